//! Chat transport trait.

use crate::InboundEvent;
use crate::error::Result;

use futures::Stream;
use std::pin::Pin;

/// Inbound event stream type.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundEvent> + Send>>;

/// A chat transport: receives channel messages and sends plain text back.
pub trait Messaging: Send + Sync + 'static {
    /// Unique name for this adapter.
    fn name(&self) -> &str;

    /// Connect and return the inbound event stream.
    fn start(&self) -> impl std::future::Future<Output = Result<InboundStream>> + Send;

    /// Join additional channels on a running connection.
    fn join(&self, channels: &[String]) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send one chat line to a channel. No splitting happens here.
    fn send(
        &self,
        channel: &str,
        text: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Health check.
    fn health_check(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Graceful shutdown.
    fn shutdown(&self) -> impl std::future::Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
