//! Bot loop: drains inbound events one at a time, runs the engine and
//! delivers its plans.

use crate::agent::engine::Engine;
use crate::messaging::dispatch::deliver;
use crate::messaging::traits::{InboundStream, Messaging};
use crate::{BotEvent, InboundEvent};

use futures::StreamExt as _;
use tokio::sync::broadcast;

use std::sync::Arc;

pub struct Bot<M: Messaging> {
    engine: Engine,
    transport: Arc<M>,
    event_tx: broadcast::Sender<BotEvent>,
}

impl<M: Messaging> Bot<M> {
    pub fn new(engine: Engine, transport: Arc<M>, event_tx: broadcast::Sender<BotEvent>) -> Self {
        Self {
            engine,
            transport,
            event_tx,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run until the inbound stream ends. Each event is handled to
    /// completion, including paced delivery, before the next is pulled.
    pub async fn run(mut self, mut inbound: InboundStream) -> crate::Result<()> {
        tracing::info!(adapter = self.transport.name(), "bot loop started");

        while let Some(event) = inbound.next().await {
            self.handle(event).await;
        }

        tracing::info!(adapter = self.transport.name(), "bot loop stopped");
        Ok(())
    }

    async fn handle(&mut self, event: InboundEvent) {
        let cancel = self.engine.settings().cancellation();
        let result = self.engine.handle_event(&event, &cancel).await;

        if result.plan.is_empty() {
            return;
        }

        let delivered = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(channel = %event.channel, "delivery cancelled");
                false
            }
            delivery = deliver(self.transport.as_ref(), &result.plan) => match delivery {
                Ok(()) => true,
                Err(error) => {
                    tracing::error!(%error, channel = %event.channel, "failed to deliver reply");
                    false
                }
            },
        };

        let Some(reply) = result.reply().filter(|_| delivered) else {
            return;
        };

        self.event_tx
            .send(BotEvent::ReplySent {
                channel: event.channel.clone(),
                text: reply.to_string(),
            })
            .ok();

        if self.engine.settings().current().tts_enabled {
            self.event_tx
                .send(BotEvent::TtsRequested {
                    channel: event.channel.clone(),
                    text: reply.to_string(),
                    user: event.display_name().to_string(),
                })
                .ok();
        }
    }
}
