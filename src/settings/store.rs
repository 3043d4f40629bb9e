//! Settings store: the configuration snapshot the engine reads per event.

use crate::BotEvent;
use crate::config::BotConfig;
use crate::error::{ConfigError, Result};

use arc_swap::ArcSwap;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Editors write a file in several steps; wait this long for them to settle.
const RELOAD_DEBOUNCE: Duration = Duration::from_millis(250);

/// State to clear when a new configuration is applied. A plain swap keeps
/// both conversation history and the cooldown timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reset {
    pub history: bool,
    pub cooldown: bool,
}

impl Reset {
    pub fn all() -> Self {
        Self {
            history: true,
            cooldown: true,
        }
    }
}

/// Holds the current immutable `BotConfig`. Writers replace it wholesale;
/// readers take an `Arc` snapshot that stays valid for the whole event.
pub struct SettingsStore {
    path: Option<PathBuf>,
    current: ArcSwap<BotConfig>,
    reset_history: AtomicBool,
    reset_cooldown: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl SettingsStore {
    pub fn new(config: BotConfig) -> Self {
        Self {
            path: None,
            current: ArcSwap::from_pointee(config),
            reset_history: AtomicBool::new(false),
            reset_cooldown: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Load from `path` (if any) plus the environment and remember the path
    /// for `reload` and `watch`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = BotConfig::load(path)?;
        Ok(Self {
            path: path.map(Path::to_path_buf),
            ..Self::new(config)
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn current(&self) -> Arc<BotConfig> {
        self.current.load_full()
    }

    /// Swap in a new configuration. Deactivating the bot cancels any call
    /// that is in flight.
    pub fn replace(&self, config: BotConfig, reset: Reset) {
        if reset.history {
            self.reset_history.store(true, Ordering::Release);
        }
        if reset.cooldown {
            self.reset_cooldown.store(true, Ordering::Release);
        }

        let active = config.active;
        self.current.store(Arc::new(config));

        tracing::info!(
            active,
            reset_history = reset.history,
            reset_cooldown = reset.cooldown,
            "configuration replaced"
        );

        if !active {
            self.cancel_in_flight();
        }
    }

    /// Re-read the file and environment. Returns `false` when nothing changed.
    pub fn reload(&self) -> Result<bool> {
        let config = BotConfig::load(self.path())?;
        if *self.current.load_full() == config {
            return Ok(false);
        }
        self.replace(config, Reset::default());
        Ok(true)
    }

    /// Pending resets, cleared on read.
    pub fn take_reset(&self) -> Reset {
        Reset {
            history: self.reset_history.swap(false, Ordering::AcqRel),
            cooldown: self.reset_cooldown.swap(false, Ordering::AcqRel),
        }
    }

    /// Token for the next model call.
    pub fn cancellation(&self) -> CancellationToken {
        self.lock_cancel().clone()
    }

    /// Cancel every call holding the current token and arm a fresh one.
    pub fn cancel_in_flight(&self) {
        let mut token = self.lock_cancel();
        token.cancel();
        *token = CancellationToken::new();
        tracing::debug!("in-flight model calls cancelled");
    }

    fn lock_cancel(&self) -> std::sync::MutexGuard<'_, CancellationToken> {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reload whenever the config file changes and announce successful
    /// reloads on `events`. The watch stops when the returned handle drops.
    pub fn watch(self: &Arc<Self>, events: broadcast::Sender<BotEvent>) -> Result<SettingsWatcher> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| ConfigError::Invalid("no config file to watch".into()))?;
        let file_name = path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| ConfigError::Invalid(format!("{} is not a file", path.display())))?;
        // Watch the directory: editors replace files rather than write in place.
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (change_tx, mut change_rx) = mpsc::channel::<()>(16);

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            match result {
                Ok(event) => {
                    let relevant = !matches!(event.kind, EventKind::Access(_))
                        && event
                            .paths
                            .iter()
                            .any(|changed| changed.file_name() == Some(file_name.as_os_str()));
                    if relevant {
                        change_tx.try_send(()).ok();
                    }
                }
                Err(error) => tracing::warn!(%error, "config watcher error"),
            }
        })
        .map_err(ConfigError::from)?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(ConfigError::from)?;

        tracing::info!(path = %path.display(), "watching config file");

        let store = Arc::clone(self);
        let task = tokio::spawn(async move {
            while change_rx.recv().await.is_some() {
                tokio::time::sleep(RELOAD_DEBOUNCE).await;
                while change_rx.try_recv().is_ok() {}

                match store.reload() {
                    Ok(true) => {
                        events.send(BotEvent::ConfigReloaded).ok();
                    }
                    Ok(false) => tracing::debug!("config file touched, no changes"),
                    Err(error) => {
                        tracing::warn!(%error, "config reload failed, keeping previous configuration");
                    }
                }
            }
        });

        Ok(SettingsWatcher {
            _watcher: watcher,
            task,
        })
    }
}

/// Keeps the file watch alive. Dropping it stops reloading.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}
