//! Cooldown gate: at most one admitted model call per cooldown window.

use std::sync::Mutex;
use tokio::time::{Duration, Instant};

/// Result of asking the gate for a call slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { remaining: Duration },
}

#[derive(Debug)]
struct GateState {
    window: Duration,
    last_call: Option<Instant>,
}

/// Tracks the last admitted call. Check and update happen under one lock so
/// two events racing across a suspension point cannot both pass.
#[derive(Debug)]
pub struct CooldownGate {
    state: Mutex<GateState>,
}

impl CooldownGate {
    pub fn new(window: Duration) -> Self {
        Self {
            state: Mutex::new(GateState {
                window,
                last_call: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // The state is two plain values; a panic mid-update cannot leave it torn.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admit the call at `now` if the window since the last admission has
    /// fully elapsed, recording `now` as the new last call.
    pub fn try_admit(&self, now: Instant) -> Admission {
        let mut state = self.lock();

        if let Some(last_call) = state.last_call {
            let elapsed = now.saturating_duration_since(last_call);
            if elapsed < state.window {
                return Admission::Rejected {
                    remaining: state.window - elapsed,
                };
            }
        }

        state.last_call = Some(now);
        Admission::Admitted
    }

    pub fn window(&self) -> Duration {
        self.lock().window
    }

    /// Change the window. The last admission time is kept.
    pub fn set_window(&self, window: Duration) {
        self.lock().window = window;
    }

    /// Forget the last admission so the next call is admitted immediately.
    pub fn reset(&self) {
        self.lock().last_call = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(10_000);

    #[test]
    fn rejects_inside_window() {
        let gate = CooldownGate::new(WINDOW);
        let t = Instant::now();

        assert_eq!(gate.try_admit(t), Admission::Admitted);
        assert_eq!(
            gate.try_admit(t + WINDOW - Duration::from_millis(1)),
            Admission::Rejected {
                remaining: Duration::from_millis(1)
            }
        );
    }

    #[test]
    fn admits_at_window_boundary() {
        let gate = CooldownGate::new(WINDOW);
        let t = Instant::now();

        assert_eq!(gate.try_admit(t), Admission::Admitted);
        assert_eq!(gate.try_admit(t + WINDOW), Admission::Admitted);
    }

    #[test]
    fn rejection_does_not_extend_the_window() {
        let gate = CooldownGate::new(WINDOW);
        let t = Instant::now();

        assert_eq!(gate.try_admit(t), Admission::Admitted);
        assert!(matches!(
            gate.try_admit(t + Duration::from_secs(5)),
            Admission::Rejected { .. }
        ));
        assert_eq!(gate.try_admit(t + WINDOW), Admission::Admitted);
    }

    #[test]
    fn reset_and_window_changes() {
        let gate = CooldownGate::new(WINDOW);
        let t = Instant::now();
        assert_eq!(gate.try_admit(t), Admission::Admitted);

        gate.reset();
        assert_eq!(gate.try_admit(t + Duration::from_millis(1)), Admission::Admitted);

        gate.set_window(Duration::from_millis(100));
        assert_eq!(gate.window(), Duration::from_millis(100));
        assert_eq!(
            gate.try_admit(t + Duration::from_millis(101)),
            Admission::Admitted
        );
    }

    #[test]
    fn zero_window_admits_everything() {
        let gate = CooldownGate::new(Duration::ZERO);
        let t = Instant::now();
        assert_eq!(gate.try_admit(t), Admission::Admitted);
        assert_eq!(gate.try_admit(t), Admission::Admitted);
    }
}
