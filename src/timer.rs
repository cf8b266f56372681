//! Named one-shot timer slots
//!
//! A slot holds at most one pending firing. Arming a slot cancels whatever
//! was pending in it. Each firing carries a [`Ticket`]; the owner must
//! [`TimerSlot::claim`] the ticket under the same lock it uses to cancel, so
//! a cancel is final even when the sleeping task has already woken up and is
//! waiting for that lock.

use std::fmt;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::trace;

/// The four timers the daemon runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// End of the current foreground item (also drives the score grace delay)
    AnimationExpiry,
    /// Scoreboard back to marquee
    ScoreAutoHide,
    /// Attract mode inactivity / cycle cadence
    AttractInactivity,
    /// Re-issue of a looping text command
    TextLoop,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AnimationExpiry => "animation_expiry",
            Self::ScoreAutoHide => "score_auto_hide",
            Self::AttractInactivity => "attract_inactivity",
            Self::TextLoop => "text_loop",
        };
        f.write_str(name)
    }
}

/// Identifies one particular arming of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    kind: TimerKind,
    generation: u64,
}

#[derive(Debug)]
struct Pending {
    ticket: Ticket,
    delay: Duration,
    task: JoinHandle<()>,
}

/// One named timer with at most one pending firing
#[derive(Debug)]
pub struct TimerSlot {
    kind: TimerKind,
    runtime: Handle,
    generation: u64,
    pending: Option<Pending>,
}

impl TimerSlot {
    pub fn new(kind: TimerKind, runtime: Handle) -> Self {
        Self {
            kind,
            runtime,
            generation: 0,
            pending: None,
        }
    }

    /// Schedule `on_fire` after `delay`, replacing any pending firing.
    ///
    /// `on_fire` runs on the runtime and must call [`claim`](Self::claim)
    /// with the ticket it receives before acting.
    pub fn arm<F>(&mut self, delay: Duration, on_fire: F) -> Ticket
    where
        F: FnOnce(Ticket) + Send + 'static,
    {
        self.cancel();
        self.generation = self.generation.wrapping_add(1);
        let ticket = Ticket {
            kind: self.kind,
            generation: self.generation,
        };

        let task = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket);
        });
        trace!(timer = %self.kind, delay_ms = delay.as_millis() as u64, generation = ticket.generation, "Timer armed");

        self.pending = Some(Pending { ticket, delay, task });
        ticket
    }

    /// Drop the pending firing, if any. Returns whether one was pending.
    pub fn cancel(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                pending.task.abort();
                trace!(timer = %self.kind, generation = pending.ticket.generation, "Timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Accept a firing. False when the ticket was cancelled or superseded,
    /// in which case the callback must do nothing.
    pub fn claim(&mut self, ticket: Ticket) -> bool {
        match &self.pending {
            Some(pending) if pending.ticket == ticket => {
                // The task is the caller; let it finish instead of aborting it
                self.pending = None;
                true
            }
            _ => {
                trace!(timer = %self.kind, generation = ticket.generation, "Stale timer firing ignored");
                false
            }
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }

    /// Delay the pending firing was armed with
    pub fn armed_delay(&self) -> Option<Duration> {
        self.pending.as_ref().map(|p| p.delay)
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Slot plus a log of accepted firings, shared the way the scheduler shares its state
    struct Harness {
        slot: TimerSlot,
        fired: Vec<u32>,
    }

    fn arm(shared: &Arc<Mutex<Harness>>, delay_ms: u64, tag: u32) {
        let weak = Arc::downgrade(shared);
        shared.lock().slot.arm(Duration::from_millis(delay_ms), move |ticket| {
            if let Some(shared) = weak.upgrade() {
                let mut h = shared.lock();
                if h.slot.claim(ticket) {
                    h.fired.push(tag);
                }
            }
        });
    }

    fn harness() -> Arc<Mutex<Harness>> {
        Arc::new(Mutex::new(Harness {
            slot: TimerSlot::new(TimerKind::AnimationExpiry, Handle::current()),
            fired: Vec::new(),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let h = harness();
        arm(&h, 500, 1);
        assert_eq!(h.lock().slot.armed_delay(), Some(Duration::from_millis(500)));

        tokio::time::sleep(Duration::from_millis(499)).await;
        assert!(h.lock().fired.is_empty());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(h.lock().fired, vec![1]);
        assert!(!h.lock().slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_pending() {
        let h = harness();
        arm(&h, 100, 1);
        arm(&h, 300, 2);

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(h.lock().fired, vec![2], "first arming must never fire");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_is_final() {
        let h = harness();
        arm(&h, 100, 1);
        assert!(h.lock().slot.cancel());
        assert!(!h.lock().slot.cancel());

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(h.lock().fired.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ticket_rejected() {
        let h = harness();
        let old = h.lock().slot.arm(Duration::from_secs(60), |_| {});
        arm(&h, 100, 2);
        assert!(!h.lock().slot.claim(old));
        assert!(h.lock().slot.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_from_inside_callback() {
        let h = harness();
        let weak = Arc::downgrade(&h);
        h.lock().slot.arm(Duration::from_millis(100), move |ticket| {
            let Some(shared) = weak.upgrade() else { return };
            let mut guard = shared.lock();
            if guard.slot.claim(ticket) {
                guard.fired.push(1);
            }
            drop(guard);
            arm(&shared, 100, 2);
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(h.lock().fired, vec![1]);
        assert!(h.lock().slot.is_armed());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(h.lock().fired, vec![1, 2]);
    }
}
