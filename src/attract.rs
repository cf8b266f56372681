//! Attract mode
//!
//! After a stretch without external commands the daemon entertains on its
//! own, alternating the wall clock with a random clip from the artwork tree.
//! It drives the display only through the public scheduler API, and any
//! external command pushes the next cycle back by the full inactivity window.

use chrono::{Local, NaiveTime};
use parking_lot::Mutex;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::scheduler::{PictureRequest, RequestedDuration, Scheduler, TextRequest};
use crate::surface::{TextStyle, Transition};
use crate::timer::{Ticket, TimerKind, TimerSlot};

#[derive(Clone)]
pub struct Attract {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    scheduler: Scheduler,
}

struct Inner {
    slot: TimerSlot,
    enabled: bool,
    clock_next: bool,
    /// The looping clock is ours and still in front
    owns_clock: bool,
}

impl Attract {
    pub fn new(scheduler: Scheduler, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    slot: TimerSlot::new(TimerKind::AttractInactivity, runtime),
                    enabled: false,
                    clock_next: true,
                    owns_clock: false,
                }),
                scheduler,
            }),
        }
    }

    /// Begin watching for inactivity
    pub fn start(&self) {
        let mut inner = self.shared.inner.lock();
        inner.enabled = true;
        let delay = self.shared.scheduler.settings().attract_inactivity();
        info!(inactivity_s = delay.as_secs(), "Attract mode enabled");
        arm(&self.shared, &mut inner, delay);
    }

    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        inner.enabled = false;
        inner.slot.cancel();
        if std::mem::take(&mut inner.owns_clock) {
            self.shared.scheduler.stop_loop();
        }
    }

    /// An external command arrived; restart the inactivity window and let
    /// our clock run out instead of looping over the game
    pub fn notify_activity(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.enabled {
            return;
        }
        if std::mem::take(&mut inner.owns_clock) {
            debug!("Attract: activity, clock loop released");
            self.shared.scheduler.stop_loop();
        }
        inner.clock_next = true;
        let delay = self.shared.scheduler.settings().attract_inactivity();
        arm(&self.shared, &mut inner, delay);
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.shared.inner.lock().slot.is_armed()
    }
}

fn arm(shared: &Arc<Shared>, inner: &mut Inner, delay: Duration) {
    let weak = Arc::downgrade(shared);
    inner.slot.arm(delay, move |ticket| {
        if let Some(shared) = weak.upgrade() {
            on_fire(&shared, ticket);
        }
    });
}

fn on_fire(shared: &Arc<Shared>, ticket: Ticket) {
    let mut guard = shared.inner.lock();
    let inner = &mut *guard;
    if !inner.slot.claim(ticket) || !inner.enabled {
        return;
    }

    let settings = shared.scheduler.settings();
    let cycle = settings.attract_cycle();
    let show_clock = inner.clock_next || !show_random_clip(&shared.scheduler);
    if show_clock {
        let text = clock_text(Local::now().time(), settings.hour_format);
        debug!(text = %text, "Attract: clock");
        shared.scheduler.submit_text(TextRequest {
            text,
            style: TextStyle::from_settings(settings),
            animation: Transition::None,
            duration: RequestedDuration::Explicit(cycle),
            clean_background: true,
            looping: true,
        });
    }
    inner.clock_next = !show_clock;
    inner.owns_clock = show_clock;

    arm(shared, inner, cycle);
}

/// False when there is nothing to play
fn show_random_clip(scheduler: &Scheduler) -> bool {
    let catalog = scheduler.resolver().animated_catalog();
    let Some(logical) = catalog.choose(&mut rand::rng()) else {
        debug!("Attract: no clips in the artwork tree");
        return false;
    };

    debug!(clip = %logical, "Attract: clip");
    match scheduler.submit_picture(PictureRequest::new(logical.as_str(), RequestedDuration::Natural)) {
        Ok(()) => true,
        Err(e) => {
            warn!(clip = %logical, error = %e, "Attract clip failed");
            false
        }
    }
}

fn clock_text(time: NaiveTime, hour_format: u8) -> String {
    let format = if hour_format == 12 { "%-I:%M %p" } else { "%H:%M" };
    time.format(format).to_string()
}
