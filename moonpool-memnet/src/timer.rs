//! Deadline timers.
//!
//! Converts an optional absolute deadline into a future that can be raced
//! against a queue operation:
//!
//! - `None` never fires, so no timeout applies
//! - a deadline in the past fires on the first poll
//! - otherwise it fires at the deadline, using tokio's timer

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Instant, Sleep};

/// Build a timer for the given deadline.
pub fn timer(deadline: Option<Instant>) -> DeadlineTimer {
    DeadlineTimer::new(deadline)
}

/// Future resolving once a deadline has passed.
///
/// The underlying tokio `Sleep` is only created on the first poll that needs
/// it, so a timer can be built and reset outside of a runtime. Once fired, a
/// timer keeps reporting ready until it is reset.
#[derive(Debug, Default)]
pub struct DeadlineTimer {
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl DeadlineTimer {
    /// Create a timer firing at `deadline`, or never when `None`.
    pub fn new(deadline: Option<Instant>) -> Self {
        Self {
            deadline,
            sleep: None,
        }
    }

    /// A timer that never fires.
    pub fn never() -> Self {
        Self::default()
    }

    /// The deadline this timer fires at.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Replace the deadline.
    pub fn reset(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
        self.sleep = None;
    }

    /// Whether the deadline has already passed.
    pub fn is_expired(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| deadline <= Instant::now())
    }

    /// Poll the timer without pinning it.
    pub fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        let Some(deadline) = self.deadline else {
            return Poll::Pending;
        };

        if deadline <= Instant::now() {
            return Poll::Ready(());
        }

        self.sleep
            .get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)))
            .as_mut()
            .poll(cx)
    }
}

impl Future for DeadlineTimer {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.get_mut().poll_expired(cx)
    }
}
