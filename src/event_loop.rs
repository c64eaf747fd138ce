use std::time::{Duration, Instant};

use crate::cancel::CancelToken;

pub enum ControlFlow {
    Continue,
    Quit,
}

/// Why [`EventLoop::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The handler asked to stop.
    Quit,
    /// The deadline passed.
    Deadline,
    /// The cancellation token fired.
    Cancelled,
}

/// Something that produces events and can be waited on with a timeout.
///
/// `wait` blocks until an event may be ready or the timeout passes; it is
/// allowed to return spuriously. `next` never blocks and returns `None` when
/// nothing is queued.
pub trait EventSource {
    type Event;
    type Error;

    fn wait(&mut self, timeout: Duration) -> Result<bool, Self::Error>;
    fn next(&mut self) -> Result<Option<Self::Event>, Self::Error>;
}

impl<T: EventSource + ?Sized> EventSource for &mut T {
    type Event = T::Event;
    type Error = T::Error;

    fn wait(&mut self, timeout: Duration) -> Result<bool, Self::Error> {
        (**self).wait(timeout)
    }

    fn next(&mut self) -> Result<Option<Self::Event>, Self::Error> {
        (**self).next()
    }
}

/// Deadline `timeout` from now, or `None` when that instant is past what the
/// monotonic clock can represent (for example `Duration::MAX`). `None` means
/// the loop runs until cancelled or quit.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// A deadline-bounded event pump.
///
/// The loop owns the thread for its whole run. It drains every queued event
/// before blocking again, and never blocks for longer than `wait_slice` at a
/// time so that cancellation is noticed promptly. The deadline is measured on
/// the monotonic clock and is the only way the loop ends on its own: an
/// idle source still keeps the caller blocked until the deadline.
pub struct EventLoop<S> {
    source: S,
    wait_slice: Duration,
}

impl<S: EventSource> EventLoop<S> {
    pub fn new(source: S, wait_slice: Duration) -> Self {
        Self {
            source,
            wait_slice: wait_slice.max(Duration::from_millis(1)),
        }
    }

    pub fn source(&mut self) -> &mut S {
        &mut self.source
    }

    /// Runs until `deadline`, until `cancel` fires, or until the handler
    /// returns [`ControlFlow::Quit`], whichever happens first. A `None`
    /// deadline never expires.
    pub fn run_until<F>(
        &mut self,
        deadline: Option<Instant>,
        cancel: &CancelToken,
        mut handler: F,
    ) -> Result<LoopExit, S::Error>
    where
        F: FnMut(&mut S, S::Event) -> Result<ControlFlow, S::Error>,
    {
        loop {
            if cancel.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(LoopExit::Deadline);
            }

            // Drain before blocking: the source may already hold events that
            // arrived alongside an earlier reply.
            while let Some(event) = self.source.next()? {
                if let ControlFlow::Quit = handler(&mut self.source, event)? {
                    return Ok(LoopExit::Quit);
                }
            }

            let slice = match deadline {
                Some(deadline) => deadline
                    .saturating_duration_since(Instant::now())
                    .min(self.wait_slice),
                None => self.wait_slice,
            };
            if slice.is_zero() {
                continue;
            }
            self.source.wait(slice)?;
        }
    }
}
