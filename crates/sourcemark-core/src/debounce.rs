//! Quiescence-window coalescing of events.
//!
//! A [`Debouncer`] is one debounced task bound to a single logical handler. Events are queued
//! and the deadline is pushed back on every arrival; once the window passes without new
//! events, the handler receives the whole queue at once. The handler can be replaced between
//! invocations without losing queued events.
//!
//! The clock is passed in by the caller so hosts drive it from their own event loop.

use std::fmt;
use std::time::{Duration, Instant};

/// Default quiescence window for edit bursts.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Handler invoked with the coalesced events and a caller-provided context.
pub type DebounceHandler<E, C> = Box<dyn FnMut(&mut C, Vec<E>)>;

/// Coalesces events until a quiescence window passes.
pub struct Debouncer<E, C> {
    window: Duration,
    pending: Vec<E>,
    deadline: Option<Instant>,
    handler: DebounceHandler<E, C>,
}

impl<E, C> Debouncer<E, C> {
    /// Create a debouncer with the given window and handler.
    pub fn new(window: Duration, handler: impl FnMut(&mut C, Vec<E>) + 'static) -> Self {
        Self {
            window,
            pending: Vec::new(),
            deadline: None,
            handler: Box::new(handler),
        }
    }

    /// Replace the handler. Queued events are kept and delivered to the new handler.
    pub fn set_handler(&mut self, handler: impl FnMut(&mut C, Vec<E>) + 'static) {
        self.handler = Box::new(handler);
    }

    /// Quiescence window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Queue events observed at `now`, restarting the window.
    pub fn push(&mut self, events: impl IntoIterator<Item = E>, now: Instant) {
        self.pending.extend(events);
        self.deadline = Some(now + self.window);
    }

    /// Queued events.
    pub fn pending(&self) -> &[E] {
        &self.pending
    }

    /// Mutable access to queued events, e.g. to remap them after later changes.
    pub fn pending_mut(&mut self) -> &mut Vec<E> {
        &mut self.pending
    }

    /// Whether anything is queued.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// When the queued events will be delivered, if any are queued.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.filter(|_| self.has_pending())
    }

    /// Deliver queued events if the window has passed at `now`. Returns whether it fired.
    pub fn poll(&mut self, now: Instant, context: &mut C) -> bool {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.fire(context),
            _ => false,
        }
    }

    /// Deliver queued events immediately. Returns whether anything was delivered.
    pub fn flush(&mut self, context: &mut C) -> bool {
        if self.has_pending() {
            self.fire(context)
        } else {
            false
        }
    }

    /// Drop queued events without delivering them.
    pub fn cancel(&mut self) -> Vec<E> {
        self.deadline = None;
        std::mem::take(&mut self.pending)
    }

    fn fire(&mut self, context: &mut C) -> bool {
        self.deadline = None;
        let events = std::mem::take(&mut self.pending);
        (self.handler)(context, events);
        true
    }
}

impl<E: fmt::Debug, C> fmt::Debug for Debouncer<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debouncer")
            .field("window", &self.window)
            .field("pending", &self.pending)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}
