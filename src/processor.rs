//! Event-processing loop
//!
//! `TraceProcessor` drives the single-writer build phase: it owns the
//! [`StateBuilder`] and a set of registered handlers, and for every
//! delivered event it (1) advances the cursor, which applies all due
//! deferred mutations in (time, sequence) order, (2) validates the event
//! against each accepting handler's field-descriptor table, and (3)
//! dispatches. Validation or mutation failures follow the configured
//! error policy; by default a bad record is dropped with a warning and
//! processing continues.
//!
//! [`finish`](TraceProcessor::finish) performs the end-of-trace flush
//! (the `drain(+inf)` of remaining deferred pops) and freezes the result
//! into an immutable [`StateSystem`].

use crate::builder::StateBuilder;
use crate::config::StateConfig;
use crate::errors::Result;
use crate::event::{validate_fields, EventRecord};
use crate::handler::EventHandler;
use crate::state_system::StateSystem;

/// Single-writer driver for one trace
pub struct TraceProcessor {
    builder: StateBuilder,
    handlers: Vec<Box<dyn EventHandler>>,
    events_processed: u64,
    events_skipped: u64,
}

impl TraceProcessor {
    pub fn new(config: StateConfig) -> Self {
        TraceProcessor {
            builder: StateBuilder::new(config),
            handlers: Vec::new(),
            events_processed: 0,
            events_skipped: 0,
        }
    }

    /// Register a domain handler. Handlers are consulted in registration
    /// order; more than one may accept the same event.
    pub fn register_handler(&mut self, handler: Box<dyn EventHandler>) {
        tracing::debug!(handler = handler.id(), "registered event handler");
        self.handlers.push(handler);
    }

    pub fn builder(&self) -> &StateBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut StateBuilder {
        &mut self.builder
    }

    /// Events dispatched to at least one handler
    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Events dropped by validation or by skip-and-continue
    pub fn events_skipped(&self) -> u64 {
        self.events_skipped
    }

    /// Process one decoded event. Events must arrive in non-decreasing
    /// timestamp order.
    pub fn process(&mut self, event: &EventRecord) -> Result<()> {
        self.builder.advance(event.timestamp)?;

        // Handlers are moved out for the dispatch loop so they can borrow
        // the builder mutably.
        let mut handlers = std::mem::take(&mut self.handlers);
        let mut dispatched = false;
        let mut outcome = Ok(());
        for handler in handlers.iter_mut() {
            if !handler.accepts(event) {
                continue;
            }
            if let Err(err) = validate_fields(handler.descriptors(event), event) {
                tracing::warn!(
                    handler = handler.id(),
                    event = %event.name,
                    error = %err,
                    "event failed field validation"
                );
                self.events_skipped += 1;
                outcome = self.builder.absorb(Err(err));
                if outcome.is_err() {
                    break;
                }
                continue;
            }
            let handled = handler.handle(&mut self.builder, event);
            if handled.is_err() {
                self.events_skipped += 1;
            }
            outcome = self.builder.absorb(handled);
            if outcome.is_err() {
                break;
            }
            dispatched = true;
        }
        self.handlers = handlers;
        if dispatched {
            self.events_processed += 1;
        }
        outcome
    }

    /// Flush deferred mutations, close ongoing intervals at `end_time`
    /// (or the last applied timestamp), and freeze.
    pub fn finish(self, end_time: Option<i64>) -> Result<StateSystem> {
        tracing::debug!(
            processed = self.events_processed,
            skipped = self.events_skipped,
            "finishing trace"
        );
        self.builder.finish(end_time)
    }
}
