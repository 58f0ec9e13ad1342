//! Delayed lifecycle events exchanged between the strategy and the exchange.
//!
//! Every event is delivered a fixed propagation delay after it was decided.
//! Because the delay is the same for every producer, enqueue order is already
//! delivery order and the queue is a plain FIFO: the driver pops from the head
//! while the head is due.

use std::collections::VecDeque;

use bt_core::Order;

/// A typed event routed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Exchange → strategy: the order is fully filled.
    Executed(Order),

    /// Strategy → exchange: place the order.
    CreateOrder(Order),

    /// Strategy → exchange: cancel the resting order with this id.
    CancelOrder(Order),

    /// Driver → strategy: periodic price observation.
    CheckPrice {
        /// Trade price when the check was scheduled.
        price: f64,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Executed(_) => EventKind::Executed,
            Self::CreateOrder(_) => EventKind::CreateOrder,
            Self::CancelOrder(_) => EventKind::CancelOrder,
            Self::CheckPrice { .. } => EventKind::CheckPrice,
        }
    }
}

/// Discriminant of [`Event`], for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Executed,
    CreateOrder,
    CancelOrder,
    CheckPrice,
}

/// An event with the clock value at which it becomes deliverable.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledEvent {
    pub due: i64,
    pub event: Event,
}

/// FIFO of scheduled events with one fixed propagation delay.
#[derive(Debug, Clone)]
pub struct EventQueue {
    delay: i64,
    events: VecDeque<ScheduledEvent>,
}

impl EventQueue {
    /// Create an empty queue. `delay` is applied by [`schedule`](Self::schedule).
    pub fn new(delay: i64) -> Self {
        Self { delay, events: VecDeque::new() }
    }

    pub fn delay(&self) -> i64 {
        self.delay
    }

    /// Append `event`, deliverable once the clock reaches `due`.
    pub fn enqueue(&mut self, event: Event, due: i64) {
        self.events.push_back(ScheduledEvent { due, event });
    }

    /// Append `event`, deliverable one propagation delay after `now`.
    pub fn schedule(&mut self, now: i64, event: Event) {
        self.enqueue(event, now + self.delay);
    }

    /// Due time of the head event.
    pub fn peek_due(&self) -> Option<i64> {
        self.events.front().map(|e| e.due)
    }

    /// Pop the head event if it is due at `now`.
    pub fn pop_due(&mut self, now: i64) -> Option<Event> {
        if self.peek_due()? <= now {
            self.events.pop_front().map(|e| e.event)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.events.iter()
    }
}
