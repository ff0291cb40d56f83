//! Pin change notifications from interrupt context.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ GPIO ISR    │────▶│ PinEventQueue│────▶│ MeasurementPoller│
//! │ (any edge)  │     │  (lock-free) │     │  (consumer)      │
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```
//!
//! The ISR only records which pin changed. The poller drains the queue
//! at the start of a cycle and force-measures the binary sensors on
//! those pins, so a level change is published without waiting for the
//! record to go stale. Nothing is lost if the queue overflows: the
//! polled pass still picks the change up.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::pins::PinNumber;

/// Pending notifications. One slot stays empty to tell full from empty.
const PIN_EVENT_CAP: usize = 32;

/// Single-producer, single-consumer ring of pin numbers.
pub struct PinEventQueue {
    head: AtomicU8,
    tail: AtomicU8,
    slots: [AtomicU8; PIN_EVENT_CAP],
}

impl Default for PinEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PinEventQueue {
    pub const fn new() -> Self {
        Self {
            head: AtomicU8::new(0),
            tail: AtomicU8::new(0),
            slots: [const { AtomicU8::new(0) }; PIN_EVENT_CAP],
        }
    }

    /// Producer side; safe from interrupt context. `false` when full.
    pub fn push(&self, pin: PinNumber) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next = (head + 1) % PIN_EVENT_CAP as u8;
        if next == tail {
            return false;
        }
        self.slots[head as usize].store(pin, Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    pub fn pop(&self) -> Option<PinNumber> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let pin = self.slots[tail as usize].load(Ordering::Relaxed);
        self.tail
            .store((tail + 1) % PIN_EVENT_CAP as u8, Ordering::Release);
        Some(pin)
    }

    /// Hands every pending pin to `handler` in arrival order.
    pub fn drain(&self, mut handler: impl FnMut(PinNumber)) {
        while let Some(pin) = self.pop() {
            handler(pin);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed) as usize;
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        (head + PIN_EVENT_CAP - tail) % PIN_EVENT_CAP
    }
}

/// Queue the platform ISR feeds.
pub static PIN_EVENTS: PinEventQueue = PinEventQueue::new();

/// ISR entry point.
pub fn notify_pin_change(pin: PinNumber) -> bool {
    PIN_EVENTS.push(pin)
}
