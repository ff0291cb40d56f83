//! Pin lock arbiter.
//!
//! A lock is an exclusive lease on one physical pin number. Unrelated
//! pins never contend; two sensors sharing a bus pin take turns.
//!
//! ```text
//!   sensor A ──try_acquire(4)──▶ ┌──────────┐
//!   sensor B ──try_acquire(4)──▶ │ PinLocks │  held: [4, 17]
//!   sensor C ──try_acquire(9)──▶ └──────────┘
//! ```
//!
//! Waiting with a timeout is cooperative: [`acquire_pin_lock`] retries on
//! reactor timer ticks so other tasks on the executor keep running.

use core::cell::RefCell;
use core::time::Duration;
use std::time::Instant;

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::{Mutex, raw::NoopRawMutex};
use log::{trace, warn};

use super::PinNumber;
use crate::app::ports::Controller;

/// Most pins that can be leased at once.
pub const MAX_PIN_LOCKS: usize = 32;

pub struct PinLocks {
    held: Mutex<NoopRawMutex, RefCell<heapless::Vec<PinNumber, MAX_PIN_LOCKS>>>,
}

impl Default for PinLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl PinLocks {
    pub const fn new() -> Self {
        Self {
            held: Mutex::new(RefCell::new(heapless::Vec::new())),
        }
    }

    /// Takes the lease if nobody holds it. Never waits.
    pub fn try_acquire(&self, pin: PinNumber) -> bool {
        self.held.lock(|held| {
            let mut held = held.borrow_mut();
            if held.contains(&pin) {
                return false;
            }
            if held.push(pin).is_err() {
                warn!("pin locks: table full, refusing pin {}", pin);
                return false;
            }
            true
        })
    }

    pub fn release(&self, pin: PinNumber) {
        self.held.lock(|held| {
            let mut held = held.borrow_mut();
            if let Some(i) = held.iter().position(|&p| p == pin) {
                held.swap_remove(i);
            }
        });
    }

    pub fn is_held(&self, pin: PinNumber) -> bool {
        self.held.lock(|held| held.borrow().contains(&pin))
    }

    pub fn held_count(&self) -> usize {
        self.held.lock(|held| held.borrow().len())
    }
}

/// Releases its pin when dropped, so every early return of a measurement
/// cycle gives the lock back.
pub struct PinLease<'a> {
    ctl: &'a dyn Controller,
    pin: PinNumber,
}

impl<'a> PinLease<'a> {
    pub fn try_new(ctl: &'a dyn Controller, pin: PinNumber) -> Option<Self> {
        ctl.try_acquire_pin_lock(pin)
            .then_some(Self { ctl, pin })
    }

    pub fn pin(&self) -> PinNumber {
        self.pin
    }
}

impl Drop for PinLease<'_> {
    fn drop(&mut self) {
        self.ctl.release_pin_lock(self.pin);
    }
}

/// Acquires `pin`, waiting up to `timeout_ms`. A zero timeout fails at
/// once when the pin is taken.
pub async fn acquire_pin_lock(
    ctl: &dyn Controller,
    pin: PinNumber,
    timeout_ms: u32,
) -> Option<PinLease<'_>> {
    if let Some(lease) = PinLease::try_new(ctl, pin) {
        return Some(lease);
    }
    if timeout_ms == 0 {
        return None;
    }
    let tick = Duration::from_millis(u64::from(ctl.config().lock_poll_interval_ms.max(1)));
    let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
    loop {
        Timer::after(tick).await;
        if let Some(lease) = PinLease::try_new(ctl, pin) {
            return Some(lease);
        }
        if Instant::now() >= deadline {
            trace!("pin {}: lock wait timed out after {}ms", pin, timeout_ms);
            return None;
        }
    }
}
