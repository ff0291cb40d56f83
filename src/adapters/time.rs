//! System clock adapter.
//!
//! - **`target_os = "espidf"`**: uptime from `esp_timer_get_time()`
//!   (microseconds, monotonic), wall clock from `gettimeofday()`.
//! - **`not(target_os = "espidf")`**: `std::time` for host runs.

use crate::app::ports::Clock;

pub struct SystemClock {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        // SAFETY: gettimeofday writes into the stack-local timeval only.
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return 0;
        }
        i64::from(tv.tv_sec)
    }

    fn uptime_ms(&self) -> u64 {
        // SAFETY: esp_timer_get_time is a counter read with no side effects.
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64 / 1_000
    }
}

#[cfg(not(target_os = "espidf"))]
impl Clock for SystemClock {
    fn unix_now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs() as i64)
    }

    fn uptime_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}
