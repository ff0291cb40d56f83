//! Poll cycle driver.
//!
//! ```text
//!  run_cycle()
//!   ├─ advance the polling frame
//!   ├─ drain pin change events ─▶ force-measure interrupt-driven binaries
//!   └─ spawn take_measurement(false) for every stale sensor
//!        on edge_executor::LocalExecutor, driven by block_on
//! ```
//!
//! Sensors sharing a pin contend through the controller's pin locks, so
//! the spawned cycles interleave at lock waits, sample delays and bus
//! conversions instead of running back to back.

use std::rc::Rc;

use edge_executor::{LocalExecutor, Task};
use futures_lite::future::block_on;
use log::{debug, info};

use crate::app::controller::IoController;
use crate::error::ConfigError;
use crate::events::{PIN_EVENTS, PinEventQueue};
use crate::sensors::Sensor;

/// Sensors one poller drives. Power of two: it also sizes the executor
/// run queue.
pub const MAX_SENSORS: usize = 16;

pub struct MeasurementPoller<'q> {
    ctl: Rc<IoController>,
    sensors: heapless::Vec<Rc<Sensor>, MAX_SENSORS>,
    events: &'q PinEventQueue,
}

impl MeasurementPoller<'static> {
    /// Poller fed by the platform interrupt queue.
    pub fn new(ctl: Rc<IoController>) -> Self {
        Self::with_event_queue(ctl, &PIN_EVENTS)
    }
}

impl<'q> MeasurementPoller<'q> {
    pub fn with_event_queue(ctl: Rc<IoController>, events: &'q PinEventQueue) -> Self {
        Self {
            ctl,
            sensors: heapless::Vec::new(),
            events,
        }
    }

    /// Adds a sensor. Binary sensors switch to change interrupts when
    /// their pin supports them.
    pub fn add(&mut self, sensor: impl Into<Sensor>) -> Result<Rc<Sensor>, ConfigError> {
        let sensor = Rc::new(sensor.into());
        if !sensor.is_valid() {
            debug!("{}: invalid, not polled", sensor.id().name());
        }
        if let Some(binary) = sensor.as_binary() {
            binary.try_register_isr();
        }
        self.sensors
            .push(sensor.clone())
            .map_err(|_| ConfigError::CapacityExceeded)?;
        Ok(sensor)
    }

    pub fn sensors(&self) -> &[Rc<Sensor>] {
        &self.sensors
    }

    pub fn controller(&self) -> &Rc<IoController> {
        &self.ctl
    }

    fn handle_pin_events(&self) -> usize {
        let mut published = 0;
        self.events.drain(|pin| {
            for sensor in &self.sensors {
                let Some(binary) = sensor.as_binary() else {
                    continue;
                };
                if binary.is_using_isr() && binary.pin_number() == pin && binary.take_measurement(true)
                {
                    published += 1;
                }
            }
        });
        published
    }

    /// Runs one poll cycle. Returns how many new records were published.
    pub fn run_cycle(&self) -> usize {
        let frame = self.ctl.advance_polling_frame();
        let from_events = self.handle_pin_events();

        let executor: LocalExecutor<'_, MAX_SENSORS> = LocalExecutor::new();
        let mut tasks: heapless::Vec<Task<bool>, MAX_SENSORS> = heapless::Vec::new();
        for sensor in self
            .sensors
            .iter()
            .filter(|s| s.is_valid() && s.needs_polling())
        {
            let sensor = sensor.clone();
            let task = executor.spawn(async move { sensor.take_measurement(false).await });
            // capacity matches the sensor list
            let _ = tasks.push(task);
        }
        let spawned = tasks.len();

        let polled = block_on(executor.run(async move {
            let mut published = 0;
            for task in tasks {
                if task.await {
                    published += 1;
                }
            }
            published
        }));

        if from_events + polled > 0 {
            info!(
                "poll frame {}: {} polled of {} due, {} from events",
                frame, polled, spawned, from_events
            );
        }
        from_events + polled
    }
}
