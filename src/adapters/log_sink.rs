//! Log-based measurement sink.
//!
//! Drains a sensor's measurement subscription and writes one line per
//! record to the logger (UART / USB-CDC in production). A telemetry or
//! storage consumer would subscribe the same way.

use log::info;

use crate::measurement::Measurement;
use crate::sensors::{MeasurementSubscriber, Sensor};
use crate::units::MeasurementMode;

pub struct LogMeasurementSink<'a> {
    name: &'a str,
    mode: MeasurementMode,
    subscriber: MeasurementSubscriber<'a>,
}

impl<'a> LogMeasurementSink<'a> {
    pub fn attach(sensor: &'a Sensor, mode: MeasurementMode) -> Result<Self, crate::error::Error> {
        Ok(Self {
            name: sensor.id().name(),
            mode,
            subscriber: sensor.subscribe_measurements()?,
        })
    }

    /// Logs every pending record. Returns how many were written.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Some(m) = self.subscriber.try_next_message_pure() {
            self.emit(&m);
            count += 1;
        }
        count
    }

    fn emit(&self, m: &Measurement) {
        if let Measurement::Binary(b) = m {
            info!("MEAS | {} | state={} | frame={}", self.name, b.state, b.frame);
            return;
        }
        for row in 0..m.row_count() {
            let d = m.to_data(row, self.mode, 0);
            info!(
                "MEAS | {} | row={} | {} {} | ts={} | frame={}",
                self.name,
                row,
                d.value,
                d.units,
                d.timestamp,
                m.frame()
            );
        }
    }
}
