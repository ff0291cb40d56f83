//! Soft and hard diagnostic channels.
//!
//! ```text
//!   soft  environmental: bus absent, device init failed, search exhausted
//!   hard  logic defect:  cross-category unit conversion, bad configuration
//! ```
//!
//! Both log through `log` and keep a counter plus the most recent error so
//! a status view can show them without scraping logs.

use core::cell::Cell;

use log::{error, warn};
use serde::Serialize;

use crate::error::Error;

#[derive(Debug, Default)]
pub struct Diagnostics {
    soft_count: Cell<u32>,
    hard_count: Cell<u32>,
    last_soft: Cell<Option<Error>>,
    last_hard: Cell<Option<Error>>,
}

/// Serializable snapshot of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DiagnosticCounters {
    pub soft: u32,
    pub hard: u32,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recoverable condition outside the software's control.
    pub fn soft(&self, source: &str, err: impl Into<Error>) {
        let err = err.into();
        warn!("{}: {}", source, err);
        self.soft_count.set(self.soft_count.get().saturating_add(1));
        self.last_soft.set(Some(err));
    }

    /// Programming error. The operation that hit it has already been
    /// abandoned by the caller.
    pub fn hard(&self, source: &str, err: impl Into<Error>) {
        let err = err.into();
        error!("{}: {}", source, err);
        self.hard_count.set(self.hard_count.get().saturating_add(1));
        self.last_hard.set(Some(err));
    }

    pub fn soft_count(&self) -> u32 {
        self.soft_count.get()
    }

    pub fn hard_count(&self) -> u32 {
        self.hard_count.get()
    }

    pub fn last_soft(&self) -> Option<Error> {
        self.last_soft.get()
    }

    pub fn last_hard(&self) -> Option<Error> {
        self.last_hard.get()
    }

    pub fn counters(&self) -> DiagnosticCounters {
        DiagnosticCounters {
            soft: self.soft_count(),
            hard: self.hard_count(),
        }
    }
}
