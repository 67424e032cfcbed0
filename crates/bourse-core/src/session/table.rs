//! Exchange schedule tables
//!
//! A table is loaded once (built-in or from a JSON file), validated, and never
//! mutated afterwards. Entries are keyed by exchange id in a `BTreeMap` so
//! iteration order, and with it tie-breaking, is deterministic.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Serialize, Serializer};
use tracing::{debug, info};

use crate::error::ScheduleError;
use crate::types::{ExchangeSchedule, TradingDays};

/// Minutes since midnight for an `hh:mm` UTC time
pub const fn hm(hour: u16, minute: u16) -> u16 {
    hour * 60 + minute
}

/// Built-in African exchange hours, UTC, standard time
const BUILTIN: &[(&str, &str, u16, u16, TradingDays)] = &[
    ("jse", "Johannesburg Stock Exchange", hm(7, 0), hm(15, 0), TradingDays::MON_FRI),
    ("ngx", "Nigerian Exchange", hm(9, 0), hm(13, 30), TradingDays::MON_FRI),
    ("egx", "Egyptian Exchange", hm(8, 0), hm(12, 30), TradingDays::SUN_THU),
    ("nse", "Nairobi Securities Exchange", hm(6, 0), hm(12, 0), TradingDays::MON_FRI),
    ("gse", "Ghana Stock Exchange", hm(10, 0), hm(15, 0), TradingDays::MON_FRI),
    ("brvm", "Bourse Regionale des Valeurs Mobilieres", hm(9, 0), hm(15, 30), TradingDays::MON_FRI),
    ("bvc", "Casablanca Stock Exchange", hm(8, 30), hm(14, 30), TradingDays::MON_FRI),
];

/// Validated, immutable set of exchange schedules
#[derive(Clone, Debug, Default)]
pub struct ScheduleTable {
    schedules: BTreeMap<String, ExchangeSchedule>,
}

/// Serializes as a JSON array, the same shape `from_json_str` reads
impl Serialize for ScheduleTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.schedules.values())
    }
}

impl ScheduleTable {
    /// Build a table, validating each schedule and rejecting duplicate ids
    pub fn new(schedules: Vec<ExchangeSchedule>) -> Result<Self, ScheduleError> {
        let mut table = BTreeMap::new();

        for schedule in schedules {
            schedule.validate()?;
            if table.contains_key(&schedule.id) {
                return Err(ScheduleError::DuplicateId(schedule.id));
            }
            table.insert(schedule.id.clone(), schedule);
        }

        debug!("Schedule table built with {} exchanges", table.len());
        Ok(Self { schedules: table })
    }

    /// Compiled-in table of African exchanges
    pub fn builtin() -> Self {
        let schedules = BUILTIN
            .iter()
            .map(|&(id, name, open, close, days)| {
                let schedule = ExchangeSchedule {
                    id: id.to_string(),
                    name: name.to_string(),
                    open_minute_utc: open,
                    close_minute_utc: close,
                    trading_days: days,
                };
                (schedule.id.clone(), schedule)
            })
            .collect();

        Self { schedules }
    }

    /// Parse a JSON array of schedules
    pub fn from_json_str(json: &str) -> Result<Self, ScheduleError> {
        let schedules: Vec<ExchangeSchedule> = serde_json::from_str(json)?;
        Self::new(schedules)
    }

    /// Load a JSON schedule file
    pub fn from_path(path: &Path) -> Result<Self, ScheduleError> {
        let json = std::fs::read_to_string(path)
            .map_err(|source| ScheduleError::Io { path: path.to_path_buf(), source })?;

        let table = Self::from_json_str(&json)?;
        info!("Loaded {} exchange schedules from {}", table.len(), path.display());
        Ok(table)
    }

    pub fn get(&self, id: &str) -> Option<&ExchangeSchedule> {
        self.schedules.get(id)
    }

    /// Schedules in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &ExchangeSchedule> {
        self.schedules.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.schedules.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }
}
