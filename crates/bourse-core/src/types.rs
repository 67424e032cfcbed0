//! Shared types for exchange sessions and the request cache
//!
//! # Conventions
//! 1. Minutes are minutes since UTC midnight, `0..1440`
//! 2. Weekdays are numbered from Sunday: 0 = Sunday .. 6 = Saturday
//! 3. Cache timestamps are Unix milliseconds
//! 4. Field names serialize in snake_case, matching schedule files on disk

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScheduleError;

/// Minutes in a day; every session minute is strictly below this
pub const MINUTES_PER_DAY: u16 = 1440;

// ============================================================================
// Exchange Schedules
// ============================================================================

/// Set of weekdays an exchange trades on, stored as a bitmask (bit 0 = Sunday)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct TradingDays(u8);

impl TradingDays {
    /// Monday through Friday
    pub const MON_FRI: TradingDays = TradingDays(0b0011_1110);
    /// Sunday through Thursday (Cairo)
    pub const SUN_THU: TradingDays = TradingDays(0b0001_1111);

    /// Build from weekday numbers, rejecting anything above 6
    pub fn from_days(days: &[u8]) -> Result<Self, ScheduleError> {
        let mut mask = 0u8;
        for &day in days {
            if day > 6 {
                return Err(ScheduleError::InvalidWeekday(day));
            }
            mask |= 1 << day;
        }
        Ok(TradingDays(mask))
    }

    pub fn contains(&self, day: u8) -> bool {
        day <= 6 && self.0 & (1 << day) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Weekday numbers in ascending order
    pub fn days(&self) -> Vec<u8> {
        (0..=6).filter(|d| self.contains(*d)).collect()
    }
}

impl TryFrom<Vec<u8>> for TradingDays {
    type Error = ScheduleError;

    fn try_from(days: Vec<u8>) -> Result<Self, Self::Error> {
        TradingDays::from_days(&days)
    }
}

impl From<TradingDays> for Vec<u8> {
    fn from(days: TradingDays) -> Self {
        days.days()
    }
}

/// Trading-hour window for one exchange
///
/// The window is a closed interval: both the open and the close minute
/// count as open.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeSchedule {
    /// Unique key, e.g. "jse"
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Session open, minutes since UTC midnight
    pub open_minute_utc: u16,
    /// Session close, minutes since UTC midnight
    pub close_minute_utc: u16,
    /// Days the exchange trades
    pub trading_days: TradingDays,
}

impl ExchangeSchedule {
    /// Create a validated schedule
    pub fn new(
        id: &str,
        name: &str,
        open_minute_utc: u16,
        close_minute_utc: u16,
        trading_days: TradingDays,
    ) -> Result<Self, ScheduleError> {
        let schedule = Self {
            id: id.to_string(),
            name: name.to_string(),
            open_minute_utc,
            close_minute_utc,
            trading_days,
        };
        schedule.validate()?;
        Ok(schedule)
    }

    /// Check the invariants every schedule table relies on
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.id.is_empty() {
            return Err(ScheduleError::EmptyId);
        }

        for minute in [self.open_minute_utc, self.close_minute_utc] {
            if minute >= MINUTES_PER_DAY {
                return Err(ScheduleError::MinuteOutOfRange { id: self.id.clone(), minute });
            }
        }

        // No overnight sessions: evaluation never looks at the previous day
        if self.open_minute_utc >= self.close_minute_utc {
            return Err(ScheduleError::InvalidWindow {
                id: self.id.clone(),
                open: self.open_minute_utc,
                close: self.close_minute_utc,
            });
        }

        if self.trading_days.is_empty() {
            return Err(ScheduleError::NoTradingDays { id: self.id.clone() });
        }

        Ok(())
    }

    pub fn trades_on(&self, weekday: u8) -> bool {
        self.trading_days.contains(weekday)
    }

    /// Whether `minute` falls inside `[open, close]`
    pub fn contains_minute(&self, minute: u16) -> bool {
        self.open_minute_utc <= minute && minute <= self.close_minute_utc
    }
}

// ============================================================================
// Session Evaluation Results
// ============================================================================

/// An exchange and the instant its next session starts
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Opening {
    pub exchange_id: String,
    pub opens_at: DateTime<Utc>,
}

/// Answer to "which exchange opens next?"
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "when", rename_all = "snake_case")]
pub enum NextOpening {
    /// An exchange trading today opens later today
    LaterToday(Opening),
    /// Nothing opens later today; earliest opening on a following day
    NextSession(Opening),
    /// Today is not a trading day anywhere; earliest opening after it
    AfterWeekend(Opening),
}

impl NextOpening {
    pub fn opening(&self) -> &Opening {
        match self {
            NextOpening::LaterToday(o)
            | NextOpening::NextSession(o)
            | NextOpening::AfterWeekend(o) => o,
        }
    }

    pub fn exchange_id(&self) -> &str {
        &self.opening().exchange_id
    }

    pub fn opens_at(&self) -> DateTime<Utc> {
        self.opening().opens_at
    }

    pub fn is_later_today(&self) -> bool {
        matches!(self, NextOpening::LaterToday(_))
    }
}

/// One row of the market status board
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExchangeStatus {
    pub id: String,
    pub name: String,
    pub is_open: bool,
    /// Minutes until the close minute starts, when open; 0 during the close minute
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closes_in_minutes: Option<i64>,
    /// Minutes until the next session starts, when closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opens_in_minutes: Option<i64>,
}

// ============================================================================
// Request Cache
// ============================================================================

/// Cached response body with its insertion time
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at_ms: i64,
}

impl CacheEntry {
    pub fn new(value: Value, stored_at_ms: i64) -> Self {
        Self { value, stored_at_ms }
    }

    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.stored_at_ms
    }

    /// Fresh while `now - stored_at <= max_age_ms` (inclusive)
    pub fn is_fresh(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.age_ms(now_ms) <= max_age_ms
    }
}

/// HTTP method of a cached request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Request options; part of the cache key, otherwise opaque to the cache
///
/// Headers live in a `BTreeMap` so the serialized form, and therefore the
/// cache key, does not depend on insertion order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestOptions {
    /// Plain GET with no headers
    pub fn get() -> Self {
        Self::default()
    }

    /// POST with a JSON body
    pub fn post(body: Value) -> Self {
        Self { method: HttpMethod::Post, headers: BTreeMap::new(), body: Some(body) }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Cache key: URL followed by the serialized options
    pub fn cache_key(&self, url: &str) -> String {
        let options = serde_json::to_string(self).unwrap_or_default();
        format!("{}{}", url, options)
    }
}

/// Counters reported by the cache
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trading_days_presets() {
        assert_eq!(TradingDays::MON_FRI.days(), vec![1, 2, 3, 4, 5]);
        assert_eq!(TradingDays::SUN_THU.days(), vec![0, 1, 2, 3, 4]);
        assert!(!TradingDays::MON_FRI.contains(0));
        assert!(!TradingDays::MON_FRI.contains(6));
        assert!(!TradingDays::MON_FRI.contains(9));
    }

    #[test]
    fn test_trading_days_rejects_invalid_weekday() {
        assert!(matches!(TradingDays::from_days(&[1, 7]), Err(ScheduleError::InvalidWeekday(7))));
    }

    #[test]
    fn test_schedule_deserialize() {
        let json = r#"{
            "id": "jse",
            "name": "Johannesburg Stock Exchange",
            "open_minute_utc": 420,
            "close_minute_utc": 900,
            "trading_days": [1, 2, 3, 4, 5]
        }"#;

        let schedule: ExchangeSchedule = serde_json::from_str(json).unwrap();
        assert_eq!(schedule.trading_days, TradingDays::MON_FRI);
        assert!(schedule.validate().is_ok());

        let back = serde_json::to_value(&schedule).unwrap();
        assert_eq!(back["trading_days"], json!([1, 2, 3, 4, 5]));
    }

    #[test]
    fn test_schedule_deserialize_bad_weekday() {
        let json = r#"{"id": "x", "open_minute_utc": 1, "close_minute_utc": 2, "trading_days": [8]}"#;
        assert!(serde_json::from_str::<ExchangeSchedule>(json).is_err());
    }

    #[test]
    fn test_schedule_validation() {
        assert!(matches!(
            ExchangeSchedule::new("x", "", 900, 420, TradingDays::MON_FRI),
            Err(ScheduleError::InvalidWindow { .. })
        ));
        assert!(matches!(
            ExchangeSchedule::new("x", "", 420, 420, TradingDays::MON_FRI),
            Err(ScheduleError::InvalidWindow { .. })
        ));
        assert!(matches!(
            ExchangeSchedule::new("x", "", 420, 1440, TradingDays::MON_FRI),
            Err(ScheduleError::MinuteOutOfRange { minute: 1440, .. })
        ));
        assert!(matches!(
            ExchangeSchedule::new("x", "", 420, 900, TradingDays::from_days(&[]).unwrap()),
            Err(ScheduleError::NoTradingDays { .. })
        ));
        assert!(matches!(
            ExchangeSchedule::new("", "", 420, 900, TradingDays::MON_FRI),
            Err(ScheduleError::EmptyId)
        ));
    }

    #[test]
    fn test_contains_minute_is_closed_interval() {
        let jse = ExchangeSchedule::new("jse", "", 420, 900, TradingDays::MON_FRI).unwrap();
        assert!(!jse.contains_minute(419));
        assert!(jse.contains_minute(420));
        assert!(jse.contains_minute(900));
        assert!(!jse.contains_minute(901));
    }

    #[test]
    fn test_cache_entry_freshness() {
        let entry = CacheEntry::new(json!({"x": 1}), 1_000);
        assert!(entry.is_fresh(61_000, 60_000));
        assert!(!entry.is_fresh(61_001, 60_000));
    }

    #[test]
    fn test_cache_key_ignores_header_order() {
        let a = RequestOptions::get().with_header("b", "2").with_header("a", "1");
        let b = RequestOptions::get().with_header("a", "1").with_header("b", "2");
        assert_eq!(a.cache_key("http://x/api/news"), b.cache_key("http://x/api/news"));
    }

    #[test]
    fn test_cache_key_distinguishes_options() {
        let url = "http://x/api/markets";
        let get = RequestOptions::get().cache_key(url);
        let post = RequestOptions::post(json!({"q": 1})).cache_key(url);
        assert_ne!(get, post);
        assert_eq!(get, format!("{}{}", url, r#"{"method":"GET"}"#));
    }

    #[test]
    fn test_next_opening_serialization() {
        let next = NextOpening::LaterToday(Opening {
            exchange_id: "ngx".to_string(),
            opens_at: "2024-01-15T09:00:00Z".parse().unwrap(),
        });
        let json = serde_json::to_value(&next).unwrap();
        assert_eq!(json["when"], "later_today");
        assert_eq!(json["exchange_id"], "ngx");
    }
}
