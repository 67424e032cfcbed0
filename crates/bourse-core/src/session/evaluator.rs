//! Market Session Evaluator - open/closed state and next opening
//!
//! # Rules
//! 1. An exchange is open iff today is one of its trading days AND
//!    `open <= minute_of_day <= close` (both bounds count as open)
//! 2. Unknown exchange ids are closed, never an error
//! 3. Sessions never cross midnight, so only the current UTC day matters
//! 4. Ties between exchanges opening at the same instant go to the lowest id
//!
//! Pure and synchronous: every call takes `now` explicitly.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc};
use tracing::debug;

use super::table::ScheduleTable;
use crate::types::{ExchangeSchedule, ExchangeStatus, NextOpening, Opening};

/// Weekday of `now`, 0 = Sunday
pub fn weekday_of(now: DateTime<Utc>) -> u8 {
    now.weekday().num_days_from_sunday() as u8
}

/// Minutes since UTC midnight, seconds truncated
pub fn minute_of_day(now: DateTime<Utc>) -> u16 {
    (now.hour() * 60 + now.minute()) as u16
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Evaluates exchange sessions against a fixed schedule table
#[derive(Clone, Debug)]
pub struct MarketSessionEvaluator {
    table: ScheduleTable,
}

impl MarketSessionEvaluator {
    pub fn new(table: ScheduleTable) -> Self {
        Self { table }
    }

    /// Evaluator over the built-in African exchange table
    pub fn builtin() -> Self {
        Self::new(ScheduleTable::builtin())
    }

    pub fn table(&self) -> &ScheduleTable {
        &self.table
    }

    pub fn schedule(&self, exchange_id: &str) -> Option<&ExchangeSchedule> {
        self.table.get(exchange_id)
    }

    /// Is `exchange_id` trading at `now`?
    pub fn is_open(&self, exchange_id: &str, now: DateTime<Utc>) -> bool {
        match self.table.get(exchange_id) {
            Some(schedule) => is_schedule_open(schedule, now),
            None => {
                debug!("Unknown exchange {}, treating as closed", exchange_id);
                false
            }
        }
    }

    /// Which exchange opens next after `now`?
    ///
    /// Returns `None` only for an empty table.
    pub fn next_opening(&self, now: DateTime<Utc>) -> Option<NextOpening> {
        let (schedule, opens_at) = self
            .table
            .iter()
            .filter_map(|s| next_open_instant(s, now).map(|at| (s, at)))
            .min_by(|(a, a_at), (b, b_at)| a_at.cmp(b_at).then_with(|| a.id.cmp(&b.id)))?;

        let opening = Opening { exchange_id: schedule.id.clone(), opens_at };

        if opens_at.date_naive() == now.date_naive() {
            return Some(NextOpening::LaterToday(opening));
        }

        let today = weekday_of(now);
        let global_weekend = !self.table.iter().any(|s| s.trades_on(today));

        debug!(
            "No session opens later today; next is {} at {} (global_weekend={})",
            opening.exchange_id, opening.opens_at, global_weekend
        );

        if global_weekend {
            Some(NextOpening::AfterWeekend(opening))
        } else {
            Some(NextOpening::NextSession(opening))
        }
    }

    /// Next session start for a single exchange
    pub fn next_open_for(&self, exchange_id: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.table.get(exchange_id).and_then(|s| next_open_instant(s, now))
    }

    /// Status of every exchange: open ones first, then by id
    pub fn status_board(&self, now: DateTime<Utc>) -> Vec<ExchangeStatus> {
        let minute = minute_of_day(now);

        let mut board: Vec<ExchangeStatus> = self
            .table
            .iter()
            .map(|schedule| {
                let is_open = is_schedule_open(schedule, now);
                let closes_in_minutes =
                    is_open.then(|| i64::from(schedule.close_minute_utc) - i64::from(minute));
                let opens_in_minutes = if is_open {
                    None
                } else {
                    next_open_instant(schedule, now).map(|at| (at - now).num_minutes())
                };

                ExchangeStatus {
                    id: schedule.id.clone(),
                    name: schedule.name.clone(),
                    is_open,
                    closes_in_minutes,
                    opens_in_minutes,
                }
            })
            .collect();

        board.sort_by(|a, b| b.is_open.cmp(&a.is_open).then_with(|| a.id.cmp(&b.id)));
        board
    }
}

impl Default for MarketSessionEvaluator {
    fn default() -> Self {
        Self::builtin()
    }
}

fn is_schedule_open(schedule: &ExchangeSchedule, now: DateTime<Utc>) -> bool {
    schedule.trades_on(weekday_of(now)) && schedule.contains_minute(minute_of_day(now))
}

/// First session start strictly after the current minute, searching at most
/// one week ahead
fn next_open_instant(schedule: &ExchangeSchedule, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = weekday_of(now);
    let minute = minute_of_day(now);
    let midnight = start_of_day(now);
    let open = Duration::minutes(i64::from(schedule.open_minute_utc));

    if schedule.trades_on(today) && schedule.open_minute_utc > minute {
        return Some(midnight + open);
    }

    (1..=7u8)
        .find(|offset| schedule.trades_on((today + offset) % 7))
        .map(|offset| midnight + Duration::days(i64::from(offset)) + open)
}
