//! Exchange trading sessions
//!
//! # Components
//! - `ScheduleTable`: validated exchange hours, built-in or loaded from JSON
//! - `MarketSessionEvaluator`: open/closed checks, next opening, status board

mod evaluator;
pub mod table;

pub use evaluator::{minute_of_day, weekday_of, MarketSessionEvaluator};
pub use table::{hm, ScheduleTable};
