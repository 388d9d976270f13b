//! Scrapes the class schedule, professor ratings and assignment calendars,
//! and reshapes them into the JSON documents the planner consumes.

pub mod calendar;
pub mod catalog;
pub mod fetch;
pub mod parse;
pub mod rate;
pub mod ratings;
pub mod schedule;
pub mod store;
pub mod sync;

pub use catalog::{simplify, Course, Section, TimeBlock, TitleCodeIndex};
pub use fetch::FetchError;
pub use rate::RateLimiter;
pub use schedule::{ClassSchedule, ScheduleService, Session};
pub use sync::{synchronize, SyncOptions, SyncReport};
