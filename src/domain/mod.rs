//! Core entities shared by every component: jobs, job items, and the events
//! written alongside them.

pub mod cursor;
pub mod model;

pub use cursor::Cursor;
pub use model::{
    JobItemStatus, JobType, MatchQuality, NormalizedItem, QueueState, ResultRecord,
};
