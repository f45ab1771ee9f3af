//! StageTimelineReconstructor: derive the ordered stage visits of an entity by replaying
//! its audit history.

mod config;
mod reconstruct;

pub use config::TimelineConfig;
pub use reconstruct::{replay, StageTimeline};
pub use track_types::StageVisit;
