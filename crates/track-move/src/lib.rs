//! StageMoveCoordinator: optimistic pipeline stage changes over a local entity cache.
//!
//! A move rewrites every cached view of the entity right away, asks the remote API to
//! persist it, then either commits (views flagged stale, audit entry recorded) or puts the
//! cache back exactly as it was.

mod cache;
mod coordinator;

pub use cache::{CacheContents, CacheSnapshot, CachedList, CachedRecord, EntityCache};
pub use coordinator::{
    CoordinatorConfig, MoveError, MoveOutcome, MovePhase, StageMoveCoordinator,
};
