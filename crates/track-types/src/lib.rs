//! Core types and collaborator traits for the change-tracking core.
//!
//! Audit entries, field changes, stage visits, query filters and the traits through which
//! the core reaches durable storage, the remote API and the current session.

mod audit;
mod dto;
mod timeline;
mod traits;

pub use audit::*;
pub use dto::*;
pub use timeline::*;
pub use traits::*;
