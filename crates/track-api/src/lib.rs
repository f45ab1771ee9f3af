//! Change-tracking REST API: audit log, stage timelines and optimistic pipeline moves.

pub mod server;
