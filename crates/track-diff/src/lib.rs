//! DiffEngine: field-level diff between two versions of an entity's data.

mod engine;

pub use engine::{
    apply_changes, compute_changes, deep_equal, diff_snapshots, to_field_map, DiffError, MAX_DEPTH,
};
