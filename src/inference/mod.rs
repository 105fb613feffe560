//! Inference layer primitives.
//!
//! Conflict resolution between simultaneously triggered rules. Resolution is
//! pure (no I/O) so a decision can be reproduced from its evaluation records.

mod resolver;

pub use resolver::{ConflictResolver, Lane, Resolution, Winner};
