//! Face embeddings on the unit sphere and exact nearest-neighbour search.
//!
//! All comparisons happen between L2-normalized vectors, so the Euclidean
//! distance between two embeddings is bounded to `[0, 2]` and acts as a
//! similarity proxy: `d = sqrt(2 - 2 * cos)`.

pub mod error;
pub mod flat;
pub mod l2;

pub use error::VecError;
pub use flat::{FlatIndex, Match};
pub use l2::{l2_distance, l2_norm, normalize};
