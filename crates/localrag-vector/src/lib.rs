//! localrag-vector
//!
//! Dense collaborators behind the core `DenseIndex` contract: an in-memory flat
//! inner-product index persisted as JSON, and a LanceDB-backed table.
pub mod flat;
pub mod lance;
pub mod schema;
pub mod table;

pub use flat::{l2_normalize, FlatIndex};
pub use lance::LanceIndex;
