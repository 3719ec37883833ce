pub mod chunker;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use chunker::{unified_chunk, ChunkParams};
pub use error::{Error, Result};
