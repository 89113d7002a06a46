//! Storage layer: Arrow layout of the reference-passage index, LanceDB (vector) backend.

mod error;
pub use error::StoreError;

pub mod passages;
pub use passages::{IndexedPassage, PASSAGES_TABLE};

#[cfg(feature = "lancedb")]
mod lance;
#[cfg(feature = "lancedb")]
pub use lance::{PassageReader, PassageStore};
