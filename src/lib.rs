//! groundline - Grounded answers with citations from your own documents
//!
//! This is the convenience wrapper crate that re-exports the groundline
//! components.
//!
//! # Quick Start
//!
//! ```toml
//! [dependencies]
//! groundline = "0.1"
//! ```

// Re-export core
pub use groundline_core::*;

/// Prelude module for convenient imports
pub mod prelude {
    pub use groundline_core::rag::{Ingestor, VectorStore};
    pub use groundline_core::*;
}
