//! Utility modules shared by the frontend and the analyses.
//!
//! - Error types and diagnostics
//! - Source location tracking
//! - Symbol arena
//! - Cancellation

pub mod errors;
pub mod intern;
pub mod location;
pub mod progress;

// Re-exports
pub use errors::*;
pub use intern::{SymbolId, SymbolInfo, SymbolKind, SymbolTable};
pub use location::{SourceLocation, Span};
pub use progress::CancellationToken;
