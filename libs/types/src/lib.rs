//! Types library for the sensor freshness feed
//!
//! Shared type definitions used by the ingestion core and the HTTP gateway.
//!
//! # Modules
//! - `ids`: Sensor source identifier (SourceId)
//! - `measurement`: Particulate-matter reading as delivered by the upstream provider
//! - `errors`: Error taxonomy

// Public modules
pub mod ids;
pub mod measurement;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::measurement::*;
    pub use crate::errors::*;
}
