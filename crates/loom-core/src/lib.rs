//! Foundation types for the Loom hardware package manager.
//!
//! This crate provides:
//! - The closed error taxonomy shared by every Loom crate
//! - Version and constraint algebra for dependency requirements
//! - Package name parsing and normalization
//! - A generic directed graph with topological sorting
//! - A path-aware glob matcher for member and source patterns
//! - SHA-256 hashing helpers and UUID identifiers

pub mod error;
pub mod glob;
pub mod graph;
pub mod hash;
pub mod id;
pub mod name;
pub mod version;

pub use error::{Error, ErrorCode, Result};
pub use name::PackageName;
pub use version::{Constraint, ConstraintOp, PartialVersion, Version, VersionReq};

/// Loom version stamp recorded in lockfiles and cache keys.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
