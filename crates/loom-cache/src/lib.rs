//! The incremental build cache.
//!
//! A persistent, transactional store mapping file-identity fingerprints to
//! cached parse results, include-graph edges, design-unit edges, and
//! whole-project filelists. A warm cache turns a no-change rebuild into one
//! `stat` per file.

pub mod codec;
pub mod fingerprint;
pub mod store;

pub use codec::{deserialize_parse_result, serialize_parse_result};
pub use fingerprint::{effective_hash, filelist_key};
pub use store::{
    BuildCache, CacheStats, DepEdgeEntry, FileStatEntry, FilelistEntry, IncludeDepEntry,
};
