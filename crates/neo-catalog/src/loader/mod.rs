//! Catalog loads from JPL, merged and MPCORB exports.

pub mod mpcorb;
pub mod neo;
mod report;

pub use mpcorb::{MpcorbLoader, MpcorbReport};
pub use neo::{LoadMode, LoadReport, NeoLoader, DEFAULT_MERGED_HEADER, DEFAULT_NEO_HEADER};
pub use report::{ErrorCount, ErrorSample, LoadStatus};
