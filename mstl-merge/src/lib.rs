//! The ingest half of the TraceList engine: folds parsed records into a
//! `mstl_core::TraceList`, deciding append/prepend/insert/heal.
//!
//! Paired with `mstl-pack` the way `giga-segy-in` is paired with
//! `giga-segy-out` around the shared `giga-segy-core` data model — except both
//! directions here operate on the *same* `TraceList` rather than on
//! direction-specific file structures.
pub mod merge;

pub use merge::{add_record, add_record_flags, MergeOutcome};
pub use mstl_core::{MergeOptions, MstlError, RecordDescriptor, Tolerance, TraceList};
