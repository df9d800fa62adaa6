//! The emit half of the TraceList engine: drains a `mstl_core::TraceList` back
//! into fixed-maximum-length records, either as a one-shot batch pass or a
//! resumable generator (spec.md 4.H, 4.I).
//!
//! Paired with `mstl-merge` the way `giga-segy-out` is paired with
//! `giga-segy-in`, except both directions share one `TraceList` rather than
//! owning independent file structures.
pub mod batch;
pub mod generator;
pub mod template;

#[cfg(test)]
mod integration_tests;

pub use batch::pack_list;
pub use generator::{Packer, PackerState};
pub use template::{choose_encoding, PackedRecord, RecordPacker, RecordTemplate, ENCODING_ASCII, ENCODING_FLOAT32, ENCODING_FLOAT64};
pub use mstl_core::{MstlError, PackOptions, TraceList};
