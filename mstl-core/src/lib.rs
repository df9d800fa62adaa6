//! Foundation crate for the TraceList engine: the data model shared by the
//! `mstl-merge` ingest side and the `mstl-pack` emit side, following the same
//! core/in/out split as `giga-segy-core`/`giga-segy-in`/`giga-segy-out`.
//!
//! This crate owns everything that is structural (arenas, skip list, segment
//! and trace ID linkage, time arithmetic, the record-codec boundary) so that
//! both directions operate on exactly one shared `TraceList`, rather than on
//! two independently-owned representations.
pub mod codec;
pub mod errors;
pub mod logging;
pub mod recordlist;
pub mod rng;
pub mod segment;
pub mod settings;
pub mod skiplist;
pub mod slab;
pub mod time;
pub mod traceid;
pub mod tracelist;

pub use codec::{flags, ParseOutcome, RecordCodec, RecordDescriptor, SampleBuffer, SampleType, SourceId, SID_MAX_LEN};
pub use errors::MstlError;
pub use logging::{install_log_sink, Severity};
pub use recordlist::{unpack_recordlist, RecordList, RecordListEntry, RecordLocation, RecordOrigin, Whence};
pub use segment::Segment;
pub use settings::{MergeOptions, PackOptions, Tolerance, DEFAULT_RATE_TOLERANCE};
pub use slab::Slab;
pub use time::{install_leap_seconds, period_ns, sample_time, MsTime, MSTIME_ERROR, NSTMODULUS};
pub use traceid::TraceId;
pub use tracelist::{SearchResult, TraceList};
