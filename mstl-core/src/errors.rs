//! Error kinds surfaced at the TraceList engine boundary.
use crate::codec::SampleType;

/// Errors produced by the `mstl` engine (model, merge and pack crates share this type).
#[derive(Debug)]
pub enum MstlError {
    /// Out of memory while growing a buffer or allocating an arena slot.
    Allocation,
    /// Attempt to merge samples of different types into one segment.
    SampleTypeMismatch { have: SampleType, got: SampleType },
    /// `samplesize()` could not be determined for a declared sample type/encoding.
    UnknownSampleType { encoding: u8 },
    /// A record's end time could not be computed.
    TimeCompute { msg: String },
    /// An internal invariant was violated (bad `whence`, missing predecessor, ...).
    Invariant { msg: String },
    /// The upstream parser/packer/decoder (an external collaborator) reported a failure.
    Codec { msg: String },
    /// A file seek/read failed while resolving a record-list entry.
    Io(std::io::Error),
}

impl From<std::io::Error> for MstlError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::fmt::Display for MstlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use MstlError::*;
        match self {
            Allocation => write!(f, "allocation failed"),
            SampleTypeMismatch { have, got } => {
                write!(f, "cannot merge sample type {:?} into segment of type {:?}", got, have)
            }
            UnknownSampleType { encoding } => {
                write!(f, "unknown sample size/type for encoding {}", encoding)
            }
            TimeCompute { msg } => write!(f, "could not compute time: {}", msg),
            Invariant { msg } => write!(f, "internal invariant violated: {}", msg),
            Codec { msg } => write!(f, "codec error: {}", msg),
            Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for MstlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MstlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MstlError> for String {
    fn from(e: MstlError) -> String {
        e.to_string()
    }
}
