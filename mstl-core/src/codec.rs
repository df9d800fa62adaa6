//! The boundary between the TraceList engine and the physical record codec.
//!
//! Byte-level header parsing, CRC, and data-sample encodings (Steim1/2, text,
//! float, double, ...) are an external collaborator (spec.md section 6). This
//! module defines that boundary as traits plus the plain data the engine passes
//! across it: the sample type, the source identifier, and the read-only record
//! descriptor the merge engine consumes.
use std::fmt;

use crate::errors::MstlError;

/// Maximum length of a source identifier, in bytes (spec.md section 3).
pub const SID_MAX_LEN: usize = 64;

/// A printable source identifier, e.g. `FDSN:NET_STA__B_H_Z`.
///
/// Lexicographic order on the inner string is the primary order the skip list
/// (component E) and the trace ID comparator use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId(String);

impl SourceId {
    /// Builds a `SourceId`, rejecting strings longer than [`SID_MAX_LEN`] bytes.
    pub fn new(s: impl Into<String>) -> Result<Self, MstlError> {
        let s = s.into();
        if s.len() > SID_MAX_LEN {
            return Err(MstlError::Invariant {
                msg: format!("source id {:?} exceeds {} bytes", s, SID_MAX_LEN),
            });
        }
        Ok(SourceId(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The decoded sample type carried by a segment or a record.
///
/// Mixing types within one segment is forbidden (spec.md section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    I32,
    F32,
    F64,
    Text,
}

impl SampleType {
    /// Byte size of one decoded sample of this type.
    pub fn samplesize(self) -> usize {
        match self {
            SampleType::I32 => 4,
            SampleType::F32 => 4,
            SampleType::F64 => 8,
            SampleType::Text => 1,
        }
    }
}

/// An owned buffer of decoded samples, tagged by type.
///
/// Segments and record descriptors both carry one of these; `from_record`,
/// `append`, `prepend` and `absorb` all refuse to mix variants (spec.md 4.C).
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Text(Vec<u8>),
}

impl SampleBuffer {
    pub fn sample_type(&self) -> SampleType {
        match self {
            SampleBuffer::I32(_) => SampleType::I32,
            SampleBuffer::F32(_) => SampleType::F32,
            SampleBuffer::F64(_) => SampleType::F64,
            SampleBuffer::Text(_) => SampleType::Text,
        }
    }

    /// Number of decoded samples currently held (not the same as a segment's
    /// `samplecnt`, which may include header-only / undecoded samples).
    pub fn len(&self) -> usize {
        match self {
            SampleBuffer::I32(v) => v.len(),
            SampleBuffer::F32(v) => v.len(),
            SampleBuffer::F64(v) => v.len(),
            SampleBuffer::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends `other`'s samples to `self`. Both variants must match.
    pub fn extend_from(&mut self, other: &SampleBuffer) -> Result<(), MstlError> {
        match (self, other) {
            (SampleBuffer::I32(a), SampleBuffer::I32(b)) => a.extend_from_slice(b),
            (SampleBuffer::F32(a), SampleBuffer::F32(b)) => a.extend_from_slice(b),
            (SampleBuffer::F64(a), SampleBuffer::F64(b)) => a.extend_from_slice(b),
            (SampleBuffer::Text(a), SampleBuffer::Text(b)) => a.extend_from_slice(b),
            (a, b) => {
                return Err(MstlError::SampleTypeMismatch {
                    have: a.sample_type(),
                    got: b.sample_type(),
                })
            }
        }
        Ok(())
    }

    /// Prepends `other`'s samples in front of `self`'s existing samples.
    pub fn prepend_from(&mut self, other: &SampleBuffer) -> Result<(), MstlError> {
        fn splice_front<T: Clone>(dst: &mut Vec<T>, src: &[T]) {
            let mut new_buf = Vec::with_capacity(src.len() + dst.len());
            new_buf.extend_from_slice(src);
            new_buf.append(dst);
            *dst = new_buf;
        }
        match (self, other) {
            (SampleBuffer::I32(a), SampleBuffer::I32(b)) => splice_front(a, b),
            (SampleBuffer::F32(a), SampleBuffer::F32(b)) => splice_front(a, b),
            (SampleBuffer::F64(a), SampleBuffer::F64(b)) => splice_front(a, b),
            (SampleBuffer::Text(a), SampleBuffer::Text(b)) => splice_front(a, b),
            (a, b) => {
                return Err(MstlError::SampleTypeMismatch {
                    have: a.sample_type(),
                    got: b.sample_type(),
                })
            }
        }
        Ok(())
    }

    /// Drops the first `n` decoded samples, shifting the rest to the front
    /// (the "rolling buffer" shift used by the packer, spec.md 4.H step 3).
    pub fn drain_front(&mut self, n: usize) {
        match self {
            SampleBuffer::I32(v) => {
                v.drain(0..n.min(v.len()));
            }
            SampleBuffer::F32(v) => {
                v.drain(0..n.min(v.len()));
            }
            SampleBuffer::F64(v) => {
                v.drain(0..n.min(v.len()));
            }
            SampleBuffer::Text(v) => {
                v.drain(0..n.min(v.len()));
            }
        }
    }

    /// An empty buffer of the same variant as `self`, used when constructing
    /// a fresh segment that shares a record's sample type.
    pub fn new_empty(sample_type: SampleType) -> Self {
        match sample_type {
            SampleType::I32 => SampleBuffer::I32(Vec::new()),
            SampleType::F32 => SampleBuffer::F32(Vec::new()),
            SampleType::F64 => SampleBuffer::F64(Vec::new()),
            SampleType::Text => SampleBuffer::Text(Vec::new()),
        }
    }
}

/// Bit-flags recognized at the engine boundary (spec.md section 6).
pub mod flags {
    pub const UNPACK_DATA: u32 = 1 << 0;
    pub const RECORD_LIST: u32 = 1 << 1;
    pub const SPLIT_IS_VERSION: u32 = 1 << 2;
    pub const PP_UPDATE_TIME: u32 = 1 << 3;
    pub const FLUSH_DATA: u32 = 1 << 4;
    pub const MAINTAIN_MSTL: u32 = 1 << 5;
    pub const PACK_VER2: u32 = 1 << 6;
}

/// A read-only projection of one parsed record, as the merge engine sees it.
///
/// Not retained after the merge call returns: any state the engine needs lives
/// on in `Segment`s or `RecordListEntry`s (spec.md section 3).
#[derive(Debug, Clone)]
pub struct RecordDescriptor {
    pub sid: SourceId,
    pub pubversion: u8,
    pub starttime: i64,
    /// Hz if positive, seconds-per-sample if negative.
    pub samprate: f64,
    /// Sample count declared by the record's header; may exceed `numsamples`.
    pub samplecnt: i64,
    pub sampletype: SampleType,
    /// Opaque codec-specific encoding id (Steim1/2, etc. — meaningless to this crate).
    pub encoding: u8,
    /// Decoded samples actually present (`None` for a header-only record).
    pub datasamples: Option<SampleBuffer>,
    pub reclen: u32,
    pub extra: Option<String>,
    pub flags: u32,
}

impl RecordDescriptor {
    /// Number of decoded samples present (0 for header-only records).
    pub fn numsamples(&self) -> i64 {
        self.datasamples.as_ref().map(|b| b.len() as i64).unwrap_or(0)
    }
}

/// Outcome of a `RecordCodec::parse` call.
pub enum ParseOutcome {
    Record(Box<RecordDescriptor>),
    /// Skip `n` bytes and try again (e.g. padding between records).
    Skip(usize),
    Eof,
}

/// The physical record codec, treated as an external collaborator (spec.md section 6).
///
/// Implementors own the byte-level details (CRC, Steim1/2, float/double/text
/// decoding); the engine only ever calls through this trait.
pub trait RecordCodec {
    /// Parses one record out of `buffer`, returning the outcome and the number
    /// of bytes consumed.
    fn parse(&self, buffer: &[u8], flags: u32) -> Result<(ParseOutcome, usize), MstlError>;

    /// Byte offset and length of the payload within one encoded record.
    fn data_bounds(&self, encoding: u8, reclen: u32) -> (usize, usize);

    /// Resolves a codec-specific encoding id to a decoded sample size and type.
    fn encoding_sizetype(&self, encoding: u8) -> Result<(usize, SampleType), MstlError>;

    /// Decodes `count` samples (or "as many as `bytes` holds" if `count < 0`) out
    /// of `bytes`, appending them to `out` (whose variant fixes the target sample
    /// type), returning the number of samples actually decoded.
    fn decode_samples(
        &self,
        bytes: &[u8],
        encoding: u8,
        count: i64,
        out: &mut SampleBuffer,
        swapflag: bool,
        sid: &SourceId,
    ) -> Result<i64, MstlError>;
}
