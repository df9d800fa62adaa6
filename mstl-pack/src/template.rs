//! The packer-side boundary to the physical record encoder (spec.md section 6:
//! `pack_init`/`pack_next`/`pack_free`), plus the ephemeral template built from
//! a segment before each packing pass (spec.md 4.H step 1).
use mstl_core::{MsTime, MstlError, SampleBuffer, SampleType, SourceId};

/// Conventional miniSEED encoding ids forced onto non-integer sample types
/// (spec.md 4.H step 1: "Encoding for text/f32/f64 is forced").
pub const ENCODING_ASCII: u8 = 0;
pub const ENCODING_FLOAT32: u8 = 4;
pub const ENCODING_FLOAT64: u8 = 5;

/// Resolves the encoding id a segment should be packed with: forced for
/// text/float types, honoring the caller's choice for integers.
pub fn choose_encoding(sampletype: SampleType, requested_int_encoding: u8) -> u8 {
    match sampletype {
        SampleType::Text => ENCODING_ASCII,
        SampleType::F32 => ENCODING_FLOAT32,
        SampleType::F64 => ENCODING_FLOAT64,
        SampleType::I32 => requested_int_encoding,
    }
}

/// An ephemeral, read-only view of one segment built just before packing it.
/// Never retained past the packing call that built it (spec.md 4.H step 1).
pub struct RecordTemplate<'a> {
    pub sid: &'a SourceId,
    pub pubversion: u8,
    pub samprate: f64,
    pub starttime: MsTime,
    pub encoding: u8,
    pub sampletype: SampleType,
    pub samples: &'a SampleBuffer,
    pub reclen: u32,
    pub flags: u32,
}

/// One physical record produced by a [`RecordPacker`], plus how many of the
/// template's samples it consumed.
pub struct PackedRecord {
    pub bytes: Vec<u8>,
    pub samples_packed: i64,
}

/// The physical record encoder, treated as an external collaborator, mirroring
/// `mstl_core::RecordCodec` on the decode side (spec.md section 6).
///
/// `State` threads packing progress across repeated `pack_next` calls so that
/// both the batch packer (which drains it to completion) and the generator
/// packer (which pauses between calls) can drive the same state machine.
pub trait RecordPacker {
    type State;

    /// Begins packing `template`, returning the initial progress state.
    fn pack_init(&self, template: &RecordTemplate<'_>) -> Result<Self::State, MstlError>;

    /// Produces the next record, or `None` once the template's samples are
    /// exhausted (or too few remain to fill even one record, for a template
    /// that is not being force-flushed).
    fn pack_next(&self, state: &mut Self::State) -> Result<Option<PackedRecord>, MstlError>;
}
