//! Round-trip tests between `mstl-merge` (ingest) and `mstl-pack` (emit),
//! using a fixed-width fake codec so both directions agree on a wire format
//! without depending on a real Steim/CRC implementation.
use tinyvec::TinyVec;

use mstl_core::{MstlError, ParseOutcome, RecordCodec, RecordDescriptor, SampleBuffer, SampleType, SourceId};

use crate::template::{PackedRecord, RecordPacker, RecordTemplate};

mod roundtrip;

/// Saves a heap allocation per field for the header's fixed-width numbers,
/// the same trick the teacher's `giga-segy-out::write_data` plays for its
/// own per-sample byte buffers.
type TVu8 = TinyVec<[u8; 8]>;

/// Fixed record header: sid (zero-padded to `SID_MAX_LEN`), pubversion,
/// starttime (i64), samprate (f64), sample count (u32). Payload is
/// big-endian `i32` samples, lossless for [`SampleType::I32`].
const HEADER_LEN: usize = mstl_core::SID_MAX_LEN + 1 + 8 + 8 + 4;

/// A test-only packer/codec pair that agrees on one trivial fixed-width wire
/// format, used to exercise pack -> parse -> merge round trips without an
/// external Steim/CRC implementation (spec.md section 6 treats both as
/// collaborators external to this workspace).
pub struct FixedWidthCodec;

impl RecordPacker for FixedWidthCodec {
    type State = PackState;

    fn pack_init(&self, template: &RecordTemplate<'_>) -> Result<Self::State, MstlError> {
        let SampleBuffer::I32(samples) = template.samples else {
            return Err(MstlError::UnknownSampleType { encoding: template.encoding });
        };
        let per_record = ((template.reclen as usize).saturating_sub(HEADER_LEN)) / 4;
        Ok(PackState {
            sid: template.sid.clone(),
            pubversion: template.pubversion,
            samprate: template.samprate,
            starttime: template.starttime,
            samples: samples.clone(),
            offset: 0,
            per_record: per_record.max(1),
            flush: template.flags & mstl_core::flags::FLUSH_DATA != 0,
        })
    }

    fn pack_next(&self, state: &mut Self::State) -> Result<Option<PackedRecord>, MstlError> {
        let remaining = state.samples.len() - state.offset;
        if remaining == 0 {
            return Ok(None);
        }
        let take = remaining.min(state.per_record);
        if take < state.per_record && !state.flush {
            // Not enough left to fill a full record and nobody asked to flush.
            return Ok(None);
        }

        let chunk = &state.samples[state.offset..state.offset + take];
        let record_start = mstl_core::sample_time(state.starttime, state.offset as i64, state.samprate)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + chunk.len() * 4);
        let mut sid_bytes = [0u8; mstl_core::SID_MAX_LEN];
        let sid_str = state.sid.as_str().as_bytes();
        sid_bytes[..sid_str.len()].copy_from_slice(sid_str);
        bytes.extend_from_slice(&sid_bytes);
        bytes.push(state.pubversion);
        bytes.extend_from_slice(&TVu8::from(&record_start.to_be_bytes()[..]));
        bytes.extend_from_slice(&TVu8::from(&state.samprate.to_be_bytes()[..]));
        bytes.extend_from_slice(&TVu8::from(&(chunk.len() as u32).to_be_bytes()[..]));
        for s in chunk {
            bytes.extend_from_slice(&TVu8::from(&s.to_be_bytes()[..]));
        }

        state.offset += take;
        Ok(Some(PackedRecord {
            bytes,
            samples_packed: take as i64,
        }))
    }
}

pub struct PackState {
    sid: SourceId,
    pubversion: u8,
    samprate: f64,
    starttime: i64,
    samples: Vec<i32>,
    offset: usize,
    per_record: usize,
    flush: bool,
}

impl RecordCodec for FixedWidthCodec {
    fn parse(&self, buffer: &[u8], _flags: u32) -> Result<(ParseOutcome, usize), MstlError> {
        if buffer.len() < HEADER_LEN {
            return Ok((ParseOutcome::Eof, 0));
        }
        let sid_bytes = &buffer[0..mstl_core::SID_MAX_LEN];
        let sid_len = sid_bytes.iter().position(|&b| b == 0).unwrap_or(sid_bytes.len());
        let sid = SourceId::new(std::str::from_utf8(&sid_bytes[..sid_len]).unwrap_or_default())?;
        let mut off = mstl_core::SID_MAX_LEN;
        let pubversion = buffer[off];
        off += 1;
        let starttime = i64::from_be_bytes(buffer[off..off + 8].try_into().unwrap());
        off += 8;
        let samprate = f64::from_be_bytes(buffer[off..off + 8].try_into().unwrap());
        off += 8;
        let count = u32::from_be_bytes(buffer[off..off + 4].try_into().unwrap()) as usize;
        off += 4;

        let payload_len = count * 4;
        if buffer.len() < off + payload_len {
            return Ok((ParseOutcome::Eof, 0));
        }
        let mut samples = Vec::with_capacity(count);
        for chunk in buffer[off..off + payload_len].chunks_exact(4) {
            samples.push(i32::from_be_bytes(chunk.try_into().unwrap()));
        }

        let rec = RecordDescriptor {
            sid,
            pubversion,
            starttime,
            samprate,
            samplecnt: count as i64,
            sampletype: SampleType::I32,
            encoding: 11,
            datasamples: Some(SampleBuffer::I32(samples)),
            reclen: (off + payload_len) as u32,
            extra: None,
            flags: 0,
        };
        Ok((ParseOutcome::Record(Box::new(rec)), off + payload_len))
    }

    fn data_bounds(&self, _encoding: u8, reclen: u32) -> (usize, usize) {
        (HEADER_LEN, reclen as usize - HEADER_LEN)
    }

    fn encoding_sizetype(&self, _encoding: u8) -> Result<(usize, SampleType), MstlError> {
        Ok((4, SampleType::I32))
    }

    fn decode_samples(
        &self,
        bytes: &[u8],
        _encoding: u8,
        _count: i64,
        out: &mut SampleBuffer,
        _swapflag: bool,
        _sid: &SourceId,
    ) -> Result<i64, MstlError> {
        let SampleBuffer::I32(out) = out else {
            return Err(MstlError::UnknownSampleType { encoding: 0 });
        };
        let mut n = 0i64;
        for chunk in bytes.chunks_exact(4) {
            out.push(i32::from_be_bytes(chunk.try_into().unwrap()));
            n += 1;
        }
        Ok(n)
    }
}
