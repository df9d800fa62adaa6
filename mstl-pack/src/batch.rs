//! The batch packer: drains an entire `TraceList` in one pass (spec.md 4.H).
use std::time::{SystemTime, UNIX_EPOCH};

use log::Level::Trace;
use mstl_core::{
    flags, mstl_log, sample_time, MstlError, PackOptions, Segment, SourceId, TraceId, TraceList, NSTMODULUS,
};

use crate::template::{choose_encoding, PackedRecord, RecordPacker, RecordTemplate};

/// Packs every segment with `numsamples > 0` in `list`, calling `emit` once
/// per produced record. Returns the total number of records created.
///
/// `force_flush` mirrors the caller passing the `FLUSH_DATA` flag (spec.md
/// 4.H step 4): every segment is force-flushed regardless of idle time.
pub fn pack_list<P: RecordPacker>(
    list: &mut TraceList,
    packer: &P,
    opts: &PackOptions,
    force_flush: bool,
    mut emit: impl FnMut(&[u8]) -> Result<(), MstlError>,
) -> Result<usize, MstlError> {
    let mut total_records = 0usize;
    let id_indices: Vec<usize> = list.iter_ids().map(|(idx, _)| idx).collect();
    let mut emptied_ids = Vec::new();

    for id_idx in id_indices {
        let Some(id) = list.get_mut(id_idx) else { continue };
        let sid = id.sid.clone();
        let pubversion = id.pubversion;
        let seg_indices: Vec<usize> = id.iter_segments().map(|(idx, _)| idx).collect();

        for seg_idx in seg_indices {
            let records = pack_one_segment(id, seg_idx, &sid, pubversion, packer, opts, force_flush, &mut emit)?;
            total_records += records;
        }

        if id.is_empty() {
            emptied_ids.push(id_idx);
        }
    }

    for id_idx in emptied_ids {
        let Some(id) = list.get(id_idx) else { continue };
        let sid = id.sid.clone();
        let pubversion = id.pubversion;
        let search = list.find(&sid, pubversion, true);
        if search.found == Some(id_idx) {
            list.remove_id(id_idx, &search.predecessors);
        }
    }

    Ok(total_records)
}

/// Packs one segment to completion (or until it is not force-flushed and not
/// enough samples remain), applying spec.md 4.H step 3 bookkeeping after.
#[allow(clippy::too_many_arguments)]
fn pack_one_segment<P: RecordPacker>(
    id: &mut TraceId,
    seg_idx: usize,
    sid: &SourceId,
    pubversion: u8,
    packer: &P,
    opts: &PackOptions,
    force_flush: bool,
    emit: &mut impl FnMut(&[u8]) -> Result<(), MstlError>,
) -> Result<usize, MstlError> {
    let Some(seg) = id.get(seg_idx) else { return Ok(0) };
    if seg.numsamples() == 0 {
        return Ok(0);
    }
    let flush = force_flush || should_idle_flush(seg, opts);

    let (records, packed_samples) = run_packer(seg, sid, pubversion, packer, opts, flush, emit)?;

    if !opts.maintain_in_place() && packed_samples > 0 {
        apply_drain(id, seg_idx, packed_samples)?;
    }

    Ok(records)
}

pub(crate) fn should_idle_flush(seg: &Segment, opts: &PackOptions) -> bool {
    if opts.flush_idle_seconds() == 0 {
        return false;
    }
    let Some(last_update_ns) = seg.private_ptr else {
        return false;
    };
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let idle_seconds = now_ns.saturating_sub(last_update_ns) / NSTMODULUS;
    idle_seconds >= opts.flush_idle_seconds() as i64
}

#[allow(clippy::too_many_arguments)]
fn run_packer<P: RecordPacker>(
    seg: &Segment,
    sid: &SourceId,
    pubversion: u8,
    packer: &P,
    opts: &PackOptions,
    flush: bool,
    emit: &mut impl FnMut(&[u8]) -> Result<(), MstlError>,
) -> Result<(usize, i64), MstlError> {
    let encoding = choose_encoding(seg.sampletype(), opts.int_encoding());
    let mut template_flags = 0u32;
    if flush {
        template_flags |= flags::FLUSH_DATA;
    }
    let template = RecordTemplate {
        sid,
        pubversion,
        samprate: seg.samprate,
        starttime: seg.starttime,
        encoding,
        sampletype: seg.sampletype(),
        samples: seg.samples(),
        reclen: opts.reclen(),
        flags: template_flags,
    };

    let mut state = packer.pack_init(&template)?;
    let mut records = 0usize;
    let mut packed_samples = 0i64;

    while let Some(PackedRecord { bytes, samples_packed }) = packer.pack_next(&mut state)? {
        emit(&bytes)?;
        records += 1;
        packed_samples += samples_packed;
        mstl_log!(Trace, "packed record #{} ({} samples)", records, samples_packed);
    }

    Ok((records, packed_samples))
}

/// Shifts `seg`'s remaining samples to the front and shrinks its bookkeeping
/// after `packed` samples were consumed (spec.md 4.H step 3); removes the
/// segment once it is drained.
pub(crate) fn apply_drain(id: &mut TraceId, seg_idx: usize, packed: i64) -> Result<(), MstlError> {
    let now_empty = {
        let seg = id.get_mut(seg_idx).expect("segment still linked");
        let new_start = if packed >= seg.samplecnt {
            seg.endtime
        } else {
            sample_time(seg.starttime, packed, seg.samprate)?
        };
        seg.starttime = new_start;
        seg.samplecnt -= packed;
        seg.drain_front(packed as usize);
        seg.numsamples() == 0
    };
    if now_empty {
        id.remove(seg_idx);
    } else {
        id.bubble_into_place(seg_idx);
    }
    Ok(())
}
