//! The merge engine: folds one parsed record into a `TraceList` (spec.md 4.F).
use log::Level::{Debug, Trace};
use std::time::{SystemTime, UNIX_EPOCH};

use mstl_core::{
    flags, mstl_log, period_ns, sample_time, MergeOptions, MsTime, MstlError, RecordDescriptor, RecordOrigin,
    Segment, Tolerance, TraceId, TraceList, Whence,
};

/// Where the record landed, returned so a caller (or the generator packer,
/// which watches for newly-touched IDs) can find it again without a second search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    pub id_idx: usize,
    pub segment_idx: usize,
    /// `true` when the record exactly duplicated an existing segment's span
    /// (autoheal idempotence) and no sample data was copied in.
    pub was_duplicate: bool,
}

/// Folds `rec` into `list`, allocating a new trace ID and/or segment as needed.
///
/// `record_origin` mirrors the `RECORD_LIST` flag (spec.md section 6): when
/// `Some`, every segment `rec` touches — newly created, appended to, or
/// prepended to — gains a record-list entry referencing `rec`'s real bytes
/// via the supplied origin (spec.md component G).
pub fn add_record(
    list: &mut TraceList,
    rec: &RecordDescriptor,
    tol: &Tolerance,
    opts: MergeOptions,
    record_origin: Option<RecordOrigin>,
) -> Result<MergeOutcome, MstlError> {
    let endtime = sample_time(rec.starttime, rec.samplecnt - 1, rec.samprate)?;
    let version_key = if opts.split_version { rec.pubversion } else { 0 };
    let search = list.find(&rec.sid, version_key, opts.split_version);

    let id_idx = match search.found {
        Some(idx) => idx,
        None => {
            mstl_log!(Trace, "merge: no existing trace id for {}, allocating", rec.sid);
            let new_id = TraceId::new(rec.sid.clone(), rec.pubversion, 0);
            list.insert_id(&search.predecessors, new_id)
        }
    };

    let id = list.get_mut(id_idx).expect("just found or inserted");

    if id.is_empty() {
        let seg = Segment::from_record(rec, endtime, record_origin.as_ref());
        let segment_idx = id.splice_after(None, seg);
        id.pubversion = rec.pubversion;
        stamp_if_requested(id, segment_idx, opts);
        return Ok(MergeOutcome {
            id_idx,
            segment_idx,
            was_duplicate: false,
        });
    }

    let nsperiod = period_ns(rec.samprate);
    let time_tol = tol.time_tolerance_ns(nsperiod);

    let first_idx = id.first_idx().expect("nonempty id has a first segment");
    let last_idx = id.last_idx().expect("nonempty id has a last segment");

    let (segbefore, segafter, followseg, was_duplicate) = if is_exact_duplicate(id, last_idx, rec, endtime) {
        (Some(last_idx), None, None, true)
    } else if is_exact_duplicate(id, first_idx, rec, endtime) {
        (Some(first_idx), None, None, true)
    } else {
        match fast_path(id, rec, endtime, nsperiod, time_tol, tol, first_idx, last_idx) {
            Some(p) => (p.segbefore, p.segafter, p.followseg, false),
            None => scan(id, rec, endtime, nsperiod, time_tol, tol),
        }
    };

    if was_duplicate {
        let segment_idx = segbefore.expect("duplicate match always reports its segment");
        mstl_log!(
            Debug,
            "merge: {} record at {} duplicates an existing segment, skipping",
            rec.sid,
            rec.starttime
        );
        stamp_if_requested(id, segment_idx, opts);
        return Ok(MergeOutcome {
            id_idx,
            segment_idx,
            was_duplicate: true,
        });
    }

    let segment_idx = apply(
        id,
        rec,
        endtime,
        segbefore,
        segafter,
        followseg,
        opts.autoheal,
        record_origin.as_ref(),
    )?;
    id.pubversion = id.pubversion.max(rec.pubversion);
    id.bubble_into_place(segment_idx);
    stamp_if_requested(id, segment_idx, opts);

    Ok(MergeOutcome {
        id_idx,
        segment_idx,
        was_duplicate: false,
    })
}

/// Legacy bitflags entry point for [`add_record`] (spec.md section 9,
/// "Legacy/deprecation notes": one shape per capability, alternatives exposed
/// as convenience wrappers rather than a second real signature). `autoheal`
/// stays an explicit argument, as in the upstream C API this mirrors; the
/// `RECORD_LIST` bit gates whether `record_origin` is actually attached, so a
/// caller can pass one in unconditionally and control tracking purely via flags.
pub fn add_record_flags(
    list: &mut TraceList,
    rec: &RecordDescriptor,
    tol: &Tolerance,
    raw_flags: u32,
    autoheal: bool,
    record_origin: Option<RecordOrigin>,
) -> Result<MergeOutcome, MstlError> {
    let opts = MergeOptions::from_flags(raw_flags, autoheal);
    let origin = record_origin.filter(|_| raw_flags & flags::RECORD_LIST != 0);
    add_record(list, rec, tol, opts, origin)
}

/// `true` when the segment at `idx` already covers exactly `[rec.starttime, endtime]`
/// (spec.md 4.F step 4, "autoheal idempotence").
fn is_exact_duplicate(id: &TraceId, idx: usize, rec: &RecordDescriptor, endtime: MsTime) -> bool {
    id.get(idx)
        .map(|seg| seg.starttime == rec.starttime && seg.endtime == endtime)
        .unwrap_or(false)
}

struct Plan {
    segbefore: Option<usize>,
    segafter: Option<usize>,
    followseg: Option<usize>,
}

/// The four fast cases from spec.md 4.F step 4, tried before falling back to a
/// full scan of the segment list.
#[allow(clippy::too_many_arguments)]
fn fast_path(
    id: &TraceId,
    rec: &RecordDescriptor,
    endtime: MsTime,
    nsperiod: i64,
    time_tol: i64,
    tol: &Tolerance,
    first_idx: usize,
    last_idx: usize,
) -> Option<Plan> {
    let last = id.get(last_idx).expect("last segment exists");
    let first = id.get(first_idx).expect("first segment exists");

    let lastgap = rec.starttime - last.endtime - nsperiod;
    if last.covered() && lastgap.abs() <= time_tol && tol.rates_match(last.samprate, rec.samprate) {
        return Some(Plan {
            segbefore: Some(last_idx),
            segafter: None,
            followseg: None,
        });
    }

    if rec.starttime - last.endtime > time_tol {
        return Some(Plan {
            segbefore: None,
            segafter: None,
            followseg: Some(last_idx),
        });
    }

    if endtime < first.starttime - time_tol {
        return Some(Plan {
            segbefore: None,
            segafter: None,
            followseg: None,
        });
    }

    let firstgap = first.starttime - endtime - nsperiod;
    if first.covered() && firstgap.abs() <= time_tol && tol.rates_match(first.samprate, rec.samprate) {
        return Some(Plan {
            segbefore: None,
            segafter: Some(first_idx),
            followseg: None,
        });
    }

    None
}

/// Walks the full segment list, tracking the three cursors from spec.md 4.F
/// step 4. Returns `(segbefore, segafter, followseg, was_duplicate)`; when
/// `was_duplicate` is `true`, `segbefore` carries the matching segment's index.
fn scan(
    id: &TraceId,
    rec: &RecordDescriptor,
    endtime: MsTime,
    nsperiod: i64,
    time_tol: i64,
    tol: &Tolerance,
) -> (Option<usize>, Option<usize>, Option<usize>, bool) {
    let mut segbefore = None;
    let mut segafter = None;
    let mut followseg = None;

    for (idx, seg) in id.iter_segments() {
        if !seg.covered() {
            continue;
        }
        if seg.starttime == rec.starttime && seg.endtime == endtime {
            return (Some(idx), None, None, true);
        }
        if segbefore.is_none() {
            let gap = rec.starttime - seg.endtime - nsperiod;
            if gap.abs() <= time_tol && tol.rates_match(seg.samprate, rec.samprate) {
                segbefore = Some(idx);
            }
        }
        if segafter.is_none() {
            let gap = seg.starttime - endtime - nsperiod;
            if gap.abs() <= time_tol && tol.rates_match(seg.samprate, rec.samprate) {
                segafter = Some(idx);
            }
        }
        if seg.starttime < rec.starttime {
            followseg = Some(idx);
        }
        if segbefore.is_some() && segafter.is_some() {
            break;
        }
    }

    (segbefore, segafter, followseg, false)
}

/// Applies the outcome of the fast path or scan (spec.md 4.F step 5).
#[allow(clippy::too_many_arguments)]
fn apply(
    id: &mut TraceId,
    rec: &RecordDescriptor,
    endtime: MsTime,
    segbefore: Option<usize>,
    segafter: Option<usize>,
    followseg: Option<usize>,
    autoheal: bool,
    record_origin: Option<&RecordOrigin>,
) -> Result<usize, MstlError> {
    if let Some(before_idx) = segbefore {
        let seg = id.get_mut(before_idx).expect("segbefore exists");
        seg.append(rec, endtime)?;
        if let Some(origin) = record_origin {
            seg.record_contribution(rec, endtime, origin, Whence::End);
        }
        if autoheal {
            if let Some(after_idx) = segafter {
                if after_idx != before_idx {
                    let absorbed = id.remove(after_idx).expect("segafter exists");
                    id.get_mut(before_idx).expect("segbefore exists").absorb(absorbed)?;
                }
            }
        }
        return Ok(before_idx);
    }

    if let Some(after_idx) = segafter {
        let seg = id.get_mut(after_idx).expect("segafter exists");
        seg.prepend(rec)?;
        if let Some(origin) = record_origin {
            seg.record_contribution(rec, endtime, origin, Whence::Start);
        }
        return Ok(after_idx);
    }

    let seg = Segment::from_record(rec, endtime, record_origin);
    Ok(id.splice_after(followseg, seg))
}

fn stamp_if_requested(id: &mut TraceId, segment_idx: usize, opts: MergeOptions) {
    if !opts.update_time {
        return;
    }
    let now_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    if let Some(seg) = id.get_mut(segment_idx) {
        seg.private_ptr = Some(now_ns);
    }
}
