//! The resumable generator packer: drains a `TraceList` one record at a time
//! across repeated `next()` calls, so a caller can interleave ingestion and
//! emission (spec.md 4.I).
use log::Level::Trace;
use mstl_core::{mstl_log, MstlError, PackOptions, SourceId, TraceList};

use crate::batch::{apply_drain, should_idle_flush};
use crate::template::{choose_encoding, PackedRecord, RecordPacker, RecordTemplate};

/// The generator's internal state (spec.md 4.I, "State machine states").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackerState {
    Idle,
    InSegment,
    FinishedSegment,
    Done,
}

/// A resumable drain of a `TraceList`. Does not own the list: every [`Packer::next`]
/// call borrows it, so callers may add records to the list between calls.
pub struct Packer<'p, P: RecordPacker> {
    packer: &'p P,
    opts: PackOptions,
    force_flush: bool,
    state: PackerState,
    current: Option<(usize, usize)>,
    inner: Option<P::State>,
    current_segment_packed: i64,
    total_records: usize,
    total_samples: i64,
}

impl<'p, P: RecordPacker> Packer<'p, P> {
    /// `force_flush` mirrors a caller passing `FLUSH_DATA` for every segment
    /// regardless of idle time (spec.md section 6). Independent of that,
    /// `opts.flush_idle_seconds()` is honored per segment the same way the
    /// batch packer does it (spec.md section 8, property 8): a segment whose
    /// private-pointer update time is older than the threshold is flushed
    /// even without `force_flush` set.
    pub fn new(packer: &'p P, opts: PackOptions, force_flush: bool) -> Self {
        Packer {
            packer,
            opts,
            force_flush,
            state: PackerState::Idle,
            current: None,
            inner: None,
            current_segment_packed: 0,
            total_records: 0,
            total_samples: 0,
        }
    }

    pub fn state(&self) -> PackerState {
        self.state
    }

    /// Sets the `FLUSH_DATA` override for segments not yet started (spec.md
    /// section 8, property 7: callers drain normally until `next()` returns
    /// `None`, then set this and call once more to force out the remainder).
    /// Has no effect on a segment whose inner record-packer state already
    /// exists — it only takes effect the next time [`Self::begin_segment`] runs.
    pub fn set_force_flush(&mut self, flush: bool) {
        self.force_flush = flush;
    }

    pub fn total_records(&self) -> usize {
        self.total_records
    }

    /// Cumulative packed-sample count (what `free()` reports in spec.md 4.I).
    pub fn total_samples(&self) -> i64 {
        self.total_samples
    }

    /// Drives the state machine one step, returning the next packed record's
    /// bytes, or `None` when the whole list was scanned without producing one
    /// (the caller may add more data to `list` and call `next` again) or when
    /// the packer is [`PackerState::Done`].
    pub fn next(&mut self, list: &mut TraceList) -> Result<Option<Vec<u8>>, MstlError> {
        // When not maintaining in place, a segment that yields no record and
        // is not drained (too few samples, not flushed) stays put with
        // `numsamples > 0` — rescanning from the head would pick the exact
        // same segment forever. `stalled_at` remembers that segment for the
        // rest of *this* call only, so the scan steps past it instead of
        // looping; the next outside `next()` call still restarts from the
        // head, so newly-added data stays visible (spec.md 4.I).
        let mut stalled_at: Option<(usize, usize)> = None;
        loop {
            match self.state {
                PackerState::Done => return Ok(None),
                PackerState::InSegment => match self.advance_inner()? {
                    Some(bytes) => return Ok(Some(bytes)),
                    None => {
                        let progressed = self.current_segment_packed > 0;
                        self.finish_current_segment(list)?;
                        if !progressed {
                            stalled_at = self.current;
                        }
                        self.state = PackerState::FinishedSegment;
                    }
                },
                PackerState::FinishedSegment | PackerState::Idle => {
                    let next = if self.opts.maintain_in_place() {
                        match self.current {
                            Some((id_idx, seg_idx)) => next_after(list, id_idx, seg_idx),
                            None => first_with_samples(list),
                        }
                    } else {
                        match stalled_at {
                            Some((id_idx, seg_idx)) => next_after(list, id_idx, seg_idx),
                            None => first_with_samples(list),
                        }
                    };

                    match next {
                        Some((id_idx, seg_idx)) => {
                            self.current = Some((id_idx, seg_idx));
                            self.current_segment_packed = 0;
                            self.begin_segment(list, id_idx, seg_idx)?;
                            self.state = PackerState::InSegment;
                        }
                        None => {
                            // "None remains" means no segment anywhere still
                            // holds samples — not merely none *after* a
                            // stalled one, which would wrongly finalize a
                            // packer that a caller could still add data to
                            // or force-flush (spec.md 4.I, section 8 property 8).
                            if self.state == PackerState::FinishedSegment && first_with_samples(list).is_none() {
                                self.state = PackerState::Done;
                            }
                            return Ok(None);
                        }
                    }
                }
            }
        }
    }

    fn advance_inner(&mut self) -> Result<Option<Vec<u8>>, MstlError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(None);
        };
        match self.packer.pack_next(inner)? {
            Some(PackedRecord { bytes, samples_packed }) => {
                self.total_records += 1;
                self.total_samples += samples_packed;
                self.current_segment_packed += samples_packed;
                mstl_log!(
                    Trace,
                    "generator packed record #{} ({} samples)",
                    self.total_records,
                    samples_packed
                );
                Ok(Some(bytes))
            }
            None => {
                self.inner = None;
                Ok(None)
            }
        }
    }

    fn begin_segment(&mut self, list: &mut TraceList, id_idx: usize, seg_idx: usize) -> Result<(), MstlError> {
        let id = list.get(id_idx).expect("scan returned a live id");
        let seg = id.get(seg_idx).expect("scan returned a live segment");
        let sid: SourceId = id.sid.clone();
        let encoding = choose_encoding(seg.sampletype(), self.opts.int_encoding());
        let mut template_flags = 0u32;
        if self.force_flush || should_idle_flush(seg, &self.opts) {
            template_flags |= mstl_core::flags::FLUSH_DATA;
        }
        let template = RecordTemplate {
            sid: &sid,
            pubversion: id.pubversion,
            samprate: seg.samprate,
            starttime: seg.starttime,
            encoding,
            sampletype: seg.sampletype(),
            samples: seg.samples(),
            reclen: self.opts.reclen(),
            flags: template_flags,
        };
        self.inner = Some(self.packer.pack_init(&template)?);
        Ok(())
    }

    fn finish_current_segment(&mut self, list: &mut TraceList) -> Result<(), MstlError> {
        let Some((id_idx, seg_idx)) = self.current else { return Ok(()) };
        if self.opts.maintain_in_place() || self.current_segment_packed == 0 {
            return Ok(());
        }
        if let Some(id) = list.get_mut(id_idx) {
            apply_drain(id, seg_idx, self.current_segment_packed)?;
        }
        // A trace id whose last segment just emptied is removed from the
        // list itself (spec.md 4.H step 3 / section 8 scenario S6), the same
        // cleanup the batch packer performs after draining each id.
        if let Some(id) = list.get(id_idx) {
            if id.is_empty() {
                let sid = id.sid.clone();
                let pubversion = id.pubversion;
                let search = list.find(&sid, pubversion, true);
                if search.found == Some(id_idx) {
                    list.remove_id(id_idx, &search.predecessors);
                }
            }
        }
        Ok(())
    }
}

/// Scans `list` from the head for the first segment with `numsamples > 0`.
fn first_with_samples(list: &TraceList) -> Option<(usize, usize)> {
    for (id_idx, id) in list.iter_ids() {
        for (seg_idx, seg) in id.iter_segments() {
            if seg.numsamples() > 0 {
                return Some((id_idx, seg_idx));
            }
        }
    }
    None
}

/// Scans `list` for the first segment with `numsamples > 0` strictly after
/// `(after_id, after_seg)` in list order (used by `maintain_in_place`, which
/// never removes a drained segment and so must advance deterministically).
fn next_after(list: &TraceList, after_id: usize, after_seg: usize) -> Option<(usize, usize)> {
    let mut seen_current_id = false;
    let mut passed_current_seg = false;

    for (id_idx, id) in list.iter_ids() {
        if id_idx == after_id {
            seen_current_id = true;
            for (seg_idx, seg) in id.iter_segments() {
                if passed_current_seg && seg.numsamples() > 0 {
                    return Some((id_idx, seg_idx));
                }
                if seg_idx == after_seg {
                    passed_current_seg = true;
                }
            }
            continue;
        }
        if seen_current_id {
            for (seg_idx, seg) in id.iter_segments() {
                if seg.numsamples() > 0 {
                    return Some((id_idx, seg_idx));
                }
            }
        }
    }
    None
}
