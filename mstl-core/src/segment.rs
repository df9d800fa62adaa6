//! One contiguous run of decoded samples for one source ID (spec.md component C).
use crate::codec::{RecordDescriptor, SampleBuffer, SampleType};
use crate::errors::MstlError;
use crate::recordlist::{RecordList, RecordListEntry, RecordOrigin, Whence};
use crate::time::MsTime;

/// One contiguous decoded-sample run. Lives inside one [`crate::traceid::TraceId`]'s
/// segment arena; `prev`/`next` are arena indices into that same arena, not pointers
/// (spec.md design notes).
#[derive(Clone)]
pub struct Segment {
    pub starttime: MsTime,
    pub endtime: MsTime,
    /// Hz if positive, seconds-per-sample if negative.
    pub samprate: f64,
    /// Sample count declared by contributing headers; may exceed `numsamples`.
    pub samplecnt: i64,
    /// Decoded samples actually present.
    pub(crate) data: SampleBuffer,
    pub recordlist: Option<RecordList>,
    /// Opaque private pointer; used here to stash the last-update time (ns epoch)
    /// when the caller asks for update-time stamping (`PP_UPDATE_TIME`).
    pub private_ptr: Option<i64>,
    pub(crate) prev: Option<usize>,
    pub(crate) next: Option<usize>,
}

impl Segment {
    /// Number of decoded samples actually present.
    pub fn numsamples(&self) -> i64 {
        self.data.len() as i64
    }

    pub fn sampletype(&self) -> SampleType {
        self.data.sample_type()
    }

    pub fn samples(&self) -> &SampleBuffer {
        &self.data
    }

    /// Drops the first `n` decoded samples, shifting the rest to the front
    /// (the packer's rolling-buffer shift, spec.md 4.H step 3).
    pub fn drain_front(&mut self, n: usize) {
        self.data.drain_front(n);
    }

    /// `true` when the segment has time coverage: `samplecnt > 0 && samprate != 0`.
    /// A segment without coverage is "header-only" and only mergeable by exact
    /// SID/time equality (spec.md 9, open questions).
    pub fn covered(&self) -> bool {
        self.samplecnt > 0 && self.samprate != 0.0
    }

    /// Builds a fresh segment out of a record. Copies decoded samples when
    /// `rec.datasamples` is `Some`; otherwise produces a header-only segment.
    /// When `origin` is supplied, starts the segment's record list with one
    /// `Whence::NewList` entry referencing the record's real bytes.
    pub fn from_record(rec: &RecordDescriptor, endtime: MsTime, origin: Option<&RecordOrigin>) -> Segment {
        let data = rec
            .datasamples
            .clone()
            .unwrap_or_else(|| SampleBuffer::new_empty(rec.sampletype));

        let recordlist = origin.map(|o| {
            let mut list = RecordList::new();
            list.push(Whence::NewList, RecordListEntry::from_record(rec, endtime, o));
            list
        });

        Segment {
            starttime: rec.starttime,
            endtime,
            samprate: rec.samprate,
            samplecnt: rec.samplecnt,
            data,
            recordlist,
            private_ptr: None,
            prev: None,
            next: None,
        }
    }

    /// Records `rec` as an additional contributor to this already-existing
    /// segment, at `whence` (`End` for an append, `Start` for a prepend).
    /// Lazily starts the record list if this segment did not have one yet —
    /// the caller may start requesting `RECORD_LIST` tracking mid-stream.
    pub fn record_contribution(&mut self, rec: &RecordDescriptor, endtime: MsTime, origin: &RecordOrigin, whence: Whence) {
        let list = self.recordlist.get_or_insert_with(RecordList::new);
        list.push(whence, RecordListEntry::from_record(rec, endtime, origin));
    }

    /// Extends the segment with `rec`'s samples, bumping `endtime`/`samplecnt`.
    pub fn append(&mut self, rec: &RecordDescriptor, endtime: MsTime) -> Result<(), MstlError> {
        if let Some(new_samples) = &rec.datasamples {
            if new_samples.sample_type() != self.data.sample_type() {
                return Err(MstlError::SampleTypeMismatch {
                    have: self.data.sample_type(),
                    got: new_samples.sample_type(),
                });
            }
            self.data.extend_from(new_samples)?;
        }
        self.endtime = endtime;
        self.samplecnt += rec.samplecnt;
        Ok(())
    }

    /// Shifts existing samples forward and copies `rec`'s samples to the front,
    /// moving `starttime` backward.
    pub fn prepend(&mut self, rec: &RecordDescriptor) -> Result<(), MstlError> {
        if let Some(new_samples) = &rec.datasamples {
            if new_samples.sample_type() != self.data.sample_type() {
                return Err(MstlError::SampleTypeMismatch {
                    have: self.data.sample_type(),
                    got: new_samples.sample_type(),
                });
            }
            self.data.prepend_from(new_samples)?;
        }
        self.starttime = rec.starttime;
        self.samplecnt += rec.samplecnt;
        Ok(())
    }

    /// Appends `other`'s samples and record list onto `self`, then advances
    /// `endtime` to `other`'s. `other` is consumed (spec.md 4.F step 5, healing).
    pub fn absorb(&mut self, other: Segment) -> Result<(), MstlError> {
        if other.data.sample_type() != self.data.sample_type() {
            return Err(MstlError::SampleTypeMismatch {
                have: self.data.sample_type(),
                got: other.data.sample_type(),
            });
        }
        self.data.extend_from(&other.data)?;
        self.samplecnt += other.samplecnt;
        self.endtime = other.endtime;
        match (&mut self.recordlist, other.recordlist) {
            (Some(mine), Some(theirs)) => mine.absorb(theirs),
            (mine @ None, Some(theirs)) => *mine = Some(theirs),
            _ => {}
        }
        Ok(())
    }
}
