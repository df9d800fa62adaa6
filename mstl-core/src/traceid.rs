//! Per-source-identifier entry: the segment list plus the skip list's inline
//! forward-pointer array (spec.md component D).
use crate::codec::SourceId;
use crate::errors::MstlError;
use crate::segment::Segment;
use crate::skiplist::{empty_forward, ForwardPointers};
use crate::slab::Slab;
use crate::time::MsTime;

/// One source identifier's segment list and skip-list linkage.
pub struct TraceId {
    pub sid: SourceId,
    pub pubversion: u8,
    pub earliest: MsTime,
    pub latest: MsTime,
    segments: Slab<Segment>,
    first: Option<usize>,
    last: Option<usize>,
    numsegments: usize,
    pub(crate) height: u8,
    pub(crate) next: ForwardPointers,
}

impl TraceId {
    pub fn new(sid: SourceId, pubversion: u8, height: u8) -> Self {
        TraceId {
            sid,
            pubversion,
            earliest: MsTime::MAX,
            latest: MsTime::MIN,
            segments: Slab::new(),
            first: None,
            last: None,
            numsegments: 0,
            height,
            next: empty_forward(),
        }
    }

    pub fn numsegments(&self) -> usize {
        self.numsegments
    }

    pub fn is_empty(&self) -> bool {
        self.numsegments == 0
    }

    pub fn first_idx(&self) -> Option<usize> {
        self.first
    }

    pub fn last_idx(&self) -> Option<usize> {
        self.last
    }

    pub fn get(&self, idx: usize) -> Option<&Segment> {
        self.segments.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Segment> {
        self.segments.get_mut(idx)
    }

    /// Splices a freshly built `seg` into the list immediately after `after`
    /// (or at the head if `after` is `None`). Returns the new segment's index.
    pub fn splice_after(&mut self, after: Option<usize>, mut seg: Segment) -> usize {
        let new_idx = match after {
            None => {
                seg.prev = None;
                seg.next = self.first;
                let idx = self.segments.insert(seg);
                if let Some(first) = self.first {
                    self.segments.get_mut(first).expect("first exists").prev = Some(idx);
                } else {
                    self.last = Some(idx);
                }
                self.first = Some(idx);
                idx
            }
            Some(pred) => {
                let pred_next = self.segments.get(pred).expect("predecessor exists").next;
                seg.prev = Some(pred);
                seg.next = pred_next;
                let idx = self.segments.insert(seg);
                self.segments.get_mut(pred).expect("predecessor exists").next = Some(idx);
                if let Some(next) = pred_next {
                    self.segments.get_mut(next).expect("next exists").prev = Some(idx);
                } else {
                    self.last = Some(idx);
                }
                idx
            }
        };
        self.numsegments += 1;
        self.recompute_bounds();
        new_idx
    }

    /// Unlinks and drops the segment at `idx`.
    pub fn remove(&mut self, idx: usize) -> Option<Segment> {
        let seg = self.segments.get(idx)?;
        let (prev, next) = (seg.prev, seg.next);
        match prev {
            Some(p) => self.segments.get_mut(p).expect("prev exists").next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => self.segments.get_mut(n).expect("next exists").prev = prev,
            None => self.last = prev,
        }
        let removed = self.segments.remove(idx);
        self.numsegments -= 1;
        self.recompute_bounds();
        removed
    }

    /// Re-sorts the segment at `idx` into place by `(starttime, -endtime)` using
    /// adjacent swaps — spec.md 4.F step 6 calls for a bubble sort since at most
    /// a handful of swaps are ever expected (merge only ever touches one segment
    /// per call, and it is already nearly in position).
    pub fn bubble_into_place(&mut self, idx: usize) {
        // Bubble left while the predecessor should sort after us.
        loop {
            let prev = self.segments.get(idx).and_then(|s| s.prev);
            let Some(prev_idx) = prev else { break };
            if !Self::out_of_order(self.segments.get(prev_idx).unwrap(), self.segments.get(idx).unwrap()) {
                break;
            }
            self.swap_adjacent(prev_idx, idx);
        }
        // Bubble right while we should sort after our successor.
        loop {
            let next = self.segments.get(idx).and_then(|s| s.next);
            let Some(next_idx) = next else { break };
            if !Self::out_of_order(self.segments.get(idx).unwrap(), self.segments.get(next_idx).unwrap()) {
                break;
            }
            self.swap_adjacent(idx, next_idx);
        }
        self.recompute_bounds();
    }

    /// `true` when `a` should sort strictly after `b`, i.e. the pair is out of order.
    fn out_of_order(a: &Segment, b: &Segment) -> bool {
        (a.starttime, std::cmp::Reverse(a.endtime)) > (b.starttime, std::cmp::Reverse(b.endtime))
    }

    /// Swaps the two arena entries `left`/`right`, which must be adjacent with
    /// `left` immediately preceding `right`, relinking their neighbors.
    fn swap_adjacent(&mut self, left: usize, right: usize) {
        let before = self.segments.get(left).expect("left exists").prev;
        let after = self.segments.get(right).expect("right exists").next;

        match before {
            Some(b) => self.segments.get_mut(b).unwrap().next = Some(right),
            None => self.first = Some(right),
        }
        match after {
            Some(a) => self.segments.get_mut(a).unwrap().prev = Some(left),
            None => self.last = Some(left),
        }

        {
            let r = self.segments.get_mut(right).unwrap();
            r.prev = before;
            r.next = Some(left);
        }
        {
            let l = self.segments.get_mut(left).unwrap();
            l.prev = Some(right);
            l.next = after;
        }
    }

    fn recompute_bounds(&mut self) {
        if let Some(first) = self.first {
            self.earliest = self.segments.get(first).expect("first exists").starttime;
        }
        if let Some(last) = self.last {
            self.latest = self.segments.get(last).expect("last exists").endtime;
        }
        if self.first.is_none() {
            self.earliest = MsTime::MAX;
            self.latest = MsTime::MIN;
        }
    }

    pub fn iter_segments(&self) -> SegmentIter<'_> {
        SegmentIter {
            id: self,
            cursor: self.first,
        }
    }

    pub fn total_samples(&self) -> i64 {
        self.iter_segments().map(|(_, s)| s.numsamples()).sum()
    }

    pub(crate) fn check_ordering_invariant(&self) -> Result<(), MstlError> {
        let mut prev: Option<&Segment> = None;
        for (_, seg) in self.iter_segments() {
            if let Some(p) = prev {
                if (p.starttime, std::cmp::Reverse(p.endtime)) > (seg.starttime, std::cmp::Reverse(seg.endtime)) {
                    return Err(MstlError::Invariant {
                        msg: "segment list is not sorted by (starttime, -endtime)".to_string(),
                    });
                }
            }
            prev = Some(seg);
        }
        Ok(())
    }
}

pub struct SegmentIter<'a> {
    id: &'a TraceId,
    cursor: Option<usize>,
}

impl<'a> Iterator for SegmentIter<'a> {
    type Item = (usize, &'a Segment);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let seg = self.id.segments.get(idx).expect("linked segment exists");
        self.cursor = seg.next;
        Some((idx, seg))
    }
}
