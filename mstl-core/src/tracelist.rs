//! The `TraceList` container: a sentinel-headed skip list of [`TraceId`]s
//! (spec.md component E plus the overall container described in section 3).
use crate::codec::SourceId;
use crate::errors::MstlError;
use crate::rng::Rng;
use crate::skiplist::{compare_keys, empty_forward, ForwardPointers, MAX_HEIGHT};
use crate::slab::Slab;
use crate::traceid::TraceId;

/// The result of a skip list search: the matching node (if any) and, at every
/// level, the node whose forward pointer would need to change on insert/remove.
pub struct SearchResult {
    pub found: Option<usize>,
    pub predecessors: ForwardPointers,
}

/// An in-memory, continuously merged representation of arbitrarily many
/// channels (spec.md section 1). Owns its trace IDs exclusively; each trace ID
/// owns its segments exclusively (spec.md section 3, "Ownership").
pub struct TraceList {
    ids: Slab<TraceId>,
    head: ForwardPointers,
    rng: Rng,
    num_ids: usize,
}

impl Default for TraceList {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceList {
    pub fn new() -> Self {
        TraceList {
            ids: Slab::new(),
            head: empty_forward(),
            rng: Rng::default(),
            num_ids: 0,
        }
    }

    pub fn num_ids(&self) -> usize {
        self.num_ids
    }

    pub fn is_empty(&self) -> bool {
        self.num_ids == 0
    }

    pub fn get(&self, idx: usize) -> Option<&TraceId> {
        self.ids.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut TraceId> {
        self.ids.get_mut(idx)
    }

    /// Two-at-once mutable access, used by the merge engine's heal step which
    /// needs to absorb one segment's list into another's sibling trace ID's
    /// arena edge case — in practice both segments always belong to the *same*
    /// trace ID, so this is exposed on `TraceId` itself; kept here only for
    /// symmetry with the id-level arena.
    pub fn get_pair_mut(&mut self, a: usize, b: usize) -> (&mut TraceId, &mut TraceId) {
        self.ids.get_pair_mut(a, b)
    }

    /// Searches for `(sid, pubversion)`. When `version_sensitive` is `false`,
    /// the publication version is ignored and the first node matching `sid` is
    /// returned (there is at most one, when the caller never splits by version).
    pub fn find(&self, sid: &SourceId, pubversion: u8, version_sensitive: bool) -> SearchResult {
        let mut predecessors = empty_forward();
        let mut cur: Option<usize> = None;

        for level in (0..MAX_HEIGHT).rev() {
            let mut node = cur.map_or(self.head[level], |c| self.ids.get(c).unwrap().next[level]);
            loop {
                let Some(idx) = node else { break };
                let id = self.ids.get(idx).expect("linked id exists");
                let ord = compare_keys(&id.sid, id.pubversion, sid, pubversion, version_sensitive);
                if ord == std::cmp::Ordering::Less {
                    cur = Some(idx);
                    node = id.next[level];
                } else {
                    break;
                }
            }
            predecessors[level] = cur;
        }

        let candidate = match cur {
            Some(c) => self.ids.get(c).unwrap().next[0],
            None => self.head[0],
        };
        let found = candidate.filter(|&idx| {
            let id = self.ids.get(idx).unwrap();
            compare_keys(&id.sid, id.pubversion, sid, pubversion, version_sensitive) == std::cmp::Ordering::Equal
        });

        SearchResult { found, predecessors }
    }

    /// Inserts a freshly built `id` using the predecessor array from a prior
    /// miss-returning [`Self::find`] call. Returns the new node's index.
    pub fn insert_id(&mut self, predecessors: &ForwardPointers, mut id: TraceId) -> usize {
        let height = self.rng.random_height();
        id.height = height;
        id.next = empty_forward();
        let new_idx = self.ids.insert(id);

        for level in 0..height as usize {
            let pred = predecessors[level];
            let pred_next = match pred {
                Some(p) => self.ids.get(p).unwrap().next[level],
                None => self.head[level],
            };
            self.ids.get_mut(new_idx).unwrap().next[level] = pred_next;
            match pred {
                Some(p) => self.ids.get_mut(p).unwrap().next[level] = Some(new_idx),
                None => self.head[level] = Some(new_idx),
            }
        }

        self.num_ids += 1;
        new_idx
    }

    /// Removes the node at `idx`, using the predecessor array from a prior
    /// hit-returning [`Self::find`] call.
    pub fn remove_id(&mut self, idx: usize, predecessors: &ForwardPointers) -> Option<TraceId> {
        let id = self.ids.get(idx)?;
        let height = id.height as usize;
        let removed_next = id.next;

        for level in 0..height {
            let pred = predecessors[level];
            match pred {
                Some(p) => self.ids.get_mut(p).unwrap().next[level] = removed_next[level],
                None => self.head[level] = removed_next[level],
            }
        }

        let removed = self.ids.remove(idx);
        if removed.is_some() {
            self.num_ids -= 1;
        }
        removed
    }

    pub fn iter_ids(&self) -> IdIter<'_> {
        IdIter {
            list: self,
            cursor: self.head[0],
        }
    }

    pub fn total_samples(&self) -> i64 {
        self.iter_ids().map(|(_, id)| id.total_samples()).sum()
    }

    /// Checks the level-0 ordering invariant (spec.md section 8, property 1).
    pub fn check_ordering_invariant(&self) -> Result<(), MstlError> {
        let mut prev: Option<&TraceId> = None;
        for (_, id) in self.iter_ids() {
            if let Some(p) = prev {
                if p.sid.cmp(&id.sid) == std::cmp::Ordering::Greater
                    || (p.sid == id.sid && p.pubversion > id.pubversion)
                {
                    return Err(MstlError::Invariant {
                        msg: "skip list level 0 is not strictly ascending".to_string(),
                    });
                }
            }
            prev = Some(id);
            id.check_ordering_invariant()?;
        }
        Ok(())
    }
}

pub struct IdIter<'a> {
    list: &'a TraceList,
    cursor: Option<usize>,
}

impl<'a> Iterator for IdIter<'a> {
    type Item = (usize, &'a TraceId);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let id = self.list.ids.get(idx).expect("linked id exists");
        self.cursor = id.next[0];
        Some((idx, id))
    }
}
