//! Shared constants and the ordering key for the SID skip list (spec.md component E).
use std::cmp::Ordering;

use crate::codec::SourceId;

/// Compile-time bound on skip list height (spec.md section 4.E / design notes).
pub const MAX_HEIGHT: usize = 16;

/// Forward pointers at each level, inlined on the node as the design notes prescribe.
pub type ForwardPointers = [Option<usize>; MAX_HEIGHT];

pub fn empty_forward() -> ForwardPointers {
    [None; MAX_HEIGHT]
}

/// Orders two `(sid, pubversion)` pairs. When `version_sensitive` is `false` the
/// publication version is ignored, so a search for "the" trace ID of a SID
/// matches the (only) node regardless of what it happened to insert as its
/// version — used when the caller did not request `SPLIT_IS_VERSION`.
pub fn compare_keys(
    a_sid: &SourceId,
    a_ver: u8,
    b_sid: &SourceId,
    b_ver: u8,
    version_sensitive: bool,
) -> Ordering {
    match a_sid.cmp(b_sid) {
        Ordering::Equal if version_sensitive => a_ver.cmp(&b_ver),
        other_or_equal => other_or_equal,
    }
}
