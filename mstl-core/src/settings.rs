//! Tunable tolerances for the merge engine (spec.md component A / section 4.F).
//!
//! As with the teacher's `SegySettings`, fields are private and only reachable
//! through validated setters/getters: a rate tolerance of zero or less would
//! silently make every rate comparison fail, so it is rejected up front rather
//! than discovered later as a merge that never fires.
use std::sync::Arc;

use crate::codec::flags;
use crate::errors::MstlError;
use crate::time::period_ns;

/// Default rate-tolerance fraction: `|r1 - r2| / max(|r1|, |r2|) < 1e-4`.
pub const DEFAULT_RATE_TOLERANCE: f64 = 1e-4;

type TimeTolFn = dyn Fn(i64) -> i64 + Send + Sync;
type RateTolFn = dyn Fn(f64, f64) -> bool + Send + Sync;

/// A pair of closeness checks: how near two record boundaries, or two sample
/// rates, must be to count as contiguous/equal (spec.md glossary "Tolerance").
#[derive(Clone)]
pub struct Tolerance {
    time_tol: Option<Arc<TimeTolFn>>,
    rate_tol: Option<Arc<RateTolFn>>,
}

impl Default for Tolerance {
    fn default() -> Self {
        Tolerance {
            time_tol: None,
            rate_tol: None,
        }
    }
}

impl Tolerance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the time tolerance with a closure of `nsperiod -> max |Δt| in ns`.
    /// Default (when unset) is `nsperiod / 2`.
    pub fn with_time_tolerance(mut self, f: impl Fn(i64) -> i64 + Send + Sync + 'static) -> Self {
        self.time_tol = Some(Arc::new(f));
        self
    }

    /// Overrides the rate-match predicate with a closure of `(r1, r2) -> matches`.
    /// Default (when unset) is the `DEFAULT_RATE_TOLERANCE` fractional check.
    pub fn with_rate_tolerance(mut self, f: impl Fn(f64, f64) -> bool + Send + Sync + 'static) -> Self {
        self.rate_tol = Some(Arc::new(f));
        self
    }

    /// The maximum allowed `|Δt|` in nanoseconds for a gap of period `nsperiod`.
    pub fn time_tolerance_ns(&self, nsperiod: i64) -> i64 {
        match &self.time_tol {
            Some(f) => f(nsperiod),
            None => nsperiod / 2,
        }
    }

    /// Whether two sample rates are close enough to be considered the same.
    pub fn rates_match(&self, r1: f64, r2: f64) -> bool {
        match &self.rate_tol {
            Some(f) => f(r1, r2),
            None => {
                let denom = r1.abs().max(r2.abs());
                if denom == 0.0 {
                    r1 == r2
                } else {
                    (r1 - r2).abs() / denom < DEFAULT_RATE_TOLERANCE
                }
            }
        }
    }

    /// Convenience used by the merge engine: the time tolerance for a record
    /// at the given sample rate, derived via [`period_ns`].
    pub fn time_tolerance_for_rate(&self, samprate: f64) -> i64 {
        self.time_tolerance_ns(period_ns(samprate))
    }
}

/// Validated knobs for one `add_record` call (spec.md section 4.F parameters).
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeOptions {
    /// Separate trace IDs by publication version (`SPLIT_IS_VERSION`).
    pub split_version: bool,
    /// Bridge and heal two segments closed by a new record.
    pub autoheal: bool,
    /// Stamp the segment's private pointer with the current time on update.
    pub update_time: bool,
}

impl MergeOptions {
    /// Builds options from the legacy bitflags boundary (spec.md section 6).
    /// `autoheal` stays a separate argument, mirroring the upstream C API where
    /// it is a dedicated function parameter rather than one more flag bit —
    /// this is the "defaulted arguments / convenience wrapper" spec.md's design
    /// notes call for instead of keeping a second add-record signature around.
    pub fn from_flags(raw: u32, autoheal: bool) -> Self {
        MergeOptions {
            split_version: raw & flags::SPLIT_IS_VERSION != 0,
            autoheal,
            update_time: raw & flags::PP_UPDATE_TIME != 0,
        }
    }

    /// The flag bits a legacy caller would need to reproduce these options
    /// (`autoheal` has no corresponding bit; see [`Self::from_flags`]).
    pub fn to_flags(&self) -> u32 {
        let mut raw = 0;
        if self.split_version {
            raw |= flags::SPLIT_IS_VERSION;
        }
        if self.update_time {
            raw |= flags::PP_UPDATE_TIME;
        }
        raw
    }
}

/// Validated knobs shared by the batch and generator packers (spec.md 4.H/4.I).
#[derive(Debug, Clone, Copy)]
pub struct PackOptions {
    reclen: u32,
    maintain_in_place: bool,
    flush_idle_seconds: u32,
    pack_version2: bool,
    int_encoding: u8,
}

impl Default for PackOptions {
    fn default() -> Self {
        PackOptions {
            reclen: 4096,
            maintain_in_place: false,
            flush_idle_seconds: 0,
            pack_version2: false,
            int_encoding: 11,
        }
    }
}

impl PackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum record length. Must be large enough to hold a header;
    /// this crate does not know the codec's minimum, so only zero is rejected.
    pub fn set_reclen(&mut self, reclen: u32) -> Result<(), MstlError> {
        if reclen == 0 {
            return Err(MstlError::Invariant {
                msg: "reclen must be greater than zero".to_string(),
            });
        }
        self.reclen = reclen;
        Ok(())
    }

    pub fn reclen(&self) -> u32 {
        self.reclen
    }

    pub fn set_maintain_in_place(&mut self, v: bool) {
        self.maintain_in_place = v;
    }

    pub fn maintain_in_place(&self) -> bool {
        self.maintain_in_place
    }

    pub fn set_flush_idle_seconds(&mut self, secs: u32) {
        self.flush_idle_seconds = secs;
    }

    pub fn flush_idle_seconds(&self) -> u32 {
        self.flush_idle_seconds
    }

    pub fn set_pack_version2(&mut self, v: bool) {
        self.pack_version2 = v;
    }

    pub fn pack_version2(&self) -> bool {
        self.pack_version2
    }

    /// Codec-specific encoding id to use for integer-typed segments. Ignored
    /// for text/f32/f64 segments, whose encoding is forced by the packer
    /// (spec.md 4.H step 1).
    pub fn set_int_encoding(&mut self, encoding: u8) {
        self.int_encoding = encoding;
    }

    pub fn int_encoding(&self) -> u8 {
        self.int_encoding
    }

    /// Builds options from the legacy bitflags boundary (spec.md section 6);
    /// `reclen` and `int_encoding` have no flag bits and keep their defaults.
    pub fn from_flags(raw: u32) -> Self {
        let mut opts = Self::default();
        opts.maintain_in_place = raw & flags::MAINTAIN_MSTL != 0;
        opts.pack_version2 = raw & flags::PACK_VER2 != 0;
        opts
    }

    /// The flag bits a legacy caller would need to reproduce these options.
    pub fn to_flags(&self) -> u32 {
        let mut raw = 0;
        if self.maintain_in_place {
            raw |= flags::MAINTAIN_MSTL;
        }
        if self.pack_version2 {
            raw |= flags::PACK_VER2;
        }
        raw
    }
}
