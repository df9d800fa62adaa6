//! Leap-second-aware sample-time arithmetic.
//!
//! A `MsTime` is a signed count of nanoseconds since the Unix epoch. The calendar
//! conversions themselves (Gregorian <-> nanoseconds, the leap-second *file* reader)
//! are an external collaborator; this module only does the arithmetic spec.md
//! component A describes, plus the process-wide table that arithmetic consults.
use std::sync::OnceLock;

use crate::errors::MstlError;

/// Nanoseconds per second. Named after the historical `NSTMODULUS` constant.
pub const NSTMODULUS: i64 = 1_000_000_000;

/// Sentinel meaning "error" / "not a time" — outside the range any real sample time occupies.
pub const MSTIME_ERROR: MsTime = i64::MIN;

/// Nanoseconds since the Unix epoch.
pub type MsTime = i64;

static LEAP_SECONDS: OnceLock<Vec<i64>> = OnceLock::new();

/// Installs the process-wide leap-second table (nanosecond epoch instants of each
/// inserted leap second). Expected to be called once, before ingestion begins, same
/// as the allocator override and logger hooks described in spec.md section 6.
///
/// Calling this more than once is a no-op after the first call wins; OnceLock does
/// not support replacement, which matches the "set once" contract in spec.md.
pub fn install_leap_seconds(mut instants: Vec<i64>) {
    instants.sort_unstable();
    let _ = LEAP_SECONDS.set(instants);
}

fn leap_seconds() -> &'static [i64] {
    LEAP_SECONDS.get().map(Vec::as_slice).unwrap_or(&[])
}

/// `NSTMODULUS/rate` if `rate` is a positive sample rate in Hz, `NSTMODULUS * -rate`
/// if `rate` is a negative seconds-per-sample period, else `0`.
pub fn period_ns(rate: f64) -> i64 {
    if rate > 0.0 {
        (NSTMODULUS as f64 / rate).round() as i64
    } else if rate < 0.0 {
        (NSTMODULUS as f64 * -rate).round() as i64
    } else {
        0
    }
}

/// Adds `offset` samples' worth of time to `start`, using `rate` as Hz if positive,
/// else as seconds-per-sample. Subtracts one second if the `[start, result]` interval
/// *strictly* contains a registered leap second, where containment is tested as the
/// half-open-on-the-left, closed-on-the-right interval `(start, result - 1s]` — see
/// DESIGN.md for why this boundary was chosen over the source's ambiguous wording.
pub fn sample_time(start: MsTime, offset: i64, rate: f64) -> Result<MsTime, MstlError> {
    let raw_ns = if rate > 0.0 {
        (offset as f64 * NSTMODULUS as f64 / rate).round() as i64
    } else if rate < 0.0 {
        (offset as f64 * NSTMODULUS as f64 * -rate).round() as i64
    } else {
        0
    };

    let unadjusted = start.checked_add(raw_ns).ok_or_else(|| MstlError::TimeCompute {
        msg: format!("start {} + offset-ns {} overflows i64", start, raw_ns),
    })?;

    let adjustment = if leap_second_strictly_within(start, unadjusted) {
        NSTMODULUS
    } else {
        0
    };

    unadjusted.checked_sub(adjustment).ok_or_else(|| MstlError::TimeCompute {
        msg: format!("leap adjustment underflows for start {}", start),
    })
}

/// `true` when some registered leap instant `l` satisfies `start < l <= end - 1s`.
fn leap_second_strictly_within(start: MsTime, end: MsTime) -> bool {
    let Some(closed_upper) = end.checked_sub(NSTMODULUS) else {
        return false;
    };
    if closed_upper < start {
        return false;
    }
    leap_seconds()
        .iter()
        .any(|&l| l > start && l <= closed_upper)
}
