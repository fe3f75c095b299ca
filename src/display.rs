//! Verbosity-gated diagnostics and human-readable unit formatting.
//!
//! All ranks share one process-global notification level stored in an atomic:
//! 0 = silent, 1 = errors only, 2 = results + warnings, 3 = progress,
//! 4+ = verbose. Messages go to stderr so archive data on stdout is never
//! polluted.

use std::sync::atomic::{AtomicI32, Ordering};

/// Global notification level. Defaults to 2 (results + warnings).
pub static DISPLAY_LEVEL: AtomicI32 = AtomicI32::new(2);

/// Set the global notification level.
pub fn set_display_level(level: i32) {
    DISPLAY_LEVEL.store(level, Ordering::Relaxed);
}

/// Current notification level.
#[inline]
pub fn level() -> i32 {
    DISPLAY_LEVEL.load(Ordering::Relaxed)
}

/// Print a line to stderr if the current notification level is >= `$lvl`.
#[macro_export]
macro_rules! displayln {
    ($lvl:expr, $($arg:tt)*) => {
        if $crate::display::level() >= $lvl {
            eprintln!($($arg)*);
        }
    };
}

// ─── Unit formatting ─────────────────────────────────────────────────────────

const BYTE_UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
const BW_UNITS: [&str; 6] = ["B/s", "KiB/s", "MiB/s", "GiB/s", "TiB/s", "PiB/s"];

fn scale(value: f64, units: &'static [&'static str; 6]) -> (f64, &'static str) {
    let mut v = value;
    let mut i = 0;
    while v >= 1024.0 && i + 1 < units.len() {
        v /= 1024.0;
        i += 1;
    }
    (v, units[i])
}

/// Scale a byte count into a human-readable value and unit string.
pub fn format_bytes(bytes: u64) -> (f64, &'static str) {
    scale(bytes as f64, &BYTE_UNITS)
}

/// Scale a bytes-per-second rate into a human-readable value and unit string.
pub fn format_bw(rate: f64) -> (f64, &'static str) {
    scale(rate, &BW_UNITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_picks_unit() {
        assert_eq!(format_bytes(512), (512.0, "B"));
        assert_eq!(format_bytes(2048), (2.0, "KiB"));
        let (v, u) = format_bytes(3 * 1024 * 1024);
        assert_eq!(u, "MiB");
        assert!((v - 3.0).abs() < 1e-9);
    }

    #[test]
    fn format_bytes_caps_at_largest_unit() {
        let huge = u64::MAX;
        let (_, u) = format_bytes(huge);
        assert_eq!(u, "PiB");
    }

    #[test]
    fn format_bw_unit_suffix() {
        let (v, u) = format_bw(1536.0);
        assert_eq!(u, "KiB/s");
        assert!((v - 1.5).abs() < 1e-9);
    }
}
