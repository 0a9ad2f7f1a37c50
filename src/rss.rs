//! Resident set size of the current process, always reported in kilobytes.
//!
//! Linux exposes the current resident page count in `/proc/self/statm`.
//! Elsewhere only `getrusage(2)` is available, whose `ru_maxrss` is a
//! high-water mark: bytes on macOS, kilobytes on the BSDs.

#[cfg(not(unix))]
compile_error!("resident memory sampling is only implemented for unix targets");

use std::io;

use log::trace;

use crate::error::ProbeError;

/// Unit of a raw resident memory figure as reported by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(any(target_os = "linux", target_os = "android"), allow(dead_code))]
pub enum RssUnit {
    Bytes,
    Kilobytes,
    /// Pages of the given size in bytes.
    Pages(u64),
}

/// Normalizes a raw OS figure to kilobytes (1 KB = 1024 bytes).
pub fn to_kilobytes(raw: u64, unit: RssUnit) -> u64 {
    match unit {
        RssUnit::Bytes => raw / 1024,
        RssUnit::Kilobytes => raw,
        RssUnit::Pages(page_size) => raw.saturating_mul(page_size) / 1024,
    }
}

/// True when the platform only reports peak residency, so a released page
/// never shows up as a drop.
pub const fn is_peak_counter() -> bool {
    !cfg!(any(target_os = "linux", target_os = "android"))
}

pub fn current_kb() -> Result<u64, ProbeError> {
    let (raw, unit) = read_raw().map_err(ProbeError::ResidencyQueryFailure)?;
    trace!("raw resident figure {} in {:?}", raw, unit);
    Ok(to_kilobytes(raw, unit))
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn read_raw() -> io::Result<(u64, RssUnit)> {
    let statm = std::fs::read_to_string("/proc/self/statm")?;
    let pages = parse_statm_resident(&statm)?;
    let page_size = crate::region::page_size()? as u64;
    Ok((pages, RssUnit::Pages(page_size)))
}

/// Extracts the resident page count, the second field of `/proc/<pid>/statm`.
#[cfg_attr(not(any(target_os = "linux", target_os = "android")), allow(dead_code))]
fn parse_statm_resident(statm: &str) -> io::Result<u64> {
    let field = statm
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, format!("truncated statm: {:?}", statm)))?;
    field
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("statm resident field {:?}: {}", field, e)))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn read_raw() -> io::Result<(u64, RssUnit)> {
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let raw = u64::try_from(usage.ru_maxrss)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, format!("negative ru_maxrss {}", usage.ru_maxrss)))?;
    let unit = if cfg!(any(target_os = "macos", target_os = "ios")) {
        RssUnit::Bytes
    } else {
        RssUnit::Kilobytes
    };
    Ok((raw, unit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_to_kilobytes() {
        // macOS ru_maxrss
        assert_eq!(to_kilobytes(104_857_600, RssUnit::Bytes), 102_400);
        assert_eq!(to_kilobytes(1023, RssUnit::Bytes), 0, "partial kilobytes are truncated");
    }

    #[test]
    fn test_kilobytes_pass_through() {
        // BSD ru_maxrss
        assert_eq!(to_kilobytes(102_400, RssUnit::Kilobytes), 102_400);
    }

    #[test]
    fn test_pages_to_kilobytes() {
        // Linux statm
        assert_eq!(to_kilobytes(25_600, RssUnit::Pages(4096)), 102_400);
        assert_eq!(to_kilobytes(1_600, RssUnit::Pages(65536)), 102_400);
        assert_eq!(to_kilobytes(6_400, RssUnit::Pages(16384)), 102_400);
    }

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm_resident("12345 678 90 1 0 222 0\n").unwrap(), 678);
        assert!(parse_statm_resident("12345").is_err());
        assert!(parse_statm_resident("12345 abc 90").is_err());
        assert!(parse_statm_resident("").is_err());
    }

    #[test]
    fn test_current_kb_is_positive() {
        let kb = current_kb().expect("resident memory query");
        assert!(kb > 0, "a running process has resident pages, got {} KB", kb);
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial_test::serial]
    fn test_touch_and_dontneed_move_rss() {
        use crate::region::{Advisory, Region};

        const LEN: usize = 32 << 20;
        let mut region = Region::reserve(LEN).expect("reserve");
        let before = current_kb().unwrap();
        region.touch(1);
        let touched = current_kb().unwrap();
        assert!(
            touched >= before + (LEN as u64 >> 10) / 2,
            "touching {} KB only moved rss from {} to {}",
            LEN >> 10,
            before,
            touched
        );

        region.advise(Advisory::DontNeed).expect("madvise");
        let advised = current_kb().unwrap();
        assert!(
            advised + (LEN as u64 >> 10) / 2 <= touched,
            "MADV_DONTNEED only moved rss from {} to {}",
            touched,
            advised
        );
    }
}
