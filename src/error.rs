use std::io;

/// Fatal conditions of a probe run. None of them is retried.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("mmap failed")]
    AllocationFailure(#[source] io::Error),
    #[error("madvise failed")]
    AdvisoryFailure(#[source] io::Error),
    #[error("resident memory query failed")]
    ResidencyQueryFailure(#[source] io::Error),
    #[error("region size {size} is not a positive multiple of the page size {page_size}")]
    InvalidRegionSize { size: usize, page_size: usize },
}

impl ProbeError {
    /// Process exit status for this error. A failed residency query is kept
    /// apart from allocation and advisory failures.
    pub fn exit_code(&self) -> u8 {
        match self {
            ProbeError::AllocationFailure(_)
            | ProbeError::AdvisoryFailure(_)
            | ProbeError::InvalidRegionSize { .. } => 1,
            ProbeError::ResidencyQueryFailure(_) => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let enomem = || io::Error::from_raw_os_error(libc::ENOMEM);
        assert_eq!(ProbeError::AllocationFailure(enomem()).exit_code(), 1);
        assert_eq!(ProbeError::AdvisoryFailure(enomem()).exit_code(), 1);
        assert_eq!(
            ProbeError::InvalidRegionSize { size: 3, page_size: 4096 }.exit_code(),
            1
        );
        assert_eq!(
            ProbeError::ResidencyQueryFailure(io::Error::new(io::ErrorKind::InvalidData, "bad statm")).exit_code(),
            2,
            "residency query failures must not share the allocation exit code"
        );
    }

    #[test]
    fn test_diagnostic_carries_os_reason() {
        let err = anyhow::Error::from(ProbeError::AllocationFailure(io::Error::from_raw_os_error(libc::ENOMEM)));
        let rendered = format!("{err:#}");
        assert!(rendered.starts_with("mmap failed: "), "unexpected diagnostic: {rendered}");
        assert!(rendered.contains("os error"), "OS reason missing from diagnostic: {rendered}");
    }
}
