use std::hint::black_box;
use std::io;

use log::{debug, trace};
use memmap2::{MmapMut, UncheckedAdvice};

use crate::error::ProbeError;

/// Page-reclaim advice that can be issued for a [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advisory {
    /// `MADV_DONTNEED`: drop the physical pages, keep the virtual range.
    ///
    /// On Linux the next read of a private anonymous page returns zeroes.
    /// Other platforms (macOS included) leave the content undefined until the
    /// page is written again, and may defer the actual release.
    DontNeed,
}

impl Advisory {
    pub fn name(self) -> &'static str {
        match self {
            Advisory::DontNeed => "MADV_DONTNEED",
        }
    }

    fn as_unchecked(self) -> UncheckedAdvice {
        match self {
            Advisory::DontNeed => UncheckedAdvice::DontNeed,
        }
    }
}

pub fn page_size() -> io::Result<usize> {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(size as usize)
}

/// Private, anonymous, read-write mapping owned exclusively by the probe.
///
/// The mapping is unmapped when the region is dropped, so every exit path
/// after a successful [`Region::reserve`] releases it.
pub struct Region {
    map: MmapMut,
    page_size: usize,
}

impl Region {
    pub fn reserve(len: usize) -> Result<Self, ProbeError> {
        let page_size = page_size().map_err(ProbeError::AllocationFailure)?;
        trace!("page size is {} bytes", page_size);
        if len == 0 || len % page_size != 0 {
            return Err(ProbeError::InvalidRegionSize { size: len, page_size });
        }

        let map = MmapMut::map_anon(len).map_err(ProbeError::AllocationFailure)?;
        debug!("reserved {} MiB at {:p}", len >> 20, map.as_ptr());
        Ok(Self { map, page_size })
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }

    /// Writes `byte` to every byte of the region so each page gets its own
    /// physical frame. `byte` must be non-zero, otherwise the kernel may keep
    /// serving the shared zero page.
    pub fn touch(&mut self, byte: u8) {
        debug_assert_ne!(byte, 0, "a zero fill does not defeat zero-page sharing");
        self.map.fill(byte);
        black_box(&mut self.map[..]);
        debug!("touched {} pages with {:#04x}", self.len() / self.page_size, byte);
    }

    /// Asks the kernel to release the physical pages backing the region while
    /// keeping the virtual range mapped. See [`Advisory`] for what a later
    /// read observes.
    pub fn advise(&mut self, advisory: Advisory) -> Result<(), ProbeError> {
        // SAFETY: no reference into the mapping outlives this call, and every
        // later read accepts either zero-filled or stale content.
        unsafe { self.map.unchecked_advise(advisory.as_unchecked()) }
            .map_err(ProbeError::AdvisoryFailure)?;
        debug!("{} issued for {:p}+{:#x}", advisory.name(), self.as_ptr(), self.len());
        Ok(())
    }

    pub fn first_byte(&self) -> u8 {
        self.map[0]
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // `MmapMut` unmaps right after this.
        debug!("releasing {:p}+{:#x}", self.as_ptr(), self.len());
    }
}
