//! Reserved-then-committed anonymous memory region.
//!
//! The whole address range is reserved once with `PROT_NONE`, so the base
//! never moves; pages are committed on demand with `mprotect` as the entry
//! extent grows. Freshly committed anonymous pages are zero-filled by the
//! kernel, which the pool relies on for slab initialization.

use std::io;
use std::ptr;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

use crate::{Result, StoreConfig, StoreError, ENTRY_SIZE};

/// Default address-space reservation: 16 GiB, enough for 32 million
/// entries plus headers. Nothing is committed up front.
pub const DEFAULT_RESERVED_BYTES: usize = 16 << 30;

/// Host page size as reported by the kernel.
pub fn host_page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// A fixed-address run of pages: reserved up front, committed lazily.
pub struct PageStore {
    base: *mut u8,
    page_size: usize,
    header_pages: u32,
    reserved_pages: u32,
    committed: AtomicU32,
}

// Safety: the mapping is owned for the store's lifetime and all writes go
// through the single-writer cursor; concurrent readers only dereference
// memory below the committed watermark, reached via published indices.
unsafe impl Send for PageStore {}
unsafe impl Sync for PageStore {}

impl PageStore {
    /// Reserve the address range and commit the header pages.
    pub fn init(config: &StoreConfig) -> Result<Self> {
        let page_size = if config.page_size == 0 {
            host_page_size()
        } else {
            config.page_size
        };
        if !page_size.is_power_of_two() || page_size % ENTRY_SIZE != 0 {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "page size {} must be a power of two and a multiple of {}",
                    page_size, ENTRY_SIZE
                ),
            });
        }
        if config.header_pages < 2 {
            return Err(StoreError::InvalidConfig {
                reason: format!("header_pages {} < 2", config.header_pages),
            });
        }

        let reserved_pages = config.reserved_address_bytes / page_size;
        // Headers, the guard page, and at least one slab page must fit.
        let floor = config.header_pages as usize + 2;
        if reserved_pages < floor {
            return Err(StoreError::InvalidConfig {
                reason: format!(
                    "reservation of {} bytes holds {} pages, need at least {}",
                    config.reserved_address_bytes, reserved_pages, floor
                ),
            });
        }
        let reserved_pages = u32::try_from(reserved_pages).map_err(|_| {
            StoreError::InvalidConfig {
                reason: "reservation exceeds the addressable page count".to_string(),
            }
        })?;

        let reserved_bytes = reserved_pages as usize * page_size;
        #[cfg(target_os = "linux")]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE;
        #[cfg(not(target_os = "linux"))]
        let flags = libc::MAP_PRIVATE | libc::MAP_ANON;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                reserved_bytes,
                libc::PROT_NONE,
                flags,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(StoreError::AddressSpaceReservationFailed {
                requested: reserved_bytes,
                source: io::Error::last_os_error(),
            });
        }

        let store = Self {
            base: base as *mut u8,
            page_size,
            header_pages: config.header_pages,
            reserved_pages,
            committed: AtomicU32::new(0),
        };
        store.grow_to(config.header_pages)?;
        debug!(
            reserved_pages,
            page_size,
            header_pages = config.header_pages,
            "page store reserved"
        );
        Ok(store)
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub(crate) fn header_pages(&self) -> u32 {
        self.header_pages
    }

    #[inline]
    pub fn reserved_pages(&self) -> u32 {
        self.reserved_pages
    }

    /// Currently committed page count.
    #[inline]
    pub fn extent(&self) -> u32 {
        self.committed.load(Ordering::Acquire)
    }

    /// Ensure the first `pages` pages are committed. Idempotent. Only the
    /// writer thread grows the extent.
    pub fn grow_to(&self, pages: u32) -> Result<()> {
        let cur = self.committed.load(Ordering::Acquire);
        if pages <= cur {
            return Ok(());
        }
        if pages > self.reserved_pages {
            return Err(StoreError::OutOfCapacity {
                needed: pages,
                reserved: self.reserved_pages,
            });
        }
        let offset = cur as usize * self.page_size;
        let len = (pages - cur) as usize * self.page_size;
        let rc = unsafe {
            libc::mprotect(
                self.base.add(offset) as *mut libc::c_void,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
            )
        };
        if rc != 0 {
            // The kernel refused the commit; treat like an exhausted
            // reservation so the walk can abandon cleanly.
            return Err(StoreError::OutOfCapacity {
                needed: pages,
                reserved: cur,
            });
        }
        self.committed.store(pages, Ordering::Release);
        Ok(())
    }

    /// Raw pointer at a byte offset within the reservation. The caller
    /// stays below the committed extent.
    #[inline]
    pub(crate) fn byte_ptr(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset < self.extent() as usize * self.page_size);
        unsafe { self.base.add(offset) }
    }

    /// Byte slice inside the committed region.
    pub fn bytes_at(&self, page_index: u32, len: usize) -> &[u8] {
        let offset = page_index as usize * self.page_size;
        debug_assert!(offset + len <= self.extent() as usize * self.page_size);
        unsafe { std::slice::from_raw_parts(self.base.add(offset), len) }
    }

    pub(crate) fn bytes_at_mut(&self, page_index: u32, len: usize) -> &mut [u8] {
        let offset = page_index as usize * self.page_size;
        debug_assert!(offset + len <= self.extent() as usize * self.page_size);
        unsafe { std::slice::from_raw_parts_mut(self.base.add(offset), len) }
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        let len = self.reserved_pages as usize * self.page_size;
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, len);
        }
    }
}
