//! Host image discovery
//!
//! The host binary is mapped once into the process. Every RVA from a
//! platform descriptor is resolved against this mapping.

use crate::error::HostError;

/// The mapped host binary: a name, a load base and an extent
///
/// Addresses are stored as integers; the image outlives the framework, so
/// no lifetime ties it to a borrow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostImage {
    name: String,
    base: usize,
    size: usize,
}

impl HostImage {
    /// Describe an already-known mapping
    ///
    /// # Arguments
    /// * `name` - Human-readable module name for diagnostics
    /// * `base` - Load base that descriptor RVAs are relative to
    /// * `size` - Number of mapped bytes starting at `base`
    pub fn new(name: impl Into<String>, base: *const u8, size: usize) -> Result<Self, HostError> {
        let name = name.into();
        let base = base as usize;

        if base == 0 || size == 0 || base.checked_add(size).is_none() {
            return Err(HostError::InvalidImage { name, base, size });
        }

        Ok(Self { name, base, size })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Check that `[address, address + len)` lies inside the image
    pub fn contains(&self, address: usize, len: usize) -> bool {
        match address.checked_add(len) {
            Some(end) => address >= self.base && end <= self.base + self.size,
            None => false,
        }
    }

    /// Absolute address of an RVA
    pub fn address_of(&self, rva: u64) -> Result<usize, HostError> {
        let out_of_image = || HostError::OutOfImage {
            name: self.name.clone(),
            rva,
            size: self.size,
        };

        let offset = usize::try_from(rva).map_err(|_| out_of_image())?;
        if offset >= self.size {
            return Err(out_of_image());
        }

        Ok(self.base + offset)
    }

    /// View the whole image as bytes
    ///
    /// # Safety
    /// Every byte of the image must be mapped and readable for the lifetime
    /// of the returned slice.
    pub unsafe fn bytes(&self) -> &[u8] {
        std::slice::from_raw_parts(self.base as *const u8, self.size)
    }

    /// Find a loaded module by name
    ///
    /// An empty `module` selects the main executable. Otherwise the first
    /// loaded object whose path contains `module` is returned. The extent
    /// spans every `PT_LOAD` segment of the object.
    #[cfg(any(target_os = "linux", target_os = "android"))]
    pub fn locate(module: &str) -> Result<Self, HostError> {
        use std::ffi::{c_int, c_void, CStr};

        struct Search<'a> {
            needle: &'a str,
            found: Option<HostImage>,
        }

        unsafe extern "C" fn visit(
            info: *mut libc::dl_phdr_info,
            _size: libc::size_t,
            data: *mut c_void,
        ) -> c_int {
            let search = &mut *(data as *mut Search);
            let info = &*info;

            let name = if info.dlpi_name.is_null() {
                String::new()
            } else {
                CStr::from_ptr(info.dlpi_name).to_string_lossy().into_owned()
            };

            let matches = if search.needle.is_empty() {
                name.is_empty()
            } else {
                name.contains(search.needle)
            };
            if !matches || info.dlpi_phdr.is_null() {
                return 0;
            }

            let base = info.dlpi_addr as usize;
            let headers = std::slice::from_raw_parts(info.dlpi_phdr, info.dlpi_phnum as usize);
            let end = headers
                .iter()
                .filter(|h| h.p_type == libc::PT_LOAD)
                .map(|h| base + h.p_vaddr as usize + h.p_memsz as usize)
                .max()
                .unwrap_or(base);

            if end <= base {
                return 0;
            }

            let display = if name.is_empty() { "<main>".to_string() } else { name };
            search.found = Some(HostImage {
                name: display,
                base,
                size: end - base,
            });
            1
        }

        let mut search = Search {
            needle: module,
            found: None,
        };

        unsafe {
            libc::dl_iterate_phdr(Some(visit), &mut search as *mut Search as *mut c_void);
        }

        match search.found {
            Some(image) => {
                tracing::debug!(
                    "Located host image '{}' at {:#x} ({:#x} bytes)",
                    image.name,
                    image.base,
                    image.size
                );
                Ok(image)
            }
            None => Err(HostError::ModuleNotFound(module.to_string())),
        }
    }

    /// Find a loaded module by name
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    pub fn locate(_module: &str) -> Result<Self, HostError> {
        Err(HostError::Unsupported)
    }
}
