//! Shared library loading with per-name reference counts.
//!
//! Libraries are keyed by their canonical name (see
//! [`normalize_library_name`]), so `open("STAF")` and `open("libSTAF.so")`
//! share one OS module handle. The module is unloaded when the last
//! [`DynamicLibrary`] for it is closed.

use std::collections::HashMap;
use std::ffi::{c_void, CString};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::context::OsContext;
use crate::error::{OsError, OsResult};

/// Prefix the platform puts on shared library file names.
pub const SHARED_LIB_PREFIX: &str = if cfg!(windows) { "" } else { "lib" };

/// Suffix the platform puts on shared library file names.
pub const SHARED_LIB_SUFFIX: &str = if cfg!(windows) {
    ".dll"
} else if cfg!(target_os = "macos") {
    ".dylib"
} else {
    ".so"
};

fn has_path_separator(name: &str) -> bool {
    name.contains('/') || (cfg!(windows) && name.contains('\\'))
}

/// Turns a logical library name into the file name the loader is given.
///
/// Names containing a path separator are used as-is. Otherwise the
/// platform prefix and suffix are added unless already present.
pub fn normalize_library_name(name: &str) -> String {
    if has_path_separator(name) {
        return name.to_string();
    }
    let mut canonical = String::with_capacity(
        SHARED_LIB_PREFIX.len() + name.len() + SHARED_LIB_SUFFIX.len(),
    );
    if !name.starts_with(SHARED_LIB_PREFIX) {
        canonical.push_str(SHARED_LIB_PREFIX);
    }
    canonical.push_str(name);
    if !name.ends_with(SHARED_LIB_SUFFIX) {
        canonical.push_str(SHARED_LIB_SUFFIX);
    }
    canonical
}

struct LoadedLibrary {
    handle: sys::RawHandle,
    refs: usize,
}

/// Canonical name → loaded module. The lock also serializes every loader
/// call so that the loader's error text belongs to the failing call.
#[derive(Default)]
pub(crate) struct LibraryTable {
    loaded: Mutex<HashMap<String, LoadedLibrary>>,
}

impl LibraryTable {
    fn acquire(&self, canonical: &str) -> OsResult<sys::RawHandle> {
        let mut loaded = self.loaded.lock();
        if let Some(lib) = loaded.get_mut(canonical) {
            lib.refs += 1;
            debug!(library = canonical, refs = lib.refs, "reusing loaded library");
            return Ok(lib.handle);
        }

        let handle = sys::open(canonical)?;
        loaded.insert(canonical.to_string(), LoadedLibrary { handle, refs: 1 });
        debug!(library = canonical, "loaded library");
        Ok(handle)
    }

    fn release(&self, canonical: &str) -> OsResult<()> {
        let mut loaded = self.loaded.lock();
        let Some(lib) = loaded.get_mut(canonical) else {
            return Err(OsError::InvalidObject {
                what: "dynamic library",
            });
        };
        lib.refs -= 1;
        if lib.refs > 0 {
            return Ok(());
        }

        let handle = lib.handle;
        loaded.remove(canonical);
        debug!(library = canonical, "unloading library");
        sys::close(handle)
    }

    fn symbol(&self, handle: sys::RawHandle, symbol: &CString) -> OsResult<*mut c_void> {
        let _serialized = self.loaded.lock();
        sys::symbol(handle, symbol)
    }

    fn ref_count(&self, canonical: &str) -> usize {
        self.loaded.lock().get(canonical).map_or(0, |lib| lib.refs)
    }
}

/// An open reference to a shared library.
///
/// Dropping the value closes it; call [`DynamicLibrary::close`] to observe
/// unload errors.
pub struct DynamicLibrary<'ctx> {
    ctx: &'ctx OsContext,
    canonical: String,
    handle: sys::RawHandle,
    open: bool,
}

impl<'ctx> DynamicLibrary<'ctx> {
    /// Opens the library `name`, loading it if no other reference exists.
    pub fn open(ctx: &'ctx OsContext, name: &str) -> OsResult<Self> {
        if name.is_empty() {
            return Err(OsError::invalid_parameter("library name must not be empty"));
        }
        let canonical = normalize_library_name(name);
        let handle = ctx.libraries().acquire(&canonical)?;
        Ok(Self {
            ctx,
            canonical,
            handle,
            open: true,
        })
    }

    /// The canonical name this reference is counted under.
    pub fn name(&self) -> &str {
        &self.canonical
    }

    /// Resolves `symbol` to its address.
    ///
    /// The pointer is only valid while the library stays loaded.
    pub fn get_address(&self, symbol: &str) -> OsResult<*mut c_void> {
        let symbol = CString::new(symbol)
            .map_err(|_| OsError::invalid_parameter("symbol name contains NUL"))?;
        self.ctx.libraries().symbol(self.handle, &symbol)
    }

    /// Drops this reference, unloading the library if it was the last.
    pub fn close(mut self) -> OsResult<()> {
        self.open = false;
        self.ctx.libraries().release(&self.canonical)
    }

    /// Number of open references to the library `name` in `ctx`.
    pub fn open_count(ctx: &OsContext, name: &str) -> usize {
        ctx.libraries().ref_count(&normalize_library_name(name))
    }
}

impl Drop for DynamicLibrary<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.ctx.libraries().release(&self.canonical) {
                warn!(library = %self.canonical, error = %e, "failed to close library");
            }
        }
    }
}

impl std::fmt::Debug for DynamicLibrary<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("name", &self.canonical)
            .finish()
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::{c_char, c_void, CStr, CString};
    use std::ptr::NonNull;

    use crate::error::{OsError, OsResult};

    #[derive(Clone, Copy)]
    pub(super) struct RawHandle(NonNull<c_void>);

    // SAFETY: a dlopen handle is a process-global token usable from any thread.
    unsafe impl Send for RawHandle {}
    // SAFETY: as above; all calls through it are serialized by LibraryTable.
    unsafe impl Sync for RawHandle {}

    /// Converts the pending `dlerror()` text into an error.
    ///
    /// # Safety
    ///
    /// `err` must be null or the pointer just returned by `dlerror()`.
    unsafe fn loader_error(op: &'static str, err: *const c_char) -> OsError {
        let message = if err.is_null() {
            String::from("unknown dynamic loader error")
        } else {
            CStr::from_ptr(err).to_string_lossy().into_owned()
        };
        OsError::BaseOsMessage { op, message }
    }

    fn last_error(op: &'static str) -> OsError {
        // SAFETY: dlerror returns null or a NUL-terminated string owned by the loader.
        unsafe { loader_error(op, libc::dlerror()) }
    }

    pub(super) fn open(name: &str) -> OsResult<RawHandle> {
        let c_name =
            CString::new(name).map_err(|_| OsError::invalid_parameter("library name contains NUL"))?;
        // SAFETY: c_name is a valid C string; running library initializers is
        // the documented effect of loading.
        let raw = unsafe { libc::dlopen(c_name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        NonNull::new(raw).map(RawHandle).ok_or_else(|| last_error("dlopen"))
    }

    pub(super) fn symbol(handle: RawHandle, symbol: &CString) -> OsResult<*mut c_void> {
        // SAFETY: handle came from dlopen and has not been closed; symbol is a
        // valid C string. The first dlerror() clears stale state.
        unsafe {
            libc::dlerror();
            let addr = libc::dlsym(handle.0.as_ptr(), symbol.as_ptr());
            if addr.is_null() {
                // A null address is only a failure if the loader recorded one.
                let err = libc::dlerror();
                if !err.is_null() {
                    return Err(loader_error("dlsym", err));
                }
            }
            Ok(addr)
        }
    }

    pub(super) fn close(handle: RawHandle) -> OsResult<()> {
        // SAFETY: handle came from dlopen and this is its last reference.
        if unsafe { libc::dlclose(handle.0.as_ptr()) } != 0 {
            return Err(last_error("dlclose"));
        }
        Ok(())
    }
}

#[cfg(not(unix))]
mod sys {
    use std::ffi::{c_void, CString};

    use crate::error::{OsError, OsResult};

    #[derive(Clone, Copy)]
    pub(super) struct RawHandle;

    fn unsupported(op: &'static str) -> OsError {
        OsError::BaseOsMessage {
            op,
            message: String::from("dynamic libraries are not supported on this platform"),
        }
    }

    pub(super) fn open(_name: &str) -> OsResult<RawHandle> {
        Err(unsupported("open"))
    }

    pub(super) fn symbol(_handle: RawHandle, _symbol: &CString) -> OsResult<*mut c_void> {
        Err(unsupported("symbol"))
    }

    pub(super) fn close(_handle: RawHandle) -> OsResult<()> {
        Err(unsupported("close"))
    }
}
