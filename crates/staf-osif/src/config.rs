//! Runtime settings and host capability detection.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dynlib::{SHARED_LIB_PREFIX, SHARED_LIB_SUFFIX};
use crate::fs::CaseSensitivity;

/// Environment variable holding the worker stack size in KiB.
pub const THREAD_STACK_SIZE_VAR: &str = "STAF_THREAD_STACK_SIZE";
/// Environment variable overriding the temporary directory.
pub const TEMP_DIR_VAR: &str = "STAF_TEMP_DIR";
/// Environment variable holding the trace filter directive.
pub const TRACE_VAR: &str = "STAF_TRACE";

/// Settings taken from the environment when a context is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Stack size for threads started by this runtime, in bytes. `None`
    /// uses the platform default.
    pub thread_stack_size: Option<usize>,
    /// Directory for IPC endpoints and scratch files.
    pub temp_dir: PathBuf,
    /// `tracing` filter directive, if one was configured.
    pub trace_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thread_stack_size: None,
            temp_dir: default_temp_dir(),
            trace_filter: None,
        }
    }
}

impl RuntimeConfig {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let thread_stack_size = lookup(THREAD_STACK_SIZE_VAR).and_then(|raw| {
            let parsed = parse_stack_size_kib(&raw);
            if parsed.is_none() {
                warn!(value = %raw, "ignoring invalid {}", THREAD_STACK_SIZE_VAR);
            }
            parsed
        });

        let temp_dir = lookup(TEMP_DIR_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_temp_dir);

        let trace_filter = lookup(TRACE_VAR).filter(|v| !v.is_empty());

        let config = Self {
            thread_stack_size,
            temp_dir,
            trace_filter,
        };
        debug!(?config, "loaded runtime configuration");
        config
    }
}

/// Parses a KiB count in `1..=u32::MAX / 1024` and returns it in bytes.
fn parse_stack_size_kib(raw: &str) -> Option<usize> {
    let kib: u32 = raw.trim().parse().ok()?;
    if kib == 0 || kib > u32::MAX / 1024 {
        return None;
    }
    usize::try_from(u64::from(kib) * 1024).ok()
}

fn default_temp_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::temp_dir()
    } else {
        PathBuf::from("/tmp")
    }
}

/// Host capabilities and text conventions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Operating system name, e.g. `Linux`.
    pub os_name: String,
    /// OS release string.
    pub os_major_version: String,
    /// OS version string.
    pub os_minor_version: String,
    /// Hardware identifier.
    pub os_revision: String,
    /// Installed physical memory in bytes.
    pub physical_memory: u64,
    /// Online processors.
    pub num_processors: u32,
    /// Root of the boot volume.
    pub boot_drive: String,
    /// Root of the current volume.
    pub current_drive: String,
    /// Line terminator.
    pub line_separator: String,
    /// Separator between path components.
    pub file_separator: String,
    /// Separator between entries of a search path.
    pub path_separator: String,
    /// Separator between shell commands.
    pub command_separator: String,
    /// Whether file names compare case-sensitively.
    pub case_sensitive: bool,
    /// Prefix added to logical shared-library names.
    pub shared_lib_prefix: String,
    /// Suffix added to logical shared-library names.
    pub shared_lib_suffix: String,
}

impl ConfigInfo {
    /// Queries the running host.
    pub fn detect() -> Self {
        let host = platform::host();
        let info = Self {
            os_name: host.os_name,
            os_major_version: host.release,
            os_minor_version: host.version,
            os_revision: host.machine,
            physical_memory: host.physical_memory,
            num_processors: host.num_processors,
            boot_drive: platform::BOOT_DRIVE.to_string(),
            current_drive: platform::BOOT_DRIVE.to_string(),
            line_separator: platform::LINE_SEPARATOR.to_string(),
            file_separator: platform::FILE_SEPARATOR.to_string(),
            path_separator: platform::PATH_SEPARATOR.to_string(),
            command_separator: platform::COMMAND_SEPARATOR.to_string(),
            case_sensitive: CaseSensitivity::native() == CaseSensitivity::Sensitive,
            shared_lib_prefix: SHARED_LIB_PREFIX.to_string(),
            shared_lib_suffix: SHARED_LIB_SUFFIX.to_string(),
        };
        debug!(os = %info.os_name, cpus = info.num_processors, "detected host configuration");
        info
    }
}

struct HostFacts {
    os_name: String,
    release: String,
    version: String,
    machine: String,
    physical_memory: u64,
    num_processors: u32,
}

#[cfg(unix)]
mod platform {
    use std::ffi::CStr;

    use super::HostFacts;

    pub(super) const BOOT_DRIVE: &str = "/";
    pub(super) const LINE_SEPARATOR: &str = "\n";
    pub(super) const FILE_SEPARATOR: &str = "/";
    pub(super) const PATH_SEPARATOR: &str = ":";
    pub(super) const COMMAND_SEPARATOR: &str = ";";

    fn field(raw: &[libc::c_char]) -> String {
        // SAFETY: uname() NUL-terminates every field it fills in.
        unsafe { CStr::from_ptr(raw.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    pub(super) fn host() -> HostFacts {
        // SAFETY: utsname is plain old data; all-zero is a valid value.
        let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
        // SAFETY: uts is a valid, writable utsname.
        let rc = unsafe { libc::uname(&mut uts) };
        let (os_name, release, version, machine) = if rc == 0 {
            (
                field(&uts.sysname),
                field(&uts.release),
                field(&uts.version),
                field(&uts.machine),
            )
        } else {
            let unknown = || String::from("Unknown");
            (unknown(), unknown(), unknown(), unknown())
        };

        // SAFETY: sysconf has no memory-safety preconditions.
        let (pages, page_size, cpus) = unsafe {
            (
                libc::sysconf(libc::_SC_PHYS_PAGES),
                libc::sysconf(libc::_SC_PAGESIZE),
                libc::sysconf(libc::_SC_NPROCESSORS_ONLN),
            )
        };
        let physical_memory = if pages > 0 && page_size > 0 {
            (pages as u64).saturating_mul(page_size as u64)
        } else {
            0
        };
        let num_processors = u32::try_from(cpus).unwrap_or(1).max(1);

        HostFacts {
            os_name,
            release,
            version,
            machine,
            physical_memory,
            num_processors,
        }
    }
}

#[cfg(not(unix))]
mod platform {
    use super::HostFacts;

    pub(super) const BOOT_DRIVE: &str = "C:\\";
    pub(super) const LINE_SEPARATOR: &str = "\r\n";
    pub(super) const FILE_SEPARATOR: &str = "\\";
    pub(super) const PATH_SEPARATOR: &str = ";";
    pub(super) const COMMAND_SEPARATOR: &str = "&";

    pub(super) fn host() -> HostFacts {
        let num_processors = std::thread::available_parallelism()
            .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
            .unwrap_or(1);
        HostFacts {
            os_name: std::env::consts::OS.to_string(),
            release: String::from("Unknown"),
            version: String::from("Unknown"),
            machine: std::env::consts::ARCH.to_string(),
            physical_memory: 0,
            num_processors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(|_| None);
        assert_eq!(config, RuntimeConfig::default());
        assert!(config.thread_stack_size.is_none());
        assert!(config.trace_filter.is_none());
    }

    #[test]
    fn test_stack_size_in_kib() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[(THREAD_STACK_SIZE_VAR, "512")]));
        assert_eq!(config.thread_stack_size, Some(512 * 1024));
    }

    #[test]
    fn test_stack_size_out_of_range_falls_back() {
        for bad in ["0", "-1", "abc", "", "4194304", "99999999999"] {
            let config = RuntimeConfig::from_lookup(lookup_from(&[(THREAD_STACK_SIZE_VAR, bad)]));
            assert_eq!(config.thread_stack_size, None, "value {bad:?}");
        }
        let config =
            RuntimeConfig::from_lookup(lookup_from(&[(THREAD_STACK_SIZE_VAR, "4194303")]));
        assert_eq!(config.thread_stack_size, Some(4_194_303 * 1024));
    }

    #[test]
    fn test_temp_dir_and_trace() {
        let config = RuntimeConfig::from_lookup(lookup_from(&[
            (TEMP_DIR_VAR, "/var/staf/tmp"),
            (TRACE_VAR, "staf_osif=debug"),
        ]));
        assert_eq!(config.temp_dir, PathBuf::from("/var/staf/tmp"));
        assert_eq!(config.trace_filter.as_deref(), Some("staf_osif=debug"));
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = RuntimeConfig {
            thread_stack_size: Some(65536),
            temp_dir: PathBuf::from("/scratch"),
            trace_filter: Some("info".to_string()),
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn test_detect_reports_sane_values() {
        let info = ConfigInfo::detect();
        assert!(!info.os_name.is_empty());
        assert!(info.num_processors >= 1);
        assert!(!info.file_separator.is_empty());
        assert_eq!(info.shared_lib_suffix, SHARED_LIB_SUFFIX);
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_separators() {
        let info = ConfigInfo::detect();
        assert_eq!(info.file_separator, "/");
        assert_eq!(info.path_separator, ":");
        assert_eq!(info.line_separator, "\n");
        assert_eq!(info.boot_drive, "/");
        assert!(info.physical_memory > 0);
    }

    #[test]
    fn test_case_sensitivity_matches_file_system() {
        let info = ConfigInfo::detect();
        assert_eq!(
            info.case_sensitive,
            CaseSensitivity::native() == CaseSensitivity::Sensitive
        );
        if cfg!(any(windows, target_os = "macos")) {
            assert!(!info.case_sensitive);
        }
    }
}
