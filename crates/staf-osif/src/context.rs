//! Process-wide runtime state.
//!
//! Everything that outlives a single primitive handle lives here: the named
//! semaphore registries, the shared-library reference counts, the
//! directory-enumeration lock, the per-path entry lock table and the lazily
//! detected [`ConfigInfo`]. Most callers use [`OsContext::global`]; tests
//! build isolated instances with [`OsContext::new`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::debug;

use crate::config::{ConfigInfo, RuntimeConfig};
use crate::dynlib::LibraryTable;
use crate::fs::lock::EntryLockTable;
use crate::sync::event::EventInner;
use crate::sync::mutex::MutexInner;

/// Name → shared object map. Entries are weak, so an object lives exactly as
/// long as some handle refers to it.
pub(crate) struct NamedRegistry<T> {
    entries: Mutex<HashMap<String, Weak<T>>>,
}

impl<T> NamedRegistry<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the live object for `name`, creating it with `create` if none
    /// exists.
    pub(crate) fn open_or_create(&self, name: &str, create: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(name).and_then(Weak::upgrade) {
            return existing;
        }

        entries.retain(|_, weak| weak.strong_count() > 0);
        let created = Arc::new(create());
        entries.insert(name.to_string(), Arc::downgrade(&created));
        debug!(name, "created named object");
        created
    }

    /// Number of names with at least one live handle.
    pub(crate) fn live_count(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// Explicit holder of the runtime's shared state.
pub struct OsContext {
    config: RuntimeConfig,
    config_info: OnceLock<ConfigInfo>,
    named_mutexes: NamedRegistry<MutexInner>,
    named_events: NamedRegistry<EventInner>,
    libraries: LibraryTable,
    enum_lock: Mutex<()>,
    entry_locks: EntryLockTable,
}

static GLOBAL: OnceLock<OsContext> = OnceLock::new();

impl OsContext {
    /// Builds an isolated context.
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            config_info: OnceLock::new(),
            named_mutexes: NamedRegistry::new(),
            named_events: NamedRegistry::new(),
            libraries: LibraryTable::default(),
            enum_lock: Mutex::new(()),
            entry_locks: EntryLockTable::default(),
        }
    }

    /// The process context, created from the environment on first use.
    pub fn global() -> &'static OsContext {
        GLOBAL.get_or_init(|| OsContext::new(RuntimeConfig::from_env()))
    }

    /// Settings read at construction.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Host capabilities, detected once.
    pub fn config_info(&self) -> &ConfigInfo {
        self.config_info.get_or_init(ConfigInfo::detect)
    }

    /// Count of named mutexes and events that still have handles.
    pub fn live_named_objects(&self) -> usize {
        self.named_mutexes.live_count() + self.named_events.live_count()
    }

    pub(crate) fn named_mutexes(&self) -> &NamedRegistry<MutexInner> {
        &self.named_mutexes
    }

    pub(crate) fn named_events(&self) -> &NamedRegistry<EventInner> {
        &self.named_events
    }

    pub(crate) fn libraries(&self) -> &LibraryTable {
        &self.libraries
    }

    /// Serializes directory open/read/close across the process.
    pub(crate) fn enum_lock(&self) -> MutexGuard<'_, ()> {
        self.enum_lock.lock()
    }

    pub(crate) fn entry_locks(&self) -> &EntryLockTable {
        &self.entry_locks
    }
}

impl Default for OsContext {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl std::fmt::Debug for OsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsContext")
            .field("config", &self.config)
            .field("live_named_objects", &self.live_named_objects())
            .finish_non_exhaustive()
    }
}
