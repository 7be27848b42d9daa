//! Directory enumeration with filtering and sorting.

use std::collections::VecDeque;
use std::fs;
use std::io;

use tracing::{debug, trace};

use super::entry::{EntryTypeMask, FsEntry};
use super::path::FsPath;
use super::wildcard::matches_wildcards;
use super::CaseSensitivity;
use crate::context::OsContext;
use crate::error::{OsError, OsResult};

/// Order of enumerated entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    /// Directory order.
    #[default]
    None,
    /// By full path.
    Name,
    /// By size, smallest first.
    Size,
    /// By modification time, oldest first.
    ModTime,
}

/// Selection and ordering for [`enum_open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumFilter {
    /// Wildcard pattern for the name without extension.
    pub name_pattern: String,
    /// Wildcard pattern for the extension.
    pub extension_pattern: String,
    /// Case behaviour of both patterns and of name sorting.
    pub case: CaseSensitivity,
    /// Types to include.
    pub types: EntryTypeMask,
    /// Result order.
    pub sort_by: SortBy,
}

impl Default for EnumFilter {
    fn default() -> Self {
        Self {
            name_pattern: "*".to_string(),
            extension_pattern: "*".to_string(),
            case: CaseSensitivity::native(),
            types: EntryTypeMask::default(),
            sort_by: SortBy::None,
        }
    }
}

/// The entries matched by one enumeration, consumed front to back.
#[derive(Debug)]
pub struct FsEnum {
    entries: VecDeque<FsEntry>,
}

impl FsEnum {
    /// Entries not yet returned.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True once every entry has been returned.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Iterator for FsEnum {
    type Item = FsEntry;

    fn next(&mut self) -> Option<FsEntry> {
        self.entries.pop_front()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.entries.len(), Some(self.entries.len()))
    }
}

impl ExactSizeIterator for FsEnum {}

#[cfg(unix)]
fn not_a_directory(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::ENOTDIR)
}

#[cfg(not(unix))]
fn not_a_directory(err: &io::Error) -> bool {
    // ERROR_DIRECTORY
    err.raw_os_error() == Some(267)
}

fn read_names(root: &str, include_special: bool) -> OsResult<Vec<String>> {
    let dir = match fs::read_dir(root) {
        Ok(dir) => dir,
        Err(e) if not_a_directory(&e) => return Ok(Vec::new()),
        Err(e) => return Err(OsError::from_io("opendir", e)),
    };

    let mut names = Vec::new();
    if include_special {
        names.push(".".to_string());
        names.push("..".to_string());
    }
    for item in dir {
        let item = item.map_err(|e| OsError::from_io("readdir", e))?;
        names.push(item.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn sort_key(entry: &FsEntry, case: CaseSensitivity) -> String {
    match case {
        CaseSensitivity::Sensitive => entry.path().to_string(),
        CaseSensitivity::Insensitive => entry.path().to_uppercase(),
    }
}

/// Lists the entries of directory `root` that pass `filter`.
///
/// `.` and `..` are included only when the filter's types contain
/// [`EntryTypeMask::SPECIAL_DIRECTORY`]. Entries that vanish or cannot be
/// read while listing are skipped. A `root` that is not a directory yields
/// an empty enumeration. Sorting is stable, so ties keep directory order,
/// which itself is unspecified.
pub fn enum_open(ctx: &OsContext, root: &FsEntry, filter: &EnumFilter) -> OsResult<FsEnum> {
    let root_path = root.path();
    let include_special = filter.types.contains(EntryTypeMask::SPECIAL_DIRECTORY);

    let names = {
        let _serialized = ctx.enum_lock();
        read_names(root_path, include_special)?
    };

    let mut entries = Vec::with_capacity(names.len());
    for name in names {
        let full = format!("{root_path}/{name}");
        let parsed = FsPath::parse(&full);
        if !matches_wildcards(&parsed.name, &filter.name_pattern, filter.case)
            || !matches_wildcards(&parsed.extension, &filter.extension_pattern, filter.case)
        {
            continue;
        }

        let entry = match FsEntry::get(&parsed.as_string()) {
            Ok(entry) => entry,
            Err(e) => {
                trace!(path = %full, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if filter.types.intersects(entry.entry_type().mask()) {
            entries.push(entry);
        }
    }

    match filter.sort_by {
        SortBy::None => {}
        SortBy::Name => entries.sort_by_cached_key(|e| sort_key(e, filter.case)),
        SortBy::Size => entries.sort_by_key(FsEntry::size),
        SortBy::ModTime => entries.sort_by_key(FsEntry::modified),
    }

    debug!(root = root_path, count = entries.len(), "enumerated directory");
    Ok(FsEnum {
        entries: entries.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::EntryType;

    fn setup() -> (tempfile::TempDir, FsEntry) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), [0u8; 30]).unwrap();
        fs::write(dir.path().join("a.txt"), [0u8; 10]).unwrap();
        fs::write(dir.path().join("C.log"), [0u8; 20]).unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let root = FsEntry::get(&dir.path().to_string_lossy()).unwrap();
        (dir, root)
    }

    fn names(e: FsEnum) -> Vec<String> {
        e.map(|entry| entry.path().rsplit('/').next().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_default_lists_everything_but_dots() {
        let ctx = OsContext::default();
        let (_dir, root) = setup();
        let found = enum_open(&ctx, &root, &EnumFilter::default()).unwrap();
        assert_eq!(found.len(), 4);
        let mut found = names(found);
        found.sort();
        assert_eq!(found, vec!["C.log", "a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn test_special_directories_on_request() {
        let ctx = OsContext::default();
        let (_dir, root) = setup();
        let filter = EnumFilter {
            types: EntryTypeMask::DIRECTORY | EntryTypeMask::SPECIAL_DIRECTORY,
            sort_by: SortBy::Name,
            case: CaseSensitivity::Sensitive,
            ..EnumFilter::default()
        };
        let found: Vec<FsEntry> = enum_open(&ctx, &root, &filter).unwrap().collect();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|e| e.entry_type() == EntryType::Directory));
        assert!(found[0].path().ends_with("/."));
        assert!(found[1].path().ends_with("/.."));
    }

    #[test]
    fn test_sort_by_size() {
        let ctx = OsContext::default();
        let (_dir, root) = setup();
        let filter = EnumFilter {
            types: EntryTypeMask::FILE,
            sort_by: SortBy::Size,
            ..EnumFilter::default()
        };
        let sizes: Vec<u64> = enum_open(&ctx, &root, &filter)
            .unwrap()
            .map(|e| e.size())
            .collect();
        assert_eq!(sizes, vec![10, 20, 30]);
    }

    #[test]
    fn test_sort_by_name_case() {
        let ctx = OsContext::default();
        let (_dir, root) = setup();
        let mut filter = EnumFilter {
            types: EntryTypeMask::FILE,
            sort_by: SortBy::Name,
            case: CaseSensitivity::Sensitive,
            ..EnumFilter::default()
        };
        let found = names(enum_open(&ctx, &root, &filter).unwrap());
        assert_eq!(found, vec!["C.log", "a.txt", "b.txt"]);

        filter.case = CaseSensitivity::Insensitive;
        let found = names(enum_open(&ctx, &root, &filter).unwrap());
        assert_eq!(found, vec!["a.txt", "b.txt", "C.log"]);
    }

    #[test]
    fn test_patterns() {
        let ctx = OsContext::default();
        let (_dir, root) = setup();
        let filter = EnumFilter {
            extension_pattern: "txt".to_string(),
            case: CaseSensitivity::Sensitive,
            sort_by: SortBy::Name,
            ..EnumFilter::default()
        };
        assert_eq!(names(enum_open(&ctx, &root, &filter).unwrap()), vec!["a.txt", "b.txt"]);

        let filter = EnumFilter {
            name_pattern: "c".to_string(),
            case: CaseSensitivity::Insensitive,
            ..EnumFilter::default()
        };
        assert_eq!(names(enum_open(&ctx, &root, &filter).unwrap()), vec!["C.log"]);
    }

    #[test]
    fn test_file_root_is_empty() {
        let ctx = OsContext::default();
        let (dir, _root) = setup();
        let file = FsEntry::get(&dir.path().join("a.txt").to_string_lossy()).unwrap();
        let found = enum_open(&ctx, &file, &EnumFilter::default()).unwrap();
        assert!(found.is_empty());
    }
}
