//! Property-based tests for staf-osif using proptest.

use proptest::prelude::*;
use staf_osif::fs::{matches_wildcards, CaseSensitivity, FsPath, PathStyle};
use staf_osif::sync::{EventSem, EventSemState, WaitStatus, WaitTimeout};
use staf_osif::util::{convert_duration_string, convert_size_string};
use std::time::{Duration, Instant};

fn component() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,8}"
}

fn extension() -> impl Strategy<Value = String> {
    "[a-z0-9]{0,4}"
}

fn windows_root() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("\\".to_string()),
        "[A-Za-z]".prop_map(|drive| format!("{drive}:")),
        (component(), component()).prop_map(|(host, share)| format!("\\\\{host}\\{share}")),
    ]
}

proptest! {
    #[test]
    fn test_unix_path_round_trip(
        root in prop_oneof![Just(String::new()), Just("/".to_string())],
        dirs in proptest::collection::vec(component(), 0..4),
        name in component(),
        ext in extension(),
    ) {
        let assembled = PathStyle::Unix.assemble(&root, &dirs, &name, &ext);
        let parsed = FsPath::parse_as(&assembled, PathStyle::Unix);
        prop_assert_eq!(&parsed.root, &root);
        prop_assert_eq!(&parsed.dirs, &dirs);
        prop_assert_eq!(&parsed.name, &name);
        prop_assert_eq!(&parsed.extension, &ext);
        prop_assert_eq!(parsed.as_string(), assembled);
    }

    #[test]
    fn test_windows_path_round_trip(
        root in windows_root(),
        dirs in proptest::collection::vec(component(), 0..4),
        name in component(),
        ext in extension(),
    ) {
        let assembled = PathStyle::Windows.assemble(&root, &dirs, &name, &ext);
        let parsed = FsPath::parse_as(&assembled, PathStyle::Windows);
        prop_assert_eq!(&parsed.root, &root);
        prop_assert_eq!(&parsed.dirs, &dirs);
        prop_assert_eq!(&parsed.name, &name);
        prop_assert_eq!(&parsed.extension, &ext);
        prop_assert_eq!(parsed.as_string(), assembled);
    }

    #[test]
    fn test_windows_bare_root_keeps_trailing_separator(
        drive in "[A-Za-z]",
        host in component(),
        share in component(),
    ) {
        for root in [format!("{drive}:\\"), format!("\\\\{host}\\{share}\\")] {
            let parsed = FsPath::parse_as(&root, PathStyle::Windows);
            prop_assert_eq!(&parsed.root, &root);
            prop_assert!(parsed.dirs.is_empty());
            prop_assert!(parsed.name.is_empty());
            prop_assert_eq!(parsed.as_string(), root);
        }
    }

    #[test]
    fn test_redundant_separators_normalize(
        dirs in proptest::collection::vec(component(), 1..4),
        runs in proptest::collection::vec(1usize..4, 4),
    ) {
        let mut messy = "/".repeat(runs[0]);
        for (i, dir) in dirs.iter().enumerate() {
            messy.push_str(dir);
            messy.push_str(&"/".repeat(runs[(i + 1) % runs.len()]));
        }
        let clean = format!("/{}", dirs.join("/"));
        prop_assert_eq!(FsPath::parse_as(&messy, PathStyle::Unix).as_string(), clean);
    }

    #[test]
    fn test_repeated_post_stays_posted(posts in 1usize..20) {
        let sem = EventSem::new();
        for _ in 0..posts {
            sem.post().unwrap();
        }
        prop_assert_eq!(sem.query(), EventSemState::Posted);
        prop_assert_eq!(sem.post_count(), 1);
    }

    #[test]
    fn test_wait_on_posted_returns_immediately(millis in 0u32..60_000) {
        let sem = EventSem::new();
        sem.post().unwrap();
        let start = Instant::now();
        let status = sem.wait(WaitTimeout::from_millis(millis)).unwrap();
        prop_assert_eq!(status, WaitStatus::Posted);
        prop_assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_duration_units(n in 0u32..1000, unit in prop_oneof![
        Just(("", 1u32)),
        Just(("s", 1_000)),
        Just(("S", 1_000)),
        Just(("m", 60_000)),
        Just(("h", 3_600_000)),
    ]) {
        let value = format!("{n}{}", unit.0);
        prop_assert_eq!(convert_duration_string(&value).unwrap(), n * unit.1);
    }

    #[test]
    fn test_size_units(n in 0u32..4096, unit in prop_oneof![
        Just(("", 1u32)),
        Just(("k", 1024)),
        Just(("M", 1024 * 1024)),
    ]) {
        let value = format!("{n}{}", unit.0);
        prop_assert_eq!(convert_size_string(&value).unwrap(), n * unit.1);
    }

    #[test]
    fn test_star_matches_anything(text in "[ -~]{0,32}") {
        prop_assert!(matches_wildcards(&text, "*", CaseSensitivity::Sensitive));
    }

    #[test]
    fn test_literal_pattern_matches_itself(text in "[a-zA-Z0-9._/]{1,32}") {
        prop_assert!(matches_wildcards(&text, &text, CaseSensitivity::Sensitive));
        prop_assert!(matches_wildcards(
            &text.to_lowercase(),
            &text.to_uppercase(),
            CaseSensitivity::Insensitive
        ));
    }
}
