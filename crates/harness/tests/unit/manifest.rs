//! # Manifest Tests
//!
//! Loading is all-or-nothing; filtering always partitions the input.

use std::collections::BTreeSet;

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use rvconform_core::HarnessError;
use rvconform_core::common::GuestAddr;
use rvconform_core::manifest::{GlobPattern, TestCase, TestManifest, Xlen};

const ISA_MANIFEST: &str = r#"[
    { "name": "rv64ui-p-add", "cycle": 5000, "host-io-addr": "0x80001000", "xlen": 64 },
    { "name": "rv64ui-p-sub", "cycle": 5000, "host-io-addr": 2147487744, "xlen": 64 },
    { "name": "rv32ui-p-add", "cycle": 3000, "host-io-addr": "0x80001000", "xlen": 32, "skip": false },
    { "name": "rv64ui-p-fence_i", "cycle": 5000, "host-io-addr": "0x80001000", "xlen": 64, "skip": true }
]"#;

fn names(cases: &[TestCase]) -> Vec<&str> {
    cases.iter().map(|c| c.name.as_str()).collect()
}

#[test]
fn parses_records_verbatim() {
    let manifest = TestManifest::parse(ISA_MANIFEST, None).unwrap();
    assert_eq!(manifest.len(), 4);

    let add = &manifest.cases()[0];
    assert_eq!(add.name, "rv64ui-p-add");
    assert_eq!(add.cycle, 5000);
    assert_eq!(add.xlen, Xlen::Rv64);
    assert_eq!(add.host_io_addr, Some(GuestAddr(0x8000_1000)));
    assert!(!add.skip);
    assert_eq!(add.build_variant, None);

    assert_eq!(manifest.cases()[1].host_io_addr, Some(GuestAddr(0x8000_1000)));
    assert_eq!(manifest.cases()[2].xlen, Xlen::Rv32);
    assert!(manifest.cases()[3].skip);
}

#[test]
fn host_io_addr_is_optional() {
    let manifest =
        TestManifest::parse(r#"[{ "name": "boot", "cycle": 10, "xlen": 32 }]"#, None).unwrap();
    assert_eq!(manifest.cases()[0].host_io_addr, None);
}

#[test]
fn filter_star_splits_runnable_and_skipped() {
    let manifest = TestManifest::parse(
        r#"[
            { "name": "add", "cycle": 100, "xlen": 64, "skip": false },
            { "name": "sub", "cycle": 100, "xlen": 64, "skip": true }
        ]"#,
        None,
    )
    .unwrap();

    let partition = manifest.filter(&GlobPattern::new("*"));
    assert_eq!(names(&partition.runnable), vec!["add"]);
    assert_eq!(partition.skipped_names(), vec!["sub".to_string()]);
    assert!(partition.unmatched.is_empty());
}

#[test]
fn filter_preserves_manifest_order() {
    let manifest = TestManifest::parse(ISA_MANIFEST, None).unwrap();
    let partition = manifest.filter(&GlobPattern::new("rv64ui-*"));
    assert_eq!(names(&partition.runnable), vec!["rv64ui-p-add", "rv64ui-p-sub"]);
    assert_eq!(names(&partition.skipped), vec!["rv64ui-p-fence_i"]);
    assert_eq!(names(&partition.unmatched), vec!["rv32ui-p-add"]);
    assert_eq!(partition.len(), manifest.len());
}

#[test]
fn matching_names_include_skipped_cases() {
    let manifest = TestManifest::parse(ISA_MANIFEST, None).unwrap();
    assert_eq!(
        manifest.matching_names(&GlobPattern::new("rv64*")),
        vec!["rv64ui-p-add", "rv64ui-p-sub", "rv64ui-p-fence_i"]
    );
}

#[test]
fn missing_file_is_manifest_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    match TestManifest::load(&path) {
        Err(HarnessError::ManifestNotFound(p)) => assert_eq!(p, path),
        other => panic!("expected ManifestNotFound, got {other:?}"),
    }
}

#[test]
fn load_records_source_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("isa.json");
    std::fs::write(&path, ISA_MANIFEST).unwrap();
    let manifest = TestManifest::load(&path).unwrap();
    assert_eq!(manifest.path(), Some(path.as_path()));
    assert_eq!(manifest.len(), 4);
}

#[test]
fn malformed_record_rejects_whole_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(
        &path,
        r#"[
            { "name": "ok", "cycle": 1, "xlen": 64 },
            { "name": "bad", "cycle": "lots", "xlen": 64 }
        ]"#,
    )
    .unwrap();
    match TestManifest::load(&path) {
        Err(HarnessError::ManifestParse { path: p, .. }) => assert_eq!(p, path),
        other => panic!("expected ManifestParse, got {other:?}"),
    }
}

#[test]
fn invalid_xlen_is_rejected() {
    let err = TestManifest::parse(r#"[{ "name": "x", "cycle": 1, "xlen": 128 }]"#, None);
    assert!(matches!(err, Err(HarnessError::ManifestParse { .. })));
}

#[test]
fn duplicate_names_are_rejected() {
    let err = TestManifest::parse(
        r#"[
            { "name": "dup", "cycle": 1, "xlen": 64 },
            { "name": "dup", "cycle": 2, "xlen": 64 }
        ]"#,
        None,
    );
    match err {
        Err(HarnessError::ManifestParse { message, .. }) => assert!(message.contains("dup")),
        other => panic!("expected ManifestParse, got {other:?}"),
    }
}

#[rstest]
#[case::parent("..")]
#[case::current(".")]
#[case::empty("")]
#[case::nested("isa/rv64ui-p-add")]
#[case::escape("../../etc/passwd")]
#[case::absolute("/tmp/add")]
#[case::backslash("..\\add")]
fn names_that_are_not_plain_file_names_are_rejected(#[case] name: &str) {
    let text = format!(r#"[{{ "name": {}, "cycle": 1, "xlen": 64 }}]"#, serde_json::to_string(name).unwrap());
    match TestManifest::parse(&text, None) {
        Err(HarnessError::ManifestParse { message, .. }) => assert!(message.contains("plain file name")),
        other => panic!("expected ManifestParse, got {other:?}"),
    }
}

#[test]
fn in_memory_cases_are_checked_too() {
    let err = TestManifest::from_cases(vec![TestCase::new("../linux", 1, Xlen::Rv64)]);
    assert!(matches!(err, Err(HarnessError::ManifestParse { .. })));
}

#[test]
fn dotted_names_are_plain_file_names() {
    let manifest = TestManifest::from_cases(vec![TestCase::new("rv64ui-p-add.v2", 1, Xlen::Rv64)]).unwrap();
    assert_eq!(manifest.len(), 1);
}

fn arb_cases() -> impl Strategy<Value = Vec<TestCase>> {
    prop::collection::btree_map("[a-c]{1,4}", any::<bool>(), 0..24).prop_map(|map| {
        map.into_iter()
            .map(|(name, skip)| {
                let case = TestCase::new(name, 100, Xlen::Rv64);
                if skip { case.skipped() } else { case }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn filter_is_a_partition(cases in arb_cases(), pattern in "[a-c*?]{0,4}") {
        let manifest = TestManifest::from_cases(cases.clone()).unwrap();
        let glob = GlobPattern::new(&pattern);
        let partition = manifest.filter(&glob);

        prop_assert_eq!(partition.len(), cases.len());

        let mut seen = BTreeSet::new();
        for case in partition.runnable.iter().chain(&partition.skipped).chain(&partition.unmatched) {
            prop_assert!(seen.insert(case.name.clone()), "{} appears twice", case.name);
        }
        let input: BTreeSet<_> = cases.iter().map(|c| c.name.clone()).collect();
        prop_assert_eq!(seen, input);

        prop_assert!(partition.runnable.iter().all(|c| !c.skip && glob.matches(&c.name)));
        prop_assert!(partition.skipped.iter().all(|c| c.skip && glob.matches(&c.name)));
        prop_assert!(partition.unmatched.iter().all(|c| !glob.matches(&c.name)));
    }
}
