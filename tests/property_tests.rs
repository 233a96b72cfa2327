//! Property-based tests for grouping correctness
//!
//! Generates small trees with contents drawn from a tiny alphabet (so
//! duplicate groups are common) and checks the engine's core contract:
//! after a run, two files share an inode iff their content was identical,
//! and every file's visible content is unchanged.

#![cfg(unix)]

use proptest::prelude::*;
use relink::DeduperBuilder;
use std::fs;
use std::os::unix::fs::MetadataExt;
use tempfile::TempDir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn grouping_matches_content_equality(
        contents in prop::collection::vec(prop::collection::vec(0u8..2, 0..3), 1..8)
    ) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        let names: Vec<String> = (0..contents.len())
            .map(|i| format!("file_{}.bin", i))
            .collect();
        for (name, content) in names.iter().zip(&contents) {
            fs::write(root.join(name), content).unwrap();
        }

        DeduperBuilder::new().build(root).unwrap().run().unwrap();

        // Content equivalence preserved
        for (name, content) in names.iter().zip(&contents) {
            prop_assert_eq!(&fs::read(root.join(name)).unwrap(), content);
        }

        // Same content iff same inode (all files share one device here)
        let inodes: Vec<u64> = names
            .iter()
            .map(|name| fs::metadata(root.join(name)).unwrap().ino())
            .collect();
        for i in 0..contents.len() {
            for j in (i + 1)..contents.len() {
                let same_content = contents[i] == contents[j];
                let same_inode = inodes[i] == inodes[j];
                prop_assert_eq!(
                    same_content,
                    same_inode,
                    "files {} and {}: same_content={} same_inode={}",
                    i, j, same_content, same_inode
                );
            }
        }
    }

    #[test]
    fn rerun_is_idempotent(
        contents in prop::collection::vec(prop::collection::vec(0u8..2, 0..3), 1..6)
    ) {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        for (i, content) in contents.iter().enumerate() {
            fs::write(root.join(format!("f{}", i)), content).unwrap();
        }

        DeduperBuilder::new().build(root).unwrap().run().unwrap();
        let report = DeduperBuilder::new().build(root).unwrap().run().unwrap();

        prop_assert_eq!(report.files_linked, 0);
        prop_assert_eq!(report.fingerprints_computed, 0);
    }
}
