//! Property-based tests for the conflict marker parser.
//!
//! These tests use proptest to throw arbitrary and marker-heavy input at the
//! parser and check that its invariants hold for all of it.

#[cfg(test)]
mod proptest_tests {
    use crate::conflict::parse_conflicts;
    use proptest::prelude::*;

    fn start_marker_count(text: &str) -> usize {
        text.lines()
            .filter(|line| line.trim().starts_with("<<<<<<<"))
            .count()
    }

    /// Lines drawn mostly from markers and marker look-alikes.
    fn marker_heavy_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("<<<<<<< HEAD".to_string()),
            Just("=======".to_string()),
            Just(">>>>>>> feature".to_string()),
            Just("  =======  ".to_string()),
            Just("a ======= b".to_string()),
            Just("<<<<<<".to_string()),
            "[a-z ]{0,12}",
        ]
    }

    proptest! {
        /// Property: parsing never panics on arbitrary bytes
        #[test]
        fn parse_is_total_on_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let regions = parse_conflicts(&bytes);
            let text = String::from_utf8_lossy(&bytes);
            prop_assert!(regions.len() <= start_marker_count(&text));
        }

        /// Property: never more regions than start markers, and every region
        /// is well ordered
        #[test]
        fn regions_are_bounded_and_ordered(lines in proptest::collection::vec(marker_heavy_line(), 0..60)) {
            let text = lines.join("\n");
            let regions = parse_conflicts(text.as_bytes());

            prop_assert!(regions.len() <= start_marker_count(&text));
            for region in &regions {
                prop_assert!(region.start_line < region.separator_line);
                prop_assert!(region.separator_line < region.end_line);
                prop_assert!(region.start_marker.trim().starts_with("<<<<<<<"));
                prop_assert_eq!(region.separator_marker.trim(), "=======");
                prop_assert!(region.end_marker.trim().starts_with(">>>>>>>"));
                prop_assert!(region.context_before.len() <= 3);
                prop_assert!(region.context_after.len() <= 3);
            }
            for pair in regions.windows(2) {
                prop_assert!(pair[0].end_line < pair[1].start_line);
            }
        }

        /// Property: well-formed blocks are all found, with their content intact
        #[test]
        fn well_formed_blocks_are_all_found(
            blocks in proptest::collection::vec(("[a-z]{1,8}", "[a-z]{1,8}"), 1..6)
        ) {
            let text: String = blocks
                .iter()
                .map(|(ours, theirs)| {
                    format!("ctx\n<<<<<<< HEAD\n{}\n=======\n{}\n>>>>>>> other\n", ours, theirs)
                })
                .collect();
            let regions = parse_conflicts(text.as_bytes());

            prop_assert_eq!(regions.len(), blocks.len());
            for (region, (ours, theirs)) in regions.iter().zip(&blocks) {
                prop_assert_eq!(&region.ours, ours);
                prop_assert_eq!(&region.theirs, theirs);
            }
        }
    }
}
