//! Property-based tests for the patch engine.
//!
//! These tests verify key invariants:
//! - Idempotency: a second rewrite pass never changes the file
//! - Append safety: a guarded fragment is appended at most once
//! - Prefix preservation: appending never alters existing content

use proptest::prelude::*;
use std::fs;
use tree_patcher::engine::join_fragment;
use tree_patcher::{NoOpReason, PatchEngine, PatchResult, RepositoryRoot, TransformationRule};

/// Strategy to generate source lines, some of which reference the vendor class.
fn arb_source() -> impl Strategy<Value = String> {
    prop::collection::vec(
        prop_oneof![
            3 => "[a-z][a-z ();]{0,24}",
            1 => Just("import vendor.Bar;".to_string()),
            1 => Just("    if (Bar.canUse()) {}".to_string()),
        ],
        0..24,
    )
    .prop_map(|lines| {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    })
}

/// Strategy to generate makefile content that never mentions the marker.
fn arb_makefile() -> impl Strategy<Value = String> {
    prop::collection::vec("[A-Z_]{1,12} [:+]= [a-z0-9-]{0,12}", 0..12)
        .prop_filter("must not mention the marker", |lines| {
            lines.iter().all(|line| !line.contains("stub-pkg"))
        })
        .prop_flat_map(|lines| {
            let text = lines.join("\n");
            prop_oneof![Just(text.clone()), Just(format!("{text}\n"))]
        })
}

fn vendor_rules() -> Vec<TransformationRule> {
    vec![
        TransformationRule::regex("import", r"import vendor\.Bar;\n", ""),
        TransformationRule::literal("can-use", "Bar.canUse()", "false"),
    ]
}

proptest! {
    #[test]
    fn rewrite_second_pass_is_noop(source in arb_source()) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Foo.java"), &source).unwrap();
        let root = RepositoryRoot::new(dir.path()).unwrap();
        let engine = PatchEngine::new(&root);

        let _ = engine.rewrite_file("Foo.java", &vendor_rules()).unwrap();
        let once = fs::read_to_string(dir.path().join("Foo.java")).unwrap();
        prop_assert!(!once.contains("vendor.Bar"));
        prop_assert!(!once.contains("Bar.canUse()"));

        let second = engine.rewrite_file("Foo.java", &vendor_rules()).unwrap();
        prop_assert!(
            matches!(second, PatchResult::SkippedNoOp { reason: NoOpReason::NoRuleMatched, .. }),
            "unexpected second result: {:?}",
            second
        );
        let twice = fs::read_to_string(dir.path().join("Foo.java")).unwrap();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn guarded_append_happens_once(content in arb_makefile(), runs in 1usize..4) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("product.mk"), &content).unwrap();
        let root = RepositoryRoot::new(dir.path()).unwrap();
        let engine = PatchEngine::new(&root);

        for _ in 0..runs {
            let _ = engine
                .append_guarded("product.mk", "stub-pkg", "PRODUCT_PACKAGES += stub-pkg\n")
                .unwrap();
        }

        let after = fs::read_to_string(dir.path().join("product.mk")).unwrap();
        prop_assert_eq!(after.matches("stub-pkg").count(), 1);
        prop_assert!(after.starts_with(&content));
        prop_assert!(after.ends_with('\n'));
    }

    #[test]
    fn join_fragment_preserves_prefix(content in arb_makefile(), fragment in "[a-z +=\n]{1,40}") {
        let joined = join_fragment(&content, &fragment);
        prop_assert!(joined.starts_with(&content));
        prop_assert!(joined.trim_end().ends_with(fragment.trim_end()));
    }
}
