use super::write_file;
use std::fs;
use tempfile::TempDir;
use tree_patcher::config::{apply_patches, load_builtin, ApplyOptions, Operation, PatchConfig};
use tree_patcher::{resolve_root, PatchResult, RepositoryRoot};

const STUB: &str = "device/xiaomi/xaga/miuiframework/core/java/miui/process/ProcessManager.java";
const BLUEPRINT: &str = "device/xiaomi/xaga/miuiframework/Android.bp";
const MAKEFILE: &str = "device/xiaomi/xaga/custom_xaga.mk";

fn miui_set() -> PatchConfig {
    load_builtin("miui-camera").unwrap().unwrap()
}

fn authored_content(config: &PatchConfig, id: &str) -> String {
    let patch = config.patches.iter().find(|p| p.id == id).unwrap();
    match &patch.operation {
        Operation::Author { content } => content.clone(),
        other => panic!("{id} is not an author patch: {other:?}"),
    }
}

/// Device tree with a makefile and no miuiframework directory yet
fn setup_xaga_tree(makefile: Option<&str>) -> (TempDir, RepositoryRoot) {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("device/xiaomi/xaga")).unwrap();
    fs::create_dir_all(dir.path().join("scripts")).unwrap();
    if let Some(contents) = makefile {
        write_file(dir.path(), MAKEFILE, contents);
    }

    let marker = miui_set().meta.root_marker.unwrap();
    let root = resolve_root(dir.path().join("scripts"), marker).unwrap();
    (dir, root)
}

fn read(dir: &TempDir, relative: &str) -> String {
    fs::read_to_string(dir.path().join(relative)).unwrap()
}

#[test]
fn test_fresh_tree() {
    let (dir, root) = setup_xaga_tree(Some("PRODUCT_NAME := custom_xaga\n"));
    let config = miui_set();

    let reports = apply_patches(&config, &root, &ApplyOptions::default());
    let ids: Vec<_> = reports.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        ["process-manager-stub", "miui-framework-module", "miui-framework-package"]
    );
    for report in &reports {
        assert!(
            matches!(report.result, Ok(PatchResult::Applied { .. })),
            "{}: {:?}",
            report.id,
            report.result
        );
    }

    assert_eq!(
        read(&dir, STUB),
        authored_content(&config, "process-manager-stub")
    );
    assert!(read(&dir, STUB).starts_with("package miui.process;\n"));
    assert!(read(&dir, BLUEPRINT).contains("name: \"miui-framework\","));
    assert_eq!(
        read(&dir, MAKEFILE),
        "PRODUCT_NAME := custom_xaga\n\n# Added by tree-patcher\nPRODUCT_PACKAGES += miui-framework\n"
    );
}

#[test]
fn test_second_run_changes_nothing() {
    let (dir, root) = setup_xaga_tree(Some("PRODUCT_NAME := custom_xaga\n"));
    let config = miui_set();
    let options = ApplyOptions::default();

    let _ = apply_patches(&config, &root, &options);
    let stub = read(&dir, STUB);
    let makefile = read(&dir, MAKEFILE);

    let reports = apply_patches(&config, &root, &options);
    assert!(matches!(reports[0].result, Ok(PatchResult::Unchanged { .. })));
    assert!(matches!(reports[1].result, Ok(PatchResult::Unchanged { .. })));
    assert!(matches!(
        reports[2].result,
        Ok(PatchResult::SkippedPresent { .. })
    ));

    assert_eq!(read(&dir, STUB), stub);
    assert_eq!(read(&dir, MAKEFILE), makefile);
    assert_eq!(makefile.matches("miui-framework").count(), 1);
}

#[test]
fn test_stale_stub_is_replaced() {
    let (dir, root) = setup_xaga_tree(Some("PRODUCT_NAME := custom_xaga\n"));
    write_file(dir.path(), STUB, "package miui.process;\nclass ProcessManager {}\n");
    let config = miui_set();

    let reports = apply_patches(&config, &root, &ApplyOptions::default());
    assert!(matches!(reports[0].result, Ok(PatchResult::Applied { .. })));
    assert_eq!(
        read(&dir, STUB),
        authored_content(&config, "process-manager-stub")
    );
}

#[test]
fn test_missing_makefile_is_skipped_and_stubs_still_written() {
    let (dir, root) = setup_xaga_tree(None);

    let reports = apply_patches(&miui_set(), &root, &ApplyOptions::default());
    assert!(matches!(reports[0].result, Ok(PatchResult::Applied { .. })));
    assert!(matches!(
        reports[2].result,
        Ok(PatchResult::SkippedMissing { .. })
    ));
    assert!(dir.path().join(STUB).exists());
    assert!(!dir.path().join(MAKEFILE).exists());
}

#[test]
fn test_makefile_already_listing_package_is_untouched() {
    let existing = "PRODUCT_PACKAGES += \\\n    miui-framework \\\n    Other\n";
    let (dir, root) = setup_xaga_tree(Some(existing));

    let reports = apply_patches(&miui_set(), &root, &ApplyOptions::default());
    assert!(matches!(
        reports[2].result,
        Ok(PatchResult::SkippedPresent { .. })
    ));
    assert_eq!(read(&dir, MAKEFILE), existing);
}

#[test]
fn test_makefile_without_trailing_newline() {
    let (dir, root) = setup_xaga_tree(Some("PRODUCT_NAME := custom_xaga"));

    let _ = apply_patches(&miui_set(), &root, &ApplyOptions::default());
    assert_eq!(
        read(&dir, MAKEFILE),
        "PRODUCT_NAME := custom_xaga\n\n# Added by tree-patcher\nPRODUCT_PACKAGES += miui-framework\n"
    );
}
