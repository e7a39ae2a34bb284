use super::write_file;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tree_patcher::config::{apply_patches, load_builtins, ApplyOptions, PatchReport};
use tree_patcher::{NoOpReason, PatchResult, RepositoryRoot, RunSummary};

const IMMS: &str =
    "frameworks/base/services/core/java/com/android/server/inputmethod/InputMethodManagerService.java";
const FACE_SERVICE: &str =
    "frameworks/base/services/core/java/com/android/server/biometrics/sensors/face/FaceService.java";
const AUTH_SERVICE: &str =
    "frameworks/base/services/core/java/com/android/server/biometrics/AuthService.java";
const MAKEFILE: &str = "device/xiaomi/xaga/custom_xaga.mk";

fn setup_full_tree() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        IMMS,
        include_str!("../fixtures/InputMethodManagerService.java.input"),
    );
    write_file(
        dir.path(),
        FACE_SERVICE,
        include_str!("../fixtures/FaceService.java.input"),
    );
    write_file(
        dir.path(),
        AUTH_SERVICE,
        include_str!("../fixtures/AuthService.java.input"),
    );
    write_file(dir.path(), MAKEFILE, "PRODUCT_NAME := custom_xaga\n");
    dir
}

fn run_all(root: &RepositoryRoot) -> Vec<PatchReport> {
    load_builtins()
        .unwrap()
        .iter()
        .flat_map(|(_, config)| apply_patches(config, root, &ApplyOptions::default()))
        .collect()
}

fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().display().to_string(), fs::read(e.path()).unwrap()))
        .collect();
    files.sort();
    files
}

#[test]
fn test_all_sets_on_full_tree() {
    let dir = setup_full_tree();
    let root = RepositoryRoot::new(dir.path()).unwrap();

    let reports = run_all(&root);
    let summary = RunSummary::from_reports(&reports);
    assert_eq!(summary.applied, reports.len());
    assert_eq!(summary.exit_code(), 0);

    let after_first = snapshot(dir.path());
    let reports = run_all(&root);
    let summary = RunSummary::from_reports(&reports);
    assert_eq!(summary.applied, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(snapshot(dir.path()), after_first);
}

#[test]
fn test_sparse_tree_skips_missing_targets() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("frameworks/base")).unwrap();
    let root = RepositoryRoot::new(dir.path()).unwrap();

    let reports = run_all(&root);
    for report in reports.iter().filter(|r| r.kind != "author") {
        assert!(
            matches!(report.result, Ok(PatchResult::SkippedMissing { .. })),
            "{}: {:?}",
            report.id,
            report.result
        );
    }
    assert!(!dir.path().join(IMMS).exists());
    assert!(!dir.path().join(MAKEFILE).exists());
}

#[test]
fn test_upstream_drift_reports_no_match() {
    let dir = TempDir::new().unwrap();
    let drifted = "package com.android.server.inputmethod;\n\npublic final class InputMethodManagerService {\n}\n";
    write_file(dir.path(), IMMS, drifted);
    let root = RepositoryRoot::new(dir.path()).unwrap();

    let reports = run_all(&root);
    let imms = reports
        .iter()
        .find(|r| r.id == "imms-lineage-hardware")
        .unwrap();
    assert!(matches!(
        imms.result,
        Ok(PatchResult::SkippedNoOp {
            reason: NoOpReason::NoRuleMatched,
            ..
        })
    ));
    assert_eq!(RunSummary::from_reports(&reports).no_match, 1);
    assert_eq!(fs::read_to_string(dir.path().join(IMMS)).unwrap(), drifted);
}
