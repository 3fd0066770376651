use familiar::error::PathError;
use familiar::safety::{validate_path, WorkspaceGuard};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ─── Helper ───────────────────────────────────────────────────────────

/// A temp dir plus its canonical path (macOS /var -> /private/var).
fn setup_root() -> (TempDir, PathBuf) {
    let tmp = tempfile::tempdir().expect("failed to create temp dir");
    let root = fs::canonicalize(tmp.path()).unwrap();
    (tmp, root)
}

fn is_out_of_bounds(result: Result<PathBuf, PathError>) -> bool {
    matches!(result, Err(PathError::OutOfBounds { .. }))
}

// ─── Allowed ──────────────────────────────────────────────────────────

#[test]
fn root_itself_is_allowed() {
    let (_tmp, root) = setup_root();
    assert_eq!(validate_path(&root, &root).unwrap(), root);
}

#[test]
fn new_file_under_existing_directory_is_allowed() {
    let (_tmp, root) = setup_root();
    fs::create_dir(root.join("sub")).unwrap();

    let target = root.join("sub").join("new-file.txt");
    assert!(!target.exists());
    assert_eq!(validate_path(&root, &target).unwrap(), target);
}

#[test]
fn new_file_under_missing_directories_is_allowed() {
    let (_tmp, root) = setup_root();
    let target = root.join("a").join("b").join("c.txt");
    assert_eq!(validate_path(&root, &target).unwrap(), target);
}

#[test]
fn dotdot_that_stays_inside_is_allowed() {
    let (_tmp, root) = setup_root();
    fs::create_dir(root.join("a")).unwrap();
    let target = root.join("a").join("..").join("b.txt");
    assert_eq!(validate_path(&root, &target).unwrap(), root.join("b.txt"));
}

#[cfg(unix)]
#[test]
fn symlink_pointing_inside_is_allowed() {
    let (_tmp, root) = setup_root();
    let real = root.join("real.txt");
    fs::write(&real, "data").unwrap();
    std::os::unix::fs::symlink(&real, root.join("link")).unwrap();

    assert_eq!(validate_path(&root, &root.join("link")).unwrap(), real);
}

// ─── Blocked ──────────────────────────────────────────────────────────

#[test]
fn dotdot_escape_is_out_of_bounds() {
    let (_tmp, root) = setup_root();
    let target = root.join("a").join("..").join("..").join("escape");
    assert!(is_out_of_bounds(validate_path(&root, &target)));
}

#[test]
fn sibling_with_common_prefix_is_out_of_bounds() {
    let (_tmp, base) = setup_root();
    let root = base.join("root");
    let sibling = base.join("root-other");
    fs::create_dir(&root).unwrap();
    fs::create_dir(&sibling).unwrap();

    assert!(is_out_of_bounds(validate_path(&root, &sibling.join("f.txt"))));
}

#[test]
fn absolute_path_elsewhere_is_out_of_bounds() {
    let (_tmp, root) = setup_root();
    assert!(is_out_of_bounds(validate_path(&root, Path::new("/etc/hosts"))));
}

#[cfg(unix)]
#[test]
fn symlink_pointing_outside_is_out_of_bounds() {
    let (_tmp, root) = setup_root();
    let (_outside_tmp, outside) = setup_root();
    fs::write(outside.join("target.txt"), "outside").unwrap();
    std::os::unix::fs::symlink(outside.join("target.txt"), root.join("sneaky")).unwrap();

    assert!(is_out_of_bounds(validate_path(&root, &root.join("sneaky"))));
}

#[cfg(unix)]
#[test]
fn new_file_through_symlinked_directory_is_out_of_bounds() {
    let (_tmp, root) = setup_root();
    let (_outside_tmp, outside) = setup_root();
    std::os::unix::fs::symlink(&outside, root.join("escape-dir")).unwrap();

    let target = root.join("escape-dir").join("new.txt");
    assert!(is_out_of_bounds(validate_path(&root, &target)));
}

#[cfg(unix)]
#[test]
fn dangling_symlink_to_outside_is_out_of_bounds() {
    let (_tmp, root) = setup_root();
    let (_outside_tmp, outside) = setup_root();
    std::os::unix::fs::symlink(outside.join("not-yet"), root.join("dangling")).unwrap();

    assert!(is_out_of_bounds(validate_path(&root, &root.join("dangling"))));
}

// ─── WorkspaceGuard ───────────────────────────────────────────────────

#[test]
fn guard_creates_and_canonicalizes_root() {
    let (_tmp, base) = setup_root();
    let new_ws = base.join("brand_new_workspace");
    let guard = WorkspaceGuard::new(&new_ws).unwrap();

    assert!(new_ws.is_dir());
    assert_eq!(guard.canonical_root(), new_ws.as_path());
}

#[test]
fn guard_resolves_relative_paths_against_root() {
    let (_tmp, root) = setup_root();
    let guard = WorkspaceGuard::new(&root).unwrap();

    assert_eq!(guard.resolve("notes/today.md").unwrap(), root.join("notes/today.md"));
    assert!(is_out_of_bounds(guard.resolve("../../etc/passwd")));
    assert!(is_out_of_bounds(guard.resolve("/etc/passwd")));
}
