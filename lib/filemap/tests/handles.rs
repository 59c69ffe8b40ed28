use std::fs::OpenOptions;
use std::io::Write;

use filemap::{FileError, FileHandle, FileId, FileRegistry, PopulateRule};
use pretty_assertions::assert_eq;
use serial_test::serial;

fn write_file(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    path
}

#[test]
fn shared_opens_are_linked() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "shared", b"0123456789");
    let registry = FileRegistry::new();

    let a = registry.open(&path, true).unwrap();
    let b = registry.open(&path, true).unwrap();
    assert!(a.same_handle(&b));
    assert!(a.is_shared());
    assert_eq!(a.ref_count(), 2);
    assert_eq!(a.id(), b.id());
    assert_eq!(a.size(), b.size());
    assert_eq!(a.mtime(), b.mtime());
    assert!(matches!(a.id(), FileId::Real { .. }));

    drop(a);
    let map = b.map_all(PopulateRule::Random).unwrap();
    assert_eq!(&*map, b"0123456789");
    drop(map);
    drop(b);
    assert!(registry.is_empty());
}

#[test]
fn unshared_opens_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "unshared", b"abc");
    let registry = FileRegistry::new();

    let a = registry.open(&path, false).unwrap();
    let b = registry.open(&path, false).unwrap();
    assert!(!a.same_handle(&b));
    assert!(!a.is_shared());
    assert_eq!(a.id(), b.id());
    assert!(registry.is_empty());

    let map = b.map_all(PopulateRule::Sequential).unwrap();
    a.close();
    assert_eq!(&*map, b"abc");
}

#[test]
fn shared_and_unshared_do_not_mix() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "mixed", b"abc");
    let registry = FileRegistry::new();

    let shared = registry.open(&path, true).unwrap();
    let unshared = registry.open(&path, false).unwrap();
    assert!(!shared.same_handle(&unshared));
    assert_eq!(shared.ref_count(), 1);
}

#[test]
fn filename_is_the_sanitized_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "name", b"");
    let registry = FileRegistry::new();

    let indirect = dir.path().join(".").join("name");
    let handle = registry.open(&indirect, true).unwrap();
    assert_eq!(handle.filename().as_str(), path.to_str().unwrap());
}

#[test]
fn closing_one_owner_keeps_regions_alive() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "owners", b"line one\nline two\n");
    let registry = FileRegistry::new();

    let first = registry.open(&path, true).unwrap();
    let second = first.duplicate();
    let map = first.map_all(PopulateRule::WillNeed).unwrap();

    second.close();
    assert_eq!(first.ref_count(), 1);
    assert_eq!(first.region_count(), 1);
    assert_eq!(map.lines().count(), 2);
    assert_eq!(&map[..8], b"line one");
}

#[test]
fn stale_shared_handles_are_detached() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "stale", b"short");
    let registry = FileRegistry::new();

    let old = registry.open(&path, true).unwrap();
    let old_map = old.map_all(PopulateRule::Random).unwrap();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b" and longer").unwrap();
    drop(file);

    let fresh = registry.open(&path, true).unwrap();
    assert!(!fresh.same_handle(&old));
    assert_eq!(fresh.size(), 16);
    assert_eq!(old.size(), 5);
    assert_eq!(&*old_map, b"short");

    // The detached handle must not take the fresh entry with it.
    drop(old_map);
    drop(old);
    let again = registry.open(&path, true).unwrap();
    assert!(again.same_handle(&fresh));
    assert_eq!(registry.len(), 1);
}

#[test]
fn refresh_reports_changes_without_remapping() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "refresh", b"1234");
    let registry = FileRegistry::new();

    let handle = registry.open(&path, false).unwrap();
    let map = handle.map_all(PopulateRule::Random).unwrap();
    assert_eq!(handle.refresh(), Ok(false));

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"5678").unwrap();
    drop(file);

    assert_eq!(handle.refresh(), Ok(true));
    assert_eq!(handle.size(), 8);
    assert_eq!(map.len(), 4);
    assert_eq!(&*map, b"1234");
    assert_eq!(handle.refresh(), Ok(false));

    let whole = handle.map_all(PopulateRule::Random).unwrap();
    assert_eq!(&*whole, b"12345678");
}

#[test]
fn open_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::new();
    assert_eq!(
        registry.open(dir.path().join("missing"), true).err(),
        Some(FileError::NotFound)
    );
    assert_eq!(registry.open("", false).err(), Some(FileError::InvalidArgument));
}

#[test]
fn virtual_handles_behave_like_files() {
    let handle = FileHandle::virtualize_copy(Some("mem.txt"), b"a\nbb\n");
    assert_eq!(handle.size(), 5);
    assert!(matches!(handle.id(), FileId::Virtual(_)));

    let map = handle.map_range(PopulateRule::Sequential, 2, 3).unwrap();
    assert_eq!(&*map, b"bb\n");
    assert_eq!(
        handle.map_range(PopulateRule::Random, 2, 4).err(),
        Some(FileError::OutOfRange)
    );

    let mut lines = handle.map_lines().unwrap();
    let first = lines.advance().unwrap();
    assert_eq!((first.index(), first.as_bytes()), (1, &b"a"[..]));
    let second = lines.advance().unwrap();
    assert_eq!((second.index(), second.as_bytes()), (2, &b"bb"[..]));
    assert!(lines.advance().is_none());
}

#[test]
#[serial]
fn global_registry_deduplicates() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "global", b"global");

    let a = filemap::open(&path, true).unwrap();
    let b = FileRegistry::global().open(&path, true).unwrap();
    assert!(a.same_handle(&b));
}

#[test]
fn handles_cross_threads() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(&dir, "threads", &[7u8; 4096]);
    let registry = FileRegistry::new();
    let handle = registry.open(&path, true).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let own = registry.open(&path, true).unwrap();
                assert!(own.same_handle(&handle));
                let map = own.map_all(PopulateRule::Populate).unwrap();
                assert!(map.iter().all(|&b| b == 7));
            });
        }
    });
    assert_eq!(handle.ref_count(), 1);
    assert_eq!(handle.region_count(), 0);
}
