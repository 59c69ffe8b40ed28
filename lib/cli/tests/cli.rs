use assert_cmd::Command;
use predicates::prelude::*;

const FILEMAP_VERSION: &str = env!("CARGO_PKG_VERSION");

fn filemap() -> Command {
    let mut cmd = Command::cargo_bin("filemap").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("FILEMAP_CONFIG");
    cmd
}

#[test]
fn short_version_string() {
    let version_number = format!("filemap {FILEMAP_VERSION}");
    for flag in ["--version", "-V"] {
        filemap()
            .arg(flag)
            .assert()
            .success()
            .stdout(predicate::str::contains(&version_number));
    }
}

#[test]
fn verbose_version_names_the_library() {
    filemap()
        .args(["-V", "-v"])
        .assert()
        .success()
        .stdout(predicate::str::contains("library: filemap"));
}

#[test]
fn ls_lists_entries() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.txt"), b"x").unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    filemap()
        .arg("ls")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("file.txt"))
        .stdout(predicate::str::contains("sub"));

    filemap()
        .args(["ls", "--stat"])
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?m)^directory\s+.*/sub$").unwrap())
        .stdout(predicate::str::is_match(r"(?m)^regular\s+.*/file\.txt$").unwrap());
}

#[test]
fn ls_of_missing_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    filemap()
        .arg("ls")
        .arg(dir.path().join("missing"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to list"));
}

#[test]
fn lines_are_numbered() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("text");
    std::fs::write(&path, b"one\ntwo\nthree").unwrap();

    filemap()
        .arg("lines")
        .arg(&path)
        .assert()
        .success()
        .stdout("     1  one\n     2  two\n     3  three\n");

    filemap()
        .args(["lines", "--count"])
        .arg(&path)
        .assert()
        .success()
        .stdout("3\n");
}

#[test]
fn cp_copies_and_limit_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("src");
    std::fs::write(&src, vec![42u8; 1 << 20]).unwrap();

    let dst = dir.path().join("dst");
    filemap().arg("cp").arg(&src).arg(&dst).assert().success();
    assert_eq!(std::fs::read(&dst).unwrap(), std::fs::read(&src).unwrap());

    let config = dir.path().join("filemap.toml");
    std::fs::write(&config, "[copy]\nchunk_size = 4096\n").unwrap();
    let aborted = dir.path().join("aborted");
    filemap()
        .arg("--config")
        .arg(&config)
        .args(["cp", "--limit", "8192"])
        .arg(&src)
        .arg(&aborted)
        .assert()
        .failure()
        .stderr(predicate::str::contains("aborted"));
    assert!(!aborted.exists());
}

#[test]
fn bad_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("filemap.toml");
    std::fs::write(&config, "[copy]\nchunk_size = 0\n").unwrap();

    filemap()
        .arg("--config")
        .arg(&config)
        .arg("stat")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("chunk_size"));
}

#[test]
fn stat_reports_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sized");
    std::fs::write(&path, b"12345").unwrap();

    filemap()
        .arg("stat")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"(?m)^size\s+5$").unwrap());
}
