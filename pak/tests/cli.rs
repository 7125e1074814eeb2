use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use pak_format::{Compression, PakWriter};
use tempfile::TempDir;

fn pak(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pak"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn sample_archive(dir: &Path) -> PathBuf {
    let path = dir.join("sample.pak");
    let mut writer = PakWriter::create(&path).unwrap();
    writer
        .add("Game/Maps/level.umap", b"level data", Compression::Stored)
        .unwrap();
    writer
        .add("Engine/base.ini", &b"[core]\n".repeat(40), Compression::Zlib)
        .unwrap();
    writer.finish().unwrap();
    path
}

#[test]
fn test_list_shows_entries_in_order() {
    let temp_dir = TempDir::new().unwrap();
    let archive = sample_archive(temp_dir.path());

    let out = pak(&["list", archive.to_str().unwrap()]);
    assert!(out.status.success());
    let stdout = String::from_utf8(out.stdout).unwrap();
    let maps = stdout.find("Game/Maps/level.umap").unwrap();
    let ini = stdout.find("Engine/base.ini").unwrap();
    assert!(maps < ini);
}

#[test]
fn test_extract_with_prefix() {
    let temp_dir = TempDir::new().unwrap();
    let archive = sample_archive(temp_dir.path());
    let out_dir = temp_dir.path().join("out");

    let out = pak(&[
        "extract",
        archive.to_str().unwrap(),
        "-o",
        out_dir.to_str().unwrap(),
        "--prefix",
        "Engine",
        "-q",
    ]);
    assert!(out.status.success());
    assert_eq!(
        std::fs::read(out_dir.join("Engine").join("base.ini")).unwrap(),
        b"[core]\n".repeat(40)
    );
    assert!(!out_dir.join("Game").exists());
}

#[test]
fn test_extract_existing_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let archive = sample_archive(temp_dir.path());
    let out_dir = temp_dir.path().join("out");
    std::fs::create_dir_all(out_dir.join("Engine")).unwrap();
    std::fs::write(out_dir.join("Engine").join("base.ini"), b"mine").unwrap();

    let args = [
        "extract",
        archive.to_str().unwrap(),
        "-o",
        out_dir.to_str().unwrap(),
        "-q",
    ];
    let out = pak(&args);
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(!String::from_utf8_lossy(&out.stderr).contains("base.ini"));
    assert_eq!(
        std::fs::read(out_dir.join("Engine").join("base.ini")).unwrap(),
        b"mine"
    );

    let loud = pak(&args[..4]);
    assert!(!loud.status.success());
    assert!(String::from_utf8_lossy(&loud.stderr).contains("Engine/base.ini"));

    let mut forced = args.to_vec();
    forced.push("--overwrite");
    assert!(pak(&forced).status.success());
}

#[test]
fn test_validate_and_info() {
    let temp_dir = TempDir::new().unwrap();
    let archive = sample_archive(temp_dir.path());

    let out = pak(&["validate", archive.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout)
        .unwrap()
        .contains("Validated 2 files"));

    let out = pak(&["validate", "-j", "1", "-q", archive.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let out = pak(&["info", archive.to_str().unwrap(), "Engine/base.ini"]);
    assert!(out.status.success());
    assert!(String::from_utf8(out.stdout).unwrap().contains("zlib"));
}

#[test]
fn test_not_a_pak() {
    let temp_dir = TempDir::new().unwrap();
    let bogus = temp_dir.path().join("bogus.pak");
    std::fs::write(&bogus, b"definitely not an archive, just some bytes in a file").unwrap();

    let out = pak(&["info", bogus.to_str().unwrap()]);
    assert!(!out.status.success());
}
