use assert_cmd::prelude::*;
use dualfork::{ResType, ResourceBuilder};
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn write_fork(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut b = ResourceBuilder::new();
    b.add_named(ResType::new(*b"snd "), 128, "Door", vec![7u8; 40]);
    b.add(ResType::new(*b"TEXT"), -3, b"hello".to_vec());
    fs::write(path, b.to_bytes()?)?;
    Ok(())
}

#[test]
fn test_cli_list_get_cycle() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let fork = dir.path().join("sounds.rsrc");
    write_fork(&fork)?;

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("list").arg(&fork);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Door").and(predicate::str::contains("2 resource(s)")));

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("list").arg("--json").arg(&fork);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"type\": \"TEXT\"").and(predicate::str::contains("\"id\": -3")));

    let out = dir.path().join("hello.txt");
    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("get").arg(&fork).arg("TEXT").arg("-3").arg("-o").arg(&out);
    cmd.assert().success().stdout(predicate::str::contains("wrote 5 bytes"));
    assert_eq!(fs::read(&out)?, b"hello");

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("get").arg(&fork).arg("TEXT").arg("4").arg("-o").arg(&out);
    cmd.assert().failure().stderr(predicate::str::contains("not present"));
    Ok(())
}

#[test]
fn test_cli_resolve_and_kind() -> Result<(), Box<dyn std::error::Error>> {
    let first = tempdir()?;
    let second = tempdir()?;
    fs::create_dir(second.path().join("maps"))?;
    fs::write(second.path().join("maps/level1.map"), b"")?;

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("resolve")
        .arg("maps/level1.map")
        .arg("--search-path")
        .arg(first.path())
        .arg("--search-path")
        .arg(second.path());
    cmd.assert().success().stdout(predicate::str::contains("maps/level1.map"));

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("resolve").arg("maps/level2.map").arg("--search-path").arg(first.path());
    cmd.assert().failure().stderr(predicate::str::contains("does not exist"));

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("kind").arg(second.path().join("maps/level1.map"));
    cmd.assert().success().stdout(predicate::str::contains("Map"));
    Ok(())
}

#[test]
fn test_cli_rejects_garbage() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let junk = dir.path().join("junk.bin");
    fs::write(&junk, b"this is not a resource fork at all")?;

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("list").arg(&junk);
    cmd.assert().failure().stderr(predicate::str::contains("invalid resource container"));

    let mut cmd = Command::cargo_bin("dualfork")?;
    cmd.arg("kind").arg(&junk);
    cmd.assert().success().stdout(predicate::str::contains("unknown"));
    Ok(())
}
