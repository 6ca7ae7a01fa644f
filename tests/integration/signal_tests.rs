#![cfg(unix)]
//! Termination of the real binary while a mutation is in flight.

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::Path,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use tempfile::tempdir;

const ORIGINAL: &str = "alias ll='ls -la'\n";

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn has_scratch(dir: &Path) -> bool {
    dir_entries(dir)
        .iter()
        .any(|name| name.starts_with(".aliases.") && name.ends_with(".tmp"))
}

#[test]
fn sigterm_during_validation_leaves_only_the_original_file() -> shdefs::Result<()> {
    let store = tempdir()?;
    let tools = tempdir()?;

    // Stands in for the shell; keeps the candidate under validation.
    let slow_shell = tools.path().join("slow-sh");
    fs::write(&slow_shell, "#!/bin/sh\nsleep 5\n")?;
    fs::set_permissions(&slow_shell, fs::Permissions::from_mode(0o755))?;

    let target = store.path().join("aliases");
    fs::write(&target, ORIGINAL)?;

    let mut child = Command::new(env!("CARGO_BIN_EXE_shdefs"))
        .arg("--dir")
        .arg(store.path())
        .args(["--oracle", "shell", "--shell"])
        .arg(&slow_shell)
        .args(["add", "alias", "la", "ls -A"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + Duration::from_secs(10);
    while !has_scratch(store.path()) {
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("no scratch file appeared: {:?}", dir_entries(store.path()));
        }
        thread::sleep(Duration::from_millis(10));
    }

    let pid = i32::try_from(child.id()).expect("pid fits in i32");
    assert_eq!(unsafe { libc::kill(pid, libc::SIGTERM) }, 0);
    let status = child.wait()?;

    assert_eq!(status.code(), Some(130));
    assert_eq!(dir_entries(store.path()), vec!["aliases"]);
    assert_eq!(fs::read_to_string(&target)?, ORIGINAL);
    Ok(())
}
