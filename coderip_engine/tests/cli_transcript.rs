use std::fs;
use std::process::Command;

use anyhow::{ensure, Context, Result};
use tempfile::tempdir;

fn run_script(script: &str) -> Result<String> {
    let dir = tempdir()?;
    let path = dir.path().join("session.txt");
    fs::write(&path, script)?;

    let output = Command::new(env!("CARGO_BIN_EXE_coderip_engine"))
        .arg("--offline")
        .arg("--seed")
        .arg("7")
        .arg("--script")
        .arg(&path)
        .env_remove("RUST_LOG")
        .output()
        .context("running coderip_engine")?;
    ensure!(
        output.status.success(),
        "coderip_engine exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );
    Ok(String::from_utf8(output.stdout)?)
}

#[test]
fn offline_session_unlocks_and_patches() -> Result<()> {
    let stdout = run_script(
        "# stage one
look
click PasswordDoor 1211
inventory
inspect PasswordDoor
unlock PasswordDoor o****** yellow
say hello
apply Patch(\"Gyro\", \"onClick\", ```math.pi / 2```, ```math.pi```)
click Gyro
dance
quit
click Gyro
",
    )?;

    let expected = [
        "[coderip] PasswordDoor (PasswordDoor) at (860, 360)",
        "[coderip] Match_3 (Match) at (180, 620)",
        "[coderip] received 5 yellow key(s)",
        "[coderip] PasswordDoor: Correct password! You received 5 yellow keys.",
        "[coderip] yellow key x5",
        "  o****** [sealed]",
        "  o******** [sealed]",
        "[coderip] PasswordDoor.onClick unlocked with a yellow key",
        "[coderip] card for PasswordDoor updated",
        "  onClick [editable]",
        "[coderip] the agent is offline",
        "[coderip] patched Gyro.onClick",
        "[coderip] Gyro: The gyro turns 90 degrees.",
        "[coderip] unknown command 'dance' (try help)",
    ];
    for line in expected {
        assert!(stdout.contains(line), "missing {line:?} in:\n{stdout}");
    }
    assert_eq!(
        stdout.matches("The gyro turns").count(),
        1,
        "commands after quit must not run"
    );
    Ok(())
}

#[test]
fn malformed_directives_are_reported() -> Result<()> {
    let stdout = run_script(
        "apply Patch(\"Vault\")
apply nothing to see here
apply Patch(\"Letter\", \"onCollide\", ```other```, ```x```)
",
    )?;
    assert!(stdout.contains("[coderip] ignored malformed directive at byte 0"));
    assert!(stdout.contains("[coderip] no directive found"));
    assert!(stdout.contains("[coderip] patch to Letter.onCollide rejected: 'Letter.onCollide' is sealed"));
    Ok(())
}
