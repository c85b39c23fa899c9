use assert_cmd::prelude::*;
use color_eyre::Result;
use std::io::Write;
use std::process::{Command, Output};

fn ironfly(args: &[&str]) -> Result<Output> {
    let mut cmd = Command::cargo_bin("ironfly")?;
    cmd.env_remove("IRONFLY_CONFIG").args(args);
    Ok(cmd.output()?)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_states_prints_transition_table() -> Result<()> {
    let output = ironfly(&["states"])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("available       --deploy  --> deploying"));
    assert!(out.contains("clean-wait      --abort   --> clean-failed"));
    Ok(())
}

#[test]
fn test_states_from_one_state() -> Result<()> {
    let output = ironfly(&["states", "--from", "deploying"])?;
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("target: active"));
    assert!(out.contains("wait     -> wait-callback"));

    let output = ironfly(&["states", "--from", "levitating"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("levitating"));
    Ok(())
}

#[test]
fn test_check_accepts_legal_request() -> Result<()> {
    let output = ironfly(&["check", "--state", "available", "--verb", "active", "--configdrive"])?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("accepted: active (deploy)"));
    Ok(())
}

#[test]
fn test_check_rejections_exit_nonzero() -> Result<()> {
    let cases: &[(&[&str], &str)] = &[
        (&["--state", "available", "--verb", "provide"], "can not be performed"),
        (&["--state", "available", "--verb", "provide", "--reserved-by", "conductor-2"], "locked by host conductor-2"),
        (&["--state", "available", "--verb", "active", "--maintenance"], "maintenance mode"),
        (&["--state", "active", "--verb", "rebuild", "--configdrive"], "config drive"),
        (&["--state", "clean-wait", "--verb", "abort", "--api-minor", "12"], "Not acceptable"),
    ];
    for (args, expected) in cases {
        let mut full = vec!["check"];
        full.extend_from_slice(args);
        let output = ironfly(&full)?;
        assert_eq!(output.status.code(), Some(1), "args: {:?}", args);
        let out = stdout(&output);
        assert!(out.starts_with("rejected:"), "args: {:?}, stdout: {}", args, out);
        assert!(out.contains(expected), "args: {:?}, stdout: {}", args, out);
    }
    Ok(())
}

#[test]
fn test_config_from_file_and_env() -> Result<()> {
    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "conductor:\n  host: conductor-42\ndhcp:\n  dhcp_provider: none")?;
    let path = file.path().to_string_lossy().to_string();

    let output = ironfly(&["config", "--config", &path])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("host: conductor-42"));
    assert!(out.contains("dhcp_provider: none"));
    assert!(out.contains("bootfile_name: pxelinux.0"));

    let output = Command::cargo_bin("ironfly")?
        .env("IRONFLY_CONFIG", &path)
        .arg("config")
        .output()?;
    assert!(output.status.success());
    assert!(stdout(&output).contains("host: conductor-42"));
    Ok(())
}

#[test]
fn test_config_missing_file_fails() -> Result<()> {
    let output = ironfly(&["config", "--config", "/nonexistent/ironfly.yaml"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load configuration"));
    Ok(())
}

#[test]
fn test_demo_walkthrough() -> Result<()> {
    let output = ironfly(&["demo"])?;
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    let steps: Vec<&str> = out
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .collect();
    assert!(steps.starts_with(&["enrolled", "manage", "provide"]));
    assert!(out.contains("2 provisioning port(s) attached"));
    assert!(out.lines().any(|l| l.starts_with("deploy") && l.contains("active") && l.contains("power on")));
    let last = out.lines().last().unwrap_or_default();
    assert!(last.starts_with("tear down"));
    assert!(last.contains("available"));
    Ok(())
}
