use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn pgsieve() -> Command {
    Command::cargo_bin("pgsieve").unwrap()
}

#[test]
fn version_is_reported() {
    pgsieve()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pgsieve"));
}

#[test]
fn a_config_file_is_required() {
    pgsieve().assert().failure();
}

#[test]
fn a_missing_config_file_is_a_controlled_error() {
    pgsieve()
        .arg("/nonexistent/rules.yaml")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("error loading config file"));
}

#[test]
fn invalid_yaml_is_a_controlled_error() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "db_objects: 3")?;
    pgsieve().arg(file.path()).assert().failure().code(1);
    Ok(())
}

#[test]
fn rule_validation_errors_are_reported_together() -> anyhow::Result<()> {
    let mut file = NamedTempFile::new()?;
    writeln!(
        file,
        "db_objects:\n\
         - name: users\n  names: [posts]\n\
         - name: t\n  action: explode"
    )?;
    pgsieve()
        .arg(file.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("both 'name' and 'names'"))
        .stderr(predicate::str::contains("bad 'action': 'explode'"));
    Ok(())
}

#[test]
fn a_dsn_is_required_with_a_valid_config() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "db_objects:\n- name: users").unwrap();
    pgsieve()
        .arg(file.path())
        .env_remove("DATABASE_URL")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("no database connection string"));
}
