use crate::helpers::cli::CliTestHelper;
use anyhow::Result;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() -> Result<()> {
    let helper = CliTestHelper::new()?;
    helper
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("repair"))
        .stdout(predicate::str::contains("baseline"))
        .stdout(predicate::str::contains("clean"));
    Ok(())
}

#[test]
fn test_migrate_help_shows_options() -> Result<()> {
    let helper = CliTestHelper::new()?;
    helper
        .command()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--target"))
        .stdout(predicate::str::contains("--out-of-order"))
        .stdout(predicate::str::contains("--placeholder"))
        .stdout(predicate::str::contains("--format"));
    Ok(())
}

#[test]
fn test_unknown_format_is_rejected() -> Result<()> {
    let helper = CliTestHelper::new()?;
    helper
        .command()
        .args(["info", "--format", "xml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("xml"));
    Ok(())
}
