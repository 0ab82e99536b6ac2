use anyhow::Result;
use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A scratch project directory to run the keel binary in.
pub struct CliTestHelper {
    pub temp_dir: TempDir,
    pub project_root: PathBuf,
}

impl CliTestHelper {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let project_root = temp_dir.path().to_path_buf();
        Ok(Self {
            temp_dir,
            project_root,
        })
    }

    /// The binary, run from the project root with no database in the environment.
    pub fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("keel").expect("keel binary should be built");
        cmd.current_dir(&self.project_root)
            .env_remove("KEEL_DATABASE_URL")
            .env_remove("DATABASE_URL")
            .env_remove("RUST_LOG");
        cmd
    }

    pub fn write_config(&self, contents: &str) -> Result<()> {
        fs::write(self.project_root.join("keel.yaml"), contents)?;
        Ok(())
    }

    pub fn write_migration(&self, name: &str, contents: &str) -> Result<()> {
        let dir = self.project_root.join("migrations");
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(name), contents)?;
        Ok(())
    }
}
