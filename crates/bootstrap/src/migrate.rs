//! Migration trigger: advance the schema to head exactly once.

use crate::command::{exit_code_of, CommandLine};
use crate::error::BootstrapError;
use async_trait::async_trait;
use poi_registry_db::DbPool;
use std::path::PathBuf;
use tracing::{error, info};

/// A single synchronous schema migration run.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Short description for logs.
    fn describe(&self) -> String;

    async fn run(&self) -> Result<(), BootstrapError>;
}

/// Runs an external migration tool, e.g. `alembic upgrade head`.
pub struct CommandMigration {
    command: CommandLine,
}

impl CommandMigration {
    pub fn new(command: CommandLine) -> Self {
        Self { command }
    }
}

#[async_trait]
impl MigrationStep for CommandMigration {
    fn describe(&self) -> String {
        format!("command `{}`", self.command)
    }

    async fn run(&self) -> Result<(), BootstrapError> {
        let status = self
            .command
            .to_command()
            .status()
            .await
            .map_err(|source| BootstrapError::Spawn {
                role: "migration",
                program: self.command.program.clone(),
                source,
            })?;

        if status.success() {
            return Ok(());
        }

        // A tool killed by a signal has no exit code of its own.
        let code = status.code().unwrap_or(1);
        error!(command = %self.command, code, raw = exit_code_of(status), "Migration command failed");
        Err(BootstrapError::MigrationExit { code })
    }
}

/// Where the built-in migrator reads its SQL files from.
#[derive(Debug, Clone)]
pub enum MigrationSource {
    /// The schema compiled into the service.
    Embedded,
    Directory(PathBuf),
}

/// Applies SQL migrations with the built-in migrator. Versions already
/// recorded in the database are skipped, so repeated runs are harmless.
pub struct SqlxMigration {
    database_url: String,
    source: MigrationSource,
}

impl SqlxMigration {
    pub fn new(database_url: impl Into<String>, source: MigrationSource) -> Self {
        Self {
            database_url: database_url.into(),
            source,
        }
    }
}

#[async_trait]
impl MigrationStep for SqlxMigration {
    fn describe(&self) -> String {
        match &self.source {
            MigrationSource::Embedded => "embedded schema".to_string(),
            MigrationSource::Directory(dir) => format!("migrations in {}", dir.display()),
        }
    }

    async fn run(&self) -> Result<(), BootstrapError> {
        let db = DbPool::connect(&self.database_url)
            .await
            .map_err(|e| BootstrapError::Migration(format!("{e:#}")))?;

        let result = match &self.source {
            MigrationSource::Embedded => db.migrate().await,
            MigrationSource::Directory(dir) => db.migrate_from(dir).await,
        };
        // The server opens its own connections.
        db.close().await;

        result.map_err(|e| BootstrapError::Migration(format!("{e:#}")))
    }
}

/// Stage that does nothing, for `--skip-migrations`.
pub struct SkipMigration;

#[async_trait]
impl MigrationStep for SkipMigration {
    fn describe(&self) -> String {
        "skipped".to_string()
    }

    async fn run(&self) -> Result<(), BootstrapError> {
        info!("Skipping migrations");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandMigration {
        CommandMigration::new(CommandLine::from_words(["sh", "-c", script]).unwrap())
    }

    #[tokio::test]
    async fn successful_command_passes() {
        sh("exit 0").run().await.unwrap();
    }

    #[tokio::test]
    async fn failing_command_reports_its_exit_code() {
        let err = sh("exit 3").run().await.unwrap_err();
        assert!(matches!(err, BootstrapError::MigrationExit { code: 3 }));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn missing_tool_is_a_spawn_error() {
        let migration = CommandMigration::new(
            CommandLine::parse("definitely-not-a-migration-tool upgrade head").unwrap(),
        );
        let err = migration.run().await.unwrap_err();
        assert!(matches!(err, BootstrapError::Spawn { role: "migration", .. }));
        assert_eq!(err.exit_code(), crate::error::EXIT_NOT_FOUND);
    }
}
