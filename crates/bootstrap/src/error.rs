//! Bootstrap error type and its mapping onto process exit codes.

use crate::phase::Phase;
use crate::settings::SettingsError;

/// `EX_CONFIG` from sysexits.h.
pub const EXIT_CONFIG: i32 = 78;
/// `EX_SOFTWARE` from sysexits.h.
pub const EXIT_SOFTWARE: i32 = 70;
/// Shell convention for a command that could not be found.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Shell convention for a command that was found but could not run.
pub const EXIT_NOT_EXECUTABLE: i32 = 126;

/// Error type for the startup sequence.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("Configuration error: {0}")]
    Config(#[from] SettingsError),
    #[error("Migration command exited with status {code}")]
    MigrationExit { code: i32 },
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Failed to start {role} `{program}`: {source}")]
    Spawn {
        role: &'static str,
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Database has not been reached yet")]
    DatabaseNotReached,
    #[error("Invalid phase transition from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BootstrapError {
    /// Exit code the coordinator process terminates with for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            BootstrapError::Config(_) => EXIT_CONFIG,
            BootstrapError::MigrationExit { code } => *code,
            BootstrapError::Migration(_) | BootstrapError::Io(_) => 1,
            BootstrapError::Spawn { source, .. } => match source.kind() {
                std::io::ErrorKind::NotFound => EXIT_NOT_FOUND,
                _ => EXIT_NOT_EXECUTABLE,
            },
            BootstrapError::DatabaseNotReached | BootstrapError::InvalidTransition { .. } => {
                EXIT_SOFTWARE
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn migration_exit_code_is_propagated() {
        assert_eq!(BootstrapError::MigrationExit { code: 3 }.exit_code(), 3);
        assert_eq!(BootstrapError::Migration("checksum mismatch".into()).exit_code(), 1);
    }

    #[test]
    fn spawn_failures_follow_shell_conventions() {
        let missing = BootstrapError::Spawn {
            role: "server",
            program: "uvicorn".into(),
            source: Error::new(ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(missing.exit_code(), EXIT_NOT_FOUND);
        assert!(missing.to_string().contains("`uvicorn`"));

        let denied = BootstrapError::Spawn {
            role: "server",
            program: "./serve.sh".into(),
            source: Error::new(ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(denied.exit_code(), EXIT_NOT_EXECUTABLE);
    }

    #[test]
    fn config_errors_use_ex_config() {
        let err = BootstrapError::from(SettingsError::Missing("POSTGRES_DATABASE_URL"));
        assert_eq!(err.exit_code(), EXIT_CONFIG);
    }
}
