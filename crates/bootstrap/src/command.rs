//! External command lines and their exit statuses.

use std::fmt;
use std::process::ExitStatus;
use tokio::process::Command;

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Build from pre-split words; `None` when there is no program.
    pub fn from_words<I, S>(words: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut words = words.into_iter().map(Into::into);
        let program = words.next().filter(|p| !p.is_empty())?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    /// Split a command string on whitespace, e.g. `"alembic upgrade head"`.
    /// No quoting rules apply.
    pub fn parse(line: &str) -> Option<Self> {
        Self::from_words(line.split_whitespace())
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit code for a finished child. A child killed by a signal reports
/// `128 + signal` on Unix, the shell convention.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_on_whitespace() {
        let cmd = CommandLine::parse("  alembic   upgrade head ").unwrap();
        assert_eq!(cmd.program, "alembic");
        assert_eq!(cmd.args, vec!["upgrade", "head"]);
        assert_eq!(cmd.to_string(), "alembic upgrade head");
    }

    #[test]
    fn empty_command_has_no_program() {
        assert!(CommandLine::parse("   ").is_none());
        assert!(CommandLine::from_words(Vec::<String>::new()).is_none());
        assert!(CommandLine::from_words([""]).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn signal_deaths_map_to_shell_codes() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code_of(ExitStatus::from_raw(0)), 0);
        // Wait status encoding: exit code in the high byte, signal in the low bits.
        assert_eq!(exit_code_of(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code_of(ExitStatus::from_raw(15)), 143);
    }
}
