//! Coordinator phases.

use crate::error::BootstrapError;
use std::fmt;

/// Where the coordinator is in the startup sequence. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    WaitingForDb,
    Migrating,
    Serving,
}

impl Phase {
    /// Numeric value exported through the phase gauge.
    pub fn ordinal(self) -> i64 {
        match self {
            Phase::WaitingForDb => 0,
            Phase::Migrating => 1,
            Phase::Serving => 2,
        }
    }

    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::WaitingForDb => Some(Phase::Migrating),
            Phase::Migrating => Some(Phase::Serving),
            Phase::Serving => None,
        }
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(self, to: Phase) -> Result<Phase, BootstrapError> {
        if self.next() == Some(to) {
            Ok(to)
        } else {
            Err(BootstrapError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::WaitingForDb => "WAITING_FOR_DB",
            Phase::Migrating => "MIGRATING",
            Phase::Serving => "SERVING",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_linearly() {
        let phase = Phase::WaitingForDb.advance(Phase::Migrating).unwrap();
        let phase = phase.advance(Phase::Serving).unwrap();
        assert_eq!(phase, Phase::Serving);
        assert_eq!(phase.next(), None);
    }

    #[test]
    fn skipping_or_reversing_is_rejected() {
        assert!(matches!(
            Phase::WaitingForDb.advance(Phase::Serving),
            Err(BootstrapError::InvalidTransition { .. })
        ));
        assert!(Phase::Serving.advance(Phase::Migrating).is_err());
        assert!(Phase::Migrating.advance(Phase::Migrating).is_err());
    }

    #[test]
    fn display_uses_state_names() {
        assert_eq!(Phase::WaitingForDb.to_string(), "WAITING_FOR_DB");
        assert_eq!(Phase::Serving.ordinal(), 2);
    }
}
