use std::fmt;

use serde::Serialize;

/// Lifecycle of one stage run.
///
/// ```text
/// Pending -> Materializing -> Committing -> Committed
///                 |               |
///                 +-> Failed <----+
///                 |     |
///                 +-----+-> RolledBack
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Working schema not created yet.
    Pending,
    /// Working schema exists; tables are being written into it.
    Materializing,
    /// Swap in progress.
    Committing,
    Committed,
    Failed,
    RolledBack,
}

impl StageState {
    pub fn can_transition_to(self, next: StageState) -> bool {
        use StageState::*;
        matches!(
            (self, next),
            (Pending, Materializing)
                | (Pending, Failed)
                | (Materializing, Committing)
                | (Materializing, Failed)
                | (Materializing, RolledBack)
                | (Committing, Committed)
                | (Committing, Failed)
                | (Failed, RolledBack)
        )
    }

    /// No further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Committed | StageState::RolledBack)
    }

    pub fn name(self) -> &'static str {
        match self {
            StageState::Pending => "pending",
            StageState::Materializing => "materializing",
            StageState::Committing => "committing",
            StageState::Committed => "committed",
            StageState::Failed => "failed",
            StageState::RolledBack => "rolled back",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::StageState::*;
    use super::*;

    #[test]
    fn test_happy_path() {
        assert!(Pending.can_transition_to(Materializing));
        assert!(Materializing.can_transition_to(Committing));
        assert!(Committing.can_transition_to(Committed));
        assert!(Committed.is_terminal());
    }

    #[test]
    fn test_failure_paths() {
        assert!(Materializing.can_transition_to(Failed));
        assert!(Committing.can_transition_to(Failed));
        assert!(Failed.can_transition_to(RolledBack));
        assert!(Materializing.can_transition_to(RolledBack));
        assert!(!Failed.is_terminal());
    }

    #[test]
    fn test_rejected_transitions() {
        assert!(!Pending.can_transition_to(Committed));
        assert!(!Failed.can_transition_to(Committing));
        assert!(!Committed.can_transition_to(RolledBack));
        assert!(!RolledBack.can_transition_to(Materializing));
        assert!(!Materializing.can_transition_to(Materializing));
    }

    #[test]
    fn test_display() {
        assert_eq!(RolledBack.to_string(), "rolled back");
        assert_eq!(Materializing.to_string(), "materializing");
    }
}
