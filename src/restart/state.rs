//! Restart lifecycle state

use std::fmt;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RestartState {
    /// No initialize call yet
    Uninitialized,
    /// Initialized, waiting for the first boot to complete
    Initializing,
    /// Watching for changes
    Monitoring,
    /// A change batch is queued for the worker
    RestartPending,
    /// A restart attempt is running
    Restarting,
    /// Restart was switched off; terminal
    Disabled,
    /// First boot completed without monitoring; terminal
    Finished,
}

impl RestartState {
    /// Whether no further restarts can ever happen
    pub fn is_terminal(self) -> bool {
        matches!(self, RestartState::Disabled | RestartState::Finished)
    }

    /// Whether a transition from `self` to `next` is legal
    pub fn can_transition_to(self, next: RestartState) -> bool {
        use RestartState::*;

        if next == Disabled {
            return self != Disabled;
        }

        match (self, next) {
            (Uninitialized, Initializing) => true,
            (Initializing, Monitoring) | (Initializing, Finished) => true,
            (Monitoring, RestartPending) => true,
            (RestartPending, Restarting) => true,
            (Restarting, RestartPending) | (Restarting, Monitoring) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RestartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestartState::Uninitialized => "uninitialized",
            RestartState::Initializing => "initializing",
            RestartState::Monitoring => "monitoring",
            RestartState::RestartPending => "restart-pending",
            RestartState::Restarting => "restarting",
            RestartState::Disabled => "disabled",
            RestartState::Finished => "finished",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::RestartState::*;
    use super::*;

    const ALL: [RestartState; 7] = [
        Uninitialized,
        Initializing,
        Monitoring,
        RestartPending,
        Restarting,
        Disabled,
        Finished,
    ];

    #[test]
    fn test_terminal_states() {
        assert!(Disabled.is_terminal());
        assert!(Finished.is_terminal());
        assert!(!Monitoring.is_terminal());
    }

    #[test]
    fn test_any_state_can_be_disabled() {
        for state in ALL {
            assert_eq!(state.can_transition_to(Disabled), state != Disabled);
        }
    }

    #[test]
    fn test_restart_cycle() {
        assert!(Monitoring.can_transition_to(RestartPending));
        assert!(RestartPending.can_transition_to(Restarting));
        assert!(Restarting.can_transition_to(Monitoring));
        assert!(Restarting.can_transition_to(RestartPending));
    }

    #[test]
    fn test_no_way_back() {
        assert!(!Monitoring.can_transition_to(Initializing));
        assert!(!Finished.can_transition_to(Monitoring));
        assert!(!Disabled.can_transition_to(Initializing));
        assert!(!Initializing.can_transition_to(Uninitialized));
    }
}
