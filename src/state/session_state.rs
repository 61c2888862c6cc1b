/// Session slot state definitions
///
/// Every slot in the session pool is in exactly one of these states.
use std::fmt;

/// Lifecycle state of a session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Free to be acquired (may or may not be connected yet)
    Idle,

    /// Held by exactly one worker
    Busy,

    /// Permanently revoked; never handed out again
    Banned,
}

impl SessionState {
    /// Returns true if the slot can be handed to a worker
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if no transition can leave this state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Banned)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Banned => "banned",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_idle_is_available() {
        assert!(SessionState::Idle.is_available());
        assert!(!SessionState::Busy.is_available());
        assert!(!SessionState::Banned.is_available());
    }

    #[test]
    fn test_banned_is_terminal() {
        assert!(SessionState::Banned.is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Busy.is_terminal());
    }
}
