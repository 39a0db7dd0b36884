//! Session lifecycle states.

use std::fmt;

/// Where the session is in its hardware lifecycle.
///
/// The device handle is held only in `Opening`, `Previewing` and
/// `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// No camera held.
    #[default]
    Idle,
    /// Opening and configuring a device.
    Opening,
    /// Frames are streaming.
    Previewing,
    /// Tearing the preview down.
    Stopping,
    /// A fault could not be recovered; waiting for a command.
    Error,
}

impl SessionState {
    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Opening => "opening",
            SessionState::Previewing => "previewing",
            SessionState::Stopping => "stopping",
            SessionState::Error => "error",
        }
    }

    /// Stable numeric code for the state gauge.
    pub fn code(&self) -> u8 {
        match self {
            SessionState::Idle => 0,
            SessionState::Opening => 1,
            SessionState::Previewing => 2,
            SessionState::Stopping => 3,
            SessionState::Error => 4,
        }
    }

    /// Inverse of [`code`](Self::code); unknown codes map to `Idle`.
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => SessionState::Opening,
            2 => SessionState::Previewing,
            3 => SessionState::Stopping,
            4 => SessionState::Error,
            _ => SessionState::Idle,
        }
    }

    /// States in which a device handle may be held.
    #[inline]
    pub fn may_hold_device(&self) -> bool {
        matches!(
            self,
            SessionState::Opening | SessionState::Previewing | SessionState::Stopping
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for state in [
            SessionState::Idle,
            SessionState::Opening,
            SessionState::Previewing,
            SessionState::Stopping,
            SessionState::Error,
        ] {
            assert_eq!(SessionState::from_code(state.code()), state);
        }
    }

    #[test]
    fn test_device_holding_states() {
        assert!(!SessionState::Idle.may_hold_device());
        assert!(!SessionState::Error.may_hold_device());
        assert!(SessionState::Previewing.may_hold_device());
    }
}
