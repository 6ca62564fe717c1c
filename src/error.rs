//! Typed errors for rejected engine commands

use thiserror::Error;

use crate::hotkeys::ChordParseError;

/// Errors returned to callers configuring the engine.
///
/// Transient OS failures are not represented here; those are logged
/// where they happen and treated as a missed observation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("unknown auto focus mode '{0}'")]
    InvalidMode(String),

    #[error(transparent)]
    InvalidShortcut(#[from] ChordParseError),

    #[error("shortcut '{0}' is reserved for the forced-focus maneuver")]
    ReservedShortcut(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_mode_message_names_the_mode() {
        let error = EngineError::InvalidMode("TURBO".to_string());
        assert_eq!(error.to_string(), "unknown auto focus mode 'TURBO'");
    }

    #[test]
    fn test_parse_error_converts() {
        let parse = ChordParseError::UnknownKey("F99".to_string());
        let error = EngineError::from(parse.clone());
        assert_eq!(error, EngineError::InvalidShortcut(parse));
    }
}
