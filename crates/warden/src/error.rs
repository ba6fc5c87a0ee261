//! Application-level errors and their process exit codes.

use plugin_system::PluginSystemError;
use thiserror::Error;
use warden_parser::ParserError;
use warden_rcon::RconError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Log source could not be opened: {0}")]
    LogSource(#[source] ParserError),
    #[error("RCON client could not be constructed: {0}")]
    Rcon(#[from] RconError),
    #[error("Plugin storage could not be constructed: {0}")]
    Storage(#[source] PluginSystemError),
    #[error("Plugin loading failed: {0}")]
    Plugins(#[source] PluginSystemError),
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl AppError {
    /// Process exit status for this error.
    ///
    /// | Code | Condition |
    /// |---|---|
    /// | 1 | configuration or runtime error |
    /// | 2 | mandatory plugin missing or failed |
    /// | 3 | RCON client could not be constructed |
    /// | 4 | log source could not be opened |
    /// | 5 | storage could not be constructed |
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Config(_) | AppError::Runtime(_) => 1,
            AppError::Plugins(
                PluginSystemError::MandatoryPluginMissing(_)
                | PluginSystemError::MandatoryPluginFailed { .. },
            ) => 2,
            AppError::Plugins(_) => 1,
            AppError::Rcon(_) => 3,
            AppError::LogSource(_) => 4,
            AppError::Storage(_) => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(AppError::Config("bad".into()).exit_code(), 1);
        assert_eq!(AppError::Runtime("boom".into()).exit_code(), 1);
        assert_eq!(
            AppError::Plugins(PluginSystemError::MandatoryPluginMissing("admin".into())).exit_code(),
            2
        );
        assert_eq!(
            AppError::Plugins(PluginSystemError::MandatoryPluginFailed {
                name: "admin".into(),
                reason: "startup".into(),
            })
            .exit_code(),
            2
        );
        assert_eq!(
            AppError::Plugins(PluginSystemError::Refused("twice".into())).exit_code(),
            1
        );
        assert_eq!(AppError::Rcon(RconError::Setup("no route".into())).exit_code(), 3);
        assert_eq!(
            AppError::LogSource(ParserError::UnsupportedGame("x".into())).exit_code(),
            4
        );
        assert_eq!(
            AppError::Storage(PluginSystemError::UnsupportedStorage("redis".into())).exit_code(),
            5
        );
    }
}
