use crate::settings::StoreError;
use thiserror::Error;

/// Failure of a single command. Rendered to the issuing session, never fatal.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command \"{0}\" - type \"help\" for a list of commands")]
    NoMatch(String),

    #[error("missing {0}")]
    MissingArgument(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("authentication failed -- {reason}")]
    AuthenticationFailure { reason: String },

    #[error("settings not saved: {0}")]
    Persistence(#[from] StoreError),

    #[error("{0}")]
    Failed(String),
}

/// Startup-time registration failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command registry full ({capacity} commands)")]
    CapacityExceeded { capacity: usize },

    #[error("command \"{0}\" already registered in this command set")]
    DuplicateName(String),

    #[error("command name \"{name}\" exceeds {max} characters")]
    NameTooLong { name: String, max: usize },

    #[error("invalid command name {0:?}")]
    InvalidName(String),

    #[error("unknown command set {0}")]
    UnknownCommandSet(u8),
}

/// Text written back to the session on success.
pub type CommandResult = Result<String, CommandError>;
