//! # Console
//!
//! Line-oriented command console shared by the local (serial) interface and the
//! network (telnet) interface.
//!
//! - [`args`] - tokenizer over the rest of a command line
//! - [`registry`] - command sets, descriptors and help topics
//! - [`dispatcher`] - line assembly and one-handler-per-line dispatch
//! - [`session`] - one console bound to one transport
//! - [`pool`] - fixed slots for network sessions
//! - [`commands`] - the `s.*`, `c.*`, `help` and `quit` handlers
//! - [`server`] - the polling loop tying it together

pub mod args;
pub mod auth;
pub mod commands;
pub mod dispatcher;
pub mod error;
pub mod help;
pub mod pool;
pub mod registry;
pub mod server;
pub mod session;

pub use args::{ArgMatch, Args};
pub use commands::build_registry;
pub use dispatcher::{Console, ConsoleState, DispatchOutcome, Invocation, Line};
pub use error::{CommandError, CommandResult, RegistryError};
pub use help::{HelpProvider, HelpTopic};
pub use pool::{Admission, SessionPool, REFUSAL_MESSAGE};
pub use registry::{CommandId, CommandRegistry, CommandSetId, RegistryLimits};
pub use server::{ConsoleServer, StatusReport};
pub use session::{Session, SessionKind, SessionState};
