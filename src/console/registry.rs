//! # Command Registry
//!
//! Commands are registered once at startup into a fixed number of command sets.
//! Descriptors live in a single arena and are addressed by [`CommandId`]; command
//! sets only keep ids. Registration is fallible and the caller is expected to abort
//! startup on any error, so a registry that exists is always complete.
//!
//! Names are unique per set and matched exactly. Dotted prefixes such as `s.` only
//! matter to help routing, never to dispatch.

use super::dispatcher::Invocation;
use super::error::{CommandResult, RegistryError};
use super::help::{HelpProvider, HelpTopic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandSetId(pub u8);

impl CommandSetId {
    pub const AUTHENTICATED: CommandSetId = CommandSetId(0);
    pub const UNAUTHENTICATED: CommandSetId = CommandSetId(1);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandId(pub u16);

/// Largest registry a [`CommandId`] can address.
pub const MAX_COMMANDS: usize = u16::MAX as usize + 1;

pub type Handler = fn(&mut Invocation<'_>) -> CommandResult;
/// Receives the raw line when nothing in the active set matched.
pub type DefaultHandler = fn(&mut Invocation<'_>, &str) -> CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryLimits {
    pub command_sets: u8,
    /// Total across all sets.
    pub max_commands: usize,
    pub max_name_len: usize,
}

impl Default for RegistryLimits {
    fn default() -> Self {
        RegistryLimits {
            command_sets: 2,
            max_commands: 48,
            max_name_len: 8,
        }
    }
}

pub struct CommandDescriptor {
    pub name: String,
    pub set: CommandSetId,
    pub handler: Handler,
}

#[derive(Default)]
struct CommandSet {
    commands: Vec<CommandId>,
    default_handler: Option<DefaultHandler>,
}

pub struct CommandRegistry {
    limits: RegistryLimits,
    arena: Vec<CommandDescriptor>,
    sets: Vec<CommandSet>,
    help: Vec<HelpTopic>,
}

impl CommandRegistry {
    pub fn new(limits: RegistryLimits) -> Self {
        CommandRegistry {
            limits,
            arena: Vec::with_capacity(limits.max_commands.min(MAX_COMMANDS)),
            sets: (0..limits.command_sets).map(|_| CommandSet::default()).collect(),
            help: Vec::new(),
        }
    }

    pub fn limits(&self) -> RegistryLimits {
        self.limits
    }

    fn set(&self, id: CommandSetId) -> Result<&CommandSet, RegistryError> {
        self.sets
            .get(id.0 as usize)
            .ok_or(RegistryError::UnknownCommandSet(id.0))
    }

    pub fn register(
        &mut self,
        set: CommandSetId,
        name: &str,
        handler: Handler,
    ) -> Result<CommandId, RegistryError> {
        let existing = self.set(set)?;
        if name.is_empty() || name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if name.len() > self.limits.max_name_len {
            return Err(RegistryError::NameTooLong {
                name: name.to_string(),
                max: self.limits.max_name_len,
            });
        }
        if existing
            .commands
            .iter()
            .any(|id| self.arena[id.0 as usize].name == name)
        {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        if self.arena.len() >= self.limits.max_commands {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.limits.max_commands,
            });
        }

        let id = u16::try_from(self.arena.len())
            .map(CommandId)
            .map_err(|_| RegistryError::CapacityExceeded {
                capacity: self.arena.len(),
            })?;
        self.arena.push(CommandDescriptor {
            name: name.to_string(),
            set,
            handler,
        });
        self.sets[set.0 as usize].commands.push(id);
        Ok(id)
    }

    pub fn set_default_handler(
        &mut self,
        set: CommandSetId,
        handler: DefaultHandler,
    ) -> Result<(), RegistryError> {
        self.set(set)?;
        self.sets[set.0 as usize].default_handler = Some(handler);
        Ok(())
    }

    pub fn lookup(&self, set: CommandSetId, name: &str) -> Option<&CommandDescriptor> {
        self.set(set)
            .ok()?
            .commands
            .iter()
            .map(|id| &self.arena[id.0 as usize])
            .find(|d| d.name == name)
    }

    pub fn descriptor(&self, id: CommandId) -> Option<&CommandDescriptor> {
        self.arena.get(id.0 as usize)
    }

    pub fn default_handler_for(&self, set: CommandSetId) -> Option<DefaultHandler> {
        self.set(set).ok()?.default_handler
    }

    /// Command names of `set` in registration order.
    pub fn names(&self, set: CommandSetId) -> Vec<&str> {
        self.set(set)
            .map(|s| {
                s.commands
                    .iter()
                    .map(|id| self.arena[id.0 as usize].name.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Append a help block; blocks render in insertion order.
    pub fn add_help_topic(&mut self, topic: HelpTopic) {
        self.help.push(topic);
    }
}

impl HelpProvider for CommandRegistry {
    fn help_topics(&self) -> &[HelpTopic] {
        &self.help
    }
}
