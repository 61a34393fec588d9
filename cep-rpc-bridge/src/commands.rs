use crate::events::CommandDescriptor;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub type CommandCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("No command registered with id {0}")]
    Unknown(i64),
    #[error("Command {name} failed: {source}")]
    Failed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandProperties {
    pub icon: Option<String>,
    pub description: Option<String>,
}

struct RegisteredCommand {
    name: String,
    properties: CommandProperties,
    callback: CommandCallback,
}

/// Local callbacks the panel can trigger by integer id.
///
/// Ids are handed out in registration order and never reused, so a stale id
/// coming back from the panel cannot reach a different command.
pub struct CommandRegistry {
    next_id: AtomicI64,
    commands: RwLock<IndexMap<i64, RegisteredCommand>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            commands: RwLock::new(IndexMap::new()),
        }
    }

    pub fn register<F>(
        &self,
        name: impl Into<String>,
        properties: CommandProperties,
        callback: F,
    ) -> i64
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = name.into();
        tracing::debug!(id, %name, "Registered command");
        self.commands.write().insert(
            id,
            RegisteredCommand {
                name,
                properties,
                callback: Arc::new(callback),
            },
        );
        id
    }

    pub fn unregister(&self, id: i64) -> bool {
        self.commands.write().shift_remove(&id).is_some()
    }

    pub fn name(&self, id: i64) -> Option<String> {
        self.commands.read().get(&id).map(|command| command.name.clone())
    }

    /// Menu entries in registration order.
    pub fn descriptors(&self) -> Vec<CommandDescriptor> {
        self.commands
            .read()
            .iter()
            .map(|(id, command)| CommandDescriptor {
                id: *id,
                display_name: command.name.clone(),
                icon_path: command.properties.icon.clone(),
                description: command.properties.description.clone(),
            })
            .collect()
    }

    /// Runs the command registered under `id`. The registry lock is not held
    /// while the callback runs, so callbacks may register further commands.
    pub fn invoke(&self, id: i64) -> Result<(), CommandError> {
        let (name, callback) = {
            let commands = self.commands.read();
            let command = commands.get(&id).ok_or(CommandError::Unknown(id))?;
            (command.name.clone(), command.callback.clone())
        };

        tracing::info!(id, %name, "Running command");
        callback().map_err(|source| CommandError::Failed { name, source })
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let commands = self.commands.read();
        f.debug_map()
            .entries(commands.iter().map(|(id, command)| (id, &command.name)))
            .finish()
    }
}
