//! Button actions backed by external programs

use anyhow::{bail, Context, Result};
use button_actions::{ActionHandler, ButtonAction};
use std::collections::HashMap;
use std::process::Stdio;
use tracing::{debug, info};

/// Spawns the program configured for each action without waiting for it
#[derive(Debug, Clone, Default)]
pub struct CommandActionHandler {
    commands: HashMap<ButtonAction, Vec<String>>,
}

impl CommandActionHandler {
    /// Handler running `commands[action]` for each action
    pub fn new(commands: HashMap<ButtonAction, Vec<String>>) -> Self {
        Self { commands }
    }
}

impl ActionHandler for CommandActionHandler {
    fn perform(&mut self, action: ButtonAction) -> Result<()> {
        let Some(argv) = self.commands.get(&action) else {
            info!("No command configured for {}", action);
            return Ok(());
        };
        let Some((program, args)) = argv.split_first() else {
            bail!("empty command configured for {}", action);
        };

        // tokio reaps the child once it exits
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {} for {}", program, action))?;

        debug!(pid = child.id(), "Spawned {} for {}", program, action);
        Ok(())
    }
}
