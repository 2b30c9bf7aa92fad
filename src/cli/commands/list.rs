//! `--list-checks`.

use crate::checks::CheckRegistry;
use crate::error::Result;
use crate::ui::UserInterface;

use super::{Command, CommandResult};

/// Prints the registered checks in execution order.
#[derive(Debug, Default)]
pub struct ListChecksCommand;

impl ListChecksCommand {
    pub fn new() -> Self {
        Self
    }

    /// One line per check: name, dependencies, declared features.
    pub fn lines(&self, registry: &CheckRegistry) -> Result<Vec<String>> {
        registry
            .execution_order()?
            .iter()
            .map(|name| {
                let check = registry.create(name)?;
                let mut line = name.clone();
                if !check.depends_on().is_empty() {
                    line.push_str(&format!(" (after {})", check.depends_on().join(", ")));
                }
                line.push_str(&format!(": {}", check.features_to_be_checked().join(", ")));
                Ok(line)
            })
            .collect()
    }
}

impl Command for ListChecksCommand {
    fn name(&self) -> &'static str {
        "list-checks"
    }

    fn execute(&self, _ui: &mut dyn UserInterface) -> Result<CommandResult> {
        for line in self.lines(&CheckRegistry::builtin())? {
            println!("{}", line);
        }
        Ok(CommandResult::success())
    }
}
