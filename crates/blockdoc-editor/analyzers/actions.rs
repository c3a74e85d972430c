//! Editor actions offered by analyzers for their spans
//!
//! An action is a named command with an importance. Applying it routes the
//! command through the command supervisor, so it lands in history like any
//! other edit.

use crate::commands::{CommandResult, EditorCommand};
use crate::core::Result;
use crate::supervisor::CommandSupervisor;

/// How prominently an action should be offered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum ActionImportance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A command an analyzer suggests for one of its spans
#[derive(Debug)]
pub struct EditorAction {
    name: String,
    importance: ActionImportance,
    resource_key: String,
    command: Box<dyn EditorCommand>,
}

impl EditorAction {
    /// Create an action with normal importance
    pub fn new(
        name: impl Into<String>,
        resource_key: impl Into<String>,
        command: Box<dyn EditorCommand>,
    ) -> Self {
        Self {
            name: name.into(),
            importance: ActionImportance::Normal,
            resource_key: resource_key.into(),
            command,
        }
    }

    /// Set the importance
    #[must_use]
    pub fn with_importance(mut self, importance: ActionImportance) -> Self {
        self.importance = importance;
        self
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn importance(&self) -> ActionImportance {
        self.importance
    }

    /// Stable identifier for icons, shortcuts or localization
    pub fn resource_key(&self) -> &str {
        &self.resource_key
    }

    /// Command the action would execute
    pub fn command(&self) -> &dyn EditorCommand {
        self.command.as_ref()
    }

    /// Execute the action through the supervisor
    pub fn apply(self, supervisor: &CommandSupervisor) -> Result<CommandResult> {
        supervisor.execute_boxed(self.command)
    }
}

/// Order actions by importance, highest first, keeping offer order among equals
pub(crate) fn sort_by_importance(actions: &mut [EditorAction]) {
    actions.sort_by(|a, b| b.importance.cmp(&a.importance));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SetTextCommand;
    use crate::core::BlockKey;

    fn action(name: &str, importance: ActionImportance) -> EditorAction {
        EditorAction::new(
            name,
            "test.action",
            Box::new(SetTextCommand::new(BlockKey::from_raw(1), name)),
        )
        .with_importance(importance)
    }

    #[test]
    fn sorting_is_stable_and_descending() {
        let mut actions = vec![
            action("low", ActionImportance::Low),
            action("first-normal", ActionImportance::Normal),
            action("critical", ActionImportance::Critical),
            action("second-normal", ActionImportance::Normal),
        ];
        sort_by_importance(&mut actions);
        let names: Vec<_> = actions.iter().map(EditorAction::name).collect();
        assert_eq!(names, ["critical", "first-normal", "second-normal", "low"]);
    }

    #[test]
    fn accessors() {
        let action = action("fix", ActionImportance::High);
        assert_eq!(action.resource_key(), "test.action");
        assert_eq!(action.importance(), ActionImportance::High);
        assert_eq!(action.command().description(), "Set text");
    }
}
