//! Plugin composition for the editor layer.
//!
//! A plugin is a unit of editor functionality - a set of component and
//! singleton definitions, systems, and adapters installed together.
//! Plugins are applied in registration order against the
//! [`EditorBuilder`](crate::EditorBuilder) before the world is frozen, so
//! a later plugin can rely on the definitions of an earlier one.

use weft_ecs::error::EcsError;

use crate::EditorBuilder;

/// A composable unit of editor functionality.
pub trait Plugin {
    /// The plugin's name, for diagnostics.
    fn name(&self) -> &str;

    /// Install this plugin's definitions, systems and adapters.
    fn build(&self, editor: &mut EditorBuilder) -> Result<(), EcsError>;
}
