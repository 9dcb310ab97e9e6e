//! Builtin tool implementations for toolbus
//!
//! The default local tool set served by the fallback caller (and handy for
//! standing up demo servers): arithmetic, text manipulation, small
//! utilities, and a knowledge-base search tool over an injected
//! [`SearchProvider`].

pub mod knowledge;
pub mod math;
pub mod text;
pub mod util;

mod args;

pub use knowledge::{Passage, SearchKnowledgeTool, SearchProvider};
pub use math::{AddTool, DivideTool, MultiplyTool, PowerTool, SubtractTool};
pub use text::{CountWordsTool, EchoTool, LowercaseTool, ReverseTextTool, UppercaseTool};
pub use util::{CurrentTimeTool, FormatJsonTool, GenerateUuidTool};

use std::sync::Arc;
use toolbus_core::{Tool, ToolRegistry};

/// All builtin tools that need no external collaborator
pub fn default_tools() -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(AddTool),
        Arc::new(SubtractTool),
        Arc::new(MultiplyTool),
        Arc::new(DivideTool),
        Arc::new(PowerTool),
        Arc::new(EchoTool),
        Arc::new(UppercaseTool),
        Arc::new(LowercaseTool),
        Arc::new(ReverseTextTool),
        Arc::new(CountWordsTool),
        Arc::new(CurrentTimeTool),
        Arc::new(GenerateUuidTool),
        Arc::new(FormatJsonTool),
    ]
}

/// A registry pre-populated with [`default_tools`]
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_all(default_tools());
    registry
}
