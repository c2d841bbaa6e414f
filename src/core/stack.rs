//! Stack: a construct tree plus the outputs it exports.

use super::context::StackContext;
use super::error::ComposeResult;
use super::outputs::OutputRegistry;
use super::synth::{synthesize, Document};
use super::tree::ConstructTree;
use super::types::NodeId;

/// Unit of synthesis. Each stack owns its tree and output registry.
#[derive(Debug, Clone)]
pub struct Stack {
    pub tree: ConstructTree,
    pub outputs: OutputRegistry,
}

impl Stack {
    pub fn new(name: &str, context: StackContext) -> ComposeResult<Self> {
        Ok(Self {
            tree: ConstructTree::new(name, context)?,
            outputs: OutputRegistry::new(),
        })
    }

    pub fn root(&self) -> NodeId {
        self.tree.root()
    }

    pub fn name(&self) -> &str {
        self.tree.stack_name()
    }

    pub fn context(&self) -> &StackContext {
        self.tree.context()
    }

    /// Resolve every token and emit the document.
    pub fn synthesize(&self) -> ComposeResult<Document> {
        synthesize(&self.tree, &self.outputs)
    }
}
