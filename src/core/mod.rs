//! Core composition logic: construct tree, reference resolution and synthesis.

pub mod context;
pub mod error;
pub mod fanout;
pub mod hasher;
pub mod outputs;
pub mod parser;
pub mod resolver;
pub mod stack;
pub mod state;
pub mod synth;
pub mod tree;
pub mod types;
pub mod versions;
