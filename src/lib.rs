//! azcompose: composition units for Azure resources over a construct tree.
//!
//! Units declare resource nodes whose attributes may reference each other
//! before any value is known. Synthesis resolves every reference in one pass
//! and emits a deterministic document for the provisioning engine.

pub mod cli;
pub mod constructs;
pub mod core;
