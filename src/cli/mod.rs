//! AZ-014: CLI subcommands: init, validate, synth, versions, schema.

use crate::constructs::build_stack;
use crate::core::context::{AzureCli, StackContext};
use crate::core::hasher::hash_string;
use crate::core::parser::{self, StackFile};
use crate::core::stack::Stack;
use crate::core::{state, versions};
use clap::{Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new stack project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Parse, validate and build stack.yaml without writing anything
    Validate {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,
    },

    /// Synthesize the configuration document
    Synth {
        /// Path to stack.yaml
        #[arg(short, long, default_value = "stack.yaml")]
        file: PathBuf,

        /// Output directory (document lands in stacks/<name>/cdk.tf.json)
        #[arg(long, default_value = state::DEFAULT_OUT_DIR)]
        out_dir: PathBuf,

        /// Write to this file instead of the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Document layout
        #[arg(long, value_enum, default_value_t = Format::Engine)]
        format: Format,

        /// Tenant id (overrides stack file and detection)
        #[arg(long)]
        tenant_id: Option<String>,

        /// Skip the Azure CLI identity lookup
        #[arg(long)]
        no_detect: bool,

        /// Fail if the existing document differs instead of writing
        #[arg(long)]
        check: bool,
    },

    /// Show supported API versions
    Versions {
        /// Limit to one resource type
        resource_type: Option<String>,
    },

    /// Print the stack file JSON Schema
    Schema,
}

/// Layout of the synthesized document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Flat document with resource and output blocks
    Document,
    /// Engine JSON grouped by block type
    Engine,
}

/// Options for `synth`.
#[derive(Debug)]
pub struct SynthOptions<'a> {
    pub file: &'a Path,
    pub out_dir: &'a Path,
    pub output: Option<&'a Path>,
    pub format: Format,
    pub tenant_id: Option<&'a str>,
    pub detect: bool,
    pub check: bool,
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Synth {
            file,
            out_dir,
            output,
            format,
            tenant_id,
            no_detect,
            check,
        } => cmd_synth(&SynthOptions {
            file: &file,
            out_dir: &out_dir,
            output: output.as_deref(),
            format,
            tenant_id: tenant_id.as_deref(),
            detect: !no_detect,
            check,
        }),
        Commands::Versions { resource_type } => cmd_versions(resource_type.as_deref()),
        Commands::Schema => cmd_schema(),
    }
}

const STARTER: &str = r#"version: "1.0"
name: my-stack

context:
  role_policy: strict

resource_groups:
  - id: core
    name: rg-my-stack
    location: eastus
    tags:
      managed-by: azcompose

networks:
  - id: hub
    resource_group: core
    address_space: ["10.0.0.0/16"]
    subnets:
      - name: default
        address_prefixes: ["10.0.0.0/24"]

storage_accounts:
  - id: data
    resource_group: core
    name: stmystack001
    containers:
      - name: assets
"#;

fn cmd_init(path: &Path) -> Result<(), String> {
    let stack_path = path.join("stack.yaml");
    if stack_path.exists() {
        return Err(format!("{} already exists", stack_path.display()));
    }
    std::fs::create_dir_all(path).map_err(|e| format!("cannot create {}: {}", path.display(), e))?;
    std::fs::write(&stack_path, STARTER)
        .map_err(|e| format!("cannot write {}: {}", stack_path.display(), e))?;

    println!("Initialized stack at {}", path.display());
    println!("  Created: {}", stack_path.display());
    Ok(())
}

/// Parse and validate a stack file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<StackFile, String> {
    let stack_file = parser::parse_stack_file(file)
        .map_err(|e| format!("{}: {}", file.display(), e))?;
    let errors = parser::validate_stack(&stack_file);
    if errors.is_empty() {
        return Ok(stack_file);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err(format!("{} validation error(s)", errors.len()))
}

/// Context precedence: flag, then stack file, then detection or placeholder.
fn resolve_context(file: &StackFile, tenant_id: Option<&str>, detect: bool) -> StackContext {
    let base = if detect && file.context.tenant_id.is_none() && tenant_id.is_none() {
        StackContext::detect(&AzureCli)
    } else {
        StackContext::placeholder()
    };
    let context = file.context.apply(base);
    let context = match tenant_id {
        Some(tenant) => context.with_tenant_id(tenant),
        None => context,
    };
    debug!(
        "tenant {:?}, subscription {:?}",
        context.tenant_source(),
        context.subscription_source()
    );
    context
}

fn build(file: &StackFile, context: StackContext) -> Result<Stack, String> {
    build_stack(file, context).map_err(|e| e.to_string())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let stack_file = parse_and_validate(file)?;
    let stack = build(&stack_file, resolve_context(&stack_file, None, false))?;
    stack.synthesize().map_err(|e| e.to_string())?;
    println!(
        "OK: {} ({} nodes, {} outputs)",
        stack.name(),
        stack.tree.node_count(),
        stack.outputs.len()
    );
    Ok(())
}

fn cmd_synth(opts: &SynthOptions<'_>) -> Result<(), String> {
    let stack_file = parse_and_validate(opts.file)?;
    let context = resolve_context(&stack_file, opts.tenant_id, opts.detect);
    let stack = build(&stack_file, context)?;
    let document = stack.synthesize().map_err(|e| e.to_string())?;
    let rendered = match opts.format {
        Format::Document => document.to_json(),
        Format::Engine => document.to_engine_json(),
    }
    .map_err(|e| e.to_string())?;

    let path = opts
        .output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| state::document_path(opts.out_dir, stack.name()));

    if opts.check {
        let existing = state::existing_fingerprint(&path).map_err(|e| e.to_string())?;
        return match existing {
            Some(fp) if fp == hash_string(&rendered) => {
                println!("Up to date: {}", path.display());
                Ok(())
            }
            Some(_) => Err(format!("{} is out of date", path.display())),
            None => Err(format!("{} does not exist", path.display())),
        };
    }

    state::save_document(&path, &rendered).map_err(|e| e.to_string())?;
    info!("wrote {}", path.display());
    println!(
        "Synthesized {}: {} resource(s), {} output(s)",
        document.stack,
        document.resources.len(),
        document.outputs.len()
    );
    println!("  Written: {}", path.display());
    Ok(())
}

fn cmd_versions(resource_type: Option<&str>) -> Result<(), String> {
    let types: Vec<&str> = match resource_type {
        Some(t) if versions::supported_versions(t).is_some() => vec![t],
        Some(t) => return Err(format!("unknown resource type '{}'", t)),
        None => versions::registered_types().collect(),
    };
    for t in types {
        let supported = versions::supported_versions(t).unwrap_or_default();
        println!("{}", t);
        for (i, v) in supported.iter().enumerate() {
            let marker = if i == 0 { " (latest)" } else { "" };
            println!("  {}{}", v, marker);
        }
    }
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = serde_json::to_string_pretty(&parser::stack_schema()).map_err(|e| e.to_string())?;
    println!("{}", schema);
    Ok(())
}
