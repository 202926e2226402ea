// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Hookbus CLI
//!
//! Inspect a plugin directory, build the event map, and fire events against
//! the built-in plugins.

mod plugins;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use hookbus_core::{scan, Dispatcher, DispatcherConfig, EventArgs, PLUGIN_EXTENSION};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hookbus")]
#[command(about = "Hookbus - event dispatcher with plugin discovery", long_about = None)]
struct Cli {
    /// Verbose mode
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List plugin files under a directory
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// Plugin file extension
        #[arg(long, default_value = PLUGIN_EXTENSION)]
        extension: String,
    },

    /// Load or rebuild the event map and print it
    Map {
        /// Config file with an [event] table
        #[arg(short, long, default_value = "hookbus.toml")]
        config: PathBuf,
    },

    /// Trigger an event and print each handler's result
    Trigger {
        /// Event name
        event: String,

        /// Event arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Config file with an [event] table
        #[arg(short, long, default_value = "hookbus.toml")]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "hookbus=debug,hookbus_core=debug"
    } else {
        "hookbus=info,hookbus_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let output = match cli.command {
        Commands::Scan { dir, extension } => scan_command(&dir, &extension)?,
        Commands::Map { config } => map_command(&config)?,
        Commands::Trigger {
            event,
            args,
            config,
        } => trigger_command(&config, &event, args.as_deref())?,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn scan_command(dir: &Path, extension: &str) -> Result<Value> {
    let plugins = scan(dir, extension)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;
    tracing::info!(dir = ?dir, plugins = plugins.len(), "Scan complete");
    Ok(serde_json::to_value(plugins)?)
}

fn map_command(config_path: &Path) -> Result<Value> {
    let dispatcher = open_dispatcher(config_path)?;
    Ok(json!({
        "source": dispatcher.map_source(),
        "events": dispatcher.event_map(),
    }))
}

fn trigger_command(config_path: &Path, event: &str, args: Option<&str>) -> Result<Value> {
    let args = parse_args(args)?;
    let dispatcher = open_dispatcher(config_path)?;
    let results = dispatcher
        .trigger_with(event, args)
        .with_context(|| format!("Trigger of '{event}' failed"))?;
    Ok(Value::Array(results))
}

/// Relative paths in the config are taken from the config file's directory.
fn open_dispatcher(config_path: &Path) -> Result<Dispatcher> {
    let base = match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let config = DispatcherConfig::load(config_path)
        .with_context(|| format!("Failed to read config {}", config_path.display()))?
        .resolve_paths(&base);

    Dispatcher::new(config, Arc::new(plugins::builtin_catalog()))
        .context("Failed to initialize dispatcher")
}

fn parse_args(raw: Option<&str>) -> Result<EventArgs> {
    let Some(raw) = raw else {
        return Ok(EventArgs::new());
    };
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    match EventArgs::from_value(value) {
        Some(args) => Ok(args),
        None => bail!("--args must be a JSON object"),
    }
}
