// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! sjest - module registry diagnostics
//!
//! Answers the questions a test author asks when a `require` misbehaves:
//! which file does this name load, is it mocked and why, and what does the
//! module map contain.

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_runtime::{Config, ModuleMap, NativeEnvironment, Runtime};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "sjest",
    about = "Module resolution and mock policy diagnostics",
    version,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Configuration file (JSON, or a package.json with a "jest" key)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the file a module name resolves to
    Resolve {
        /// The requiring file
        from: PathBuf,
        /// The module name as written in `require`
        name: String,
    },
    /// Explain whether a require is served a mock and why
    Explain {
        /// The requiring file
        from: PathBuf,
        /// The module name as written in `require`
        name: String,
    },
    /// List Haste modules, packages and manual mocks
    Modules,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "spacey_runtime=debug,spacey_mock=debug"
    } else {
        "spacey_runtime=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(load_config(cli.config.as_deref())?);
    let map = Arc::new(ModuleMap::crawl(&config).context("Failed to crawl project roots")?);

    match cli.command {
        Command::Resolve { from, name } => {
            let runtime = runtime(&config, &map)?;
            let from = absolute(&config, &from);
            let path = runtime.resolve_module(&from, &name)?;
            println!("{}", path.display());
        }
        Command::Explain { from, name } => {
            let runtime = runtime(&config, &map)?;
            let from = absolute(&config, &from);
            let identity = runtime.module_identity(&from, &name)?;
            let decision = runtime.explain(&from, &name)?;

            println!("{} {}", "module:".bold(), name.cyan());
            println!("{} {}", "identity:".bold(), identity);
            println!("{} {}", "automock:".bold(), runtime.automock());
            let verdict = if decision.mock {
                "mocked".yellow().to_string()
            } else {
                "real".green().to_string()
            };
            println!("{} {} ({})", "served:".bold(), verdict, decision.reason.dimmed());
            runtime.environment().dispose();
        }
        Command::Modules => print_module_map(&map),
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let cwd = std::env::current_dir()?;
    let package_json = cwd.join("package.json");
    if package_json.is_file() {
        return Config::from_file(&package_json)
            .with_context(|| format!("Failed to load config from {}", package_json.display()));
    }
    Ok(Config::new(cwd).normalize()?)
}

fn runtime(config: &Arc<Config>, map: &Arc<ModuleMap>) -> anyhow::Result<Runtime> {
    let environment = Arc::new(NativeEnvironment::new(config));
    Ok(Runtime::new(Arc::clone(config), environment, Arc::clone(map))?)
}

fn absolute(config: &Config, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        spacey_runtime::config::normalize_path(&config.root_dir.join(path))
    }
}

fn print_module_map(map: &ModuleMap) {
    let sections = [
        ("Haste modules", map.modules()),
        ("Haste packages", map.packages()),
        ("Manual mocks", map.mocks()),
    ];
    for (title, entries) in sections {
        println!("{} ({})", title.bold(), entries.len());
        for (name, path) in entries {
            println!("  {} {}", name.cyan(), path.display().dimmed());
        }
    }
}
