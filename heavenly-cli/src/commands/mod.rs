//! CLI command implementations.

pub mod emit;
pub mod run;

pub use emit::emit_preamble;
pub use run::run_script;

use crate::config::Config;
use anyhow::{Context, Result};
use heavenly_membrane::{HostValue, SessionOptions};
use std::path::{Path, PathBuf};

/// Globals a session links: libraries first, then configured literals
pub(crate) fn linked_globals(config: &Config) -> Result<(Vec<String>, Vec<HostValue>)> {
    let mut names = Vec::new();
    let mut values = Vec::new();

    for library in &config.library {
        names.push(library.name().to_string());
        values.push(library.value());
    }
    for (name, value) in config.link_values()? {
        if names.contains(&name) {
            anyhow::bail!("`{}` is linked twice", name);
        }
        names.push(name);
        values.push(value);
    }

    Ok((names, values))
}

pub(crate) fn session_options(config: &Config) -> SessionOptions {
    match &config.this_key {
        Some(key) => SessionOptions::new().with_this_key(key.clone()),
        None => SessionOptions::new(),
    }
}

/// Read a script named on the command line, relative to the config file
pub(crate) fn read_script(config: &Config, script: &Path) -> Result<(PathBuf, String)> {
    let path = config.resolve_path(script);
    let source = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    Ok((path, source))
}
