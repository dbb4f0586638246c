//! Print the linking preamble for a script without running it.

use super::{linked_globals, read_script, session_options};
use crate::config::Config;
use anyhow::{Context, Result};
use heavenly_machine::JsMachine;
use heavenly_membrane::Session;
use std::path::Path;

pub fn emit_preamble(config_path: &Path, script: &Path) -> Result<()> {
    let config = Config::from_file_or_default(config_path).context("Failed to load configuration")?;
    let (path, _source) = read_script(&config, script)?;
    let (names, values) = linked_globals(&config)?;

    let session = Session::with_options(JsMachine::new(), session_options(&config));
    let preamble = session
        .link_preamble(&names, &values)
        .context("Failed to link globals")?;

    tracing::debug!(script = %path.display(), links = names.len(), "Emitting preamble");
    print!("{}", preamble);
    Ok(())
}
