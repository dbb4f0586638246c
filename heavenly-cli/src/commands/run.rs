//! Compile a script in a fresh session and drive its exported procedures.

use super::{linked_globals, read_script, session_options};
use crate::config::{yaml_to_host, Config};
use anyhow::{Context, Result};
use heavenly_machine::JsMachine;
use heavenly_membrane::{HostValue, Session};
use std::path::Path;

pub fn run_script(config_path: &Path, script: &Path) -> Result<()> {
    let config = Config::from_file_or_default(config_path).context("Failed to load configuration")?;
    let (path, source) = read_script(&config, script)?;
    let (names, values) = linked_globals(&config)?;
    let exports = config.all_exports();

    tracing::info!(script = %path.display(), links = names.len(), "Running script");
    let session = Session::with_options(JsMachine::new(), session_options(&config));
    let compiled = session
        .compile(&names, &values, &source, &exports)
        .with_context(|| format!("Failed to run {}", path.display()))?;
    print_logs(compiled.session().take_logs());

    for invocation in &config.invoke {
        let this = match &invocation.this {
            Some(literal) => yaml_to_host(literal)
                .with_context(|| format!("Invalid receiver for `{}`", invocation.procedure))?,
            None => HostValue::Undefined,
        };
        let args = invocation
            .args
            .iter()
            .map(yaml_to_host)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid arguments for `{}`", invocation.procedure))?;

        tracing::debug!(procedure = %invocation.procedure, argc = args.len(), "Invoking");
        compiled
            .call(&invocation.procedure, &this, &args)
            .with_context(|| format!("Procedure `{}` failed", invocation.procedure))?;
        print_logs(compiled.session().take_logs());
    }

    Ok(())
}

fn print_logs(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}
