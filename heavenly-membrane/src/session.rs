//! Bridge sessions and compile-time linking
//!
//! A [`Session`] ties one [`PathStore`] to one machine. Every synthetic key,
//! linked global and logged line belongs to exactly one session; nothing is
//! shared between sessions and nothing is reclaimed before the session is
//! dropped.

use crate::codec::WireCodec;
use crate::codegen::{is_identifier, SourceEmitter};
use crate::error::{MembraneError, MembraneResult};
use crate::exporter::{ExportedProcedure, ProcedureExporter};
use crate::interface::{InterfaceEnumerator, PrototypeChainEnumerator};
use crate::machine::Machine;
use crate::store::{PathStore, GLOBAL_PREFIX, THIS_KEY};
use crate::surface::Surface;
use crate::value::HostValue;
use heavenly_wire::{Path, WireValue};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Knobs for a new session
#[derive(Clone)]
pub struct SessionOptions {
    /// Root key receiving the `this` of exported procedure calls
    pub this_key: String,
    /// Strategy listing the keys the machine may probe on a reference
    pub enumerator: Arc<dyn InterfaceEnumerator>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            this_key: THIS_KEY.to_string(),
            enumerator: Arc::new(PrototypeChainEnumerator),
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_this_key(mut self, key: impl Into<String>) -> Self {
        self.this_key = key.into();
        self
    }

    pub fn with_enumerator(mut self, enumerator: Arc<dyn InterfaceEnumerator>) -> Self {
        self.enumerator = enumerator;
        self
    }
}

/// One host <-> machine bridge
pub struct Session<M> {
    codec: WireCodec,
    surface: Arc<Surface>,
    exporter: Arc<ProcedureExporter>,
    machine: Arc<Mutex<M>>,
}

impl<M: Machine> Session<M> {
    pub fn new(machine: M) -> Self {
        Self::with_options(machine, SessionOptions::default())
    }

    /// Open a session and install the bridge natives into `machine`
    pub fn with_options(mut machine: M, options: SessionOptions) -> Self {
        let store = Arc::new(PathStore::new());
        let codec = WireCodec::with_enumerator(store, options.enumerator);
        let surface = Arc::new(Surface::new(codec.clone()));
        surface.install(&mut machine);

        let exporter = Arc::new(ProcedureExporter::new(codec.clone(), options.this_key));
        tracing::debug!("Opened membrane session");

        Self {
            codec,
            surface,
            exporter,
            machine: Arc::new(Mutex::new(machine)),
        }
    }

    pub fn store(&self) -> &Arc<PathStore> {
        self.codec.store()
    }

    pub fn codec(&self) -> &WireCodec {
        &self.codec
    }

    pub fn surface(&self) -> &Arc<Surface> {
        &self.surface
    }

    /// Drain the lines the machine passed to `log`
    pub fn take_logs(&self) -> Vec<String> {
        self.surface.take_logs()
    }

    /// Borrow the machine outside of a turn
    pub fn with_machine<R>(&self, f: impl FnOnce(&mut M) -> R) -> MembraneResult<R> {
        let mut machine = self.machine.try_lock().ok_or_else(|| MembraneError::Reentrant {
            procedure: "<session>".to_string(),
        })?;
        Ok(f(&mut machine))
    }

    /// Register `value` as the global `name` and return its wire form
    ///
    /// The value is stored under `_global_<name>` at the root.
    pub fn link(&self, name: &str, value: HostValue) -> MembraneResult<WireValue> {
        if !is_identifier(name) {
            return Err(MembraneError::InvalidIdentifier(name.to_string()));
        }
        let path = Path::root_key(format!("{}{}", GLOBAL_PREFIX, name));
        let wire = self.codec.encode(&value, &path);
        self.store().write_raw(&path, value)?;
        tracing::debug!(name, kind = wire.type_name(), "Linked global");
        Ok(wire)
    }

    /// Link every `(name, value)` pair and render the statements binding them
    pub fn link_preamble<S: AsRef<str>>(
        &self,
        names: &[S],
        values: &[HostValue],
    ) -> MembraneResult<String> {
        if names.len() != values.len() {
            return Err(MembraneError::LinkMismatch {
                names: names.len(),
                values: values.len(),
            });
        }

        let mut emitter = SourceEmitter::new();
        for (name, value) in names.iter().zip(values) {
            let name = name.as_ref();
            let wire = self.link(name, value.clone())?;
            emitter.bind(name, &wire)?;
        }
        Ok(emitter.finish())
    }

    /// Append `source` to the program and run it to completion
    pub fn run_source(&self, source: &str) -> MembraneResult<()> {
        let mut machine = self.machine.try_lock().ok_or_else(|| MembraneError::Reentrant {
            procedure: "<program>".to_string(),
        })?;
        machine.append_source(source)?;
        machine.run()
    }

    /// Host-callable handle for the sandbox procedure `name`
    pub fn export(&self, name: &str) -> MembraneResult<ExportedProcedure<M>> {
        if !is_identifier(name) {
            return Err(MembraneError::InvalidIdentifier(name.to_string()));
        }
        Ok(ExportedProcedure::new(
            name,
            Arc::clone(&self.exporter),
            Arc::clone(&self.machine),
        ))
    }

    /// Link globals, run `program` once and export the named procedures
    pub fn compile<S: AsRef<str>, E: AsRef<str>>(
        self,
        names: &[S],
        values: &[HostValue],
        program: &str,
        exports: &[E],
    ) -> MembraneResult<Compiled<M>> {
        let preamble = self.link_preamble(names, values)?;
        let mut source = preamble;
        source.push_str(program);
        if !source.ends_with('\n') {
            source.push('\n');
        }

        let _span = tracing::info_span!("compile", links = names.len()).entered();
        self.run_source(&source)?;

        let mut procedures = IndexMap::new();
        for name in exports {
            let procedure = self.export(name.as_ref())?;
            procedures.insert(name.as_ref().to_string(), procedure);
        }

        Ok(Compiled {
            session: self,
            procedures,
        })
    }
}

/// A program that has been linked and run, plus its exported procedures
pub struct Compiled<M> {
    session: Session<M>,
    procedures: IndexMap<String, ExportedProcedure<M>>,
}

impl<M: Machine> Compiled<M> {
    pub fn session(&self) -> &Session<M> {
        &self.session
    }

    pub fn procedures(&self) -> &IndexMap<String, ExportedProcedure<M>> {
        &self.procedures
    }

    pub fn procedure(&self, name: &str) -> Option<&ExportedProcedure<M>> {
        self.procedures.get(name)
    }

    /// Call an exported procedure by name
    pub fn call(&self, name: &str, this: &HostValue, args: &[HostValue]) -> MembraneResult<()> {
        match self.procedures.get(name) {
            Some(procedure) => procedure.call(this, args),
            None => Err(MembraneError::Path {
                path: Path::root_key(name),
                key: name.to_string(),
            }),
        }
    }

    pub fn into_session(self) -> Session<M> {
        self.session
    }
}

/// Open a default session on `machine` and compile `program` in it
pub fn compile<M: Machine, S: AsRef<str>, E: AsRef<str>>(
    machine: M,
    names: &[S],
    values: &[HostValue],
    program: &str,
    exports: &[E],
) -> MembraneResult<Compiled<M>> {
    compile_with(machine, SessionOptions::default(), names, values, program, exports)
}

/// Like [`compile`], with explicit session options
pub fn compile_with<M: Machine, S: AsRef<str>, E: AsRef<str>>(
    machine: M,
    options: SessionOptions,
    names: &[S],
    values: &[HostValue],
    program: &str,
    exports: &[E],
) -> MembraneResult<Compiled<M>> {
    Session::with_options(machine, options).compile(names, values, program, exports)
}
