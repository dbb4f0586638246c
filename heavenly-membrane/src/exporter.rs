//! Host -> sandbox procedure calls

use crate::codec::WireCodec;
use crate::codegen::{is_identifier, ProcedureCall};
use crate::error::{MembraneError, MembraneResult};
use crate::machine::Machine;
use crate::store::{ARG_FUNCTION_PREFIX, ARG_OBJECT_PREFIX, LOCAL_PREFIX};
use crate::value::HostValue;
use heavenly_wire::Path;
use parking_lot::Mutex;
use std::sync::Arc;

/// Turns host arguments into a [`ProcedureCall`] the machine can execute
pub struct ProcedureExporter {
    codec: WireCodec,
    this_key: String,
}

impl ProcedureExporter {
    pub fn new(codec: WireCodec, this_key: impl Into<String>) -> Self {
        Self {
            codec,
            this_key: this_key.into(),
        }
    }

    pub fn this_key(&self) -> &str {
        &self.this_key
    }

    /// Register the receiver and arguments, then describe the call
    ///
    /// Objects land under fresh `_argobj<N>` keys and functions under
    /// `_argfun<N>`; primitives travel inline. Each argument gets its own
    /// `_arg<K>` local on the machine side.
    pub fn prepare(
        &self,
        procedure: &str,
        this: &HostValue,
        args: &[HostValue],
    ) -> MembraneResult<ProcedureCall> {
        if !is_identifier(procedure) {
            return Err(MembraneError::InvalidIdentifier(procedure.to_string()));
        }

        let store = self.codec.store();
        store.write_raw(&Path::root_key(self.this_key.clone()), this.clone())?;

        let mut call = ProcedureCall::new(procedure);
        for arg in args {
            let wire = match arg {
                HostValue::Object(_) => {
                    let path = store.mint(ARG_OBJECT_PREFIX, arg.clone())?;
                    self.codec.encode(arg, &path)
                }
                HostValue::Function(_) => {
                    let path = store.mint(ARG_FUNCTION_PREFIX, arg.clone())?;
                    self.codec.encode(arg, &path)
                }
                primitive => self.codec.encode(primitive, &Path::default()),
            };
            call = call.bind(store.next_synthetic(LOCAL_PREFIX), wire);
        }

        tracing::debug!(procedure, argc = args.len(), "Prepared procedure call");
        Ok(call)
    }
}

/// Host-callable handle to a procedure defined inside the machine
///
/// The procedure's return value is not carried back; `call` only reports
/// whether the turn completed.
pub struct ExportedProcedure<M> {
    name: String,
    exporter: Arc<ProcedureExporter>,
    machine: Arc<Mutex<M>>,
}

impl<M: Machine> ExportedProcedure<M> {
    pub fn new(name: impl Into<String>, exporter: Arc<ProcedureExporter>, machine: Arc<Mutex<M>>) -> Self {
        Self {
            name: name.into(),
            exporter,
            machine,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the procedure with `this` and `args`
    ///
    /// Fails with [`MembraneError::Reentrant`] when the machine is already in
    /// the middle of a turn, e.g. when a host function called from the
    /// sandbox tries to call back in. Nothing is registered in that case.
    pub fn call(&self, this: &HostValue, args: &[HostValue]) -> MembraneResult<()> {
        let mut machine = self
            .machine
            .try_lock()
            .ok_or_else(|| MembraneError::Reentrant {
                procedure: self.name.clone(),
            })?;

        let call = self.exporter.prepare(&self.name, this, args)?;
        let _span = tracing::debug_span!("procedure", name = %self.name).entered();
        machine.call_procedure(&call)
    }
}

impl<M> Clone for ExportedProcedure<M> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            exporter: Arc::clone(&self.exporter),
            machine: Arc::clone(&self.machine),
        }
    }
}

impl<M> std::fmt::Debug for ExportedProcedure<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportedProcedure")
            .field("name", &self.name)
            .finish()
    }
}
