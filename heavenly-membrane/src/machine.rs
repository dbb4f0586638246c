//! The sandboxed interpreter, as seen from the host
//!
//! The membrane needs very little from the machine: a way to expose named
//! natives that take and return strings, a way to extend the persistent
//! program, and a way to run pending statements to completion.

use crate::codegen::ProcedureCall;
use crate::error::MembraneResult;
use std::sync::Arc;

/// Native reading a value by path
pub const GET_NATIVE: &str = "getFromHeaven";
/// Native writing a value by path
pub const SEND_NATIVE: &str = "sendToHeaven";
/// Native calling a host function by path
pub const PRAY_NATIVE: &str = "prayToHeaven";
/// Diagnostic sink
pub const LOG_NATIVE: &str = "log";

/// Host function callable from the machine
///
/// Arguments and the optional result are strings; the membrane natives carry
/// JSON in them. Errors returned here must surface from [`Machine::run`]
/// unchanged.
pub type NativeFn = Arc<dyn Fn(&[String]) -> MembraneResult<Option<String>> + Send + Sync>;

/// Capabilities the membrane requires from a sandboxed interpreter
pub trait Machine {
    /// Expose `native` under `name` in the global scope
    fn register_native(&mut self, name: &str, native: NativeFn);

    /// Extend the program with statements sharing the persistent scope
    fn append_source(&mut self, source: &str) -> MembraneResult<()>;

    /// Execute all pending statements to completion
    fn run(&mut self) -> MembraneResult<()>;

    /// Bind the call's locals and invoke its procedure
    ///
    /// Machines with a structured calling API should override this; the
    /// default renders the call as source text and runs it.
    fn call_procedure(&mut self, call: &ProcedureCall) -> MembraneResult<()> {
        let source = call.to_source()?;
        self.append_source(&source)?;
        self.run()
    }
}
