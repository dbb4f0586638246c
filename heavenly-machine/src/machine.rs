//! [`Machine`] implementation backed by the tree-walking interpreter

use crate::ast::Stmt;
use crate::error::{ErrorContext, MachineError};
use crate::heaven;
use crate::interpreter::Interpreter;
use crate::parser::parse_at;
use crate::value::Value;
use heavenly_membrane::{Machine, MembraneError, MembraneResult, NativeFn, ProcedureCall};

/// A persistent sandbox program
///
/// Appended chunks share one global scope and one source buffer, so later
/// chunks see everything earlier chunks declared and error spans always point
/// into [`JsMachine::source`].
pub struct JsMachine {
    interpreter: Interpreter,
    source: String,
    pending: Vec<Stmt>,
}

impl JsMachine {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
            source: String::new(),
            pending: Vec::new(),
        }
    }

    /// Everything appended so far
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Current value of a global, for inspection
    pub fn global(&self, name: &str) -> Option<Value> {
        self.interpreter.global(name)
    }

    /// Evaluate a snippet immediately and return its value
    pub fn eval(&mut self, source: &str) -> MembraneResult<Value> {
        self.append_source(source)?;
        let program = std::mem::take(&mut self.pending);
        let result = self.interpreter.run_program(&program);
        result.map_err(|err| self.report(err))
    }

    /// Log a machine error against the source and convert it for the host
    fn report(&self, err: MachineError) -> MembraneError {
        match &err {
            MachineError::NativeError { error, .. } => {
                tracing::debug!(target: "heavenly::machine", "native failed: {}", error);
            }
            _ => {
                tracing::warn!(
                    target: "heavenly::machine",
                    "{}",
                    ErrorContext::new(&self.source, &err)
                );
            }
        }
        err.into()
    }
}

impl Default for JsMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine for JsMachine {
    fn register_native(&mut self, name: &str, native: NativeFn) {
        tracing::trace!(target: "heavenly::machine", "registering native {}", name);
        self.interpreter.define_native(name, native);
    }

    fn append_source(&mut self, source: &str) -> MembraneResult<()> {
        let offset = self.source.len();
        self.source.push_str(source);
        match parse_at(source, offset) {
            Ok(stmts) => {
                self.pending.extend(stmts);
                Ok(())
            }
            Err(err) => {
                let converted = self.report(err);
                self.source.truncate(offset);
                Err(converted)
            }
        }
    }

    fn run(&mut self) -> MembraneResult<()> {
        let program = std::mem::take(&mut self.pending);
        tracing::debug!(
            target: "heavenly::machine",
            "running {} statement(s)",
            program.len()
        );
        match self.interpreter.run_program(&program) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.report(err)),
        }
    }

    /// Binds each local as a global and calls the procedure directly,
    /// without rendering the call as source.
    fn call_procedure(&mut self, call: &ProcedureCall) -> MembraneResult<()> {
        self.run()?;

        let mut args = Vec::with_capacity(call.bindings.len());
        for binding in &call.bindings {
            let value = heaven::from_wire(binding.value.clone(), Default::default())
                .map_err(|err| self.report(err))?;
            self.interpreter.define_global(&binding.local, value.clone());
            args.push(value);
        }

        tracing::debug!(
            target: "heavenly::machine",
            "calling {} with {} argument(s)",
            call.procedure,
            args.len()
        );
        match self.interpreter.call_global(&call.procedure, args) {
            Ok(_) => Ok(()),
            Err(err) => Err(self.report(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heavenly_membrane::{ArgBinding, WireValue};
    use heavenly_wire::Path;
    use serde_json::json;

    #[test]
    fn test_chunks_share_globals() {
        let mut machine = JsMachine::new();
        machine.append_source("var total = 1\n").unwrap();
        machine.run().unwrap();
        machine.append_source("total = total + 41\n").unwrap();
        machine.run().unwrap();
        assert_eq!(machine.global("total"), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_syntax_error_leaves_source_untouched() {
        let mut machine = JsMachine::new();
        machine.append_source("var a = 1\n").unwrap();
        let err = machine.append_source("var = oops").unwrap_err();
        assert!(matches!(err, MembraneError::Sandbox(_)));
        assert_eq!(machine.source(), "var a = 1\n");
    }

    #[test]
    fn test_runtime_errors_become_sandbox_errors() {
        let mut machine = JsMachine::new();
        machine.append_source("undefinedThing()\n").unwrap();
        let err = machine.run().unwrap_err();
        assert_eq!(
            err,
            MembraneError::Sandbox(
                "ReferenceError at 0..14: undefinedThing is not defined".to_string()
            )
        );
    }

    #[test]
    fn test_structured_procedure_call() {
        let mut machine = JsMachine::new();
        machine
            .append_source("var seen\nfunction onTick(point, label) { seen = label + point.x }\n")
            .unwrap();
        machine.run().unwrap();

        let get: NativeFn = std::sync::Arc::new(|args: &[String]| {
            assert_eq!(args[0], r#"["_argobj0","x"]"#);
            Ok(Some(r#"{"type":"primitive","value":3}"#.to_string()))
        });
        machine.register_native(heavenly_membrane::GET_NATIVE, get);

        let call = ProcedureCall {
            procedure: "onTick".to_string(),
            bindings: vec![
                ArgBinding {
                    local: "_arg1".to_string(),
                    value: WireValue::object(Path::from(["_argobj0"]), vec!["x".to_string()]),
                },
                ArgBinding {
                    local: "_arg2".to_string(),
                    value: WireValue::primitive(json!("x=")),
                },
            ],
        };
        machine.call_procedure(&call).unwrap();
        assert_eq!(machine.global("seen"), Some(Value::string("x=3")));
        assert!(matches!(machine.global("_arg2"), Some(Value::String(_))));
    }

    #[test]
    fn test_eval_returns_last_value() {
        let mut machine = JsMachine::new();
        assert_eq!(machine.eval("1 + 1").unwrap(), Value::Number(2.0));
    }
}
