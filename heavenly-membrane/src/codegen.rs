//! Sandbox source generation
//!
//! The host drives the machine by appending statements to its program. Every
//! host -> machine hand-off reduces to the same shape: bind some locals, each
//! either a literal or a linked reference, then call a named procedure with
//! those locals as positional arguments. [`ProcedureCall`] is that shape as
//! data; [`SourceEmitter`] renders it (and the compile-time link preamble) as
//! statements for machines that only accept source text.

use crate::error::{MembraneError, MembraneResult};
use heavenly_wire::WireValue;

/// Machine-side primitive that wraps an object reference in a proxy
pub const LINK_OBJECT: &str = "linkHeavenlyObject";
/// Machine-side primitive that wraps a function reference in a proxy
pub const LINK_FUNCTION: &str = "linkHeavenlyFunction";

const RESERVED: &[&str] = &[
    "break", "case", "catch", "class", "const", "continue", "default", "delete", "do", "else",
    "false", "finally", "for", "function", "if", "in", "instanceof", "let", "new", "null",
    "return", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with",
];

/// Whether `name` can be used as a sandbox identifier
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let starts_well = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        .unwrap_or(false);
    starts_well
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !RESERVED.contains(&name)
}

fn check_identifier(name: &str) -> MembraneResult<()> {
    if is_identifier(name) {
        Ok(())
    } else {
        Err(MembraneError::InvalidIdentifier(name.to_string()))
    }
}

/// One sandbox local bound to a wire value
#[derive(Debug, Clone, PartialEq)]
pub struct ArgBinding {
    pub local: String,
    pub value: WireValue,
}

/// A procedure invocation the host wants the machine to perform
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    pub procedure: String,
    pub bindings: Vec<ArgBinding>,
}

impl ProcedureCall {
    pub fn new(procedure: impl Into<String>) -> Self {
        Self {
            procedure: procedure.into(),
            bindings: Vec::new(),
        }
    }

    pub fn bind(mut self, local: impl Into<String>, value: WireValue) -> Self {
        self.bindings.push(ArgBinding {
            local: local.into(),
            value,
        });
        self
    }

    /// Render as statements: one binding per line, then the call
    pub fn to_source(&self) -> MembraneResult<String> {
        let mut emitter = SourceEmitter::new();
        for binding in &self.bindings {
            emitter.bind(&binding.local, &binding.value)?;
        }
        let locals: Vec<&str> = self.bindings.iter().map(|b| b.local.as_str()).collect();
        emitter.call(&self.procedure, &locals)?;
        Ok(emitter.finish())
    }
}

/// Line-oriented builder for sandbox statements
#[derive(Debug, Default)]
pub struct SourceEmitter {
    lines: Vec<String>,
}

impl SourceEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// `var <local> = <expression for value>;`
    pub fn bind(&mut self, local: &str, value: &WireValue) -> MembraneResult<&mut Self> {
        check_identifier(local)?;
        let expr = match value {
            WireValue::Object { path, keys } => format!(
                "{}({}, {})",
                LINK_OBJECT,
                serde_json::to_string(path)?,
                serde_json::to_string(keys)?
            ),
            WireValue::Function { path, keys } => format!(
                "{}({}, {})",
                LINK_FUNCTION,
                serde_json::to_string(path)?,
                serde_json::to_string(keys)?
            ),
            WireValue::Primitive { value: Some(json) } => serde_json::to_string(json)?,
            WireValue::Primitive { value: None } => "undefined".to_string(),
            WireValue::ObjectLiteral { value } => value.clone(),
        };
        self.lines.push(format!("var {} = {};", local, expr));
        Ok(self)
    }

    /// `<procedure>(<locals>);`
    pub fn call(&mut self, procedure: &str, locals: &[&str]) -> MembraneResult<&mut Self> {
        check_identifier(procedure)?;
        for local in locals {
            check_identifier(local)?;
        }
        self.lines
            .push(format!("{}({});", procedure, locals.join(", ")));
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn finish(self) -> String {
        let mut source = self.lines.join("\n");
        if !source.is_empty() {
            source.push('\n');
        }
        source
    }
}
