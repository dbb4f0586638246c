//! Sandbox runtime values

use crate::ast::FunctionDecl;
use heavenly_membrane::NativeFn;
use heavenly_wire::Path;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type ArrayRef = Arc<RwLock<Vec<Value>>>;
pub type ObjectRef = Arc<RwLock<IndexMap<String, Value>>>;
pub type Env = Arc<RwLock<Scope>>;

/// A value inside the machine
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(ArrayRef),
    Object(ObjectRef),
    Closure(Arc<Closure>),
    Native(Arc<Native>),
    /// Reference to a value living on the host side
    Proxy(Arc<Proxy>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Arc::new(RwLock::new(items)))
    }

    pub fn object(props: IndexMap<String, Value>) -> Self {
        Value::Object(Arc::new(RwLock::new(props)))
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) | Value::Object(_) => "object",
            Value::Closure(_) | Value::Native(_) => "function",
            Value::Proxy(p) if p.callable => "function",
            Value::Proxy(_) => "object",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric conversion as the arithmetic operators perform it
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Number(n) => *n,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                }
            }
            Value::Array(items) => {
                let items = items.read();
                match items.len() {
                    0 => 0.0,
                    1 => items[0].to_number(),
                    _ => f64::NAN,
                }
            }
            _ => f64::NAN,
        }
    }

    /// String conversion as `+` and the natives perform it
    pub fn to_display(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .read()
                .iter()
                .map(|v| {
                    if v.is_nullish() {
                        String::new()
                    } else {
                        v.to_display()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Closure(c) => format!("function {}() {{ [code] }}", c.name()),
            Value::Native(n) => format!("function {}() {{ [native code] }}", n.name),
            Value::Proxy(p) if p.callable => {
                format!("function {}() {{ [heavenly code] }}", p.path)
            }
            Value::Proxy(_) => "[object Heavenly]".to_string(),
        }
    }

    /// `===`
    pub fn strict_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Arc::ptr_eq(a, b),
            (Value::Proxy(a), Value::Proxy(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Value::Number(_), Value::String(_))
            | (Value::String(_), Value::Number(_))
            | (Value::Bool(_), _)
            | (_, Value::Bool(_)) => self.to_number() == other.to_number(),
            _ => self.strict_equals(other),
        }
    }
}

/// `===` semantics; NaN is never equal to itself
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", number_to_string(*n)),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Array(items) => f.debug_list().entries(items.read().iter()).finish(),
            Value::Object(props) => f.debug_map().entries(props.read().iter()).finish(),
            Value::Closure(c) => write!(f, "[Function {}]", c.name()),
            Value::Native(n) => write!(f, "[Native {}]", n.name),
            Value::Proxy(p) => write!(f, "[Heavenly {} {:?}]", p.path, p.keys),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// Render a number the way the sandbox prints it
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == n.trunc() && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// A sandbox-defined function and the scope it closes over
pub struct Closure {
    pub decl: Arc<FunctionDecl>,
    pub env: Env,
}

impl Closure {
    pub fn name(&self) -> &str {
        self.decl.name.as_deref().unwrap_or("anonymous")
    }
}

/// Machine-provided primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    LinkObject,
    LinkFunction,
}

pub enum NativeKind {
    /// String-in, string-out function registered by the host
    Host(NativeFn),
    Builtin(Builtin),
}

pub struct Native {
    pub name: String,
    pub kind: NativeKind,
}

/// Sandbox handle for a host value reachable at `path`
#[derive(Debug, Clone, PartialEq)]
pub struct Proxy {
    pub path: Path,
    pub keys: Vec<String>,
    pub callable: bool,
}

impl Proxy {
    pub fn new(path: Path, keys: Vec<String>, callable: bool) -> Self {
        Self {
            path,
            keys,
            callable,
        }
    }

    /// Whether the host advertised `key` as readable
    pub fn exposes(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key)
    }
}

/// A variable binding
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub constant: bool,
}

/// One level of lexical scope
#[derive(Default)]
pub struct Scope {
    pub vars: HashMap<String, Binding>,
    pub parent: Option<Env>,
    /// Function and global scopes receive `var` declarations
    pub function: bool,
}

impl Scope {
    pub fn global() -> Env {
        Arc::new(RwLock::new(Scope {
            function: true,
            ..Scope::default()
        }))
    }

    pub fn child(parent: &Env, function: bool) -> Env {
        Arc::new(RwLock::new(Scope {
            vars: HashMap::new(),
            parent: Some(Arc::clone(parent)),
            function,
        }))
    }
}

/// Find the binding for `name`, walking outwards
pub fn lookup(env: &Env, name: &str) -> Option<Value> {
    let mut current = Arc::clone(env);
    loop {
        let parent = {
            let scope = current.read();
            if let Some(binding) = scope.vars.get(name) {
                return Some(binding.value.clone());
            }
            scope.parent.clone()
        };
        current = parent?;
    }
}

/// Outcome of assigning to an existing binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    Constant,
    Missing,
}

/// Overwrite the nearest binding for `name`
pub fn assign(env: &Env, name: &str, value: Value) -> AssignOutcome {
    let mut current = Arc::clone(env);
    loop {
        let parent = {
            let mut scope = current.write();
            if let Some(binding) = scope.vars.get_mut(name) {
                if binding.constant {
                    return AssignOutcome::Constant;
                }
                binding.value = value;
                return AssignOutcome::Assigned;
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => current = parent,
            None => return AssignOutcome::Missing,
        }
    }
}

/// Nearest enclosing function (or global) scope
pub fn function_scope(env: &Env) -> Env {
    let mut current = Arc::clone(env);
    loop {
        let parent = {
            let scope = current.read();
            if scope.function {
                None
            } else {
                scope.parent.clone()
            }
        };
        match parent {
            Some(parent) => current = parent,
            None => return current,
        }
    }
}
