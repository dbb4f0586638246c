//! Tree-walking evaluator for the sandbox language
//!
//! Host references appear as [`Proxy`] values. Reading an advertised member,
//! writing a member, and calling a callable proxy are forwarded to the
//! `getFromHeaven`, `sendToHeaven` and `prayToHeaven` natives respectively.

use crate::ast::{BinOp, DeclKind, Expr, ExprKind, FunctionDecl, Stmt, UnOp};
use crate::error::{MachineError, Result, Span};
use crate::heaven;
use crate::value::{
    assign, function_scope, lookup, AssignOutcome, Binding, Builtin, Closure, Env, Native,
    NativeKind, Proxy, Scope, Value,
};
use heavenly_membrane::{
    NativeFn, WireValue, GET_NATIVE, LINK_FUNCTION, LINK_OBJECT, PRAY_NATIVE, SEND_NATIVE,
};
use heavenly_wire::{Path, PathKey};
use indexmap::IndexMap;
use std::sync::Arc;

/// Sandbox recursion limit
const MAX_CALL_DEPTH: usize = 64;

/// Largest length a sandbox array may grow to through index or `length` writes
const MAX_ARRAY_LENGTH: usize = 1 << 20;

/// How a statement finished
enum Completion {
    Normal,
    Return(Value),
}

pub struct Interpreter {
    globals: Env,
    natives: IndexMap<String, NativeFn>,
    depth: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        let mut interp = Self {
            globals: Scope::global(),
            natives: IndexMap::new(),
            depth: 0,
        };
        interp.define_builtin(LINK_OBJECT, Builtin::LinkObject);
        interp.define_builtin(LINK_FUNCTION, Builtin::LinkFunction);
        interp
    }

    fn define_builtin(&mut self, name: &str, builtin: Builtin) {
        let native = Native {
            name: name.to_string(),
            kind: NativeKind::Builtin(builtin),
        };
        self.define_global(name, Value::Native(Arc::new(native)));
    }

    /// Expose a host native as a global function
    pub fn define_native(&mut self, name: &str, native: NativeFn) {
        self.natives.insert(name.to_string(), Arc::clone(&native));
        let value = Native {
            name: name.to_string(),
            kind: NativeKind::Host(native),
        };
        self.define_global(name, Value::Native(Arc::new(value)));
    }

    /// Bind (or rebind) a global variable
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals.write().vars.insert(
            name.to_string(),
            Binding {
                value,
                constant: false,
            },
        );
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        lookup(&self.globals, name)
    }

    pub fn natives(&self) -> impl Iterator<Item = &str> {
        self.natives.keys().map(String::as_str)
    }

    /// Execute top-level statements in the global scope
    ///
    /// Returns the value of the last expression statement.
    pub fn run_program(&mut self, program: &[Stmt]) -> Result<Value> {
        let env = Arc::clone(&self.globals);
        self.hoist(program, &env);

        let mut last = Value::Undefined;
        for stmt in program {
            match stmt {
                Stmt::Expr(expr) => last = self.eval(expr, &env)?,
                other => {
                    self.exec(other, &env)?;
                }
            }
        }
        Ok(last)
    }

    /// Call a global function with already-converted arguments
    pub fn call_global(&mut self, name: &str, args: Vec<Value>) -> Result<Value> {
        let span = Span::default();
        let callee = self.global(name).ok_or_else(|| MachineError::ReferenceError {
            span,
            name: name.to_string(),
        })?;
        self.call_value(&callee, args, span, name)
    }

    /// Predeclare the function declarations of a statement list
    fn hoist(&self, stmts: &[Stmt], env: &Env) {
        for stmt in stmts {
            if let Stmt::Function(decl) = stmt {
                if let Some(name) = &decl.name {
                    let closure = self.closure(decl, env);
                    env.write().vars.insert(
                        name.clone(),
                        Binding {
                            value: closure,
                            constant: false,
                        },
                    );
                }
            }
        }
    }

    fn closure(&self, decl: &Arc<FunctionDecl>, env: &Env) -> Value {
        Value::Closure(Arc::new(Closure {
            decl: Arc::clone(decl),
            env: Arc::clone(env),
        }))
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Completion> {
        self.hoist(stmts, env);
        for stmt in stmts {
            if let Completion::Return(value) = self.exec(stmt, env)? {
                return Ok(Completion::Return(value));
            }
        }
        Ok(Completion::Normal)
    }

    fn exec(&mut self, stmt: &Stmt, env: &Env) -> Result<Completion> {
        match stmt {
            Stmt::Declare {
                kind,
                name,
                init,
                span,
            } => {
                let value = match init {
                    Some(expr) => Some(self.eval(expr, env)?),
                    None => None,
                };
                self.declare(*kind, name, value, *span, env)?;
                Ok(Completion::Normal)
            }
            // Bound during hoisting
            Stmt::Function(_) => Ok(Completion::Normal),
            Stmt::Return(expr, _) => {
                let value = match expr {
                    Some(expr) => self.eval(expr, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, env)?.is_truthy() {
                    self.exec(then, env)
                } else if let Some(otherwise) = otherwise {
                    self.exec(otherwise, env)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, env)?.is_truthy() {
                    if let Completion::Return(value) = self.exec(body, env)? {
                        return Ok(Completion::Return(value));
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::Block(stmts) => {
                let scope = Scope::child(env, false);
                self.exec_block(stmts, &scope)
            }
            Stmt::Expr(expr) => {
                self.eval(expr, env)?;
                Ok(Completion::Normal)
            }
            Stmt::Empty => Ok(Completion::Normal),
        }
    }

    fn declare(
        &mut self,
        kind: DeclKind,
        name: &str,
        value: Option<Value>,
        span: Span,
        env: &Env,
    ) -> Result<()> {
        match kind {
            DeclKind::Var => {
                let scope = function_scope(env);
                let mut scope = scope.write();
                if let Some(binding) = scope.vars.get_mut(name) {
                    // Redeclaring without an initializer keeps the value
                    if let Some(value) = value {
                        binding.value = value;
                    }
                } else {
                    scope.vars.insert(
                        name.to_string(),
                        Binding {
                            value: value.unwrap_or_default(),
                            constant: false,
                        },
                    );
                }
            }
            DeclKind::Let | DeclKind::Const => {
                let mut scope = env.write();
                if scope.vars.contains_key(name) {
                    return Err(MachineError::type_error(
                        span,
                        format!("Identifier '{}' has already been declared", name),
                    ));
                }
                scope.vars.insert(
                    name.to_string(),
                    Binding {
                        value: value.unwrap_or_default(),
                        constant: kind == DeclKind::Const,
                    },
                );
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr, env: &Env) -> Result<Value> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Number(n) => Ok(Value::Number(*n)),
            ExprKind::Str(s) => Ok(Value::String(s.clone())),
            ExprKind::Bool(b) => Ok(Value::Bool(*b)),
            ExprKind::Null => Ok(Value::Null),
            ExprKind::Undefined => Ok(Value::Undefined),
            ExprKind::Ident(name) => lookup(env, name).ok_or_else(|| MachineError::ReferenceError {
                span,
                name: name.clone(),
            }),
            ExprKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Object(props) => {
                let mut values = IndexMap::new();
                for (key, item) in props {
                    let value = self.eval(item, env)?;
                    values.insert(key.clone(), value);
                }
                Ok(Value::object(values))
            }
            ExprKind::Function(decl) => Ok(self.closure(decl, env)),
            ExprKind::Member(object, key) => {
                let target = self.eval(object, env)?;
                self.get_member(&target, key, span)
            }
            ExprKind::Index(object, index) => {
                let target = self.eval(object, env)?;
                let key = self.eval(index, env)?;
                self.get_member(&target, &key.to_display(), span)
            }
            ExprKind::Call(callee, args) => {
                let function = self.eval(callee, env)?;
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                self.call_value(&function, values, span, &callee.describe())
            }
            ExprKind::Assign(target, value) => self.eval_assign(target, value, span, env),
            ExprKind::Unary(op, operand) => self.eval_unary(*op, operand, env),
            ExprKind::Binary(left, op, right) => self.eval_binary(left, *op, right, env),
        }
    }

    fn eval_assign(&mut self, target: &Expr, value: &Expr, span: Span, env: &Env) -> Result<Value> {
        match &target.kind {
            ExprKind::Ident(name) => {
                let value = self.eval(value, env)?;
                match assign(env, name, value.clone()) {
                    AssignOutcome::Assigned => Ok(value),
                    AssignOutcome::Constant => Err(MachineError::type_error(
                        span,
                        format!("Assignment to constant variable '{}'", name),
                    )),
                    AssignOutcome::Missing => Err(MachineError::ReferenceError {
                        span: target.span,
                        name: name.clone(),
                    }),
                }
            }
            ExprKind::Member(object, key) => {
                let object = self.eval(object, env)?;
                let value = self.eval(value, env)?;
                self.set_member(&object, key, value.clone(), span)?;
                Ok(value)
            }
            ExprKind::Index(object, index) => {
                let object = self.eval(object, env)?;
                let key = self.eval(index, env)?.to_display();
                let value = self.eval(value, env)?;
                self.set_member(&object, &key, value.clone(), span)?;
                Ok(value)
            }
            _ => Err(MachineError::type_error(span, "Invalid assignment target")),
        }
    }

    fn eval_unary(&mut self, op: UnOp, operand: &Expr, env: &Env) -> Result<Value> {
        if op == UnOp::Typeof {
            // `typeof` tolerates undeclared names
            if let ExprKind::Ident(name) = &operand.kind {
                let kind = lookup(env, name).map_or("undefined", |v| v.type_of());
                return Ok(Value::string(kind));
            }
        }

        let value = self.eval(operand, env)?;
        let result = match op {
            UnOp::Not => Value::Bool(!value.is_truthy()),
            UnOp::Neg => Value::Number(-value.to_number()),
            UnOp::Plus => Value::Number(value.to_number()),
            UnOp::Typeof => Value::string(value.type_of()),
        };
        Ok(result)
    }

    fn eval_binary(&mut self, left: &Expr, op: BinOp, right: &Expr, env: &Env) -> Result<Value> {
        let lhs = self.eval(left, env)?;
        match op {
            BinOp::And if !lhs.is_truthy() => return Ok(lhs),
            BinOp::Or if lhs.is_truthy() => return Ok(lhs),
            BinOp::And | BinOp::Or => return self.eval(right, env),
            _ => {}
        }
        let rhs = self.eval(right, env)?;

        let result = match op {
            BinOp::Add => {
                if concatenates(&lhs) || concatenates(&rhs) {
                    Value::String(lhs.to_display() + &rhs.to_display())
                } else {
                    Value::Number(lhs.to_number() + rhs.to_number())
                }
            }
            BinOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
            BinOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
            BinOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
            BinOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
            BinOp::StrictEq => Value::Bool(lhs.strict_equals(&rhs)),
            BinOp::StrictNe => Value::Bool(!lhs.strict_equals(&rhs)),
            BinOp::LooseEq => Value::Bool(lhs.loose_equals(&rhs)),
            BinOp::LooseNe => Value::Bool(!lhs.loose_equals(&rhs)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => Value::Bool(compare(op, &lhs, &rhs)),
            BinOp::And | BinOp::Or => unreachable!("short-circuit operators handled above"),
        };
        Ok(result)
    }

    fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        span: Span,
        describe: &str,
    ) -> Result<Value> {
        match callee {
            Value::Closure(closure) => self.call_closure(closure, args, span),
            Value::Native(native) => match &native.kind {
                NativeKind::Host(f) => {
                    let args: Vec<String> = args.iter().map(Value::to_display).collect();
                    let result = f(&args).map_err(|error| MachineError::NativeError { span, error })?;
                    Ok(result.map_or(Value::Undefined, Value::String))
                }
                NativeKind::Builtin(builtin) => {
                    let path = heaven::path_from_value(args.first().unwrap_or(&Value::Undefined), span)?;
                    let keys = heaven::keys_from_value(args.get(1).unwrap_or(&Value::Undefined), span)?;
                    let callable = *builtin == Builtin::LinkFunction;
                    Ok(Value::Proxy(Arc::new(Proxy::new(path, keys, callable))))
                }
            },
            Value::Proxy(proxy) if proxy.callable => self.pray(proxy, &args, span),
            _ => Err(MachineError::type_error(
                span,
                format!("{} is not a function", describe),
            )),
        }
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>, span: Span) -> Result<Value> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(MachineError::type_error(span, "Maximum call stack size exceeded"));
        }

        let env = Scope::child(&closure.env, true);
        {
            let mut scope = env.write();
            let mut args = args.into_iter();
            for param in &closure.decl.params {
                scope.vars.insert(
                    param.clone(),
                    Binding {
                        value: args.next().unwrap_or_default(),
                        constant: false,
                    },
                );
            }
        }

        self.depth += 1;
        let result = self.exec_block(&closure.decl.body, &env);
        self.depth -= 1;

        match result? {
            Completion::Return(value) => Ok(value),
            Completion::Normal => Ok(Value::Undefined),
        }
    }

    fn get_member(&mut self, target: &Value, key: &str, span: Span) -> Result<Value> {
        match target {
            Value::Undefined | Value::Null => Err(MachineError::type_error(
                span,
                format!(
                    "Cannot read properties of {} (reading '{}')",
                    target.to_display(),
                    key
                ),
            )),
            Value::String(s) => {
                if key == "length" {
                    return Ok(Value::Number(s.chars().count() as f64));
                }
                Ok(index_of(key)
                    .and_then(|i| s.chars().nth(i))
                    .map_or(Value::Undefined, |c| Value::String(c.to_string())))
            }
            Value::Array(items) => {
                let items = items.read();
                if key == "length" {
                    return Ok(Value::Number(items.len() as f64));
                }
                Ok(index_of(key)
                    .and_then(|i| items.get(i).cloned())
                    .unwrap_or_default())
            }
            Value::Object(props) => Ok(props.read().get(key).cloned().unwrap_or_default()),
            Value::Proxy(proxy) if proxy.exposes(key) => self.fetch(&member_path(proxy, key), span),
            _ => Ok(Value::Undefined),
        }
    }

    fn set_member(&mut self, target: &Value, key: &str, value: Value, span: Span) -> Result<()> {
        match target {
            Value::Object(props) => {
                props.write().insert(key.to_string(), value);
                Ok(())
            }
            Value::Array(items) => {
                let mut items = items.write();
                if key == "length" {
                    let len = value.to_number();
                    if len < 0.0 || len.fract() != 0.0 || len > MAX_ARRAY_LENGTH as f64 {
                        return Err(MachineError::type_error(span, "Invalid array length"));
                    }
                    items.resize(len as usize, Value::Undefined);
                    return Ok(());
                }
                match index_of(key) {
                    Some(i) if i >= MAX_ARRAY_LENGTH => {
                        Err(MachineError::type_error(span, "Invalid array length"))
                    }
                    Some(i) => {
                        if i >= items.len() {
                            items.resize(i + 1, Value::Undefined);
                        }
                        items[i] = value;
                        Ok(())
                    }
                    None => Err(MachineError::type_error(
                        span,
                        format!("Cannot set property '{}' on an array", key),
                    )),
                }
            }
            Value::Proxy(proxy) => self.send(&member_path(proxy, key), &value, span),
            _ => Err(MachineError::type_error(
                span,
                format!(
                    "Cannot set properties of {} (setting '{}')",
                    target.to_display(),
                    key
                ),
            )),
        }
    }

    /// Read a host value through `getFromHeaven`
    fn fetch(&mut self, path: &Path, span: Span) -> Result<Value> {
        let path = path_json(path, span)?;
        let reply = self.invoke(GET_NATIVE, &[path], span)?;
        heaven::parse_wire(&reply.unwrap_or_default(), span)
    }

    /// Write a host value through `sendToHeaven`
    fn send(&mut self, path: &Path, value: &Value, span: Span) -> Result<()> {
        let path = path_json(path, span)?;
        let wire = wire_json(&heaven::to_wire(value, span)?, span)?;
        self.invoke(SEND_NATIVE, &[path, wire], span)?;
        Ok(())
    }

    /// Call a host function through `prayToHeaven`
    fn pray(&mut self, proxy: &Proxy, args: &[Value], span: Span) -> Result<Value> {
        let path = path_json(&proxy.path, span)?;
        let wires = args
            .iter()
            .map(|arg| heaven::to_wire(arg, span))
            .collect::<Result<Vec<WireValue>>>()?;
        let args = serde_json::to_string(&wires).map_err(|e| MachineError::NativeError {
            span,
            error: e.into(),
        })?;
        let reply = self.invoke(PRAY_NATIVE, &[path, args], span)?;
        heaven::parse_wire(&reply.unwrap_or_default(), span)
    }

    fn invoke(&self, name: &str, args: &[String], span: Span) -> Result<Option<String>> {
        let native = self.natives.get(name).cloned().ok_or_else(|| {
            MachineError::type_error(span, format!("native `{}` is not registered", name))
        })?;
        native(args).map_err(|error| MachineError::NativeError { span, error })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Operands that turn `+` into string concatenation
fn concatenates(value: &Value) -> bool {
    matches!(
        value,
        Value::String(_) | Value::Array(_) | Value::Object(_) | Value::Proxy(_)
    )
}

fn compare(op: BinOp, lhs: &Value, rhs: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (lhs, rhs) {
        return match op {
            BinOp::Lt => a < b,
            BinOp::Le => a <= b,
            BinOp::Gt => a > b,
            _ => a >= b,
        };
    }
    let (a, b) = (lhs.to_number(), rhs.to_number());
    match op {
        BinOp::Lt => a < b,
        BinOp::Le => a <= b,
        BinOp::Gt => a > b,
        _ => a >= b,
    }
}

fn index_of(key: &str) -> Option<usize> {
    if key.len() > 1 && key.starts_with('0') {
        return None;
    }
    key.parse().ok()
}

fn member_path(proxy: &Proxy, key: &str) -> Path {
    proxy.path.child(PathKey::Name(key.to_string()))
}

fn path_json(path: &Path, span: Span) -> Result<String> {
    path.to_json_string().map_err(|e| MachineError::NativeError {
        span,
        error: e.into(),
    })
}

fn wire_json(wire: &WireValue, span: Span) -> Result<String> {
    wire.to_json_string().map_err(|e| MachineError::NativeError {
        span,
        error: e.into(),
    })
}
