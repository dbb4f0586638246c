//! Host value model
//!
//! The host side of the membrane is a dynamic object graph: primitives, objects
//! with insertion-ordered properties and an optional prototype, and callable
//! functions. Objects and functions are shared handles, so two values are the
//! same object exactly when they point at the same allocation.

use crate::error::{MembraneError, MembraneResult};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::{Number, Value};
use std::fmt;
use std::sync::Arc;

/// Signature of a host function: `(this, args) -> result`
pub type NativeCallable =
    dyn Fn(&HostValue, &[HostValue]) -> MembraneResult<HostValue> + Send + Sync;

/// Largest integer that survives an f64 round-trip
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A value living in the host realm
#[derive(Clone, Default)]
pub enum HostValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    Function(FunctionRef),
}

impl HostValue {
    /// Wrap a closure as a host function value
    pub fn function<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> MembraneResult<HostValue> + Send + Sync + 'static,
    {
        HostValue::Function(FunctionRef::native(name, f))
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, HostValue::Object(_) | HostValue::Function(_))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    /// Name of the value's kind, as `typeof` would report it
    pub fn type_of(&self) -> &'static str {
        match self {
            HostValue::Undefined => "undefined",
            HostValue::Null => "object",
            HostValue::Bool(_) => "boolean",
            HostValue::Number(_) => "number",
            HostValue::String(_) => "string",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            HostValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            HostValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            HostValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Read a property the way a member expression would
    ///
    /// Returns `None` when the value cannot carry properties at all
    /// (`undefined`/`null`); a missing property on anything else reads as
    /// `undefined`.
    pub fn get_property(&self, key: &str) -> Option<HostValue> {
        match self {
            HostValue::Undefined | HostValue::Null => None,
            HostValue::String(s) => Some(string_property(s, key)),
            HostValue::Bool(_) | HostValue::Number(_) => Some(HostValue::Undefined),
            HostValue::Object(obj) => Some(obj.get(key)),
            HostValue::Function(f) => Some(f.get(key)),
        }
    }

    /// Whether `key` names an actual member, own or inherited
    pub fn has_property(&self, key: &str) -> bool {
        match self {
            HostValue::String(s) => {
                key == "length"
                    || key
                        .parse::<usize>()
                        .map(|index| index < s.chars().count())
                        .unwrap_or(false)
            }
            HostValue::Object(obj) => obj.has(key),
            HostValue::Function(f) => f.has(key),
            _ => false,
        }
    }

    /// Assign a property; returns `false` if the value cannot hold properties
    pub fn set_property(&self, key: &str, value: HostValue) -> bool {
        match self {
            HostValue::Object(obj) => {
                obj.set(key, value);
                true
            }
            HostValue::Function(f) => {
                f.set(key, value);
                true
            }
            _ => false,
        }
    }

    /// JSON payload of a primitive; `None` for `undefined` and for references
    pub fn to_primitive_json(&self) -> Option<Value> {
        match self {
            HostValue::Null => Some(Value::Null),
            HostValue::Bool(b) => Some(Value::Bool(*b)),
            HostValue::Number(n) => Some(number_to_json(*n)),
            HostValue::String(s) => Some(Value::String(s.clone())),
            HostValue::Undefined | HostValue::Object(_) | HostValue::Function(_) => None,
        }
    }

    /// Inverse of [`HostValue::to_primitive_json`]
    pub fn from_primitive_json(value: Option<&Value>) -> HostValue {
        match value {
            None => HostValue::Undefined,
            Some(json) => HostValue::from_json(json),
        }
    }

    /// Build a fresh host value from JSON; arrays and objects become new host objects
    pub fn from_json(json: &Value) -> HostValue {
        match json {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(*b),
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => HostValue::String(s.clone()),
            Value::Array(items) => {
                HostValue::Object(ObjectRef::array(items.iter().map(HostValue::from_json)))
            }
            Value::Object(map) => {
                let obj = ObjectRef::plain();
                for (key, value) in map {
                    obj.set(key, HostValue::from_json(value));
                }
                HostValue::Object(obj)
            }
        }
    }

    /// Snapshot a host value as plain JSON
    ///
    /// Functions and `undefined` become `null`. Meant for display; cyclic
    /// graphs are cut at `depth` levels.
    pub fn to_json(&self, depth: usize) -> Value {
        match self {
            HostValue::Undefined | HostValue::Function(_) => Value::Null,
            HostValue::Object(obj) if depth == 0 => Value::String(format!("{:?}", obj)),
            HostValue::Object(obj) => match obj.class() {
                ObjectClass::Array | ObjectClass::TypedArray => Value::Array(
                    (0..obj.len())
                        .map(|i| obj.get(&i.to_string()).to_json(depth - 1))
                        .collect(),
                ),
                ObjectClass::Plain => Value::Object(
                    obj.own_keys()
                        .into_iter()
                        .map(|key| {
                            let value = obj.get(&key).to_json(depth - 1);
                            (key, value)
                        })
                        .collect(),
                ),
            },
            primitive => primitive.to_primitive_json().unwrap_or(Value::Null),
        }
    }
}

/// JSON number for an f64, matching `JSON.stringify`
///
/// Integral values in the safe range serialize as integers; NaN and the
/// infinities serialize as `null`.
pub fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

fn string_property(s: &str, key: &str) -> HostValue {
    if key == "length" {
        return HostValue::Number(s.chars().count() as f64);
    }
    key.parse::<usize>()
        .ok()
        .and_then(|index| s.chars().nth(index))
        .map(|c| HostValue::String(c.to_string()))
        .unwrap_or(HostValue::Undefined)
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) => true,
            (HostValue::Null, HostValue::Null) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Number(a), HostValue::Number(b)) => a == b,
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.ptr_eq(b),
            (HostValue::Function(a), HostValue::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Number(n) => write!(f, "{}", n),
            HostValue::String(s) => write!(f, "{:?}", s),
            HostValue::Object(obj) => write!(f, "{:?}", obj),
            HostValue::Function(func) => write!(f, "{:?}", func),
        }
    }
}

impl From<bool> for HostValue {
    fn from(b: bool) -> Self {
        HostValue::Bool(b)
    }
}

impl From<f64> for HostValue {
    fn from(n: f64) -> Self {
        HostValue::Number(n)
    }
}

impl From<i64> for HostValue {
    fn from(n: i64) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<i32> for HostValue {
    fn from(n: i32) -> Self {
        HostValue::Number(n as f64)
    }
}

impl From<&str> for HostValue {
    fn from(s: &str) -> Self {
        HostValue::String(s.to_string())
    }
}

impl From<String> for HostValue {
    fn from(s: String) -> Self {
        HostValue::String(s)
    }
}

impl From<ObjectRef> for HostValue {
    fn from(obj: ObjectRef) -> Self {
        HostValue::Object(obj)
    }
}

impl From<FunctionRef> for HostValue {
    fn from(f: FunctionRef) -> Self {
        HostValue::Function(f)
    }
}

/// Kind of host object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectClass {
    Plain,
    Array,
    TypedArray,
}

impl ObjectClass {
    /// Whether objects of this class expose a synthetic `length`
    pub fn is_indexed(&self) -> bool {
        matches!(self, ObjectClass::Array | ObjectClass::TypedArray)
    }
}

struct HostObject {
    class: ObjectClass,
    properties: RwLock<IndexMap<String, HostValue>>,
    prototype: Option<ObjectRef>,
}

/// Shared handle to a host object
#[derive(Clone)]
pub struct ObjectRef(Arc<HostObject>);

impl ObjectRef {
    pub fn new(class: ObjectClass, prototype: Option<ObjectRef>) -> Self {
        Self(Arc::new(HostObject {
            class,
            properties: RwLock::new(IndexMap::new()),
            prototype,
        }))
    }

    pub fn plain() -> Self {
        Self::new(ObjectClass::Plain, None)
    }

    /// Plain object whose lookups fall back to `prototype`
    pub fn with_prototype(prototype: ObjectRef) -> Self {
        Self::new(ObjectClass::Plain, Some(prototype))
    }

    pub fn array(items: impl IntoIterator<Item = HostValue>) -> Self {
        let obj = Self::new(ObjectClass::Array, None);
        {
            let mut props = obj.0.properties.write();
            for (i, item) in items.into_iter().enumerate() {
                props.insert(i.to_string(), item);
            }
        }
        obj
    }

    pub fn typed_array(items: &[f64]) -> Self {
        let obj = Self::new(ObjectClass::TypedArray, None);
        {
            let mut props = obj.0.properties.write();
            for (i, item) in items.iter().enumerate() {
                props.insert(i.to_string(), HostValue::Number(*item));
            }
        }
        obj
    }

    /// Builder-style property insertion
    pub fn with(self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.set(key, value.into());
        self
    }

    pub fn class(&self) -> ObjectClass {
        self.0.class
    }

    pub fn prototype(&self) -> Option<&ObjectRef> {
        self.0.prototype.as_ref()
    }

    /// Own keys in insertion order
    pub fn own_keys(&self) -> Vec<String> {
        self.0.properties.read().keys().cloned().collect()
    }

    pub fn get_own(&self, key: &str) -> Option<HostValue> {
        self.0.properties.read().get(key).cloned()
    }

    pub fn has_own(&self, key: &str) -> bool {
        self.0.properties.read().contains_key(key)
    }

    /// Key presence through own properties, `length`, then the prototype chain
    pub fn has(&self, key: &str) -> bool {
        if self.has_own(key) || (key == "length" && self.0.class.is_indexed()) {
            return true;
        }
        let mut proto = self.0.prototype.clone();
        while let Some(current) = proto {
            if current.has_own(key) {
                return true;
            }
            proto = current.0.prototype.clone();
        }
        false
    }

    /// Property lookup through own properties, `length`, then the prototype chain
    pub fn get(&self, key: &str) -> HostValue {
        if let Some(value) = self.get_own(key) {
            return value;
        }
        if key == "length" && self.0.class.is_indexed() {
            return HostValue::Number(self.len() as f64);
        }
        let mut proto = self.0.prototype.clone();
        while let Some(current) = proto {
            if let Some(value) = current.get_own(key) {
                return value;
            }
            proto = current.0.prototype.clone();
        }
        HostValue::Undefined
    }

    pub fn set(&self, key: impl Into<String>, value: HostValue) {
        self.0.properties.write().insert(key.into(), value);
    }

    /// Element count of an indexed object (highest index + 1)
    pub fn len(&self) -> usize {
        self.0
            .properties
            .read()
            .keys()
            .filter_map(|key| key.parse::<usize>().ok())
            .map(|index| index + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.properties.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {{{}}}", self.0.class, self.own_keys().join(", "))
    }
}

enum Callee {
    Native(Box<NativeCallable>),
    Bound {
        target: FunctionRef,
        receiver: HostValue,
    },
}

struct HostFunction {
    name: String,
    callee: Callee,
    properties: RwLock<IndexMap<String, HostValue>>,
    prototype: Option<ObjectRef>,
}

/// Shared handle to a host function
///
/// Binding a function to a receiver produces a new handle that remembers the
/// function it was made from. Property access on a bound handle reads through
/// to that target, and [`FunctionRef::unbound`] hands it back, so a method
/// fetched with one receiver can later be invoked against another.
#[derive(Clone)]
pub struct FunctionRef(Arc<HostFunction>);

impl FunctionRef {
    pub fn native<F>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> MembraneResult<HostValue> + Send + Sync + 'static,
    {
        Self::native_with_prototype(name, None, f)
    }

    /// Native function whose missing properties fall back to `prototype`
    pub fn native_with_prototype<F>(
        name: impl Into<String>,
        prototype: Option<ObjectRef>,
        f: F,
    ) -> Self
    where
        F: Fn(&HostValue, &[HostValue]) -> MembraneResult<HostValue> + Send + Sync + 'static,
    {
        Self(Arc::new(HostFunction {
            name: name.into(),
            callee: Callee::Native(Box::new(f)),
            properties: RwLock::new(IndexMap::new()),
            prototype,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Invoke with an explicit receiver; bound handles ignore it
    pub fn call(&self, this: &HostValue, args: &[HostValue]) -> MembraneResult<HostValue> {
        match &self.0.callee {
            Callee::Native(f) => f(this, args),
            Callee::Bound { target, receiver } => target.call(receiver, args),
        }
    }

    /// New handle that always runs against `receiver`
    pub fn bind(&self, receiver: HostValue) -> FunctionRef {
        Self(Arc::new(HostFunction {
            name: format!("bound {}", self.0.name),
            callee: Callee::Bound {
                target: self.clone(),
                receiver,
            },
            properties: RwLock::new(IndexMap::new()),
            prototype: None,
        }))
    }

    pub fn is_bound(&self) -> bool {
        matches!(self.0.callee, Callee::Bound { .. })
    }

    /// The function this handle was bound from, or itself
    pub fn unbound(&self) -> FunctionRef {
        match &self.0.callee {
            Callee::Bound { target, .. } => target.clone(),
            Callee::Native(_) => self.clone(),
        }
    }

    /// Handle that owns the property map (bound handles defer to their target)
    fn property_owner(&self) -> FunctionRef {
        let mut current = self.clone();
        while let Callee::Bound { target, .. } = &current.0.callee {
            let next = target.clone();
            current = next;
        }
        current
    }

    pub fn own_keys(&self) -> Vec<String> {
        self.property_owner()
            .0
            .properties
            .read()
            .keys()
            .cloned()
            .collect()
    }

    pub fn prototype(&self) -> Option<ObjectRef> {
        self.property_owner().0.prototype.clone()
    }

    pub fn has(&self, key: &str) -> bool {
        let owner = self.property_owner();
        let own = owner.0.properties.read().contains_key(key);
        own || owner.0.prototype.as_ref().is_some_and(|proto| proto.has(key))
    }

    /// Own property, else the prototype chain
    pub fn get(&self, key: &str) -> HostValue {
        let owner = self.property_owner();
        let own = owner.0.properties.read().get(key).cloned();
        match (own, &owner.0.prototype) {
            (Some(value), _) => value,
            (None, Some(proto)) => proto.get(key),
            (None, None) => HostValue::Undefined,
        }
    }

    pub fn set(&self, key: impl Into<String>, value: HostValue) {
        self.property_owner()
            .0
            .properties
            .write()
            .insert(key.into(), value);
    }

    /// Builder-style static property insertion
    pub fn with(self, key: impl Into<String>, value: impl Into<HostValue>) -> Self {
        self.set(key, value.into());
        self
    }

    pub fn ptr_eq(&self, other: &FunctionRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[Function: {}]", self.0.name)
    }
}

/// Pull the `index`-th argument, defaulting to `undefined`
pub fn arg(args: &[HostValue], index: usize) -> HostValue {
    args.get(index).cloned().unwrap_or_default()
}

/// Pull the `index`-th argument as a number
pub fn number_arg(args: &[HostValue], index: usize, function: &str) -> MembraneResult<f64> {
    arg(args, index).as_number().ok_or_else(|| {
        MembraneError::host(format!(
            "{}: argument {} must be a number",
            function, index
        ))
    })
}
