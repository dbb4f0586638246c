//! Wire format for the heavenly membrane
//!
//! This crate holds the one contract both realms must agree on bit for bit:
//! the JSON shape of paths and tagged wire values exchanged between the host
//! ("heaven") and the sandboxed interpreter ("the machine"). Everything that
//! crosses the boundary is a string carrying one of these shapes.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Tag values accepted in the `type` field of a wire value
pub const KNOWN_TAGS: &[&str] = &["primitive", "object", "function", "object-literal"];

/// Marker property identifying a host reference embedded in an object literal
pub const SENTINEL_MARKER: &str = "__heavenly";

/// Errors produced while reading wire payloads
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Unknown wire type: {0}")]
    UnknownType(String),

    #[error("Wire value is missing its type tag")]
    MissingType,

    #[error("Primitive wire value carries a non-primitive payload: {0}")]
    NonPrimitive(String),

    #[error("Malformed wire payload: {0}")]
    Malformed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WireResult<T> = Result<T, WireError>;

/// One segment of a path
///
/// Paths arrive from the machine as JSON arrays mixing strings and numbers
/// (`["items", 0, "name"]`). Both forms address a property by its string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Index(u64),
    Name(String),
}

impl PathKey {
    /// The property key this segment addresses
    pub fn as_key(&self) -> String {
        match self {
            PathKey::Index(i) => i.to_string(),
            PathKey::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Index(i) => write!(f, "{}", i),
            PathKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for PathKey {
    fn from(name: &str) -> Self {
        PathKey::Name(name.to_string())
    }
}

impl From<String> for PathKey {
    fn from(name: String) -> Self {
        PathKey::Name(name)
    }
}

impl From<u64> for PathKey {
    fn from(index: u64) -> Self {
        PathKey::Index(index)
    }
}

/// Ordered key sequence addressing a value inside the host data store
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(Vec<PathKey>);

impl Path {
    pub fn new(keys: Vec<PathKey>) -> Self {
        Self(keys)
    }

    /// Single-segment path at the root of the store
    pub fn root_key(key: impl Into<PathKey>) -> Self {
        Self(vec![key.into()])
    }

    pub fn keys(&self) -> &[PathKey] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path extended by one segment
    pub fn child(&self, key: impl Into<PathKey>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    /// Split into the parent segments and the final key
    pub fn split_last(&self) -> Option<(&PathKey, &[PathKey])> {
        self.0.split_last()
    }

    /// Parse a path from its JSON text
    pub fn from_json_str(text: &str) -> WireResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> WireResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(PathKey::to_string).collect();
        write!(f, "{}", joined.join("."))
    }
}

impl<K: Into<PathKey>> FromIterator<K> for Path {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&[&str]> for Path {
    fn from(keys: &[&str]) -> Self {
        keys.iter().copied().collect()
    }
}

impl<const N: usize> From<[&str; N]> for Path {
    fn from(keys: [&str; N]) -> Self {
        keys.into_iter().collect()
    }
}

/// Tagged-union representation of a value crossing the membrane
///
/// A primitive whose `value` is absent stands for `undefined`; an explicit
/// `null` stays `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WireValue {
    Primitive {
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            deserialize_with = "deserialize_present"
        )]
        value: Option<Value>,
    },
    Object {
        path: Path,
        keys: Vec<String>,
    },
    Function {
        path: Path,
        keys: Vec<String>,
    },
    ObjectLiteral {
        value: String,
    },
}

fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl WireValue {
    pub fn undefined() -> Self {
        WireValue::Primitive { value: None }
    }

    pub fn primitive(value: Value) -> Self {
        WireValue::Primitive { value: Some(value) }
    }

    pub fn object(path: Path, keys: Vec<String>) -> Self {
        WireValue::Object { path, keys }
    }

    pub fn function(path: Path, keys: Vec<String>) -> Self {
        WireValue::Function { path, keys }
    }

    pub fn object_literal(value: impl Into<String>) -> Self {
        WireValue::ObjectLiteral {
            value: value.into(),
        }
    }

    /// The `type` tag this value serializes with
    pub fn type_name(&self) -> &'static str {
        match self {
            WireValue::Primitive { .. } => "primitive",
            WireValue::Object { .. } => "object",
            WireValue::Function { .. } => "function",
            WireValue::ObjectLiteral { .. } => "object-literal",
        }
    }

    /// Path of a live reference
    pub fn path(&self) -> Option<&Path> {
        match self {
            WireValue::Object { path, .. } | WireValue::Function { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Interface keys of a live reference
    pub fn keys(&self) -> &[String] {
        match self {
            WireValue::Object { keys, .. } | WireValue::Function { keys, .. } => keys,
            _ => &[],
        }
    }

    /// Validate and read a wire value from parsed JSON
    ///
    /// The tag is checked before anything else so an unrecognized tag is always
    /// reported as [`WireError::UnknownType`], never as a generic shape error.
    pub fn from_json(json: Value) -> WireResult<Self> {
        let object = json
            .as_object()
            .ok_or_else(|| WireError::Malformed(format!("expected an object, got {}", json)))?;

        match object.get("type") {
            None => return Err(WireError::MissingType),
            Some(Value::String(tag)) if KNOWN_TAGS.contains(&tag.as_str()) => {}
            Some(Value::String(tag)) => return Err(WireError::UnknownType(tag.clone())),
            Some(other) => return Err(WireError::UnknownType(other.to_string())),
        }

        let wire: WireValue =
            serde_json::from_value(json).map_err(|e| WireError::Malformed(e.to_string()))?;

        if let WireValue::Primitive {
            value: Some(v @ (Value::Array(_) | Value::Object(_))),
        } = &wire
        {
            return Err(WireError::NonPrimitive(v.to_string()));
        }

        Ok(wire)
    }

    /// Validate and read a wire value from JSON text
    pub fn from_json_str(text: &str) -> WireResult<Self> {
        Self::from_json(serde_json::from_str(text)?)
    }

    /// Validate and read a JSON array of wire values
    pub fn list_from_json_str(text: &str) -> WireResult<Vec<Self>> {
        match serde_json::from_str::<Value>(text)? {
            Value::Array(items) => items.into_iter().map(Self::from_json).collect(),
            other => Err(WireError::Malformed(format!(
                "expected an array of wire values, got {}",
                other
            ))),
        }
    }

    pub fn to_json_string(&self) -> WireResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Placeholder for a live host reference inside an object literal
///
/// The placeholder is an ordinary wire object/function value with the
/// [`SENTINEL_MARKER`] flag set, so a JSON round-trip keeps it intact.
pub fn encode_sentinel(path: &Path, keys: &[String], callable: bool) -> Value {
    let mut map = Map::new();
    map.insert(SENTINEL_MARKER.to_string(), Value::Bool(true));
    map.insert(
        "type".to_string(),
        Value::String(if callable { "function" } else { "object" }.to_string()),
    );
    map.insert(
        "path".to_string(),
        Value::Array(
            path.keys()
                .iter()
                .map(|key| match key {
                    PathKey::Index(i) => Value::from(*i),
                    PathKey::Name(name) => Value::String(name.clone()),
                })
                .collect(),
        ),
    );
    map.insert(
        "keys".to_string(),
        Value::Array(keys.iter().cloned().map(Value::String).collect()),
    );
    Value::Object(map)
}

/// Read the path out of a sentinel, if `map` is one
pub fn decode_sentinel(map: &Map<String, Value>) -> WireResult<Option<Path>> {
    if map.get(SENTINEL_MARKER) != Some(&Value::Bool(true)) {
        return Ok(None);
    }
    let path = map
        .get("path")
        .cloned()
        .ok_or_else(|| WireError::Malformed("sentinel without a path".to_string()))?;
    let path: Path =
        serde_json::from_value(path).map_err(|e| WireError::Malformed(e.to_string()))?;
    Ok(Some(path))
}
