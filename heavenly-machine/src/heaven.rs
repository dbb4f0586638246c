//! Sandbox half of the membrane
//!
//! Converts sandbox values to and from wire values. Proxies travel as
//! references; sandbox arrays and objects travel as object literals with any
//! proxies inside them replaced by sentinels. Sandbox functions never cross.

use crate::error::{MachineError, Result, Span};
use crate::value::{Proxy, Value};
use heavenly_membrane::value::number_to_json;
use heavenly_membrane::MembraneError;
use heavenly_wire::{decode_sentinel, encode_sentinel, Path, PathKey, WireValue};
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};
use std::sync::Arc;

/// Literals nested deeper than this are assumed to be cyclic
const MAX_LITERAL_DEPTH: usize = 64;

/// Wire form of a value passed to the host
pub fn to_wire(value: &Value, span: Span) -> Result<WireValue> {
    let wire = match value {
        Value::Undefined => WireValue::undefined(),
        Value::Null => WireValue::primitive(Json::Null),
        Value::Bool(b) => WireValue::primitive(Json::Bool(*b)),
        Value::Number(n) => WireValue::primitive(number_to_json(*n)),
        Value::String(s) => WireValue::primitive(Json::String(s.clone())),
        Value::Proxy(proxy) if proxy.callable => {
            WireValue::function(proxy.path.clone(), proxy.keys.clone())
        }
        Value::Proxy(proxy) => WireValue::object(proxy.path.clone(), proxy.keys.clone()),
        Value::Array(_) | Value::Object(_) => {
            let literal = to_literal(value, span, 0)?;
            WireValue::object_literal(literal.to_string())
        }
        Value::Closure(_) | Value::Native(_) => {
            return Err(MachineError::type_error(
                span,
                "sandbox functions cannot be passed to the host",
            ))
        }
    };
    Ok(wire)
}

/// JSON for a literal, with proxies as sentinels
fn to_literal(value: &Value, span: Span, depth: usize) -> Result<Json> {
    if depth > MAX_LITERAL_DEPTH {
        return Err(MachineError::type_error(
            span,
            "literal is nested too deeply (cyclic structure?)",
        ));
    }

    let json = match value {
        Value::Undefined | Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => number_to_json(*n),
        Value::String(s) => Json::String(s.clone()),
        Value::Proxy(proxy) => encode_sentinel(&proxy.path, &proxy.keys, proxy.callable),
        Value::Array(items) => {
            let items = items.read().clone();
            Json::Array(
                items
                    .iter()
                    .map(|item| to_literal(item, span, depth + 1))
                    .collect::<Result<Vec<_>>>()?,
            )
        }
        Value::Object(props) => {
            let props = props.read().clone();
            let mut map = Map::new();
            for (key, item) in props.iter() {
                if matches!(item, Value::Undefined) {
                    continue;
                }
                map.insert(key.clone(), to_literal(item, span, depth + 1)?);
            }
            Json::Object(map)
        }
        Value::Closure(_) | Value::Native(_) => {
            return Err(MachineError::type_error(
                span,
                "sandbox functions cannot be passed to the host",
            ))
        }
    };
    Ok(json)
}

/// Sandbox value for a wire value received from the host
pub fn from_wire(wire: WireValue, span: Span) -> Result<Value> {
    match wire {
        WireValue::Primitive { value: None } => Ok(Value::Undefined),
        WireValue::Primitive { value: Some(json) } => Ok(from_primitive(&json)),
        WireValue::Object { path, keys } => Ok(proxy(path, keys, false)),
        WireValue::Function { path, keys } => Ok(proxy(path, keys, true)),
        WireValue::ObjectLiteral { value } => {
            let json: Json = serde_json::from_str(&value).map_err(|e| native(span, e.into()))?;
            from_literal(&json, span)
        }
    }
}

/// Parse and validate wire JSON produced by a native
pub fn parse_wire(text: &str, span: Span) -> Result<Value> {
    let wire = WireValue::from_json_str(text).map_err(|e| native(span, e.into()))?;
    from_wire(wire, span)
}

fn from_literal(json: &Json, span: Span) -> Result<Value> {
    match json {
        Json::Object(map) => {
            if let Some(path) = decode_sentinel(map).map_err(|e| native(span, e.into()))? {
                let keys = map
                    .get("keys")
                    .and_then(Json::as_array)
                    .map(|keys| {
                        keys.iter()
                            .filter_map(|k| k.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                let callable = map.get("type").and_then(Json::as_str) == Some("function");
                return Ok(proxy(path, keys, callable));
            }
            let mut props = IndexMap::new();
            for (key, item) in map {
                props.insert(key.clone(), from_literal(item, span)?);
            }
            Ok(Value::object(props))
        }
        Json::Array(items) => Ok(Value::array(
            items
                .iter()
                .map(|item| from_literal(item, span))
                .collect::<Result<Vec<_>>>()?,
        )),
        primitive => Ok(from_primitive(primitive)),
    }
}

fn from_primitive(json: &Json) -> Value {
    match json {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        Json::String(s) => Value::String(s.clone()),
        _ => Value::Null,
    }
}

fn proxy(path: Path, keys: Vec<String>, callable: bool) -> Value {
    Value::Proxy(Arc::new(Proxy::new(path, keys, callable)))
}

fn native(span: Span, error: MembraneError) -> MachineError {
    MachineError::NativeError { span, error }
}

/// Read a path argument of `linkHeavenlyObject` / `linkHeavenlyFunction`
pub fn path_from_value(value: &Value, span: Span) -> Result<Path> {
    let items = match value {
        Value::Array(items) => items.read().clone(),
        other => {
            return Err(MachineError::type_error(
                span,
                format!("expected a path array, got {}", other.type_of()),
            ))
        }
    };

    let keys = items
        .iter()
        .map(|item| match item {
            Value::String(s) => Ok(PathKey::Name(s.clone())),
            Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Ok(PathKey::Index(*n as u64)),
            other => Err(MachineError::type_error(
                span,
                format!("path segments must be strings or indices, got {:?}", other),
            )),
        })
        .collect::<Result<Vec<_>>>()?;

    if keys.is_empty() {
        return Err(MachineError::type_error(span, "path must not be empty"));
    }
    Ok(Path::new(keys))
}

/// Read the interface key list of a link call
pub fn keys_from_value(value: &Value, span: Span) -> Result<Vec<String>> {
    match value {
        Value::Undefined => Ok(Vec::new()),
        Value::Array(items) => Ok(items.read().iter().map(Value::to_display).collect()),
        other => Err(MachineError::type_error(
            span,
            format!("expected a key array, got {}", other.type_of()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitive_wire_values() {
        let span = Span::default();
        assert_eq!(
            to_wire(&Value::Number(5.0), span).unwrap(),
            WireValue::primitive(json!(5))
        );
        assert_eq!(to_wire(&Value::Undefined, span).unwrap(), WireValue::undefined());
        assert_eq!(
            from_wire(WireValue::primitive(json!("x")), span).unwrap(),
            Value::string("x")
        );
    }

    #[test]
    fn test_proxy_wire_values() {
        let span = Span::default();
        let wire = WireValue::function(Path::from(["_retobj0", "inc"]), vec![]);
        let value = from_wire(wire.clone(), span).unwrap();
        assert_eq!(value.type_of(), "function");
        assert_eq!(to_wire(&value, span).unwrap(), wire);
    }

    #[test]
    fn test_literal_embeds_sentinels() {
        let span = Span::default();
        let widget = proxy(Path::from(["_global_widget"]), vec!["id".to_string()], false);
        let mut props = IndexMap::new();
        props.insert("a".to_string(), Value::Number(1.0));
        props.insert("skip".to_string(), Value::Undefined);
        props.insert("list".to_string(), Value::array(vec![widget, Value::Undefined]));

        let wire = to_wire(&Value::object(props), span).unwrap();
        let text = match &wire {
            WireValue::ObjectLiteral { value } => value.clone(),
            other => panic!("expected literal, got {:?}", other),
        };
        let json: Json = serde_json::from_str(&text).unwrap();
        assert_eq!(
            json,
            json!({
                "a": 1,
                "list": [
                    {"__heavenly": true, "type": "object", "path": ["_global_widget"], "keys": ["id"]},
                    null
                ]
            })
        );

        let back = from_wire(wire, span).unwrap();
        match back {
            Value::Object(props) => {
                let list = props.read().get("list").cloned().unwrap();
                match list {
                    Value::Array(items) => {
                        assert!(matches!(items.read()[0], Value::Proxy(_)))
                    }
                    other => panic!("expected array, got {:?}", other),
                }
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_cyclic_literal_is_rejected() {
        let span = Span::default();
        let items = Value::array(vec![]);
        if let Value::Array(inner) = &items {
            inner.write().push(items.clone());
        }
        assert!(matches!(
            to_wire(&items, span).unwrap_err(),
            MachineError::TypeError { .. }
        ));
        if let Value::Array(inner) = &items {
            inner.write().clear();
        }
    }

    #[test]
    fn test_bogus_wire_keeps_membrane_error() {
        let err = parse_wire(r#"{"type":"bogus"}"#, Span::default()).unwrap_err();
        assert_eq!(
            err,
            MachineError::NativeError {
                span: Span::default(),
                error: MembraneError::UnknownWireType("bogus".to_string()),
            }
        );
    }

    #[test]
    fn test_link_arguments() {
        let span = Span::default();
        let path = Value::array(vec![Value::string("a"), Value::Number(0.0)]);
        assert_eq!(
            path_from_value(&path, span).unwrap(),
            Path::new(vec!["a".into(), 0u64.into()])
        );
        assert!(path_from_value(&Value::array(vec![]), span).is_err());
        assert_eq!(
            keys_from_value(&Value::array(vec![Value::string("x")]), span).unwrap(),
            vec!["x".to_string()]
        );
    }
}
