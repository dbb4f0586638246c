//! Host value <-> wire value conversion

use crate::error::MembraneResult;
use crate::interface::{InterfaceEnumerator, PrototypeChainEnumerator};
use crate::rehydrate::rehydrate;
use crate::store::PathStore;
use crate::value::HostValue;
use heavenly_wire::{Path, WireValue};
use serde_json::Value;
use std::sync::Arc;

/// Encoder/decoder bound to one session's store
#[derive(Clone)]
pub struct WireCodec {
    store: Arc<PathStore>,
    enumerator: Arc<dyn InterfaceEnumerator>,
}

impl WireCodec {
    pub fn new(store: Arc<PathStore>) -> Self {
        Self::with_enumerator(store, Arc::new(PrototypeChainEnumerator))
    }

    pub fn with_enumerator(store: Arc<PathStore>, enumerator: Arc<dyn InterfaceEnumerator>) -> Self {
        Self { store, enumerator }
    }

    pub fn store(&self) -> &Arc<PathStore> {
        &self.store
    }

    /// Interface keys for `value` under the configured enumerator
    pub fn interface(&self, value: &HostValue) -> Vec<String> {
        self.enumerator.enumerate(value)
    }

    /// Encode `value`, which lives (or nominally lives) at `path`
    pub fn encode(&self, value: &HostValue, path: &Path) -> WireValue {
        match value {
            HostValue::Function(_) => WireValue::function(path.clone(), self.interface(value)),
            HostValue::Object(_) => WireValue::object(path.clone(), self.interface(value)),
            primitive => WireValue::Primitive {
                value: primitive.to_primitive_json(),
            },
        }
    }

    /// Decode a validated wire value into a live host value
    pub fn decode(&self, wire: &WireValue) -> MembraneResult<HostValue> {
        match wire {
            WireValue::Primitive { value } => Ok(HostValue::from_primitive_json(value.as_ref())),
            WireValue::Object { path, .. } | WireValue::Function { path, .. } => {
                Ok(self.store.resolve_raw(path)?.value)
            }
            WireValue::ObjectLiteral { value } => {
                let literal: Value = serde_json::from_str(value)?;
                rehydrate(&self.store, &literal)
            }
        }
    }

    /// Decode from parsed JSON, rejecting unknown tags
    pub fn decode_json(&self, json: Value) -> MembraneResult<HostValue> {
        let wire = WireValue::from_json(json)?;
        self.decode(&wire)
    }

    /// Decode from JSON text, rejecting unknown tags
    pub fn decode_str(&self, text: &str) -> MembraneResult<HostValue> {
        let wire = WireValue::from_json_str(text)?;
        self.decode(&wire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MembraneError;
    use crate::interface::OwnKeysEnumerator;
    use crate::value::ObjectRef;
    use serde_json::json;

    fn codec() -> WireCodec {
        let store = Arc::new(PathStore::new());
        let proto = ObjectRef::plain().with("inherited", 1);
        store.root().set(
            "widget",
            HostValue::Object(ObjectRef::with_prototype(proto).with("size", 2)),
        );
        WireCodec::new(store)
    }

    #[test]
    fn test_primitives_round_trip() {
        let codec = codec();
        let path = Path::from(["anything"]);
        for value in [
            HostValue::Undefined,
            HostValue::Null,
            HostValue::from(true),
            HostValue::from(-12.5),
            HostValue::from(7),
            HostValue::from("text"),
        ] {
            let wire = codec.encode(&value, &path);
            assert_eq!(codec.decode(&wire).unwrap(), value);
        }
    }

    #[test]
    fn test_encode_object_lists_interface() {
        let codec = codec();
        let path = Path::from(["widget"]);
        let widget = codec.store().resolve_raw(&path).unwrap().value;
        assert_eq!(
            codec.encode(&widget, &path),
            WireValue::object(path.clone(), vec!["size".into(), "inherited".into()])
        );

        let narrow = WireCodec::with_enumerator(codec.store().clone(), Arc::new(OwnKeysEnumerator));
        assert_eq!(narrow.encode(&widget, &path).keys(), &["size".to_string()]);
    }

    #[test]
    fn test_encode_function() {
        let codec = codec();
        let f = HostValue::function("f", |_, _| Ok(HostValue::Null));
        let wire = codec.encode(&f, &Path::from(["f"]));
        assert_eq!(wire.type_name(), "function");
    }

    #[test]
    fn test_decode_reference_resolves_live_value() {
        let codec = codec();
        let wire = WireValue::object(Path::from(["widget"]), vec![]);
        let decoded = codec.decode(&wire).unwrap();
        let original = codec.store().root().get("widget");
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_object_literal() {
        let codec = codec();
        let literal = json!({
            "a": 1,
            "w": {"__heavenly": true, "type": "object", "path": ["widget"], "keys": []}
        });
        let wire = WireValue::object_literal(literal.to_string());
        let decoded = codec.decode(&wire).unwrap();
        let obj = decoded.as_object().unwrap();
        assert_eq!(obj.get("a"), HostValue::from(1));
        assert_eq!(obj.get("w"), codec.store().root().get("widget"));
    }

    #[test]
    fn test_decode_rejects_unknown_tag() {
        let codec = codec();
        let err = codec.decode_json(json!({"type": "bogus"})).unwrap_err();
        assert_eq!(err, MembraneError::UnknownWireType("bogus".to_string()));

        let err = codec.decode_str(r#"{"type":"bogus","value":1}"#).unwrap_err();
        assert!(matches!(err, MembraneError::UnknownWireType(_)));
    }

    #[test]
    fn test_decode_missing_reference_fails() {
        let codec = codec();
        let wire = WireValue::object(Path::from(["nothing", "here"]), vec![]);
        assert!(matches!(
            codec.decode(&wire).unwrap_err(),
            MembraneError::Path { .. }
        ));
    }
}
