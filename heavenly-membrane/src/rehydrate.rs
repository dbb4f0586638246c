//! Object-literal rehydration
//!
//! A literal built by the machine may mix plain data with several live host
//! references. Those references travel as sentinel placeholders; this module
//! rebuilds the literal as fresh host objects and swaps each placeholder for
//! the value it names. JSON cannot express cycles, so the recursion always
//! terminates.

use crate::error::MembraneResult;
use crate::store::PathStore;
use crate::value::{HostValue, ObjectRef};
use heavenly_wire::decode_sentinel;
use serde_json::Value;

/// Rebuild `literal` as host values, resolving embedded references
pub fn rehydrate(store: &PathStore, literal: &Value) -> MembraneResult<HostValue> {
    match literal {
        Value::Object(map) => {
            if let Some(path) = decode_sentinel(map)? {
                tracing::trace!(path = %path, "Rehydrating embedded reference");
                return Ok(store.resolve_raw(&path)?.value);
            }
            let obj = ObjectRef::plain();
            for (key, value) in map {
                obj.set(key.clone(), rehydrate(store, value)?);
            }
            Ok(HostValue::Object(obj))
        }
        Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| rehydrate(store, item))
                .collect::<MembraneResult<Vec<_>>>()?;
            Ok(HostValue::Object(ObjectRef::array(items)))
        }
        primitive => Ok(HostValue::from_json(primitive)),
    }
}
