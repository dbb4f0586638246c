//! Interface enumeration
//!
//! The keys sent alongside an object or function reference tell the machine
//! which members it may ask for. The default enumerator is deliberately
//! permissive: it exposes own keys plus every key along the prototype chain.
//! Reachability of objects is what the membrane confines, not member
//! visibility. Swap in a narrower enumerator to restrict the latter.

use crate::value::HostValue;
use indexmap::IndexSet;

/// Strategy producing the interface keys of a host value
pub trait InterfaceEnumerator: Send + Sync {
    fn enumerate(&self, value: &HostValue) -> Vec<String>;
}

/// Own keys, synthetic `length` for indexed objects, then prototype keys
#[derive(Debug, Clone, Copy, Default)]
pub struct PrototypeChainEnumerator;

impl InterfaceEnumerator for PrototypeChainEnumerator {
    fn enumerate(&self, value: &HostValue) -> Vec<String> {
        let mut keys = IndexSet::new();
        let mut proto = match value {
            HostValue::Object(obj) => {
                keys.extend(obj.own_keys());
                if obj.class().is_indexed() {
                    keys.insert("length".to_string());
                }
                obj.prototype().cloned()
            }
            HostValue::Function(f) => {
                keys.extend(f.own_keys());
                f.prototype()
            }
            _ => None,
        };
        while let Some(current) = proto {
            keys.extend(current.own_keys());
            proto = current.prototype().cloned();
        }
        keys.into_iter().collect()
    }
}

/// Own keys only (plus `length` for indexed objects)
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnKeysEnumerator;

impl InterfaceEnumerator for OwnKeysEnumerator {
    fn enumerate(&self, value: &HostValue) -> Vec<String> {
        match value {
            HostValue::Object(obj) => {
                let mut keys = obj.own_keys();
                if obj.class().is_indexed() && !keys.iter().any(|k| k == "length") {
                    keys.push("length".to_string());
                }
                keys
            }
            HostValue::Function(f) => f.own_keys(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{FunctionRef, ObjectRef};

    fn instance() -> HostValue {
        let base = ObjectRef::plain().with("toString", "base");
        let class = ObjectRef::new(crate::value::ObjectClass::Plain, Some(base))
            .with("render", "method")
            .with("toString", "override");
        HostValue::Object(ObjectRef::with_prototype(class).with("width", 10))
    }

    #[test]
    fn test_prototype_chain_keys() {
        let keys = PrototypeChainEnumerator.enumerate(&instance());
        assert_eq!(keys, vec!["width", "render", "toString"]);
    }

    #[test]
    fn test_own_keys_only() {
        let keys = OwnKeysEnumerator.enumerate(&instance());
        assert_eq!(keys, vec!["width"]);
    }

    #[test]
    fn test_arrays_expose_length() {
        let arr = HostValue::Object(ObjectRef::array(vec![HostValue::from(1)]));
        assert_eq!(PrototypeChainEnumerator.enumerate(&arr), vec!["0", "length"]);
        assert_eq!(OwnKeysEnumerator.enumerate(&arr), vec!["0", "length"]);

        let typed = HostValue::Object(ObjectRef::typed_array(&[1.0, 2.0]));
        assert_eq!(
            PrototypeChainEnumerator.enumerate(&typed),
            vec!["0", "1", "length"]
        );
    }

    #[test]
    fn test_functions_and_primitives() {
        let f = HostValue::Function(
            FunctionRef::native("f", |_, _| Ok(HostValue::Undefined)).with("meta", true),
        );
        assert_eq!(PrototypeChainEnumerator.enumerate(&f), vec!["meta"]);
        assert!(PrototypeChainEnumerator.enumerate(&HostValue::from(1)).is_empty());
    }

    #[test]
    fn test_function_prototype_keys() {
        let statics = ObjectRef::plain().with("apply", "shared").with("meta", "shadowed");
        let f = FunctionRef::native_with_prototype("f", Some(statics), |_, _| {
            Ok(HostValue::Undefined)
        })
        .with("meta", true);
        let bound = HostValue::Function(f.bind(HostValue::Undefined));

        assert_eq!(PrototypeChainEnumerator.enumerate(&bound), vec!["meta", "apply"]);
        assert_eq!(OwnKeysEnumerator.enumerate(&bound), vec!["meta"]);
    }
}
