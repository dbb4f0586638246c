//! Natives installed into the machine's global scope
//!
//! Every entry point takes and returns JSON text, which is all the
//! host <-> machine call convention can carry.

use crate::bridge::CallBridge;
use crate::codec::WireCodec;
use crate::error::{MembraneError, MembraneResult};
use crate::machine::{Machine, NativeFn, GET_NATIVE, LOG_NATIVE, PRAY_NATIVE, SEND_NATIVE};
use heavenly_wire::{Path, WireValue};
use parking_lot::Mutex;
use std::sync::Arc;

/// Host half of the sandbox-facing interface
pub struct Surface {
    codec: WireCodec,
    bridge: CallBridge,
    logs: Mutex<Vec<String>>,
}

impl Surface {
    pub fn new(codec: WireCodec) -> Self {
        let bridge = CallBridge::new(codec.clone());
        Self {
            codec,
            bridge,
            logs: Mutex::new(Vec::new()),
        }
    }

    /// `getFromHeaven(pathJSON) -> valueJSON`
    pub fn get_from_heaven(&self, path_json: &str) -> MembraneResult<String> {
        let path = Path::from_json_str(path_json)?;
        let resolved = self.codec.store().resolve_raw(&path)?;
        let wire = self.codec.encode(&resolved.value, &path);
        tracing::debug!(path = %path, kind = wire.type_name(), "get");
        Ok(wire.to_json_string()?)
    }

    /// `sendToHeaven(pathJSON, valueJSON)`
    pub fn send_to_heaven(&self, path_json: &str, value_json: &str) -> MembraneResult<()> {
        let path = Path::from_json_str(path_json)?;
        let value = self.codec.decode_str(value_json)?;
        tracing::debug!(path = %path, kind = value.type_of(), "send");
        self.codec.store().write_raw(&path, value)
    }

    /// `prayToHeaven(pathJSON, argsJSON) -> resultJSON`
    pub fn pray_to_heaven(&self, path_json: &str, args_json: &str) -> MembraneResult<String> {
        let path = Path::from_json_str(path_json)?;
        let args = WireValue::list_from_json_str(args_json)?;
        let result = self.bridge.call(&path, &args)?;
        Ok(result.to_json_string()?)
    }

    /// `log(...args)`
    pub fn log(&self, args: &[String]) {
        let line = args.join(" ");
        tracing::info!(target: "heavenly::sandbox", "{}", line);
        self.logs.lock().push(line);
    }

    /// Drain the lines logged by the machine so far
    pub fn take_logs(&self) -> Vec<String> {
        std::mem::take(&mut *self.logs.lock())
    }

    /// Register the four natives with `machine`
    pub fn install<M: Machine + ?Sized>(self: &Arc<Self>, machine: &mut M) {
        let surface = Arc::clone(self);
        let get: NativeFn = Arc::new(move |args| {
            expect_args(GET_NATIVE, args, 1)?;
            surface.get_from_heaven(&args[0]).map(Some)
        });

        let surface = Arc::clone(self);
        let send: NativeFn = Arc::new(move |args| {
            expect_args(SEND_NATIVE, args, 2)?;
            surface.send_to_heaven(&args[0], &args[1]).map(|()| None)
        });

        let surface = Arc::clone(self);
        let pray: NativeFn = Arc::new(move |args| {
            expect_args(PRAY_NATIVE, args, 2)?;
            surface.pray_to_heaven(&args[0], &args[1]).map(Some)
        });

        let surface = Arc::clone(self);
        let log: NativeFn = Arc::new(move |args| {
            surface.log(args);
            Ok(None)
        });

        machine.register_native(GET_NATIVE, get);
        machine.register_native(SEND_NATIVE, send);
        machine.register_native(PRAY_NATIVE, pray);
        machine.register_native(LOG_NATIVE, log);
    }
}

fn expect_args(native: &str, args: &[String], expected: usize) -> MembraneResult<()> {
    if args.len() < expected {
        return Err(MembraneError::Arity {
            native: native.to_string(),
            expected,
            got: args.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PathStore;
    use crate::value::{number_arg, HostValue, ObjectRef};

    fn surface() -> Surface {
        let store = Arc::new(PathStore::new());
        store.root().set(
            "config",
            HostValue::Object(ObjectRef::plain().with("theme", "dark")),
        );
        store.root().set(
            "add",
            HostValue::function("add", |_, args| {
                Ok(HostValue::from(number_arg(args, 0, "add")? + number_arg(args, 1, "add")?))
            }),
        );
        Surface::new(WireCodec::new(store))
    }

    #[test]
    fn test_get_from_heaven() {
        let surface = surface();
        assert_eq!(
            surface.get_from_heaven(r#"["config","theme"]"#).unwrap(),
            r#"{"type":"primitive","value":"dark"}"#
        );
        assert_eq!(
            surface.get_from_heaven(r#"["config"]"#).unwrap(),
            r#"{"type":"object","path":["config"],"keys":["theme"]}"#
        );
        assert_eq!(
            surface.get_from_heaven(r#"["add"]"#).unwrap(),
            r#"{"type":"function","path":["add"],"keys":[]}"#
        );
    }

    #[test]
    fn test_send_to_heaven() {
        let surface = surface();
        surface
            .send_to_heaven(r#"["config","theme"]"#, r#"{"type":"primitive","value":"light"}"#)
            .unwrap();
        assert_eq!(
            surface.get_from_heaven(r#"["config","theme"]"#).unwrap(),
            r#"{"type":"primitive","value":"light"}"#
        );

        let err = surface
            .send_to_heaven(r#"["config","theme"]"#, r#"{"type":"bogus"}"#)
            .unwrap_err();
        assert_eq!(err, MembraneError::UnknownWireType("bogus".to_string()));
    }

    #[test]
    fn test_pray_to_heaven() {
        let surface = surface();
        let result = surface
            .pray_to_heaven(
                r#"["add"]"#,
                r#"[{"type":"primitive","value":2},{"type":"primitive","value":3}]"#,
            )
            .unwrap();
        assert_eq!(result, r#"{"type":"primitive","value":5}"#);
    }

    #[test]
    fn test_bad_path_json() {
        let surface = surface();
        assert!(matches!(
            surface.get_from_heaven("not json").unwrap_err(),
            MembraneError::Wire(_)
        ));
    }

    #[test]
    fn test_logs_are_collected() {
        let surface = surface();
        surface.log(&["hello".to_string(), "world".to_string()]);
        assert_eq!(surface.take_logs(), vec!["hello world".to_string()]);
        assert!(surface.take_logs().is_empty());
    }
}
