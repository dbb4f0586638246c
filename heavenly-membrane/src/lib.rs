//! Heavenly Membrane - Object membrane between a host and a sandboxed machine
//!
//! Code running inside an untrusted interpreter (the *machine*) never holds a
//! host object directly. It holds **paths** into a store owned by the host
//! (*heaven*), and every read, write and call crosses the boundary as a small
//! JSON wire value. This crate is the host half of that boundary:
//!
//! - **Host values**: a dynamic object graph with shared handles and
//!   transparent function binding
//! - **Path store**: path resolution, writes and synthetic key minting
//! - **Wire codec**: host value <-> wire value, including object-literal
//!   rehydration
//! - **Call bridge**: machine -> host function calls
//! - **Procedure exporter**: host -> machine procedure calls
//! - **Surface**: the `getFromHeaven` / `sendToHeaven` / `prayToHeaven` /
//!   `log` natives installed into the machine
//!
//! ## Example
//!
//! ```rust,ignore
//! use heavenly_membrane::{compile, HostValue};
//!
//! let add = HostValue::function("add", |_, args| {
//!     Ok(HostValue::from(args[0].as_number().unwrap_or(0.0) + args[1].as_number().unwrap_or(0.0)))
//! });
//!
//! let compiled = compile(
//!     machine,
//!     &["add"],
//!     &[add],
//!     "function report(a, b) { log(add(a, b)) }",
//!     &["report"],
//! )?;
//! compiled.call("report", &HostValue::Undefined, &[2.into(), 3.into()])?;
//! ```
//!
//! ## Limitations
//!
//! - Registered values are never reclaimed for the life of a session.
//! - Exported procedures do not return values to the host.
//! - Calling back into the machine while it is running fails with
//!   [`MembraneError::Reentrant`].

pub mod bridge;
pub mod codec;
pub mod codegen;
pub mod error;
pub mod exporter;
pub mod interface;
pub mod machine;
pub mod rehydrate;
pub mod session;
pub mod store;
pub mod surface;
pub mod value;

pub use bridge::CallBridge;

pub use codec::WireCodec;

pub use codegen::{is_identifier, ArgBinding, ProcedureCall, SourceEmitter, LINK_FUNCTION, LINK_OBJECT};

pub use error::{MembraneError, MembraneResult};

pub use exporter::{ExportedProcedure, ProcedureExporter};

pub use interface::{InterfaceEnumerator, OwnKeysEnumerator, PrototypeChainEnumerator};

pub use machine::{Machine, NativeFn, GET_NATIVE, LOG_NATIVE, PRAY_NATIVE, SEND_NATIVE};

pub use rehydrate::rehydrate;

pub use session::{compile, compile_with, Compiled, Session, SessionOptions};

pub use store::{PathStore, Resolved};

pub use surface::Surface;

pub use value::{arg, number_arg, FunctionRef, HostValue, NativeCallable, ObjectClass, ObjectRef};

pub use heavenly_wire::{Path, PathKey, WireValue};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_store_and_codec_share_state() {
        let store = std::sync::Arc::new(PathStore::new());
        let codec = WireCodec::new(store.clone());
        store
            .root()
            .set("greeting", HostValue::from("hello"));

        let wire = codec.encode(
            &store.resolve_raw(&Path::from(["greeting"])).unwrap().value,
            &Path::from(["greeting"]),
        );
        assert_eq!(wire, WireValue::primitive(json!("hello")));
    }

    #[test]
    fn test_string_length_is_reachable() {
        let store = PathStore::new();
        store.root().set("name", HostValue::from("heaven"));
        let length = store
            .resolve_raw(&Path::from(["name", "length"]))
            .unwrap()
            .value;
        assert_eq!(length, HostValue::from(6));
    }

    #[test]
    fn test_bridge_and_surface_agree() {
        let store = std::sync::Arc::new(PathStore::new());
        store.root().set(
            "double",
            HostValue::function("double", |_, args| {
                Ok(HostValue::from(number_arg(args, 0, "double")? * 2.0))
            }),
        );
        let codec = WireCodec::new(store);
        let bridge = CallBridge::new(codec.clone());
        let surface = Surface::new(codec);

        let direct = bridge
            .call(&Path::from(["double"]), &[WireValue::primitive(json!(21))])
            .unwrap();
        let via_surface = surface
            .pray_to_heaven(r#"["double"]"#, r#"[{"type":"primitive","value":21}]"#)
            .unwrap();
        assert_eq!(direct.to_json_string().unwrap(), via_surface);
        assert_eq!(via_surface, r#"{"type":"primitive","value":42}"#);
    }
}
