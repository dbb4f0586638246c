//! Sandbox -> host call forwarding

use crate::codec::WireCodec;
use crate::error::{MembraneError, MembraneResult};
use crate::store::{PathStore, RETURN_PREFIX};
use crate::value::HostValue;
use heavenly_wire::{Path, WireValue};
use std::sync::Arc;

/// Invokes host functions on behalf of the machine
#[derive(Clone)]
pub struct CallBridge {
    codec: WireCodec,
}

impl CallBridge {
    pub fn new(codec: WireCodec) -> Self {
        Self { codec }
    }

    fn store(&self) -> &Arc<PathStore> {
        self.codec.store()
    }

    /// Call the function at `path` with wire-encoded arguments
    ///
    /// Primitive results are encoded against the called path. Anything else is
    /// registered under a fresh `_retobj<N>` key so the machine can keep
    /// referring to it. Errors raised by the host function are returned as-is.
    pub fn call(&self, path: &Path, args: &[WireValue]) -> MembraneResult<WireValue> {
        let resolved = self.store().resolve_raw(path)?;
        let function = match &resolved.value {
            HostValue::Function(f) => f.clone(),
            _ => return Err(MembraneError::NotCallable(path.clone())),
        };

        let raw_args = args
            .iter()
            .map(|wire| self.codec.decode(wire).map(unwrap_bound))
            .collect::<MembraneResult<Vec<_>>>()?;

        tracing::debug!(path = %path, argc = raw_args.len(), "Calling host function");
        let result = function.call(&resolved.receiver, &raw_args)?;

        if result.is_primitive() {
            return Ok(self.codec.encode(&result, path));
        }

        let result_path = self.store().mint(RETURN_PREFIX, result.clone())?;
        Ok(self.codec.encode(&result, &result_path))
    }
}

/// Strip the binding added when a function was fetched through the store
///
/// A method fetched earlier comes back bound to its original receiver. When
/// it is handed back as an argument, the callee must see the function itself
/// so it can pick the receiver.
fn unwrap_bound(value: HostValue) -> HostValue {
    match value {
        HostValue::Function(f) if f.is_bound() => HostValue::Function(f.unbound()),
        other => other,
    }
}
