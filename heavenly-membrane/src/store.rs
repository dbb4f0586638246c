//! Path-addressed data store
//!
//! The store owns the root of the host object graph for one session. Every
//! reference the machine holds is a path into this root. Entries minted under
//! synthetic keys are never removed or renumbered, so a path handed out once
//! stays resolvable for the rest of the session.

use crate::error::{MembraneError, MembraneResult};
use crate::value::{HostValue, ObjectRef};
use heavenly_wire::{Path, PathKey};
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix for objects returned from host calls
pub const RETURN_PREFIX: &str = "_retobj";
/// Prefix for object arguments passed into sandbox procedures
pub const ARG_OBJECT_PREFIX: &str = "_argobj";
/// Prefix for function arguments passed into sandbox procedures
pub const ARG_FUNCTION_PREFIX: &str = "_argfun";
/// Prefix for sandbox-side locals bound to procedure arguments
pub const LOCAL_PREFIX: &str = "_arg";
/// Prefix for values linked at compile time
pub const GLOBAL_PREFIX: &str = "_global_";
/// Root key holding the receiver of the current exported procedure call
pub const THIS_KEY: &str = "g_this";

/// Result of walking a path: the value and its immediate parent
#[derive(Debug, Clone)]
pub struct Resolved {
    pub value: HostValue,
    pub receiver: HostValue,
}

/// Root object graph plus the synthetic key counter
#[derive(Debug)]
pub struct PathStore {
    root: ObjectRef,
    next_id: AtomicU64,
}

impl PathStore {
    pub fn new() -> Self {
        Self::with_root(ObjectRef::plain())
    }

    pub fn with_root(root: ObjectRef) -> Self {
        Self {
            root,
            next_id: AtomicU64::new(0),
        }
    }

    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    /// Walk `path` from the root
    ///
    /// Functions come back bound to their receiver, so invoking the result
    /// later keeps the natural `this`. A missing final key reads as
    /// `undefined`; reading through a missing intermediate is a path error.
    pub fn resolve_raw(&self, path: &Path) -> MembraneResult<Resolved> {
        let (last, parents) = path.split_last().ok_or(MembraneError::EmptyPath)?;
        let receiver = self.walk(path, parents)?;
        let value = Self::step(path, &receiver, last)?;

        let value = match value {
            HostValue::Function(f) => HostValue::Function(f.bind(receiver.clone())),
            other => other,
        };

        tracing::trace!(path = %path, kind = value.type_of(), "Resolved path");
        Ok(Resolved { value, receiver })
    }

    /// Assign `value` at `path`; the parent of the final key must exist
    pub fn write_raw(&self, path: &Path, value: HostValue) -> MembraneResult<()> {
        let (last, parents) = path.split_last().ok_or(MembraneError::EmptyPath)?;
        let parent = self.walk(path, parents)?;
        let key = last.as_key();

        if parent.set_property(&key, value) {
            tracing::trace!(path = %path, "Wrote path");
            Ok(())
        } else {
            Err(MembraneError::Path {
                path: path.clone(),
                key,
            })
        }
    }

    /// Whether every key along `path` names an existing member
    ///
    /// Unlike [`PathStore::resolve_raw`], a missing final key counts as absent.
    pub fn contains(&self, path: &Path) -> bool {
        let Some((last, parents)) = path.split_last() else {
            return false;
        };
        self.walk(path, parents)
            .map(|parent| parent.has_property(&last.as_key()))
            .unwrap_or(false)
    }

    /// Next unique synthetic name with the given prefix
    ///
    /// The counter is shared by every prefix, so names never collide within a
    /// session.
    pub fn next_synthetic(&self, prefix: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{}{}", prefix, id)
    }

    /// Register `value` under a fresh root-level key and return its path
    pub fn mint(&self, prefix: &str, value: HostValue) -> MembraneResult<Path> {
        let key = self.next_synthetic(prefix);
        let path = Path::root_key(key);
        self.write_raw(&path, value)?;
        tracing::debug!(path = %path, "Minted synthetic key");
        Ok(path)
    }

    /// Number of synthetic names handed out so far
    pub fn minted(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    fn walk(&self, path: &Path, keys: &[PathKey]) -> MembraneResult<HostValue> {
        let mut current = HostValue::Object(self.root.clone());
        for key in keys {
            current = Self::step(path, &current, key)?;
        }
        Ok(current)
    }

    fn step(path: &Path, current: &HostValue, key: &PathKey) -> MembraneResult<HostValue> {
        let key = key.as_key();
        current
            .get_property(&key)
            .ok_or_else(|| MembraneError::Path {
                path: path.clone(),
                key,
            })
    }
}

impl Default for PathStore {
    fn default() -> Self {
        Self::new()
    }
}
