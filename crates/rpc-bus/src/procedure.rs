//! The procedure registry.
//!
//! Grounded on `rodengine`'s `ProcedureRegistry` (name -> fn, looked up once
//! per call) and the teacher's `bus::rpc` registry
//! (`OnceLock<Mutex<HashMap<String, mpsc::Sender<...>>>>`) — here the
//! registry is owned by a single `Server` and shared read-only with every
//! `Client` opened against it, so a `parking_lot::RwLock` (cheap uncontended
//! reads) replaces the teacher's `Mutex`.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::CoreError;
use crate::value::{Arity, Value};

/// A registered procedure body, tagged by the arity of its result.
pub enum Procedure {
    Void(Box<dyn Fn(&[Value]) -> Result<(), CoreError> + Send + Sync>),
    One(Box<dyn Fn(&[Value]) -> Result<Value, CoreError> + Send + Sync>),
    Multi(Box<dyn Fn(&[Value]) -> Result<Vec<Value>, CoreError> + Send + Sync>),
}

impl Procedure {
    pub fn void<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), CoreError> + Send + Sync + 'static,
    {
        Procedure::Void(Box::new(f))
    }

    pub fn one<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, CoreError> + Send + Sync + 'static,
    {
        Procedure::One(Box::new(f))
    }

    pub fn multi<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Vec<Value>, CoreError> + Send + Sync + 'static,
    {
        Procedure::Multi(Box::new(f))
    }

    pub fn arity(&self) -> Arity {
        match self {
            Procedure::Void(_) => Arity::Void,
            Procedure::One(_) => Arity::One,
            Procedure::Multi(_) => Arity::Multi,
        }
    }
}

/// Write-once-before-first-use, read-only-thereafter procedure table.
///
/// Nothing in this crate enforces the "before first use" half of that
/// contract beyond documentation — same as the spec's source, registration
/// is a single-phase setup step the caller is trusted to do before spawning
/// any `Client` or driving the server loop.
pub(crate) struct Registry<K> {
    procedures: RwLock<HashMap<K, Arc<Procedure>>>,
}

impl<K> Registry<K>
where
    K: Eq + Hash + Clone + Debug,
{
    pub fn new() -> Self {
        Self {
            procedures: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a procedure under `key`. Panics if `key` is already taken —
    /// per spec §4.1 this is a setup-time, process-abort-class error.
    pub fn register(&self, key: K, procedure: Procedure) {
        let mut map = self.procedures.write();
        if map.contains_key(&key) {
            panic!("rpc-bus: procedure already registered for key {key:?}");
        }
        map.insert(key, Arc::new(procedure));
    }

    pub fn get(&self, key: &K) -> Option<Arc<Procedure>> {
        self.procedures.read().get(key).cloned()
    }

    /// Resolve `key`, validating it matches `expected`. This is where
    /// `NotFound`/`ArityMismatch` get raised for callers (spec §4.2
    /// "Procedure resolution").
    pub fn resolve(&self, key: &K, expected: Arity) -> Result<Arc<Procedure>, CoreError> {
        let procedure = self.get(key).ok_or(CoreError::NotFound)?;
        if procedure.arity() != expected {
            return Err(CoreError::ArityMismatch);
        }
        Ok(procedure)
    }
}
