//! Method registry: global, case-sensitive method namespace.
//!
//! Populated during the registration phase only. Once the server is shared
//! with the dispatch thread it is reachable through `&self` alone, so the
//! table is immutable while serving and lookups take no lock.
//!
//! Duplicate names are **rejected**: the first service to claim a name
//! keeps it, and the later registration fails as a startup error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::error;
use serde_json::Value;

use super::message::RpcError;
use crate::error::RegistryError;

/// Invocation function for one method.
pub type RpcMethod = Arc<dyn Fn(&Value) -> Result<Value, RpcError> + Send + Sync>;

/// One row of the registry.
#[derive(Clone)]
pub struct RegistryEntry {
    pub service: String,
    pub handler: RpcMethod,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, RegistryEntry>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single method under `service`.
    pub fn register(
        &mut self,
        service: &str,
        name: &str,
        handler: RpcMethod,
    ) -> Result<(), RegistryError> {
        self.check_available(service, name)?;
        self.methods.insert(
            name.to_owned(),
            RegistryEntry {
                service: service.to_owned(),
                handler,
            },
        );
        Ok(())
    }

    /// Register a batch of methods for one service, all or nothing.
    pub fn register_all(
        &mut self,
        service: &str,
        methods: Vec<(String, RpcMethod)>,
    ) -> Result<(), RegistryError> {
        for (i, (name, _)) in methods.iter().enumerate() {
            self.check_available(service, name)?;
            if methods[..i].iter().any(|(prior, _)| prior == name) {
                return Err(self.reject(service, service, name));
            }
        }
        for (name, handler) in methods {
            self.register(service, &name, handler)?;
        }
        Ok(())
    }

    fn check_available(&self, service: &str, name: &str) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyMethodName {
                service: service.to_owned(),
            });
        }
        match self.methods.get(name) {
            Some(existing) => Err(self.reject(&existing.service, service, name)),
            None => Ok(()),
        }
    }

    fn reject(&self, existing: &str, attempted: &str, name: &str) -> RegistryError {
        error!(
            "RPC: duplicate method '{}' (owned by '{}'), rejecting registration from '{}'",
            name, existing, attempted
        );
        RegistryError::DuplicateMethod {
            method: name.to_owned(),
            existing: existing.to_owned(),
            attempted: attempted.to_owned(),
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&RegistryEntry> {
        self.methods.get(name)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
