//! Execution isolation for concurrent lanes.
//!
//! Lanes that share one built network must not collide on ports, scratch
//! files or logs. An [`IsolationProvider`] hands out [`ExecutionContext`]s
//! that keep them apart; running out of contexts is an error for the whole
//! batch.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use crate::config::IsolationConfig;
use crate::error::ResourceExhaustedError;

/// An isolated slice of the host: a port block and a scratch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub id: usize,
    pub label: String,
    pub port_base: u16,
    pub port_count: u16,
    pub scratch_dir: PathBuf,
}

impl ExecutionContext {
    /// Port `offset` of the context's block
    pub fn port(&self, offset: u16) -> Option<u16> {
        (offset < self.port_count).then(|| self.port_base + offset)
    }

    /// Environment exported to every process of the context
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("NETSWEEP_CONTEXT".to_string(), self.label.clone());
        env.insert("NETSWEEP_PORT_BASE".to_string(), self.port_base.to_string());
        env.insert("TMPDIR".to_string(), self.scratch_dir.display().to_string());
        env
    }
}

/// Source of execution contexts
pub trait IsolationProvider: Send + Sync {
    /// Allocate `n` mutually isolated contexts, all or nothing
    fn allocate(&self, n: usize) -> Result<Vec<ExecutionContext>, ResourceExhaustedError>;

    /// Return a context to the pool
    fn release(&self, context: ExecutionContext);
}

/// Contexts carved out of the local machine
pub struct LocalIsolation {
    limits: IsolationConfig,
    scratch_root: PathBuf,
    in_use: Mutex<Vec<bool>>,
}

impl LocalIsolation {
    pub fn new(limits: IsolationConfig, scratch_root: impl Into<PathBuf>) -> Self {
        let slots = Self::slot_capacity(&limits);
        Self {
            limits,
            scratch_root: scratch_root.into(),
            in_use: Mutex::new(vec![false; slots]),
        }
    }

    /// Slots allowed by `max_contexts` and by the port space above `port_base`
    fn slot_capacity(limits: &IsolationConfig) -> usize {
        let ports_above = u16::MAX as usize - limits.port_base as usize + 1;
        let by_ports = ports_above / (limits.ports_per_context.max(1) as usize);
        limits.max_contexts.min(by_ports)
    }

    pub fn capacity(&self) -> usize {
        self.lock().len()
    }

    pub fn available(&self) -> usize {
        self.lock().iter().filter(|used| !**used).count()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<bool>> {
        self.in_use.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn context(&self, slot: usize) -> ExecutionContext {
        let label = format!("ctx-{}", slot);
        ExecutionContext {
            id: slot,
            port_base: self.limits.port_base + (slot as u16) * self.limits.ports_per_context,
            port_count: self.limits.ports_per_context,
            scratch_dir: self.scratch_root.join(&label),
            label,
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }
}

impl IsolationProvider for LocalIsolation {
    fn allocate(&self, n: usize) -> Result<Vec<ExecutionContext>, ResourceExhaustedError> {
        let mut slots = self.lock();
        let free: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, used)| !**used)
            .map(|(slot, _)| slot)
            .take(n)
            .collect();

        if free.len() < n {
            return Err(ResourceExhaustedError {
                requested: n,
                available: free.len(),
                reason: format!(
                    "limited to {} concurrent context(s) of {} ports from port {}",
                    slots.len(),
                    self.limits.ports_per_context,
                    self.limits.port_base
                ),
            });
        }

        let mut contexts = Vec::with_capacity(n);
        for &slot in &free {
            let context = self.context(slot);
            if let Err(e) = fs::create_dir_all(&context.scratch_dir) {
                return Err(ResourceExhaustedError {
                    requested: n,
                    available: contexts.len(),
                    reason: format!("cannot create {}: {}", context.scratch_dir.display(), e),
                });
            }
            contexts.push(context);
        }
        for &slot in &free {
            slots[slot] = true;
        }
        debug!("Allocated {} execution context(s)", n);
        Ok(contexts)
    }

    fn release(&self, context: ExecutionContext) {
        if let Err(e) = fs::remove_dir_all(&context.scratch_dir) {
            warn!("Could not clean {}: {}", context.scratch_dir.display(), e);
        }
        let mut slots = self.lock();
        match slots.get_mut(context.id) {
            Some(used) => *used = false,
            None => warn!("Released unknown context {}", context.label),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn limits(max_contexts: usize) -> IsolationConfig {
        IsolationConfig {
            max_contexts,
            port_base: 30000,
            ports_per_context: 10,
        }
    }

    #[test]
    fn test_contexts_are_disjoint() {
        let dir = TempDir::new().unwrap();
        let isolation = LocalIsolation::new(limits(4), dir.path());
        let contexts = isolation.allocate(3).unwrap();

        assert_eq!(contexts.len(), 3);
        for (i, a) in contexts.iter().enumerate() {
            assert!(a.scratch_dir.is_dir());
            for b in &contexts[i + 1..] {
                let a_ports = a.port_base..a.port_base + a.port_count;
                assert!(!a_ports.contains(&b.port_base));
                assert_ne!(a.scratch_dir, b.scratch_dir);
            }
        }
        assert_eq!(contexts[1].port(1), Some(30011));
        assert_eq!(contexts[1].port(10), None);
        assert_eq!(isolation.available(), 1);
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let dir = TempDir::new().unwrap();
        let isolation = LocalIsolation::new(limits(2), dir.path());
        let err = isolation.allocate(3).unwrap_err();
        assert_eq!(err.requested, 3);
        assert_eq!(err.available, 2);
        // nothing was taken by the failed request
        assert_eq!(isolation.available(), 2);
    }

    #[test]
    fn test_release_returns_slot() {
        let dir = TempDir::new().unwrap();
        let isolation = LocalIsolation::new(limits(1), dir.path());
        let mut contexts = isolation.allocate(1).unwrap();
        assert!(isolation.allocate(1).is_err());

        let context = contexts.remove(0);
        let scratch = context.scratch_dir.clone();
        isolation.release(context);
        assert!(!scratch.exists());
        assert_eq!(isolation.allocate(1).unwrap()[0].id, 0);
    }

    #[test]
    fn test_port_space_bounds_capacity() {
        let isolation = LocalIsolation::new(
            IsolationConfig {
                max_contexts: 100,
                port_base: 65000,
                ports_per_context: 200,
            },
            "/unused",
        );
        assert_eq!(isolation.capacity(), 2);
    }

    #[test]
    fn test_context_env() {
        let context = ExecutionContext {
            id: 0,
            label: "ctx-0".to_string(),
            port_base: 20000,
            port_count: 100,
            scratch_dir: PathBuf::from("/tmp/ctx-0"),
        };
        let env = context.env();
        assert_eq!(env["NETSWEEP_CONTEXT"], "ctx-0");
        assert_eq!(env["TMPDIR"], "/tmp/ctx-0");
    }
}
