//! # Transaction Descriptors
//!
//! What the interception layer knows about a transactional method: its
//! signature, the coordination strategy it declares, its propagation mode,
//! and the arguments of the current call.
//!
//! The static part ([`MethodMeta`]) is computed once per signature and cached
//! process-wide in a [`DescriptorCache`]. The unit id is a name-based UUID of
//! the signature, so every process derives the same unit id for the same
//! method without coordination. Argument values change per call and are
//! refreshed on every lookup.

use dashmap::DashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;
use uuid::Uuid;

/// Deterministic unit id for a method signature.
pub fn unit_id(signature: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, signature.as_bytes())
        .simple()
        .to_string()
}

/// Declared policy for joining or starting a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Propagation {
    /// Join the inherited group, or start one if there is none.
    Required,
    /// Always start a fresh group, ignoring any inherited one.
    RequiresNew,
    /// Join the inherited group; run without coordination if there is none.
    Supports,
}

/// Part a frame plays in its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Participant,
    NonTransactional,
}

impl Propagation {
    pub fn resolve(self, has_group: bool) -> Role {
        match (self, has_group) {
            (Propagation::RequiresNew, _) => Role::Initiator,
            (Propagation::Required, false) => Role::Initiator,
            (Propagation::Required, true) | (Propagation::Supports, true) => Role::Participant,
            (Propagation::Supports, false) => Role::NonTransactional,
        }
    }
}

/// Per-method data, identical for every call of the same signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodMeta {
    pub signature: String,
    pub unit_id: String,
    pub transaction_type: String,
    pub propagation: Propagation,
}

/// Everything the coordinator needs about one intercepted call.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionDescriptor {
    meta: Arc<MethodMeta>,
    args: Vec<serde_json::Value>,
}

impl TransactionDescriptor {
    pub fn new(meta: Arc<MethodMeta>, args: Vec<serde_json::Value>) -> Self {
        Self { meta, args }
    }

    pub fn signature(&self) -> &str {
        &self.meta.signature
    }

    pub fn unit_id(&self) -> &str {
        &self.meta.unit_id
    }

    pub fn transaction_type(&self) -> &str {
        &self.meta.transaction_type
    }

    pub fn propagation(&self) -> Propagation {
        self.meta.propagation
    }

    pub fn args(&self) -> &[serde_json::Value] {
        &self.args
    }

    pub fn meta(&self) -> &Arc<MethodMeta> {
        &self.meta
    }
}

/// Signature-keyed cache of [`MethodMeta`].
///
/// Unbounded: the set of transactional methods in a process is finite.
/// Concurrent first lookups of one signature may both build the entry; the
/// content is the same either way.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: DashMap<String, Arc<MethodMeta>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static DescriptorCache {
        static CACHE: OnceLock<DescriptorCache> = OnceLock::new();
        CACHE.get_or_init(DescriptorCache::new)
    }

    /// Returns the descriptor for `signature` with `args` as the current arguments.
    pub fn get_or_insert(
        &self,
        signature: &str,
        transaction_type: &str,
        propagation: Propagation,
        args: Vec<serde_json::Value>,
    ) -> TransactionDescriptor {
        let key = unit_id(signature);
        let meta = match self.entries.get(&key) {
            Some(meta) => meta.clone(),
            None => {
                let meta = Arc::new(MethodMeta {
                    signature: signature.to_string(),
                    unit_id: key.clone(),
                    transaction_type: transaction_type.to_string(),
                    propagation,
                });
                debug!(%signature, unit_id = %key, "Descriptor cached");
                self.entries.insert(key, meta.clone());
                meta
            }
        };
        TransactionDescriptor::new(meta, args)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
