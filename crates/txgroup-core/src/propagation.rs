//! # Propagation Context
//!
//! The part of a transaction's identity that crosses process boundaries: the
//! group id and the participant map (`service id -> address`).
//!
//! A [`TracingContext`] lives in a task-local slot. The coordination layer
//! enters it with [`TracingContext::scope`] and every nested call in the same
//! task sees the same context, so business code never passes it around.
//! Crossing a process boundary goes through the wire projection:
//! [`TracingContext::export_projection`] on the caller side and
//! [`TracingContext::import_projection`] on the callee side.
//!
//! A context without a group id means "not part of a transaction". Any
//! group-scoped operation on such a context fails with
//! [`ContextError::NoActiveGroup`] instead of inventing a default.

use crate::error::ContextError;
use base64::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::debug;
use uuid::Uuid;

/// Metadata key carrying the group id between services.
pub const GROUP_ID_KEY: &str = "x-group-id";
/// Metadata key carrying the encoded participant map between services.
pub const APP_MAP_KEY: &str = "x-app-map";

tokio::task_local! {
    static TRACING: RefCell<TracingContext>;
}

/// What actually travels between services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingProjection {
    pub group_id: String,
    /// Serialized participant map. Either the raw JSON object or its base64 form.
    pub participant_map: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TracingContext {
    group_id: Option<String>,
    participants: BTreeMap<String, String>,
}

impl TracingContext {
    /// Starts a group unless one is already present. Idempotent.
    pub fn begin_group(&mut self) {
        if self.has_group() {
            return;
        }
        let group_id = Uuid::new_v4().simple().to_string();
        debug!(%group_id, "begin transaction group");
        self.group_id = Some(group_id);
        self.participants.clear();
    }

    pub fn has_group(&self) -> bool {
        self.group_id.as_deref().is_some_and(|id| !id.is_empty())
    }

    pub fn group_id(&self) -> Result<&str, ContextError> {
        match self.group_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ContextError::NoActiveGroup),
        }
    }

    /// Registers a participant. A service already present keeps its first address.
    pub fn add_participant(
        &mut self,
        service_id: impl Into<String>,
        address: impl Into<String>,
    ) -> Result<(), ContextError> {
        self.group_id()?;
        self.participants
            .entry(service_id.into())
            .or_insert_with(|| address.into());
        Ok(())
    }

    pub fn participants(&self) -> Result<&BTreeMap<String, String>, ContextError> {
        self.group_id()?;
        Ok(&self.participants)
    }

    /// Participant map as base64 of its JSON form, ready for header transport.
    pub fn participant_map_base64(&self) -> Result<String, ContextError> {
        let json = serde_json::to_string(self.participants()?)
            .map_err(|e| ContextError::Projection(e.to_string()))?;
        Ok(BASE64_STANDARD.encode(json))
    }

    pub fn projection(&self) -> Result<TracingProjection, ContextError> {
        Ok(TracingProjection {
            group_id: self.group_id()?.to_string(),
            participant_map: self.participant_map_base64()?,
        })
    }

    pub fn export_projection(&self) -> Result<Vec<u8>, ContextError> {
        serde_json::to_vec(&self.projection()?).map_err(|e| ContextError::Projection(e.to_string()))
    }

    /// Projection as request metadata pairs.
    pub fn headers(&self) -> Result<Vec<(&'static str, String)>, ContextError> {
        let projection = self.projection()?;
        Ok(vec![
            (GROUP_ID_KEY, projection.group_id),
            (APP_MAP_KEY, projection.participant_map),
        ])
    }

    pub fn import_projection(&mut self, bytes: &[u8]) -> Result<(), ContextError> {
        let projection: TracingProjection =
            serde_json::from_slice(bytes).map_err(|e| ContextError::Projection(e.to_string()))?;
        self.apply(projection)
    }

    /// Merges a projection into this context.
    ///
    /// The participant map may arrive either already decoded (a JSON object)
    /// or base64 encoded; both forms are accepted.
    pub fn apply(&mut self, projection: TracingProjection) -> Result<(), ContextError> {
        let participants = decode_participant_map(&projection.participant_map)?;
        if !projection.group_id.is_empty() {
            self.group_id = Some(projection.group_id);
        }
        self.participants.extend(participants);
        Ok(())
    }

    /// Builds a context from request metadata. Missing keys yield an empty context.
    pub fn from_headers<'a>(
        headers: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ContextError> {
        let mut projection = TracingProjection::default();
        for (key, value) in headers {
            match key {
                GROUP_ID_KEY => projection.group_id = value.to_string(),
                APP_MAP_KEY => projection.participant_map = value.to_string(),
                _ => {}
            }
        }
        let mut ctx = TracingContext::default();
        ctx.apply(projection)?;
        Ok(ctx)
    }

    pub fn destroy(&mut self) {
        self.group_id = None;
        self.participants.clear();
    }

    // -------------------------------------------------------------------------
    // Task-local access
    // -------------------------------------------------------------------------

    /// Runs `f` with `ctx` installed as the current task's tracing context.
    pub async fn scope<F: Future>(ctx: TracingContext, f: F) -> F::Output {
        TRACING.scope(RefCell::new(ctx), f).await
    }

    /// Whether the current task has entered a tracing scope.
    pub fn is_entered() -> bool {
        TRACING.try_with(|_| ()).is_ok()
    }

    /// Applies `f` to the current context, or returns `None` outside a scope.
    pub fn with_current<R>(f: impl FnOnce(&mut TracingContext) -> R) -> Option<R> {
        TRACING.try_with(|cell| f(&mut cell.borrow_mut())).ok()
    }

    /// Snapshot of the current context; empty outside a scope.
    pub fn current() -> TracingContext {
        Self::with_current(|ctx| ctx.clone()).unwrap_or_default()
    }

    /// Clears the current context. Safe to call outside a scope.
    pub fn destroy_current() {
        let _ = Self::with_current(TracingContext::destroy);
    }
}

fn decode_participant_map(raw: &str) -> Result<BTreeMap<String, String>, ContextError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(BTreeMap::new());
    }
    let json = if raw.starts_with('{') {
        raw.to_string()
    } else {
        let bytes = BASE64_STANDARD
            .decode(raw)
            .map_err(|e| ContextError::Projection(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| ContextError::Projection(e.to_string()))?
    };
    serde_json::from_str(&json).map_err(|e| ContextError::Projection(e.to_string()))
}
