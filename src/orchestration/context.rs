//! # Strand Context
//!
//! The shared mutable blackboard of one strand, the collaborator handles the
//! built-in steps consume, and the cooperative cancellation signal.
//!
//! Every strand owns exactly one [`StrandContext`]. Step actions never see it
//! directly: they receive a [`StepContext`], a per-step view that records every
//! key the step writes so the strand can detect two steps of the same wave
//! writing the same key.

use crate::compliance::{ControlCatalog, ControlMonitor, EvidenceStore};
use crate::constants::context_keys;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// String-keyed JSON map used for the shared context and step parameters
pub type ContextMap = Map<String, Value>;

#[derive(Debug, Default)]
struct CancellationState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation signal shared by a strand, its steps and the orchestrator
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    state: Arc<CancellationState>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `false` if it had already been requested.
    pub fn cancel(&self) -> bool {
        let first = !self.state.cancelled.swap(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
        first
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent `cancel` cannot be missed
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// External collaborators available to step actions
#[derive(Clone, Default)]
pub struct Collaborators {
    pub catalog: Option<Arc<dyn ControlCatalog>>,
    pub monitor: Option<Arc<ControlMonitor>>,
    pub evidence: Option<Arc<EvidenceStore>>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators")
            .field("catalog", &self.catalog.is_some())
            .field("monitor", &self.monitor.is_some())
            .field("evidence", &self.evidence.is_some())
            .finish()
    }
}

impl Collaborators {
    pub fn with_catalog(mut self, catalog: Arc<dyn ControlCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<ControlMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn with_evidence(mut self, evidence: Arc<EvidenceStore>) -> Self {
        self.evidence = Some(evidence);
        self
    }
}

/// Shared state of one strand
#[derive(Debug)]
pub struct StrandContext {
    strand_id: String,
    data: RwLock<ContextMap>,
    collaborators: Collaborators,
    cancellation: CancellationHandle,
}

impl StrandContext {
    pub fn new(
        strand_id: impl Into<String>,
        collaborators: Collaborators,
        cancellation: CancellationHandle,
    ) -> Self {
        Self {
            strand_id: strand_id.into(),
            data: RwLock::new(ContextMap::new()),
            collaborators,
            cancellation,
        }
    }

    pub fn strand_id(&self) -> &str {
        &self.strand_id
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancellation
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.data.read().get(key).cloned()
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.write().insert(key.into(), value)
    }

    /// Run a closure against the current context without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&ContextMap) -> R) -> R {
        f(&*self.data.read())
    }

    pub fn snapshot(&self) -> ContextMap {
        self.data.read().clone()
    }

    /// Record a step payload under `results.<step_id>`
    pub fn record_result(&self, step_id: &str, payload: Value) {
        let mut data = self.data.write();
        let results = data
            .entry(context_keys::RESULTS)
            .or_insert_with(|| Value::Object(Map::new()));
        if !results.is_object() {
            *results = Value::Object(Map::new());
        }
        if let Value::Object(results) = results {
            results.insert(step_id.to_string(), payload);
        }
    }

    /// Append a message to the context's `errors` list
    pub fn push_error(&self, message: &str) {
        let mut data = self.data.write();
        let errors = data
            .entry(context_keys::ERRORS)
            .or_insert_with(|| Value::Array(Vec::new()));
        if !errors.is_array() {
            *errors = Value::Array(Vec::new());
        }
        if let Value::Array(errors) = errors {
            errors.push(Value::String(message.to_string()));
        }
    }
}

/// The view of the strand context handed to one step attempt
#[derive(Debug, Clone)]
pub struct StepContext {
    strand: Arc<StrandContext>,
    step_id: Arc<str>,
    written_keys: Arc<Mutex<BTreeSet<String>>>,
}

impl StepContext {
    pub fn new(strand: Arc<StrandContext>, step_id: &str) -> Self {
        Self {
            strand,
            step_id: Arc::from(step_id),
            written_keys: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn strand_id(&self) -> &str {
        self.strand.strand_id()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.strand.get(key)
    }

    /// Write a context key, remembering that this step wrote it
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        self.written_keys.lock().insert(key.clone());
        self.strand.insert(key, value)
    }

    pub fn read<R>(&self, f: impl FnOnce(&ContextMap) -> R) -> R {
        self.strand.read(f)
    }

    /// Target control ids the strand was created for
    pub fn target_controls(&self) -> Vec<String> {
        self.strand.read(|data| {
            data.get(context_keys::TARGET_CONTROLS)
                .and_then(Value::as_array)
                .map(|controls| {
                    controls
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        })
    }

    pub fn collaborators(&self) -> &Collaborators {
        self.strand.collaborators()
    }

    pub fn is_cancelled(&self) -> bool {
        self.strand.cancellation().is_cancelled()
    }

    /// Keys written through this view so far, sorted
    pub fn written_keys(&self) -> Vec<String> {
        self.written_keys.lock().iter().cloned().collect()
    }
}
