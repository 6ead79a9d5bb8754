//! Testing utilities for NodeFlow workspace
//!
//! Shared fixtures and a recording executor for controller tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use nodeflow_core::{
    CancellationToken, ExecutorError, FieldEntry, NodeOperateParams, NodeStatus, UnitExecutor,
    UnitId, UnitOfWork, UnitSuccess, WorkItem, WorkflowNode,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::time::Instant;

static TRACING: Once = Once::new();

/// Install a test subscriber honoring `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Work item whose first field is `field_key` and that sits at `node` with `status`
pub fn work_item(id: i64, field_key: &str, node: &str, status: NodeStatus) -> WorkItem {
    WorkItem::new(id, 1)
        .with_name(format!("item-{id}"))
        .with_type_key("story")
        .with_fields(vec![FieldEntry::new(field_key, "text").with_alias(field_key)])
        .with_nodes(vec![WorkflowNode::new(node, status)])
}

/// Parse work items the way the query endpoint returns them
pub fn work_items_from_json(source: &str) -> anyhow::Result<Vec<WorkItem>> {
    Ok(serde_json::from_str(source)?)
}

/// Units carrying their own id as params
pub fn echo_units(ids: impl IntoIterator<Item = UnitId>) -> Vec<UnitOfWork<UnitId>> {
    ids.into_iter().map(|id| UnitOfWork::new(id, id)).collect()
}

/// Node-confirm params for one item
pub fn operate_params(work_item_id: i64, node_id: &str) -> NodeOperateParams {
    NodeOperateParams {
        project_key: "space".to_string(),
        work_item_type_key: "story".to_string(),
        work_item_id,
        node_id: node_id.to_string(),
        fields: Vec::new(),
        work_item_name: format!("item-{work_item_id}"),
    }
}

/// Callback run when a unit starts executing
pub type StartHook = Arc<dyn Fn(UnitId) + Send + Sync>;

/// Executor that records every call
///
/// Each unit sleeps for its configured delay while watching its token, then returns its
/// own id, a scripted error, or panics.
#[derive(Default, Clone)]
pub struct RecordingExecutor {
    delay: Duration,
    delays: HashMap<UnitId, Duration>,
    failures: HashMap<UnitId, ExecutorError>,
    panics: HashSet<UnitId>,
    on_start: Option<StartHook>,
    log: Arc<CallLog>,
}

/// Shared record of executor calls
#[derive(Default, Debug)]
pub struct CallLog {
    started: Mutex<Vec<(UnitId, Instant)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallLog {
    /// Unit ids in start order
    pub fn started_ids(&self) -> Vec<UnitId> {
        self.started.lock().iter().map(|(id, _)| *id).collect()
    }

    /// Start instant of a unit
    pub fn started_at(&self, unit_id: UnitId) -> Option<Instant> {
        self.started
            .lock()
            .iter()
            .find(|(id, _)| *id == unit_id)
            .map(|(_, at)| *at)
    }

    /// Number of executor calls
    pub fn calls(&self) -> usize {
        self.started.lock().len()
    }

    /// Highest number of concurrently executing units
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for RecordingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingExecutor")
            .field("delay", &self.delay)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every unit
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay for one unit
    pub fn with_unit_delay(mut self, unit_id: UnitId, delay: Duration) -> Self {
        self.delays.insert(unit_id, delay);
        self
    }

    /// Fail one unit
    pub fn with_failure(mut self, unit_id: UnitId, err: ExecutorError) -> Self {
        self.failures.insert(unit_id, err);
        self
    }

    /// Panic inside one unit
    pub fn with_panic(mut self, unit_id: UnitId) -> Self {
        self.panics.insert(unit_id);
        self
    }

    /// Call `hook` whenever a unit starts
    pub fn with_on_start(mut self, hook: StartHook) -> Self {
        self.on_start = Some(hook);
        self
    }

    /// Shared call log
    pub fn log(&self) -> Arc<CallLog> {
        Arc::clone(&self.log)
    }
}

#[async_trait]
impl<P> UnitExecutor<P> for RecordingExecutor
where
    P: Send + Sync + 'static,
{
    type Output = UnitId;

    async fn execute(
        &self,
        unit_id: UnitId,
        _params: &P,
        token: CancellationToken,
    ) -> Result<UnitSuccess<UnitId>, ExecutorError> {
        self.log.started.lock().push((unit_id, Instant::now()));
        let now = self.log.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.log.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(hook) = &self.on_start {
            hook(unit_id);
        }

        let delay = self.delays.get(&unit_id).copied().unwrap_or(self.delay);
        let result = tokio::select! {
            () = token.cancelled() => Err(ExecutorError::Cancelled("token fired".to_string())),
            () = tokio::time::sleep(delay) => match self.failures.get(&unit_id) {
                Some(err) => Err(err.clone()),
                None => Ok(UnitSuccess::now(unit_id)),
            },
        };

        self.log.in_flight.fetch_sub(1, Ordering::SeqCst);
        assert!(!self.panics.contains(&unit_id), "executor exploded on unit {unit_id}");
        result
    }
}
