//! Batch node-confirm session
//!
//! One session per opened batch dialog. It owns the selected work items, the field
//! catalog, the node-list cache and the configuration, and hands submission plans to
//! the batch controller.

use crate::config::NodeFlowConfig;
use crate::controller::{BatchController, ControllerHandle, UnitExecutor};
use crate::error::{ConfigError, FieldValueError, SelectionError};
use crate::field_type::FieldCatalog;
use crate::grouping::group_by_field_signature;
use crate::node_cache::{NodeListCache, WorkflowConfig};
use crate::selection::{
    ensure_single_template, filter_not_in_progress, items_at_node, plan_submission,
    prefill_values, SubmissionPlan,
};
use crate::types::{FieldGroup, NodeOperateParams, TemplateId, WorkItem};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// State of one batch dialog
#[derive(Debug)]
pub struct NodeFlowSession {
    project_key: String,
    config: NodeFlowConfig,
    node_cache: NodeListCache,
    items: Vec<WorkItem>,
    template_id: Option<TemplateId>,
    catalog: FieldCatalog,
}

impl NodeFlowSession {
    /// Create session for a project
    #[must_use]
    pub fn new(project_key: impl Into<String>, config: NodeFlowConfig) -> Self {
        Self {
            project_key: project_key.into(),
            config,
            node_cache: NodeListCache::default(),
            items: Vec::new(),
            template_id: None,
            catalog: FieldCatalog::default(),
        }
    }

    /// With a shared node-list cache
    #[inline]
    #[must_use]
    pub fn with_node_cache(mut self, cache: NodeListCache) -> Self {
        self.node_cache = cache;
        self
    }

    /// With the project's field catalog
    #[inline]
    #[must_use]
    pub fn with_catalog(mut self, catalog: FieldCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Project key
    #[inline]
    #[must_use]
    pub fn project_key(&self) -> &str {
        &self.project_key
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &NodeFlowConfig {
        &self.config
    }

    /// Field catalog
    #[inline]
    #[must_use]
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    /// Loaded items
    #[inline]
    #[must_use]
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Template shared by the loaded items
    #[inline]
    #[must_use]
    pub fn template_id(&self) -> Option<TemplateId> {
        self.template_id
    }

    /// Load the selected items
    ///
    /// Items are kept even when the selection is rejected.
    ///
    /// # Errors
    /// See [`ensure_single_template`].
    pub fn load_items(&mut self, items: Vec<WorkItem>) -> Result<TemplateId, SelectionError> {
        self.items = items;
        let checked = ensure_single_template(&self.items);
        self.template_id = checked.as_ref().ok().copied();
        match &checked {
            Ok(template_id) => {
                tracing::info!(items = self.items.len(), template_id, "loaded selection");
            }
            Err(err) => tracing::warn!(items = self.items.len(), %err, "selection rejected"),
        }
        checked
    }

    /// Items with no node in progress
    #[must_use]
    pub fn filtered_out(&self) -> Vec<&WorkItem> {
        filter_not_in_progress(&self.items)
    }

    /// Groups for a target node
    #[must_use]
    pub fn groups(&self, node_id: &str) -> Vec<FieldGroup> {
        group_by_field_signature(&self.items, Some(node_id))
    }

    /// Number of items currently at a node
    #[must_use]
    pub fn node_batch(&self, node_id: &str) -> usize {
        self.template_id
            .map_or(0, |template| items_at_node(&self.items, node_id, template).len())
    }

    /// Whether moving every item at a node exceeds the per-submit cap
    #[inline]
    #[must_use]
    pub fn exceeds_cap(&self, node_id: &str) -> bool {
        self.node_batch(node_id) > self.config.max_units_per_submit
    }

    /// Initial form values for a node
    #[must_use]
    pub fn prefill(&self, node_id: &str) -> IndexMap<i64, Map<String, Value>> {
        self.template_id
            .map(|template| prefill_values(&self.items, node_id, template))
            .unwrap_or_default()
    }

    /// Node list of a template, cache first
    ///
    /// # Errors
    /// Whatever the loader returns.
    pub async fn node_list<E, F, Fut>(
        &self,
        template_id: TemplateId,
        load: F,
    ) -> Result<Arc<Vec<WorkflowConfig>>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<WorkflowConfig>, E>>,
    {
        self.node_cache.try_get_or_load(template_id, load).await
    }

    /// Build the submission plan for a node from per-group form values
    ///
    /// # Errors
    /// - `FieldValueError` when form values do not fit the catalog
    pub fn plan(
        &self,
        node_id: &str,
        values: &HashMap<usize, Map<String, Value>>,
    ) -> Result<SubmissionPlan, FieldValueError> {
        plan_submission(
            &self.project_key,
            &self.groups(node_id),
            node_id,
            values,
            &self.catalog,
            &self.config,
        )
    }

    /// Run a plan with the configured width
    ///
    /// # Errors
    /// - `ConfigError::Invalid` when the configured width is zero
    pub fn submit<E>(
        &self,
        plan: SubmissionPlan,
        executor: Arc<E>,
    ) -> Result<ControllerHandle<NodeOperateParams, E::Output>, ConfigError>
    where
        E: UnitExecutor<NodeOperateParams> + 'static,
    {
        let width = self.config.width()?;
        if plan.is_truncated() {
            tracing::warn!(truncated = plan.truncated, "submitting truncated plan");
        }
        Ok(BatchController::with_shared(executor, width).run(plan.units))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::FnExecutor;
    use crate::types::{FieldEntry, NodeStatus, UnitSuccess, WorkflowNode};
    use pretty_assertions::assert_eq;

    fn at(id: i64, key: &str, node: &str, status: NodeStatus) -> WorkItem {
        WorkItem::new(id, 3)
            .with_fields(vec![FieldEntry::new(key, "text")])
            .with_nodes(vec![WorkflowNode::new(node, status)])
    }

    fn session() -> NodeFlowSession {
        let mut session = NodeFlowSession::new(
            "space",
            NodeFlowConfig::default().with_max_units_per_submit(2),
        );
        session
            .load_items(vec![
                at(1, "a", "dev", NodeStatus::Doing),
                at(2, "b", "dev", NodeStatus::Doing),
                at(3, "a", "dev", NodeStatus::Doing),
                at(4, "a", "qa", NodeStatus::Done),
            ])
            .unwrap();
        session
    }

    #[test]
    fn session_exposes_selection_views() {
        let session = session();

        assert_eq!(session.template_id(), Some(3));
        assert_eq!(session.filtered_out().len(), 1);
        assert_eq!(session.groups("dev").len(), 2);
        assert_eq!(session.node_batch("dev"), 3);
        assert!(session.exceeds_cap("dev"));
        assert!(!session.exceeds_cap("qa"));
    }

    #[test]
    fn rejected_selection_clears_template() {
        let mut session = session();
        let err = session
            .load_items(vec![WorkItem::new(1, 3), at(2, "a", "dev", NodeStatus::Doing)])
            .unwrap_err();
        assert_eq!(err, SelectionError::NoWorkflow);
        assert_eq!(session.template_id(), None);
        assert_eq!(session.node_batch("dev"), 0);
    }

    #[tokio::test]
    async fn node_list_is_cached() {
        let session = session();
        let first = session
            .node_list(3, || async { Ok::<_, String>(vec![WorkflowConfig::new("dev", "Dev")]) })
            .await
            .unwrap();
        let second = session
            .node_list(3, || async { Err::<Vec<WorkflowConfig>, _>("not called".to_string()) })
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn submit_runs_the_capped_plan() {
        let session = session();
        let plan = session.plan("dev", &HashMap::new()).unwrap();
        assert_eq!(plan.truncated, 1);

        let executor = Arc::new(FnExecutor::new(
            |_id, params: NodeOperateParams, _token| async move {
                Ok(UnitSuccess::now(params.work_item_id))
            },
        ));
        let outcome = session.submit(plan, executor).unwrap().outcome().await;

        assert!(!outcome.is_canceled);
        let ids: Vec<i64> = outcome.all_results.iter().filter_map(|r| r.data().copied()).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
