//! Node-confirm executor backed by the open API

use crate::client::ApiClient;
use crate::models::FlowNodeRef;
use async_trait::async_trait;
use nodeflow_core::{
    CancellationToken, ExecutorError, NodeOperateParams, UnitExecutor, UnitId, UnitSuccess,
};

/// Confirms one node per unit
///
/// The request is dropped as soon as the unit's token fires.
#[derive(Debug, Clone)]
pub struct NodeOperateExecutor {
    client: ApiClient,
}

impl NodeOperateExecutor {
    /// Create executor around a client
    #[inline]
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Underlying client
    #[inline]
    #[must_use]
    pub fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl UnitExecutor<NodeOperateParams> for NodeOperateExecutor {
    type Output = Vec<FlowNodeRef>;

    async fn execute(
        &self,
        unit_id: UnitId,
        params: &NodeOperateParams,
        token: CancellationToken,
    ) -> Result<UnitSuccess<Self::Output>, ExecutorError> {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                tracing::debug!(unit_id, "node operation dropped");
                Err(ExecutorError::Cancelled("request aborted".to_string()))
            }
            result = self.client.operate_node(params) => {
                result.map(UnitSuccess::now).map_err(ExecutorError::from)
            }
        }
    }
}
