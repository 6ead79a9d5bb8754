//! Open-API client
//!
//! Thin typed wrapper over `reqwest`. Every call decodes the [`Envelope`] and turns
//! non-zero codes and HTTP error bodies into [`ApiError`]. Request paths are appended to
//! the base url segment by segment, so a path prefix on the base url is kept.

use crate::error::ApiError;
use crate::models::{
    Envelope, ErrorBody, FieldQuery, FlowNodeRef, OperateNodeRequest, QueryExpand,
    TransitionQuery, TransitionRequiredInfo, WorkItemQuery, WorkItemRef, WorkflowDetail,
};
use nodeflow_core::field_type::LEGACY_FIELD_KEYS;
use nodeflow_core::{ApiConfig, FieldDefinition, FlowTemplate, NodeOperateParams, TemplateId, WorkItem};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

/// Header carrying the plugin token
pub const PLUGIN_TOKEN_HEADER: &str = "X-PLUGIN-TOKEN";

/// Header carrying the acting user
pub const USER_KEY_HEADER: &str = "X-USER-KEY";

/// Typed open-API client
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    config: ApiConfig,
}

impl ApiClient {
    /// Create client from settings
    ///
    /// # Errors
    /// - `ApiError::Config` when settings are invalid
    /// - `ApiError::Url` when the base url does not parse
    /// - `ApiError::Header` when a credential is not a valid header value
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        config.validate()?;
        let base = Url::parse(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if !config.plugin_token.is_empty() {
            let value = HeaderValue::from_str(&config.plugin_token).map_err(|_| ApiError::Header {
                name: PLUGIN_TOKEN_HEADER,
            })?;
            headers.insert(PLUGIN_TOKEN_HEADER, value);
        }
        if !config.user_key.is_empty() {
            let value = HeaderValue::from_str(&config.user_key).map_err(|_| ApiError::Header {
                name: USER_KEY_HEADER,
            })?;
            headers.insert(USER_KEY_HEADER, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout())
            .build()?;

        Ok(Self { http, base, config })
    }

    /// Settings
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Template detail; null node lists come back empty
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn template_detail(
        &self,
        project_key: &str,
        template_id: TemplateId,
    ) -> Result<FlowTemplate, ApiError> {
        let template_id = template_id.to_string();
        let url = self.url(&["open_api", project_key, "template_detail", template_id.as_str()])?;
        let response = self.http.get(url).send().await?;
        decode::<FlowTemplate>(response).await?.into_data()
    }

    /// Work items by id
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn query_work_items(
        &self,
        project_key: &str,
        work_item_type_key: &str,
        ids: &[i64],
        expand: QueryExpand,
    ) -> Result<Vec<WorkItem>, ApiError> {
        let body = WorkItemQuery {
            project_key,
            work_item_type_key,
            work_item_ids: ids,
            expand,
        };
        let path = ["open_api", project_key, "work_item", work_item_type_key, "query"];
        let items: Option<Vec<WorkItem>> = self.post(&path, &body).await?.into_optional_data()?;
        Ok(items.unwrap_or_default())
    }

    /// Work items by id in sequential chunks of `batch_size`, concatenated in order
    ///
    /// # Errors
    /// The first failing chunk's [`ApiError`].
    pub async fn query_work_items_batched(
        &self,
        project_key: &str,
        work_item_type_key: &str,
        ids: &[i64],
        batch_size: usize,
        expand: QueryExpand,
    ) -> Result<Vec<WorkItem>, ApiError> {
        let mut items = Vec::with_capacity(ids.len());
        for (batch_index, chunk) in ids.chunks(batch_size.max(1)).enumerate() {
            let batch = self
                .query_work_items(project_key, work_item_type_key, chunk, expand)
                .await?;
            tracing::debug!(batch_index, requested = chunk.len(), received = batch.len(), "queried work items");
            items.extend(batch);
        }
        Ok(items)
    }

    /// Workflow of one work item
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn workflow_detail(
        &self,
        project_key: &str,
        work_item_type_key: &str,
        work_item_id: i64,
    ) -> Result<WorkflowDetail, ApiError> {
        let body = WorkItemRef {
            project_key,
            work_item_type_key,
            work_item_id,
        };
        let work_item_id = work_item_id.to_string();
        let path = [
            "open_api",
            project_key,
            "work_item",
            work_item_type_key,
            work_item_id.as_str(),
            "workflow",
            "query",
        ];
        self.post(&path, &body).await?.into_data()
    }

    /// Field definitions of a work-item type, legacy keys removed
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn fields(
        &self,
        project_key: &str,
        work_item_type_key: &str,
    ) -> Result<Vec<FieldDefinition>, ApiError> {
        let body = FieldQuery {
            project_key,
            work_item_type_key,
        };
        let path = ["open_api", project_key, "field", "all"];
        let fields: Vec<FieldDefinition> = self.post(&path, &body).await?.into_data()?;
        Ok(fields
            .into_iter()
            .filter(|field| !LEGACY_FIELD_KEYS.contains(&field.field_key.as_str()))
            .collect())
    }

    /// Keys the transition into `state_key` requires
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn transition_required_fields(
        &self,
        project_key: &str,
        work_item_type_key: &str,
        work_item_id: i64,
        state_key: &str,
    ) -> Result<Vec<String>, ApiError> {
        let body = TransitionQuery {
            project_key,
            work_item_type_key,
            work_item_id,
            state_key,
        };
        let info: Option<TransitionRequiredInfo> = self
            .post(&["open_api", "work_item", "transition_required_info", "get"], &body)
            .await?
            .into_optional_data()?;
        Ok(info
            .unwrap_or_default()
            .form_items
            .into_iter()
            .map(|item| item.key)
            .collect())
    }

    /// Confirm one node of one work item
    ///
    /// # Errors
    /// Any [`ApiError`].
    pub async fn operate_node(&self, params: &NodeOperateParams) -> Result<Vec<FlowNodeRef>, ApiError> {
        let body = OperateNodeRequest {
            action: "confirm",
            project_key: &params.project_key,
            work_item_type_key: &params.work_item_type_key,
            work_item_id: params.work_item_id,
            node_id: &params.node_id,
            fields: &params.fields,
        };
        let work_item_id = params.work_item_id.to_string();
        let path = [
            "open_api",
            params.project_key.as_str(),
            "workflow",
            params.work_item_type_key.as_str(),
            work_item_id.as_str(),
            "node",
            params.node_id.as_str(),
            "operate",
        ];
        let nodes: Option<Vec<FlowNodeRef>> = self.post(&path, &body).await?.into_optional_data()?;
        Ok(nodes.unwrap_or_default())
    }

    /// Base url with `segments` appended, each percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B, D>(&self, path: &[&str], body: &B) -> Result<Envelope<D>, ApiError>
    where
        B: Serialize + ?Sized,
        D: DeserializeOwned,
    {
        let url = self.url(path)?;
        tracing::trace!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        decode(response).await
    }
}

async fn decode<D: DeserializeOwned>(response: reqwest::Response) -> Result<Envelope<D>, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let detail = serde_json::from_str::<ErrorBody>(&body).unwrap_or_default().err;
        let message = if detail.msg.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            detail.msg
        };
        tracing::warn!(status = status.as_u16(), %message, "open api error status");
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
            log_id: detail.log_id,
        });
    }

    serde_json::from_str(&body)
        .map_err(|e| ApiError::Decode(format!("{e}, body: {body}")))
}
