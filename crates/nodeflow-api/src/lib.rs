//! NodeFlow API - open-API client for batch node confirmation
//!
//! Provides:
//! - [`ApiClient`]: typed calls for templates, work items, fields and node operations
//! - [`NodeOperateExecutor`]: a [`nodeflow_core::UnitExecutor`] confirming one node per unit
//!
//! # Example
//!
//! ```rust,ignore
//! use nodeflow_api::{ApiClient, NodeOperateExecutor};
//! use nodeflow_core::{ApiConfig, NodeFlowSession, NodeFlowConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(ApiConfig::new("https://project.example.com"))?;
//! let session = NodeFlowSession::new("space", NodeFlowConfig::default());
//! let plan = session.plan("review", &Default::default())?;
//! let outcome = session
//!     .submit(plan, Arc::new(NodeOperateExecutor::new(client)))?
//!     .outcome()
//!     .await;
//! println!("{:?}", outcome.summary());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod executor;
pub mod models;

pub use client::ApiClient;
pub use error::ApiError;
pub use executor::NodeOperateExecutor;
pub use models::{Envelope, FlowNodeRef, QueryExpand, WorkflowDetail};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
