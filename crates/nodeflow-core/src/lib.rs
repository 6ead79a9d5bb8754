//! NodeFlow Core - batch node confirmation
//!
//! Moves many work items through one workflow node at once:
//! - Groups selected items by their required-field signature
//! - Serializes one form per group into field updates
//! - Runs the node-confirm requests in fixed-width sequential batches
//! - Cancels individual units or the whole run at any time
//!
//! # Example
//!
//! ```rust,ignore
//! use nodeflow_core::prelude::*;
//! use std::num::NonZeroUsize;
//!
//! # async fn example() {
//! let executor = FnExecutor::new(|id, name: String, _token| async move {
//!     Ok(UnitSuccess::now(format!("{id}: {name}")))
//! });
//! let units = vec![UnitOfWork::new(1, "first".to_string())];
//! let width = NonZeroUsize::new(5).unwrap();
//!
//! let handle = BatchController::new(executor, width).run(units);
//! let outcome = handle.outcome().await;
//! println!("{:?}", outcome.summary());
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod cancellation;
pub mod config;
pub mod controller;
pub mod error;
pub mod field_type;
pub mod grouping;
pub mod host;
pub mod node_cache;
pub mod selection;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use cancellation::{AbortHandle, CancellationRegistry, USER_CANCELED};
pub use config::{ApiConfig, NodeFlowConfig, Settings};
pub use controller::{run_batches, BatchController, ControllerHandle, FnExecutor, UnitExecutor};
pub use error::{
    BatchError, ConfigError, ExecutorError, FieldValueError, HostError, SelectionError,
    ABORTED_BEFORE_EXECUTION,
};
pub use field_type::{FieldCatalog, FieldDefinition, FieldOption, FieldType, Widget};
pub use grouping::{group_by_field_signature, submittable_count};
pub use node_cache::{FlowTemplate, NodeListCache, WorkflowConfig};
pub use selection::SubmissionPlan;
pub use session::NodeFlowSession;
pub use types::{
    Describe, FailureCause, FieldEntry, FieldGroup, FieldSignature, FieldUpdate, NodeOperateParams,
    NodeStatus, RunOutcome, RunSummary, TemplateId, UnitId, UnitOfWork, UnitOutcome, UnitResult,
    UnitSuccess, WorkItem, WorkflowNode,
};

/// Re-exported so executors can name the token type
pub use tokio_util::sync::CancellationToken;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with NodeFlow Core
    pub use crate::{
        run_batches, BatchController, CancellationToken, ControllerHandle, ExecutorError,
        FieldGroup, FnExecutor, NodeFlowConfig, NodeFlowSession, NodeOperateParams, RunOutcome,
        UnitExecutor, UnitOfWork, UnitSuccess, WorkItem,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
