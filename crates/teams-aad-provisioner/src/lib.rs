//! Provisioning of Teams AAD app registrations against Microsoft Graph or AppStudio.

pub mod backend;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod models;
pub mod post_provision;
pub mod progress;
pub mod provision;
pub mod retry;
pub mod storage;
pub mod telemetry;

pub use backend::{AadBackend, ApiError, Endpoints, OwnerDirectory, backend_for};
pub use collaborators::CollaboratorService;
pub use config::{ConfigError, PermissionPolicy, Settings};
pub use context::{Audience, ProvisionContext, RunContext, TokenProvider};
pub use models::ProvisionReport;
pub use post_provision::DownstreamAccess;
pub use provision::AadProvisioner;
pub use retry::RetryPolicy;
