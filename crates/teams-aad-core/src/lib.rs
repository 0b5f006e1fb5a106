//! Domain model and reconciliation rules for Teams AAD app registrations.
//!
//! Nothing in this crate performs I/O; the provisioner crate drives it against
//! the remote directory.

pub mod application;
pub mod catalog;
pub mod error;
pub mod manifest;
pub mod merge;
pub mod permission;
pub mod provision_config;
pub mod uris;

pub use application::{AadApplication, AccessType, RequiredResourceAccess, ResourceAccess};
pub use catalog::{CatalogError, PermissionCatalog};
pub use error::{ErrorKind, ProvisionError, ProvisionResult, RemoteStep};
pub use merge::{RequiredAdditions, plan_patch};
pub use permission::{PermissionRequest, translate};
pub use provision_config::ProvisionConfig;
