use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../data/well_known_permissions.json");

/// A well-known service and the permissions it exposes.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogService {
    pub app_id: String,
    pub display_name: String,
    #[serde(default)]
    pub oauth2_permission_scopes: Vec<CatalogPermission>,
    #[serde(default)]
    pub app_roles: Vec<CatalogPermission>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CatalogPermission {
    pub value: String,
    pub id: String,
}

/// Permissions exposed by one resource application, keyed by name.
#[derive(Clone, Debug, Default)]
pub struct ResourcePermissions {
    pub display_name: String,
    pub scopes: HashMap<String, String>,
    pub roles: HashMap<String, String>,
}

/// Immutable index of well-known resource applications.
///
/// Built once at startup and passed by reference to whatever needs name lookups.
#[derive(Clone, Debug, Default)]
pub struct PermissionCatalog {
    by_app_id: HashMap<String, ResourcePermissions>,
    by_name: HashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read permission catalog `{path}`: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid permission catalog json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate catalog entry for app id `{0}`")]
    DuplicateAppId(String),
}

impl PermissionCatalog {
    /// Catalog bundled with the crate.
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_json(BUILTIN_CATALOG)
    }

    /// Load a catalog file in the same shape as the bundled table.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let services: Vec<CatalogService> = serde_json::from_str(raw)?;
        Self::from_services(services)
    }

    pub fn from_services(
        services: impl IntoIterator<Item = CatalogService>,
    ) -> Result<Self, CatalogError> {
        let mut catalog = Self::default();
        for service in services {
            if catalog.by_app_id.contains_key(&service.app_id) {
                return Err(CatalogError::DuplicateAppId(service.app_id));
            }
            catalog
                .by_name
                .insert(service.display_name.clone(), service.app_id.clone());
            let permissions = ResourcePermissions {
                display_name: service.display_name,
                scopes: service
                    .oauth2_permission_scopes
                    .into_iter()
                    .map(|p| (p.value, p.id))
                    .collect(),
                roles: service
                    .app_roles
                    .into_iter()
                    .map(|p| (p.value, p.id))
                    .collect(),
            };
            catalog.by_app_id.insert(service.app_id, permissions);
        }
        Ok(catalog)
    }

    /// Resolve a display name such as `Microsoft Graph` to its app id.
    pub fn app_id_for(&self, display_name: &str) -> Option<&str> {
        self.by_name.get(display_name).map(String::as_str)
    }

    pub fn resource(&self, app_id: &str) -> Option<&ResourcePermissions> {
        self.by_app_id.get(app_id)
    }

    pub fn scope_id(&self, app_id: &str, scope: &str) -> Option<&str> {
        self.resource(app_id)?.scopes.get(scope).map(String::as_str)
    }

    pub fn role_id(&self, app_id: &str, role: &str) -> Option<&str> {
        self.resource(app_id)?.roles.get(role).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_app_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_app_id.is_empty()
    }
}
