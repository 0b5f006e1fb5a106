//! Translation of the user-authored `permissions.json` into resource-access grants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    application::{RequiredResourceAccess, ResourceAccess},
    catalog::PermissionCatalog,
    error::{ProvisionError, ProvisionResult},
};

/// One declared permission entry.
///
/// `delegated` and `application` are accepted as aliases of `scopes` and `roles`.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRequest {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegated: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub application: Vec<String>,
}

impl PermissionRequest {
    fn role_names(&self) -> Vec<&str> {
        unique_names(self.roles.iter().chain(&self.application))
    }

    fn scope_names(&self) -> Vec<&str> {
        unique_names(self.scopes.iter().chain(&self.delegated))
    }
}

fn unique_names<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for name in names.map(|name| name.trim()).filter(|name| !name.is_empty()) {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// True for the canonical hyphenated 8-4-4-4-12 form.
pub fn is_guid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

/// Parse a permission request document.
pub fn parse_permission_request(raw: &str) -> ProvisionResult<Vec<PermissionRequest>> {
    serde_json::from_str(raw).map_err(|err| ProvisionError::ParsePermission(err.to_string()))
}

/// Resolve a permission request against the catalog.
///
/// Output holds one entry per distinct resource in first-seen order. Roles are
/// listed before scopes within an entry. Nothing is returned on the first failure.
pub fn translate(
    raw: &str,
    catalog: &PermissionCatalog,
) -> ProvisionResult<Vec<RequiredResourceAccess>> {
    let requests = parse_permission_request(raw)?;
    translate_requests(&requests, catalog)
}

pub fn translate_requests(
    requests: &[PermissionRequest],
    catalog: &PermissionCatalog,
) -> ProvisionResult<Vec<RequiredResourceAccess>> {
    let mut output: Vec<RequiredResourceAccess> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for request in requests {
        let resource_app_id = resolve_resource(&request.resource, catalog)?;

        let mut grants = Vec::new();
        for role in request.role_names() {
            let id = resolve_name(role, &resource_app_id, |app_id, name| {
                catalog.role_id(app_id, name)
            })
            .ok_or_else(|| ProvisionError::UnknownPermissionRole {
                role: role.to_string(),
                resource: request.resource.clone(),
            })?;
            grants.push(ResourceAccess::role(id));
        }
        for scope in request.scope_names() {
            let id = resolve_name(scope, &resource_app_id, |app_id, name| {
                catalog.scope_id(app_id, name)
            })
            .ok_or_else(|| ProvisionError::UnknownPermissionScope {
                scope: scope.to_string(),
                resource: request.resource.clone(),
            })?;
            grants.push(ResourceAccess::scope(id));
        }

        let slot = *index.entry(resource_app_id.clone()).or_insert_with(|| {
            output.push(RequiredResourceAccess {
                resource_app_id,
                resource_access: Vec::new(),
            });
            output.len() - 1
        });
        let entry = &mut output[slot];
        for grant in grants {
            if !entry.resource_access.contains(&grant) {
                entry.resource_access.push(grant);
            }
        }
    }

    Ok(output)
}

fn resolve_resource(resource: &str, catalog: &PermissionCatalog) -> ProvisionResult<String> {
    let resource = resource.trim();
    if is_guid(resource) {
        return Ok(resource.to_string());
    }
    catalog
        .app_id_for(resource)
        .map(str::to_string)
        .ok_or_else(|| ProvisionError::UnknownPermissionName(resource.to_string()))
}

fn resolve_name<'c>(
    name: &str,
    resource_app_id: &str,
    lookup: impl Fn(&str, &str) -> Option<&'c str>,
) -> Option<String> {
    if is_guid(name) {
        return Some(name.to_string());
    }
    lookup(resource_app_id, name).map(str::to_string)
}
