//! Additive reconciliation of an existing application against what a run requires.
//!
//! Every merge returns `None` when the remote value already satisfies the
//! requirement; callers must then skip the network write entirely.

use crate::application::{
    AadApplication, ImplicitGrantSettings, RedirectSettings, RequiredResourceAccess,
    ResourceAccess,
};

/// Append required URIs missing from `existing`, keeping existing order.
pub fn merge_redirect_uris(existing: &[String], required: &[String]) -> Option<Vec<String>> {
    let mut merged = existing.to_vec();
    for uri in required {
        if !merged.contains(uri) {
            merged.push(uri.clone());
        }
    }
    (merged.len() != existing.len()).then_some(merged)
}

/// Ensure `{scope_id, Scope}` is granted on `resource_app_id`.
pub fn merge_resource_access(
    existing: &[RequiredResourceAccess],
    resource_app_id: &str,
    scope_id: &str,
) -> Option<Vec<RequiredResourceAccess>> {
    let wanted = ResourceAccess::scope(scope_id);
    let mut merged = existing.to_vec();
    match merged
        .iter_mut()
        .find(|entry| entry.resource_app_id == resource_app_id)
    {
        Some(entry) if entry.resource_access.contains(&wanted) => return None,
        Some(entry) => entry.resource_access.push(wanted),
        None => merged.push(RequiredResourceAccess {
            resource_app_id: resource_app_id.to_string(),
            resource_access: vec![wanted],
        }),
    }
    Some(merged)
}

/// Merge every entry of `required` into `existing` without dropping anything.
pub fn merge_required_resource_access(
    existing: &[RequiredResourceAccess],
    required: &[RequiredResourceAccess],
) -> Option<Vec<RequiredResourceAccess>> {
    let mut merged = existing.to_vec();
    let mut changed = false;
    for entry in required {
        match merged
            .iter_mut()
            .find(|current| current.resource_app_id == entry.resource_app_id)
        {
            Some(current) => {
                for access in &entry.resource_access {
                    if !current.resource_access.contains(access) {
                        current.resource_access.push(access.clone());
                        changed = true;
                    }
                }
            }
            None => {
                merged.push(entry.clone());
                changed = true;
            }
        }
    }
    changed.then_some(merged)
}

/// Schedule enabling ID-token issuance unless it is already on.
pub fn ensure_id_token_issuance(existing: Option<bool>) -> Option<ImplicitGrantSettings> {
    match existing {
        Some(true) => None,
        _ => Some(ImplicitGrantSettings {
            enable_id_token_issuance: Some(true),
            enable_access_token_issuance: None,
        }),
    }
}

/// What a run needs an application to carry after provisioning.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequiredAdditions {
    pub web_redirect_uris: Vec<String>,
    pub spa_redirect_uris: Vec<String>,
    pub identifier_uris: Vec<String>,
    /// Downstream API scope the application must be granted, as `(resourceAppId, scopeId)`.
    pub resource_scope: Option<(String, String)>,
    pub enable_id_token: bool,
}

/// Compose every additive merge into a single patch.
///
/// Returns `None` when the application already satisfies `required`.
pub fn plan_patch(current: &AadApplication, required: &RequiredAdditions) -> Option<AadApplication> {
    let mut patch = AadApplication::default();

    let redirect_uris = merge_redirect_uris(current.web_redirect_uris(), &required.web_redirect_uris);
    let implicit_grant = if required.enable_id_token {
        ensure_id_token_issuance(current.id_token_issuance())
    } else {
        None
    };
    if redirect_uris.is_some() || implicit_grant.is_some() {
        // Graph replaces `web` wholesale, so carry the untouched fields along.
        let mut web = current.web.clone().unwrap_or_default();
        if let Some(uris) = redirect_uris {
            web.redirect_uris = Some(uris);
        }
        if let Some(grant) = implicit_grant {
            let settings = web.implicit_grant_settings.get_or_insert_with(Default::default);
            settings.enable_id_token_issuance = grant.enable_id_token_issuance;
        }
        patch.web = Some(web);
    }

    if let Some(uris) = merge_redirect_uris(current.spa_redirect_uris(), &required.spa_redirect_uris)
    {
        patch.spa = Some(RedirectSettings {
            redirect_uris: uris,
        });
    }

    let identifier_uris = current.identifier_uris.as_deref().unwrap_or_default();
    if let Some(uris) = merge_redirect_uris(identifier_uris, &required.identifier_uris) {
        patch.identifier_uris = Some(uris);
    }

    if let Some((resource_app_id, scope_id)) = &required.resource_scope {
        let existing = current.required_resource_access.as_deref().unwrap_or_default();
        if let Some(access) = merge_resource_access(existing, resource_app_id, scope_id) {
            patch.required_resource_access = Some(access);
        }
    }

    (!patch.is_empty()).then_some(patch)
}
