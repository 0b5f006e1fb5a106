use uuid::Uuid;

use crate::{
    application::{
        AadApplication, ApiSettings, OptionalClaim, OptionalClaims, PermissionScope,
        PreAuthorizedApplication,
    },
    error::{ProvisionError, ProvisionResult},
};

/// Longest display name AAD accepts for an app registration.
pub const MAX_DISPLAY_NAME_LEN: usize = 120;
/// Display name given to the single tracked client secret.
pub const PASSWORD_DISPLAY_NAME: &str = "default";
pub const ACCESS_AS_USER_SCOPE: &str = "access_as_user";
pub const TEAMS_WEB_CLIENT_ID: &str = "5e3ce6c0-2b1f-4285-8d4b-75ee78787346";
pub const TEAMS_MOBILE_DESKTOP_CLIENT_ID: &str = "1fec8e78-bce4-4aaf-ab1b-5451cc387264";

/// One AAD application across a provisioning run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub display_name: String,
    pub object_id: Option<String>,
    pub client_id: Option<String>,
    pub password: Option<String>,
    oauth2_permission_scope_id: String,
    pub permission_request: Option<String>,
    pub is_local_debug: bool,
}

impl ProvisionConfig {
    /// Start a config for `app_name`, generating a fresh `access_as_user` scope id.
    pub fn new(app_name: &str, is_local_debug: bool) -> ProvisionResult<Self> {
        Ok(Self {
            display_name: display_name_for(app_name)?,
            object_id: None,
            client_id: None,
            password: None,
            oauth2_permission_scope_id: Uuid::new_v4().to_string(),
            permission_request: None,
            is_local_debug,
        })
    }

    pub fn oauth2_permission_scope_id(&self) -> &str {
        &self.oauth2_permission_scope_id
    }

    /// Adopt a scope id persisted by an earlier run.
    pub fn restore_scope_id(&mut self, scope_id: impl Into<String>) {
        self.oauth2_permission_scope_id = scope_id.into();
    }

    /// Body for creating the application registration.
    pub fn create_payload(&self) -> AadApplication {
        let scope_id = self.oauth2_permission_scope_id.clone();
        AadApplication {
            display_name: Some(self.display_name.clone()),
            sign_in_audience: Some("AzureADMyOrg".into()),
            api: Some(ApiSettings {
                requested_access_token_version: Some(2),
                oauth2_permission_scopes: Some(vec![PermissionScope {
                    id: scope_id.clone(),
                    value: ACCESS_AS_USER_SCOPE.into(),
                    kind: "User".into(),
                    is_enabled: true,
                    admin_consent_description: Some(
                        "Allow Teams to call the app's web APIs as the current user.".into(),
                    ),
                    admin_consent_display_name: Some("Teams can access app's web APIs".into()),
                    user_consent_description: Some(
                        "Enable Teams to call this app's web APIs with the same rights that you have."
                            .into(),
                    ),
                    user_consent_display_name: Some(
                        "Teams can access app's web APIs and make requests on your behalf.".into(),
                    ),
                }]),
                pre_authorized_applications: Some(
                    [TEAMS_WEB_CLIENT_ID, TEAMS_MOBILE_DESKTOP_CLIENT_ID]
                        .into_iter()
                        .map(|app_id| PreAuthorizedApplication {
                            app_id: app_id.into(),
                            delegated_permission_ids: vec![scope_id.clone()],
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            optional_claims: Some(OptionalClaims {
                access_token: Some(vec![OptionalClaim {
                    name: "idtyp".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Strip everything but ASCII letters and digits, then cap the length.
pub fn display_name_for(app_name: &str) -> ProvisionResult<String> {
    let name: String = app_name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_DISPLAY_NAME_LEN)
        .collect();
    if name.is_empty() {
        return Err(ProvisionError::GetConfig {
            key: "displayName".into(),
        });
    }
    Ok(name)
}
