use serde::{Deserialize, Serialize};

/// Summary of one run, printed by the admin CLI.
///
/// `credentials` names the state keys that hold secrets, never their values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ProvisionReport {
    pub env: String,
    pub tenant: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub warnings: Vec<String>,
    pub credentials: Vec<String>,
}

impl ProvisionReport {
    pub fn new(env: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            env: env.into(),
            tenant: tenant.into(),
            ..Default::default()
        }
    }
}

/// Whether a user may manage an application registration.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccessLevel {
    Owner,
    NoPermission,
}

/// One owner of the application registration.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_object_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_principal_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PermissionStatus {
    pub object_id: String,
    pub user_object_id: String,
    pub access: AccessLevel,
}
