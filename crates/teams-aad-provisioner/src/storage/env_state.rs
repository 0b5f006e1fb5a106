//! Per-environment documents: the user-authored env config and the AAD state
//! written back after each run.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::state_manager::{StatePath, StateStore, StorageError};

pub const LOCAL_DEBUG_PREFIX: &str = "local_";
pub const OAUTH_HOST: &str = "https://login.microsoftonline.com";

/// Which environment a run reads and writes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnvScope {
    pub env: String,
    pub local_debug: bool,
}

impl EnvScope {
    pub fn new(env: impl Into<String>, local_debug: bool) -> Self {
        Self {
            env: env.into(),
            local_debug,
        }
    }

    pub fn config_path(&self) -> Result<StatePath, StorageError> {
        StatePath::new(format!("{}/config.json", self.env))
    }

    pub fn state_path(&self) -> Result<StatePath, StorageError> {
        let file = if self.local_debug {
            "local-settings.json"
        } else {
            "state.json"
        };
        StatePath::new(format!("{}/{file}", self.env))
    }

    fn key_prefix(&self) -> &'static str {
        if self.local_debug { LOCAL_DEBUG_PREFIX } else { "" }
    }
}

/// User-authored settings for one environment.
///
/// Local debug keeps its own `localAuth` block so a cloud identity is never
/// adopted into the `local_` state keys.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub local_auth: AuthConfig,
}

impl EnvConfig {
    pub fn auth_for(&self, scope: &EnvScope) -> &AuthConfig {
        if scope.local_debug {
            &self.local_auth
        } else {
            &self.auth
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Use the pre-existing registration below instead of provisioning one.
    #[serde(default)]
    pub skip_provision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_as_user_scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub is_vs: bool,
}

/// AAD identity persisted between runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AadState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2_permission_scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_id_uris: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_authority: Option<String>,
}

impl AadState {
    /// Record the tenant together with the login host and authority derived from it.
    pub fn set_tenant(&mut self, tenant_id: &str) {
        self.tenant_id = Some(tenant_id.to_string());
        self.oauth_host = Some(OAUTH_HOST.to_string());
        self.oauth_authority = Some(format!("{OAUTH_HOST}/{tenant_id}"));
    }
}

pub fn load_env_config(
    store: &dyn StateStore,
    scope: &EnvScope,
) -> Result<EnvConfig, StorageError> {
    match store.get_json_value(&scope.config_path()?)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(EnvConfig::default()),
    }
}

pub fn save_env_config(
    store: &dyn StateStore,
    scope: &EnvScope,
    config: &EnvConfig,
) -> Result<(), StorageError> {
    store.put_json_value(&scope.config_path()?, &serde_json::to_value(config)?)
}

/// Read the AAD state, stripping the local-debug key prefix when present.
pub fn load_aad_state(store: &dyn StateStore, scope: &EnvScope) -> Result<AadState, StorageError> {
    let Some(Value::Object(entries)) = store.get_json_value(&scope.state_path()?)? else {
        return Ok(AadState::default());
    };
    let prefix = scope.key_prefix();
    let stripped: Map<String, Value> = entries
        .into_iter()
        .filter_map(|(key, value)| key.strip_prefix(prefix).map(|k| (k.to_string(), value)))
        .collect();
    Ok(serde_json::from_value(Value::Object(stripped))?)
}

/// Merge `state` into the stored document, keeping unrelated keys written by other tools.
pub fn save_aad_state(
    store: &dyn StateStore,
    scope: &EnvScope,
    state: &AadState,
) -> Result<(), StorageError> {
    let path = scope.state_path()?;
    let mut document = match store.get_json_value(&path)? {
        Some(Value::Object(entries)) => entries,
        _ => Map::new(),
    };
    if let Value::Object(entries) = serde_json::to_value(state)? {
        let prefix = scope.key_prefix();
        for (key, value) in entries {
            document.insert(format!("{prefix}{key}"), value);
        }
    }
    store.put_json_value(&path, &Value::Object(document))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::MemoryState;
    use serde_json::json;

    #[test]
    fn local_debug_state_uses_prefixed_keys() {
        let store = MemoryState::default();
        let scope = EnvScope::new("dev", true);
        let state = AadState {
            object_id: Some("obj".into()),
            client_id: Some("client".into()),
            ..Default::default()
        };
        save_aad_state(&store, &scope, &state).unwrap();

        let raw = store
            .get_json_value(&StatePath::new("dev/local-settings.json").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(raw, json!({ "local_objectId": "obj", "local_clientId": "client" }));
        assert_eq!(load_aad_state(&store, &scope).unwrap(), state);
        assert_eq!(
            load_aad_state(&store, &EnvScope::new("dev", false)).unwrap(),
            AadState::default()
        );
    }

    #[test]
    fn save_preserves_foreign_keys() {
        let store = MemoryState::default();
        let scope = EnvScope::new("dev", false);
        store
            .put_json_value(&scope.state_path().unwrap(), &json!({ "botId": "bot" }))
            .unwrap();

        let mut state = AadState::default();
        state.set_tenant("tenant-1");
        save_aad_state(&store, &scope, &state).unwrap();

        let raw = store
            .get_json_value(&scope.state_path().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(raw["botId"], "bot");
        assert_eq!(
            raw["oauthAuthority"],
            "https://login.microsoftonline.com/tenant-1"
        );
    }

    #[test]
    fn cloud_identity_is_not_visible_to_local_debug() {
        let store = MemoryState::default();
        let config = EnvConfig {
            app_name: Some("demo".into()),
            auth: AuthConfig {
                skip_provision: true,
                object_id: Some("cloud-obj".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        save_env_config(&store, &EnvScope::new("dev", false), &config).unwrap();

        let local = EnvScope::new("dev", true);
        let loaded = load_env_config(&store, &local).unwrap();
        assert_eq!(loaded.app_name.as_deref(), Some("demo"));
        assert!(!loaded.auth_for(&local).skip_provision);
        assert_eq!(loaded.auth_for(&local).object_id, None);
        assert_eq!(
            loaded.auth_for(&EnvScope::new("dev", false)).object_id.as_deref(),
            Some("cloud-obj")
        );
    }

    #[test]
    fn missing_env_config_defaults() {
        let store = MemoryState::default();
        let config = load_env_config(&store, &EnvScope::new("dev", false)).unwrap();
        assert!(!config.auth.skip_provision);
    }
}
