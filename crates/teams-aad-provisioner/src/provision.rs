//! Identity resolution and permission application for one environment.

use std::{fs, io, path::Path, sync::Arc};

use teams_aad_core::{
    AadApplication, PermissionCatalog, ProvisionConfig, ProvisionError, ProvisionResult,
    RemoteStep, RequiredResourceAccess, merge::merge_required_resource_access,
    provision_config::PASSWORD_DISPLAY_NAME, translate, uris,
};
use tracing::{error, info};

use crate::{
    backend::{AadBackend, ApiError},
    config::PermissionPolicy,
    context::ProvisionContext,
    models::ProvisionReport,
    progress::{NoopProgress, ProgressReporter},
    retry::RetryPolicy,
    storage::{
        AadState, AuthConfig, EnvConfig,
        env_state::{load_aad_state, load_env_config, save_aad_state},
    },
    telemetry::{self, EventAttributes},
};

pub const PERMISSIONS_FILE: &str = "permissions.json";
pub const PROGRESS_TITLE: &str = "[AAD App Registration]";

pub(crate) const OP_CREATE_APP: &str = "createAadApp";
pub(crate) const OP_GET_APP: &str = "getAadApp";
pub(crate) const OP_CREATE_SECRET: &str = "createAadAppSecret";
pub(crate) const OP_UPDATE_PERMISSION: &str = "updateAadAppPermission";
pub(crate) const OP_UPDATE_APP: &str = "updateAadApp";

/// Drives the AAD app registration lifecycle against one backend.
pub struct AadProvisioner {
    pub(crate) backend: Arc<dyn AadBackend>,
    pub(crate) catalog: PermissionCatalog,
    pub(crate) retry: RetryPolicy,
    pub(crate) policy: PermissionPolicy,
    pub(crate) progress: Arc<dyn ProgressReporter>,
}

impl AadProvisioner {
    pub fn new(backend: Arc<dyn AadBackend>, catalog: PermissionCatalog) -> Self {
        Self {
            backend,
            catalog,
            retry: RetryPolicy::default(),
            policy: PermissionPolicy::default(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_policy(mut self, policy: PermissionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Create, fetch or adopt the registration, apply `permissions.json` and persist identity.
    pub fn provision(&self, ctx: &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport> {
        let mut attrs = EventAttributes {
            env: &ctx.scope().env,
            tenant: ctx.tenant(),
            ..Default::default()
        };
        telemetry::emit_start(telemetry::EVENT_PROVISION_START, &attrs);
        self.progress
            .start(&format!("{PROGRESS_TITLE} Provisioning"));

        let result = load_env_config(ctx.state(), ctx.scope())
            .map_err(ProvisionError::from)
            .and_then(|env_config| {
                let auth = env_config.auth_for(ctx.scope());
                attrs.skip = auth.skip_provision;
                if auth.skip_provision {
                    self.adopt_existing(ctx, auth)
                } else {
                    self.provision_app(ctx, &env_config)
                }
            });

        self.progress.end(result.is_ok());
        self.finish(telemetry::EVENT_PROVISION, attrs, result)
    }

    /// Re-apply `permissions.json` to the stored registration without touching identity.
    pub fn update_permission(&self, ctx: &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport> {
        let mut attrs = EventAttributes {
            env: &ctx.scope().env,
            tenant: ctx.tenant(),
            ..Default::default()
        };
        self.progress
            .start(&format!("{PROGRESS_TITLE} Updating permissions"));

        let result = load_env_config(ctx.state(), ctx.scope())
            .map_err(ProvisionError::from)
            .and_then(|env_config| {
                let auth = env_config.auth_for(ctx.scope());
                attrs.skip = auth.skip_provision;
                if auth.skip_provision {
                    Ok(skipped_permission_update(ctx, auth))
                } else {
                    self.reapply_permissions(ctx)
                }
            });

        self.progress.end(result.is_ok());
        self.finish(telemetry::EVENT_UPDATE_PERMISSION, attrs, result)
    }

    pub(crate) fn finish(
        &self,
        event: &str,
        attrs: EventAttributes<'_>,
        result: ProvisionResult<ProvisionReport>,
    ) -> ProvisionResult<ProvisionReport> {
        match &result {
            Ok(report) => {
                let attrs = EventAttributes {
                    app_id: report.client_id.as_deref(),
                    ..attrs
                };
                telemetry::emit_success(event, &attrs);
            }
            Err(err) => {
                error!(
                    target: "aad.provision",
                    event,
                    env = attrs.env,
                    error = %err,
                    "AAD app operation failed"
                );
                telemetry::emit_error(event, &attrs, err);
            }
        }
        result
    }

    fn reapply_permissions(&self, ctx: &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport> {
        let state = load_aad_state(ctx.state(), ctx.scope())?;
        let object_id = state.object_id.ok_or_else(|| ProvisionError::GetConfig {
            key: "objectId".into(),
        })?;
        let required = self.read_required_access(ctx.project_root())?;

        let mut report = ProvisionReport::new(&ctx.scope().env, ctx.tenant());
        report.object_id = Some(object_id.clone());
        report.client_id = state.client_id;
        self.apply_permissions(&object_id, required, &mut report)?;
        Ok(report)
    }

    fn adopt_existing(
        &self,
        ctx: &ProvisionContext<'_>,
        auth: &AuthConfig,
    ) -> ProvisionResult<ProvisionReport> {
        let (Some(object_id), Some(client_id), Some(client_secret), Some(scope_id)) = (
            auth.object_id.clone(),
            auth.client_id.clone(),
            auth.client_secret.clone(),
            auth.access_as_user_scope_id.clone(),
        ) else {
            return Err(ProvisionError::GetSkipAppConfig {
                file: ctx.scope().config_path()?.as_str().to_string(),
            });
        };

        let mut state = load_aad_state(ctx.state(), ctx.scope())?;
        state.object_id = Some(object_id.clone());
        state.client_id = Some(client_id.clone());
        state.client_secret = Some(client_secret);
        state.oauth2_permission_scope_id = Some(scope_id);
        state.set_tenant(ctx.tenant());
        save_aad_state(ctx.state(), ctx.scope(), &state)?;
        info!(target: "aad.provision", object_id = %object_id, "skipProvision set; adopted configured AAD app");

        let mut report = ProvisionReport::new(&ctx.scope().env, ctx.tenant());
        report.object_id = Some(object_id.clone());
        report.client_id = Some(client_id);
        report.skipped.push(format!("application {object_id}"));
        report.credentials.push("clientSecret".into());
        Ok(report)
    }

    fn provision_app(
        &self,
        ctx: &ProvisionContext<'_>,
        env_config: &EnvConfig,
    ) -> ProvisionResult<ProvisionReport> {
        let app_name = env_config
            .app_name
            .as_deref()
            .ok_or_else(|| ProvisionError::GetConfig {
                key: "appName".into(),
            })?;
        let mut config = ProvisionConfig::new(app_name, ctx.scope().local_debug)?;
        let mut state = load_aad_state(ctx.state(), ctx.scope())?;
        config.object_id = state.object_id.clone();
        config.client_id = state.client_id.clone();
        config.password = state.client_secret.clone();
        if let Some(scope_id) = &state.oauth2_permission_scope_id {
            config.restore_scope_id(scope_id.clone());
        }

        // Validate the request before anything is created remotely.
        self.progress.next("Reading permission request");
        let raw = read_permission_request(ctx.project_root())?;
        let required = translate(&raw, &self.catalog)?;
        config.permission_request = Some(raw);

        let mut report = ProvisionReport::new(&ctx.scope().env, ctx.tenant());
        match config.object_id.clone() {
            Some(object_id) => {
                self.progress.next("Fetching existing AAD app");
                let app = self.call(OP_GET_APP, RemoteStep::GetApp, || {
                    self.backend.get_app(&object_id)
                })?;
                config.client_id = Some(required_field(app.app_id, RemoteStep::GetApp, "appId")?);
                report.skipped.push(format!("application {object_id}"));
            }
            None => {
                self.progress.next("Creating AAD app");
                let payload = config.create_payload();
                let app = self.call(OP_CREATE_APP, RemoteStep::CreateApp, || {
                    self.backend.create_app(&payload)
                })?;
                let object_id = required_field(app.id, RemoteStep::CreateApp, "id")?;
                config.client_id = Some(required_field(app.app_id, RemoteStep::CreateApp, "appId")?);
                config.object_id = Some(object_id.clone());
                config.password = None;

                // Identity is saved before any further remote call.
                state.object_id = Some(object_id.clone());
                state.client_id = config.client_id.clone();
                state.client_secret = None;
                state.oauth2_permission_scope_id =
                    Some(config.oauth2_permission_scope_id().to_string());
                save_aad_state(ctx.state(), ctx.scope(), &state)?;
                info!(target: "aad.provision", object_id = %object_id, "created AAD app");
                report.created.push(format!("application {object_id}"));
            }
        }
        let object_id = config.object_id.clone().ok_or_else(|| ProvisionError::GetConfig {
            key: "objectId".into(),
        })?;

        if config.password.is_none() {
            self.progress.next("Creating client secret");
            let secret = self.call(OP_CREATE_SECRET, RemoteStep::CreateSecret, || {
                self.backend.create_secret(&object_id, PASSWORD_DISPLAY_NAME)
            })?;
            config.password = Some(secret);
            report.created.push("client secret".into());
        }

        self.progress.next("Updating permissions");
        self.apply_permissions(&object_id, required, &mut report)?;

        state.object_id = Some(object_id.clone());
        state.client_id = config.client_id.clone();
        state.client_secret = config.password.clone();
        state.oauth2_permission_scope_id = Some(config.oauth2_permission_scope_id().to_string());
        state.set_tenant(ctx.tenant());
        record_application_id_uri(&mut state, env_config.auth_for(ctx.scope()), &mut report);
        save_aad_state(ctx.state(), ctx.scope(), &state)?;

        report.object_id = Some(object_id);
        report.client_id = config.client_id;
        report.credentials.push("clientSecret".into());
        Ok(report)
    }

    pub(crate) fn apply_permissions(
        &self,
        object_id: &str,
        required: Vec<RequiredResourceAccess>,
        report: &mut ProvisionReport,
    ) -> ProvisionResult<()> {
        let access = match self.policy {
            PermissionPolicy::Replace => required,
            PermissionPolicy::Merge => {
                let current = self.call(OP_GET_APP, RemoteStep::GetApp, || {
                    self.backend.get_app(object_id)
                })?;
                let existing = current.required_resource_access.unwrap_or_default();
                match merge_required_resource_access(&existing, &required) {
                    Some(merged) => merged,
                    None => {
                        report.skipped.push("requiredResourceAccess".into());
                        return Ok(());
                    }
                }
            }
        };

        let patch = AadApplication {
            required_resource_access: Some(access),
            ..Default::default()
        };
        self.call(OP_UPDATE_PERMISSION, RemoteStep::UpdatePermission, || {
            self.backend.update_app(object_id, &patch)
        })?;
        info!(target: "aad.provision", object_id, policy = ?self.policy, "applied permissions");
        report.updated.push("requiredResourceAccess".into());
        Ok(())
    }

    pub(crate) fn read_required_access(
        &self,
        project_root: &Path,
    ) -> ProvisionResult<Vec<RequiredResourceAccess>> {
        translate(&read_permission_request(project_root)?, &self.catalog)
    }

    /// Run `call` under the retry policy and attribute its failure to `step`.
    pub(crate) fn call<T, F>(&self, operation: &str, step: RemoteStep, call: F) -> ProvisionResult<T>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        self.retry
            .run(operation, call)
            .map_err(|err| err.into_provision(step))
    }
}

/// Read `permissions.json` from the project root.
pub fn read_permission_request(project_root: &Path) -> ProvisionResult<String> {
    let path = project_root.join(PERMISSIONS_FILE);
    fs::read_to_string(&path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => ProvisionError::MissingPermissionsFile {
            path: path.display().to_string(),
        },
        _ => ProvisionError::State(format!("failed to read {}: {err}", path.display())),
    })
}

fn required_field(value: Option<String>, step: RemoteStep, field: &str) -> ProvisionResult<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ProvisionError::InvalidResponse {
            step,
            detail: format!("response has no `{field}`"),
        })
}

fn skipped_permission_update(ctx: &ProvisionContext<'_>, auth: &AuthConfig) -> ProvisionReport {
    info!(target: "aad.provision", "skipProvision set; permissions left untouched");
    let mut report = ProvisionReport::new(&ctx.scope().env, ctx.tenant());
    report.object_id = auth.object_id.clone();
    report.client_id = auth.client_id.clone();
    report.skipped.push("requiredResourceAccess".into());
    report
}

/// Derive the identifier URI from the current endpoints; a stale stored value is replaced.
fn record_application_id_uri(state: &mut AadState, auth: &AuthConfig, report: &mut ProvisionReport) {
    let Some(client_id) = state.client_id.as_deref() else {
        return;
    };
    let host = auth.frontend_endpoint.as_deref().and_then(uris::endpoint_host);
    match uris::application_id_uri(host.as_deref(), auth.bot_id.as_deref(), client_id) {
        Ok(uri) => state.application_id_uris = Some(uri),
        Err(err) => report.warnings.push(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use teams_aad_core::AadApplication;

    use crate::{
        backend::{AadBackend, ApiError},
        context::Audience,
    };

    #[derive(Clone, Debug, PartialEq)]
    pub enum Call {
        Create,
        Get(String),
        Update(String, AadApplication),
        Secret(String),
    }

    /// Scripted backend that records every call.
    pub struct MockBackend {
        pub app: Mutex<AadApplication>,
        pub calls: Mutex<Vec<Call>>,
        pub fail_updates: Mutex<u32>,
    }

    impl MockBackend {
        pub fn with_app(app: AadApplication) -> Self {
            Self {
                app: Mutex::new(app),
                calls: Mutex::new(Vec::new()),
                fail_updates: Mutex::new(0),
            }
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl AadBackend for MockBackend {
        fn audience(&self) -> Audience {
            Audience::Graph
        }

        fn create_app(&self, app: &AadApplication) -> Result<AadApplication, ApiError> {
            self.calls.lock().unwrap().push(Call::Create);
            let mut stored = self.app.lock().unwrap();
            let id = stored.id.clone();
            let app_id = stored.app_id.clone();
            *stored = AadApplication {
                id,
                app_id,
                ..app.clone()
            };
            Ok(stored.clone())
        }

        fn get_app(&self, object_id: &str) -> Result<AadApplication, ApiError> {
            self.calls.lock().unwrap().push(Call::Get(object_id.into()));
            Ok(self.app.lock().unwrap().clone())
        }

        fn update_app(&self, object_id: &str, patch: &AadApplication) -> Result<(), ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Update(object_id.into(), patch.clone()));
            let mut failures = self.fail_updates.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ApiError::http(503, "unavailable".into()));
            }
            let mut stored = self.app.lock().unwrap();
            if let Some(access) = &patch.required_resource_access {
                stored.required_resource_access = Some(access.clone());
            }
            Ok(())
        }

        fn create_secret(&self, object_id: &str, _display_name: &str) -> Result<String, ApiError> {
            self.calls.lock().unwrap().push(Call::Secret(object_id.into()));
            Ok("generated-secret".into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use teams_aad_core::{RequiredResourceAccess, ResourceAccess};
    use tracing_test::traced_test;

    use super::{test_support::*, *};
    use crate::{
        context::{Audience, RunContext},
        storage::{
            EnvScope, StateStore,
            env_state::save_env_config,
            test_support::MemoryState,
        },
    };

    const GRAPH: &str = "00000003-0000-0000-c000-000000000000";
    const USER_READ: &str = "e1fe6dd8-ba31-4d61-89e7-88639da4683d";

    struct Fixture {
        run: RunContext,
        store: MemoryState,
        root: tempfile::TempDir,
        backend: Arc<MockBackend>,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                run: RunContext::new(Audience::Graph, "token", "tenant-1"),
                store: MemoryState::default(),
                root: tempfile::tempdir().unwrap(),
                backend: Arc::new(MockBackend::with_app(AadApplication {
                    id: Some("obj-1".into()),
                    app_id: Some("client-1".into()),
                    ..Default::default()
                })),
            };
            fixture.write_env_config(EnvConfig {
                app_name: Some("My App".into()),
                ..Default::default()
            });
            fixture
        }

        fn write_env_config(&self, config: EnvConfig) {
            save_env_config(&self.store, &EnvScope::new("dev", false), &config).unwrap();
        }

        fn write_permissions(&self, body: serde_json::Value) {
            fs::write(self.root.path().join(PERMISSIONS_FILE), body.to_string()).unwrap();
        }

        fn ctx(&self) -> ProvisionContext<'_> {
            self.ctx_for(EnvScope::new("dev", false))
        }

        fn ctx_for(&self, scope: EnvScope) -> ProvisionContext<'_> {
            ProvisionContext::new(&self.run, &self.store, scope, self.root.path())
        }

        fn provisioner(&self) -> AadProvisioner {
            AadProvisioner::new(self.backend.clone(), PermissionCatalog::builtin().unwrap())
                .with_retry(RetryPolicy::new(3, Duration::ZERO))
        }

        fn state(&self) -> AadState {
            load_aad_state(&self.store, &EnvScope::new("dev", false)).unwrap()
        }
    }

    fn user_read() -> Vec<RequiredResourceAccess> {
        vec![RequiredResourceAccess {
            resource_app_id: GRAPH.into(),
            resource_access: vec![ResourceAccess::scope(USER_READ)],
        }]
    }

    #[test]
    fn creates_app_secret_and_permissions_on_first_run() {
        let fx = Fixture::new();
        fx.write_permissions(json!([{ "resource": "Microsoft Graph", "scopes": ["User.Read"] }]));

        let report = fx.provisioner().provision(&fx.ctx()).unwrap();

        assert_eq!(
            fx.backend.calls(),
            vec![
                Call::Create,
                Call::Secret("obj-1".into()),
                Call::Update(
                    "obj-1".into(),
                    AadApplication {
                        required_resource_access: Some(user_read()),
                        ..Default::default()
                    }
                ),
            ]
        );
        assert_eq!(report.object_id.as_deref(), Some("obj-1"));
        assert_eq!(report.client_id.as_deref(), Some("client-1"));

        let state = fx.state();
        assert_eq!(state.client_secret.as_deref(), Some("generated-secret"));
        assert_eq!(state.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(
            state.oauth_authority.as_deref(),
            Some("https://login.microsoftonline.com/tenant-1")
        );
        assert!(state.oauth2_permission_scope_id.is_some());
        assert_eq!(
            report.warnings,
            vec![ProvisionError::CannotGenerateIdentifierUris.to_string()]
        );
    }

    #[test]
    fn second_run_fetches_and_reuses_secret() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        fx.provisioner().provision(&fx.ctx()).unwrap();
        let first = fx.state();
        fx.backend.calls.lock().unwrap().clear();

        fx.provisioner().provision(&fx.ctx()).unwrap();

        let calls = fx.backend.calls();
        assert_eq!(calls[0], Call::Get("obj-1".into()));
        assert!(!calls.iter().any(|c| matches!(c, Call::Create | Call::Secret(_))));
        let second = fx.state();
        assert_eq!(second.client_secret, first.client_secret);
        assert_eq!(second.oauth2_permission_scope_id, first.oauth2_permission_scope_id);
    }

    #[test]
    fn skip_provision_adopts_configured_identity_without_remote_calls() {
        let fx = Fixture::new();
        fx.write_env_config(EnvConfig {
            app_name: Some("demo".into()),
            auth: AuthConfig {
                skip_provision: true,
                object_id: Some("existing-obj".into()),
                client_id: Some("existing-client".into()),
                client_secret: Some("existing-secret".into()),
                access_as_user_scope_id: Some("scope".into()),
                ..Default::default()
            },
            ..Default::default()
        });

        let report = fx.provisioner().provision(&fx.ctx()).unwrap();

        assert!(fx.backend.calls().is_empty());
        assert_eq!(report.client_id.as_deref(), Some("existing-client"));
        let state = fx.state();
        assert_eq!(state.object_id.as_deref(), Some("existing-obj"));
        assert_eq!(state.client_secret.as_deref(), Some("existing-secret"));
        assert_eq!(state.oauth2_permission_scope_id.as_deref(), Some("scope"));
    }

    #[test]
    fn skip_provision_with_missing_secret_fails_before_any_call() {
        let fx = Fixture::new();
        fx.write_env_config(EnvConfig {
            app_name: Some("demo".into()),
            auth: AuthConfig {
                skip_provision: true,
                object_id: Some("existing-obj".into()),
                client_id: Some("existing-client".into()),
                access_as_user_scope_id: Some("scope".into()),
                ..Default::default()
            },
            ..Default::default()
        });

        let err = fx.provisioner().provision(&fx.ctx()).unwrap_err();

        assert_eq!(
            err,
            ProvisionError::GetSkipAppConfig {
                file: "dev/config.json".into()
            }
        );
        assert!(fx.backend.calls().is_empty());
        assert_eq!(fx.state(), AadState::default());
    }

    #[test]
    fn invalid_permission_request_creates_nothing() {
        let fx = Fixture::new();
        fx.write_permissions(json!([{ "resource": "Contoso API", "scopes": ["Read"] }]));

        let err = fx.provisioner().provision(&fx.ctx()).unwrap_err();

        assert_eq!(err, ProvisionError::UnknownPermissionName("Contoso API".into()));
        assert!(fx.backend.calls().is_empty());
    }

    #[test]
    fn missing_permission_file_is_a_user_error() {
        let fx = Fixture::new();
        let err = fx.provisioner().provision(&fx.ctx()).unwrap_err();
        assert!(matches!(err, ProvisionError::MissingPermissionsFile { .. }));
        assert_eq!(err.kind(), teams_aad_core::ErrorKind::User);
    }

    #[traced_test]
    #[test]
    fn failures_are_reported_with_their_error_name() {
        let fx = Fixture::new();
        fx.provisioner().provision(&fx.ctx()).unwrap_err();

        assert!(logs_contain("event=\"provision-start\""));
        assert!(logs_contain("error_code=\"MissingPermissionsFile\""));
        assert!(logs_contain("error_type=user"));
        assert!(logs_contain("success=false"));
    }

    #[test]
    fn merge_policy_keeps_existing_grants() {
        let fx = Fixture::new();
        let other = RequiredResourceAccess {
            resource_app_id: "00000003-0000-0ff1-ce00-000000000000".into(),
            resource_access: vec![ResourceAccess::scope("4e0d77b0-96ba-4398-af14-3baa780278f4")],
        };
        fx.backend.app.lock().unwrap().required_resource_access = Some(vec![other.clone()]);
        fx.write_permissions(json!([{ "resource": GRAPH, "scopes": [USER_READ] }]));
        let provisioner = fx.provisioner().with_policy(PermissionPolicy::Merge);

        let mut report = ProvisionReport::default();
        provisioner
            .apply_permissions("obj-1", user_read(), &mut report)
            .unwrap();
        let stored = fx.backend.app.lock().unwrap().required_resource_access.clone();
        assert_eq!(stored, Some(vec![other, user_read().remove(0)]));

        fx.backend.calls.lock().unwrap().clear();
        let mut report = ProvisionReport::default();
        provisioner
            .apply_permissions("obj-1", user_read(), &mut report)
            .unwrap();
        assert_eq!(fx.backend.calls(), vec![Call::Get("obj-1".into())]);
        assert_eq!(report.skipped, vec!["requiredResourceAccess".to_string()]);
    }

    #[test]
    fn transient_update_failures_are_retried() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        *fx.backend.fail_updates.lock().unwrap() = 2;

        fx.provisioner().provision(&fx.ctx()).unwrap();

        let updates = fx
            .backend
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::Update(..)))
            .count();
        assert_eq!(updates, 3);
    }

    #[test]
    fn exhausted_retries_surface_the_step() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        *fx.backend.fail_updates.lock().unwrap() = 5;

        let err = fx.provisioner().provision(&fx.ctx()).unwrap_err();

        assert_eq!(err.name(), "UpdatePermissionError");
        assert_eq!(err.kind(), teams_aad_core::ErrorKind::System);
        // Identity was persisted before the failing step.
        assert_eq!(fx.state().object_id.as_deref(), Some("obj-1"));
    }

    #[test]
    fn update_permission_requires_object_id() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        let err = fx.provisioner().update_permission(&fx.ctx()).unwrap_err();
        assert_eq!(
            err,
            ProvisionError::GetConfig {
                key: "objectId".into()
            }
        );

        fx.store
            .put_json_value(
                &EnvScope::new("dev", false).state_path().unwrap(),
                &json!({ "objectId": "obj-1", "clientId": "client-1" }),
            )
            .unwrap();
        let report = fx.provisioner().update_permission(&fx.ctx()).unwrap();
        assert_eq!(report.updated, vec!["requiredResourceAccess".to_string()]);
        assert_eq!(fx.backend.calls().len(), 1);
    }

    #[traced_test]
    #[test]
    fn update_permission_leaves_a_skipped_app_alone() {
        let fx = Fixture::new();
        fx.write_env_config(EnvConfig {
            app_name: Some("demo".into()),
            auth: AuthConfig {
                skip_provision: true,
                object_id: Some("existing-obj".into()),
                client_id: Some("existing-client".into()),
                client_secret: Some("existing-secret".into()),
                access_as_user_scope_id: Some("scope".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        fx.write_permissions(json!([{ "resource": "Microsoft Graph", "scopes": ["User.Read"] }]));
        fx.provisioner().provision(&fx.ctx()).unwrap();

        let report = fx.provisioner().update_permission(&fx.ctx()).unwrap();

        assert!(fx.backend.calls().is_empty());
        assert_eq!(report.object_id.as_deref(), Some("existing-obj"));
        assert_eq!(report.skipped, vec!["requiredResourceAccess".to_string()]);
        assert!(report.updated.is_empty());
        assert!(logs_contain("event=\"update-permission\""));
        assert!(logs_contain("skip=true"));
    }

    #[test]
    fn application_id_uri_follows_endpoint_changes() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        fx.write_env_config(EnvConfig {
            app_name: Some("My App".into()),
            auth: AuthConfig {
                bot_id: Some("bot-1".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        fx.provisioner().provision(&fx.ctx()).unwrap();
        assert_eq!(
            fx.state().application_id_uris.as_deref(),
            Some("api://botid-bot-1")
        );

        fx.write_env_config(EnvConfig {
            app_name: Some("My App".into()),
            auth: AuthConfig {
                bot_id: Some("bot-1".into()),
                frontend_endpoint: Some("https://tab.example.com".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        let report = fx.provisioner().provision(&fx.ctx()).unwrap();

        assert!(report.warnings.is_empty());
        assert_eq!(
            fx.state().application_id_uris.as_deref(),
            Some("api://tab.example.com/botid-bot-1")
        );
    }

    #[test]
    fn local_debug_does_not_adopt_the_cloud_identity() {
        let fx = Fixture::new();
        fx.write_permissions(json!([]));
        fx.write_env_config(EnvConfig {
            app_name: Some("My App".into()),
            auth: AuthConfig {
                skip_provision: true,
                object_id: Some("cloud-obj".into()),
                client_id: Some("cloud-client".into()),
                client_secret: Some("cloud-secret".into()),
                access_as_user_scope_id: Some("scope".into()),
                ..Default::default()
            },
            ..Default::default()
        });
        let local = EnvScope::new("dev", true);

        let report = fx.provisioner().provision(&fx.ctx_for(local.clone())).unwrap();

        assert_eq!(fx.backend.calls()[0], Call::Create);
        assert_eq!(report.object_id.as_deref(), Some("obj-1"));
        let raw = fx
            .store
            .get_json_value(&local.state_path().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(raw["local_objectId"], json!("obj-1"));
        assert_eq!(raw["local_clientSecret"], json!("generated-secret"));
        assert_eq!(fx.state(), AadState::default());
    }
}
