//! Reconciliation that runs once frontend and bot endpoints are known.

use teams_aad_core::{
    AadApplication, ProvisionError, ProvisionResult, RemoteStep, RequiredAdditions, plan_patch,
    uris::{application_id_uri, endpoint_host, redirect_uris_for},
};
use tracing::info;

use crate::{
    context::{ProvisionContext, RunContext},
    models::ProvisionReport,
    provision::{AadProvisioner, OP_GET_APP, OP_UPDATE_APP, PROGRESS_TITLE},
    storage::env_state::{load_aad_state, load_env_config, save_aad_state},
    telemetry::{self, EventAttributes},
};

impl AadProvisioner {
    /// Add the SSO redirect URIs and the application id URI to the provisioned app.
    pub fn post_provision(&self, ctx: &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport> {
        let attrs = EventAttributes {
            env: &ctx.scope().env,
            tenant: ctx.tenant(),
            ..Default::default()
        };
        telemetry::emit_start(telemetry::EVENT_POST_PROVISION_START, &attrs);
        self.progress
            .start(&format!("{PROGRESS_TITLE} Updating redirect URIs"));

        let result = self.reconcile_endpoints(ctx);

        self.progress.end(result.is_ok());
        self.finish(telemetry::EVENT_POST_PROVISION, attrs, result)
    }

    fn reconcile_endpoints(&self, ctx: &ProvisionContext<'_>) -> ProvisionResult<ProvisionReport> {
        let env_config = load_env_config(ctx.state(), ctx.scope())?;
        let mut state = load_aad_state(ctx.state(), ctx.scope())?;
        let object_id = state.object_id.clone().ok_or_else(|| ProvisionError::GetConfig {
            key: "objectId".into(),
        })?;
        let client_id = state.client_id.clone().ok_or_else(|| ProvisionError::GetConfig {
            key: "clientId".into(),
        })?;

        let auth = env_config.auth_for(ctx.scope());
        let host = auth.frontend_endpoint.as_deref().and_then(endpoint_host);
        let app_id_uri = application_id_uri(host.as_deref(), auth.bot_id.as_deref(), &client_id)?;
        let redirect = redirect_uris_for(
            auth.frontend_endpoint.as_deref(),
            auth.bot_endpoint.as_deref(),
            &client_id,
            auth.is_vs,
        );
        let required = RequiredAdditions {
            web_redirect_uris: redirect.web,
            spa_redirect_uris: redirect.spa,
            identifier_uris: vec![app_id_uri.clone()],
            resource_scope: None,
            enable_id_token: true,
        };

        let mut report = ProvisionReport::new(&ctx.scope().env, ctx.tenant());
        self.progress.next("Reconciling redirect URIs and application id URI");
        match self.reconcile_application(&object_id, &required)? {
            Some(patch) => report.updated.extend(patched_fields(&patch)),
            None => report.skipped.push(format!("application {object_id}")),
        }

        state.application_id_uris = Some(app_id_uri);
        save_aad_state(ctx.state(), ctx.scope(), &state)?;

        report.object_id = Some(object_id);
        report.client_id = Some(client_id);
        Ok(report)
    }

    /// Grant a downstream API scope to a client app, together with its redirect URIs.
    pub fn reconcile_downstream_access(
        &self,
        run: &RunContext,
        env: &str,
        access: &DownstreamAccess,
    ) -> ProvisionResult<ProvisionReport> {
        let attrs = EventAttributes {
            env,
            tenant: run.tenant_id(),
            ..Default::default()
        };
        telemetry::emit_start(telemetry::EVENT_GRANT_API_ACCESS_START, &attrs);

        let required = RequiredAdditions {
            web_redirect_uris: access.redirect_uris.clone(),
            resource_scope: Some((access.resource_app_id.clone(), access.scope_id.clone())),
            enable_id_token: true,
            ..Default::default()
        };
        let result = self
            .reconcile_application(&access.object_id, &required)
            .map(|patch| {
                let mut report = ProvisionReport::new(env, run.tenant_id());
                report.object_id = Some(access.object_id.clone());
                match patch {
                    Some(patch) => report.updated.extend(patched_fields(&patch)),
                    None => report.skipped.push(format!("application {}", access.object_id)),
                }
                report
            });

        self.finish(telemetry::EVENT_GRANT_API_ACCESS, attrs, result)
    }

    /// Read the app, plan the additive patch and send it only when something is missing.
    fn reconcile_application(
        &self,
        object_id: &str,
        required: &RequiredAdditions,
    ) -> ProvisionResult<Option<AadApplication>> {
        let current = self.call(OP_GET_APP, RemoteStep::GetApp, || {
            self.backend.get_app(object_id)
        })?;
        let Some(patch) = plan_patch(&current, required) else {
            info!(target: "aad.provision", object_id, "AAD app already up to date");
            return Ok(None);
        };

        let step = if patch.web.is_some() || patch.spa.is_some() {
            RemoteStep::UpdateRedirectUri
        } else if patch.identifier_uris.is_some() {
            RemoteStep::UpdateAppIdUri
        } else {
            RemoteStep::UpdatePermission
        };
        self.call(OP_UPDATE_APP, step, || self.backend.update_app(object_id, &patch))?;
        info!(target: "aad.provision", object_id, fields = ?patched_fields(&patch), "patched AAD app");
        Ok(Some(patch))
    }
}

/// Downstream API scope and redirect URIs a client app should hold.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DownstreamAccess {
    pub object_id: String,
    pub resource_app_id: String,
    pub scope_id: String,
    pub redirect_uris: Vec<String>,
}

fn patched_fields(patch: &AadApplication) -> Vec<String> {
    [
        ("web", patch.web.is_some()),
        ("spa", patch.spa.is_some()),
        ("identifierUris", patch.identifier_uris.is_some()),
        ("requiredResourceAccess", patch.required_resource_access.is_some()),
    ]
    .into_iter()
    .filter(|(_, set)| *set)
    .map(|(field, _)| field.to_string())
    .collect()
}
