//! Structured telemetry events, emitted through `tracing`.

use teams_aad_core::ProvisionError;
use tracing::{error, info};

pub const COMPONENT: &str = "aad-app";

pub const EVENT_PROVISION_START: &str = "provision-start";
pub const EVENT_PROVISION: &str = "provision";
pub const EVENT_POST_PROVISION_START: &str = "post-provision-start";
pub const EVENT_POST_PROVISION: &str = "post-provision";
pub const EVENT_UPDATE_PERMISSION: &str = "update-permission";
pub const EVENT_GRANT_API_ACCESS_START: &str = "grant-api-access-start";
pub const EVENT_GRANT_API_ACCESS: &str = "grant-api-access";
pub const EVENT_CHECK_PERMISSION: &str = "check-permission";
pub const EVENT_GRANT_PERMISSION: &str = "grant-permission";
pub const EVENT_LIST_COLLABORATOR: &str = "list-collaborator";

/// Common attributes attached to every lifecycle event.
#[derive(Clone, Debug, Default)]
pub struct EventAttributes<'a> {
    pub env: &'a str,
    pub tenant: &'a str,
    pub app_id: Option<&'a str>,
    pub skip: bool,
}

pub fn emit_start(event: &str, attrs: &EventAttributes<'_>) {
    info!(
        target: "aad.telemetry",
        component = COMPONENT,
        event,
        env = attrs.env,
        tenant = attrs.tenant,
        "started"
    );
}

pub fn emit_success(event: &str, attrs: &EventAttributes<'_>) {
    info!(
        target: "aad.telemetry",
        component = COMPONENT,
        event,
        env = attrs.env,
        tenant = attrs.tenant,
        appid = attrs.app_id.unwrap_or_default(),
        skip = attrs.skip,
        success = true,
        "completed"
    );
}

pub fn emit_error(event: &str, attrs: &EventAttributes<'_>, err: &ProvisionError) {
    error!(
        target: "aad.telemetry",
        component = COMPONENT,
        event,
        env = attrs.env,
        tenant = attrs.tenant,
        appid = attrs.app_id.unwrap_or_default(),
        success = false,
        error_code = err.name(),
        error_type = %err.kind(),
        error_message = %err,
        help_link = err.help_link().unwrap_or_default(),
        "failed"
    );
}

/// One remote call attempt that succeeded.
pub fn emit_attempt_succeeded(operation: &str, attempt: u32) {
    info!(
        target: "aad.telemetry",
        component = COMPONENT,
        method_name = operation,
        retry_times = attempt,
        success = true,
        "remote call succeeded"
    );
}

/// One remote call attempt that failed.
pub fn emit_attempt_failed(operation: &str, attempt: u32, err: &dyn std::fmt::Display) {
    info!(
        target: "aad.telemetry",
        component = COMPONENT,
        method_name = operation,
        retry_times = attempt,
        success = false,
        error = %err,
        "remote call failed"
    );
}
