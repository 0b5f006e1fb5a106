use std::fmt;

use thiserror::Error;

/// Convenience alias for provisioning results.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Who is expected to act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input, missing config, insufficient permission or quota.
    User,
    /// Malformed responses, transport failures, retry exhaustion.
    System,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::User => f.write_str("user"),
            ErrorKind::System => f.write_str("system"),
        }
    }
}

/// Remote operation that produced a REST failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteStep {
    CreateApp,
    GetApp,
    CreateSecret,
    UpdatePermission,
    UpdateRedirectUri,
    UpdateAppIdUri,
    ListOwners,
    AddOwner,
    GetSignedInUser,
}

impl RemoteStep {
    /// Stable error name reported in telemetry.
    pub fn error_name(&self) -> &'static str {
        match self {
            RemoteStep::CreateApp => "CreateAppError",
            RemoteStep::GetApp => "GetAppError",
            RemoteStep::CreateSecret => "CreateSecretError",
            RemoteStep::UpdatePermission => "UpdatePermissionError",
            RemoteStep::UpdateRedirectUri => "UpdateRedirectUriError",
            RemoteStep::UpdateAppIdUri => "UpdateAppIdUriError",
            RemoteStep::ListOwners => "ListCollaboratorError",
            RemoteStep::AddOwner => "GrantPermissionError",
            RemoteStep::GetSignedInUser => "GetSignedInUserError",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            RemoteStep::CreateApp => "failed to create AAD app",
            RemoteStep::GetApp => "failed to get AAD app",
            RemoteStep::CreateSecret => "failed to create AAD app secret",
            RemoteStep::UpdatePermission => "failed to update AAD app permissions",
            RemoteStep::UpdateRedirectUri => "failed to update AAD app redirect uris",
            RemoteStep::UpdateAppIdUri => "failed to update AAD app application id uri",
            RemoteStep::ListOwners => "failed to list AAD app owners",
            RemoteStep::AddOwner => "failed to add AAD app owner",
            RemoteStep::GetSignedInUser => "failed to read signed-in user",
        }
    }
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// Every failure the provisioning pipeline can surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    #[error("failed to parse permission request: {0}")]
    ParsePermission(String),
    #[error("unknown permission resource `{0}`")]
    UnknownPermissionName(String),
    #[error("unknown permission role `{role}` for resource `{resource}`")]
    UnknownPermissionRole { role: String, resource: String },
    #[error("unknown permission scope `{scope}` for resource `{resource}`")]
    UnknownPermissionScope { scope: String, resource: String },
    #[error(
        "skipProvision is set in {file} but objectId, clientId, clientSecret and oauth2PermissionScopeId are not all present"
    )]
    GetSkipAppConfig { file: String },
    #[error("permission request file not found at {path}")]
    MissingPermissionsFile { path: String },
    #[error("required config `{key}` is missing")]
    GetConfig { key: String },
    #[error("cannot generate identifier uris: neither a frontend endpoint nor a bot id is known")]
    CannotGenerateIdentifierUris,
    #[error("application id uri `{0}` is not a valid uri")]
    AppIdUriInvalid(String),
    #[error("Unknown resourceAppId {0}")]
    UnknownResourceAppId(String),
    #[error(
        "Unknown resourceAccess id: {0}, if you're using permission as resourceAccess id, please try to use permission id instead."
    )]
    UnknownResourceAccessId(String),
    #[error("{step}: {detail}")]
    Remote {
        step: RemoteStep,
        /// HTTP status, absent for transport failures.
        status: Option<u16>,
        /// Graph error code such as `Authorization_RequestDenied`.
        code: Option<String>,
        detail: String,
    },
    #[error("{step}: unexpected response: {detail}")]
    InvalidResponse { step: RemoteStep, detail: String },
    #[error("{operation} reached the retry limit")]
    RetryLimit { operation: String },
    #[error("state store error: {0}")]
    State(String),
}

impl ProvisionError {
    /// Classify the error as user-actionable or internal.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProvisionError::ParsePermission(_)
            | ProvisionError::UnknownPermissionName(_)
            | ProvisionError::UnknownPermissionRole { .. }
            | ProvisionError::UnknownPermissionScope { .. }
            | ProvisionError::GetSkipAppConfig { .. }
            | ProvisionError::MissingPermissionsFile { .. }
            | ProvisionError::AppIdUriInvalid(_)
            | ProvisionError::UnknownResourceAppId(_)
            | ProvisionError::UnknownResourceAccessId(_) => ErrorKind::User,
            ProvisionError::Remote {
                status: Some(status),
                ..
            } if (400..500).contains(status) => ErrorKind::User,
            ProvisionError::Remote { .. }
            | ProvisionError::GetConfig { .. }
            | ProvisionError::CannotGenerateIdentifierUris
            | ProvisionError::InvalidResponse { .. }
            | ProvisionError::RetryLimit { .. }
            | ProvisionError::State(_) => ErrorKind::System,
        }
    }

    /// Stable name used for telemetry `error-code`.
    pub fn name(&self) -> &'static str {
        match self {
            ProvisionError::ParsePermission(_) => "ParsePermissionError",
            ProvisionError::UnknownPermissionName(_) => "UnknownPermissionName",
            ProvisionError::UnknownPermissionRole { .. } => "UnknownPermissionRole",
            ProvisionError::UnknownPermissionScope { .. } => "UnknownPermissionScope",
            ProvisionError::GetSkipAppConfig { .. } => "GetSkipAppConfigError",
            ProvisionError::MissingPermissionsFile { .. } => "MissingPermissionsFile",
            ProvisionError::GetConfig { .. } => "GetConfigError",
            ProvisionError::CannotGenerateIdentifierUris => "CannotGenerateIdentifierUrisError",
            ProvisionError::AppIdUriInvalid(_) => "AppIdUriInvalidError",
            ProvisionError::UnknownResourceAppId(_) => "UnknownResourceAppId",
            ProvisionError::UnknownResourceAccessId(_) => "UnknownResourceAccessId",
            ProvisionError::Remote { step, .. } | ProvisionError::InvalidResponse { step, .. } => {
                step.error_name()
            }
            ProvisionError::RetryLimit { .. } => "RetryLimitError",
            ProvisionError::State(_) => "StateStoreError",
        }
    }

    /// Documentation link for well-known directory error codes.
    pub fn help_link(&self) -> Option<&'static str> {
        match self {
            ProvisionError::Remote {
                code: Some(code), ..
            } => help_link_for(code),
            _ => None,
        }
    }

    /// Whether repeating the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProvisionError::Remote { status: None, .. } => true,
            ProvisionError::Remote {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Look up the documentation page for a Graph error code.
pub fn help_link_for(code: &str) -> Option<&'static str> {
    match code {
        "Authorization_RequestDenied" | "InsufficientPermissions" => {
            Some("https://learn.microsoft.com/en-us/graph/resolve-auth-errors")
        }
        "Directory_QuotaExceeded" => Some(
            "https://learn.microsoft.com/en-us/entra/identity/users/directory-service-limits-restrictions",
        ),
        "Request_BadRequest" => Some("https://learn.microsoft.com/en-us/graph/errors"),
        _ => None,
    }
}
