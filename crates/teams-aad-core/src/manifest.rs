//! The legacy AAD manifest format and its mapping onto the Graph application shape.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    application::{
        AadApplication, AccessType, ApiSettings, ImplicitGrantSettings, InformationalUrls,
        OptionalClaims, PermissionScope, PreAuthorizedApplication, RedirectSettings,
        RequiredResourceAccess, WebSettings,
    },
    catalog::PermissionCatalog,
    error::{ProvisionError, ProvisionResult},
    permission::is_guid,
    provision_config::{TEAMS_MOBILE_DESKTOP_CLIENT_ID, TEAMS_WEB_CLIENT_ID},
};

pub const WARN_NAME_MISSING: &str = "name is missing";
pub const WARN_SIGN_IN_AUDIENCE_MISSING: &str = "signInAudience is missing";
pub const WARN_PRE_AUTHORIZED_APPLICATIONS_MISSING: &str =
    "preAuthorizedApplications is missing the Teams client ids, single sign-on will not work";
pub const WARN_OAUTH2_PERMISSIONS_MISSING: &str =
    "oauth2Permissions is missing, single sign-on will not work";
pub const WARN_ACCESS_TOKEN_VERSION_1: &str =
    "accessTokenAcceptedVersion is 1, tokens will not carry the v2 claims";
pub const WARN_OPTIONAL_CLAIMS_MISSING_IDTYP: &str =
    "optionalClaims.accessToken is missing the idtyp claim";

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AadManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accept_mapped_claims: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token_accepted_version: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_ins: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_public_client: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_roles: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by_microsoft_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_membership_claims: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_uris: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub informational_urls: Option<ManifestInformationalUrls>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_credentials: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_client_applications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logout_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2_allow_id_token_implicit_flow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2_allow_implicit_flow: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2_permissions: Option<Vec<PermissionScope>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_claims: Option<OptionalClaims>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parental_control_settings: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_authorized_applications: Option<Vec<ManifestPreAuthorizedApplication>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_urls_with_type: Option<Vec<ReplyUrl>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_resource_access: Option<Vec<RequiredResourceAccess>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_audience: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_encryption_key_id: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestInformationalUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms_of_service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marketing: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestPreAuthorizedApplication {
    pub app_id: String,
    #[serde(default)]
    pub permission_ids: Vec<String>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReplyUrlType {
    Spa,
    Web,
    InstalledClient,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyUrl {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: ReplyUrlType,
}

/// Convert a manifest into the Graph application body.
pub fn manifest_to_application(manifest: &AadManifest) -> AadApplication {
    let m = manifest.clone();

    let api_present = m.accept_mapped_claims.is_some()
        || m.known_client_applications.is_some()
        || m.access_token_accepted_version.is_some()
        || m.oauth2_permissions.is_some()
        || m.pre_authorized_applications.is_some();
    let api = api_present.then(|| ApiSettings {
        accept_mapped_claims: m.accept_mapped_claims,
        known_client_applications: m.known_client_applications,
        requested_access_token_version: m.access_token_accepted_version,
        oauth2_permission_scopes: m.oauth2_permissions,
        pre_authorized_applications: m.pre_authorized_applications.map(|apps| {
            apps.into_iter()
                .map(|app| PreAuthorizedApplication {
                    app_id: app.app_id,
                    delegated_permission_ids: app.permission_ids,
                })
                .collect()
        }),
    });

    let reply_urls = m.reply_urls_with_type.as_ref();
    let urls_of = |kind: ReplyUrlType| -> Option<Vec<String>> {
        reply_urls.map(|urls| {
            urls.iter()
                .filter(|reply| reply.kind == kind)
                .map(|reply| reply.url.clone())
                .collect()
        })
    };

    let implicit_grant_settings = (m.oauth2_allow_id_token_implicit_flow.is_some()
        || m.oauth2_allow_implicit_flow.is_some())
    .then_some(ImplicitGrantSettings {
        enable_id_token_issuance: m.oauth2_allow_id_token_implicit_flow,
        enable_access_token_issuance: m.oauth2_allow_implicit_flow,
    });
    let web_redirect_uris = urls_of(ReplyUrlType::Web);
    let web = (m.sign_in_url.is_some()
        || m.logout_url.is_some()
        || web_redirect_uris.is_some()
        || implicit_grant_settings.is_some())
    .then(|| WebSettings {
        home_page_url: m.sign_in_url,
        logout_url: m.logout_url,
        redirect_uris: web_redirect_uris,
        implicit_grant_settings,
    });

    AadApplication {
        id: m.id,
        app_id: m.app_id,
        display_name: m.name,
        description: m.description,
        notes: m.notes,
        disabled_by_microsoft_status: m.disabled_by_microsoft_status,
        group_membership_claims: m.group_membership_claims,
        identifier_uris: m.identifier_uris,
        is_fallback_public_client: m.allow_public_client,
        sign_in_audience: m.sign_in_audience,
        tags: m.tags,
        token_encryption_key_id: m.token_encryption_key_id,
        add_ins: m.add_ins,
        api,
        app_roles: m.app_roles,
        info: m.informational_urls.map(|info| InformationalUrls {
            marketing_url: info.marketing,
            privacy_statement_url: info.privacy,
            support_url: info.support,
            terms_of_service_url: info.terms_of_service,
        }),
        key_credentials: m.key_credentials,
        optional_claims: m.optional_claims,
        parental_control_settings: m.parental_control_settings,
        required_resource_access: m.required_resource_access,
        web,
        spa: urls_of(ReplyUrlType::Spa).map(|redirect_uris| RedirectSettings { redirect_uris }),
        public_client: urls_of(ReplyUrlType::InstalledClient)
            .map(|redirect_uris| RedirectSettings { redirect_uris }),
    }
}

/// Convert a Graph application back into the manifest format.
///
/// Reply URLs come out grouped as Spa, Web, InstalledClient.
pub fn application_to_manifest(application: &AadApplication) -> AadManifest {
    let app = application.clone();
    let api = app.api.unwrap_or_default();
    let web = app.web.unwrap_or_default();
    let grant = web.implicit_grant_settings.unwrap_or_default();

    let reply_urls_with_type: Option<Vec<ReplyUrl>> = (app.spa.is_some()
        || web.redirect_uris.is_some()
        || app.public_client.is_some())
    .then(|| {
        let tagged = |settings: Option<Vec<String>>, kind: ReplyUrlType| {
            settings
                .unwrap_or_default()
                .into_iter()
                .map(move |url| ReplyUrl { url, kind })
        };
        tagged(app.spa.map(|spa| spa.redirect_uris), ReplyUrlType::Spa)
            .chain(tagged(web.redirect_uris, ReplyUrlType::Web))
            .chain(tagged(
                app.public_client.map(|client| client.redirect_uris),
                ReplyUrlType::InstalledClient,
            ))
            .collect()
    });

    AadManifest {
        id: app.id,
        app_id: app.app_id,
        accept_mapped_claims: api.accept_mapped_claims,
        access_token_accepted_version: api.requested_access_token_version,
        add_ins: app.add_ins,
        allow_public_client: app.is_fallback_public_client,
        app_roles: app.app_roles,
        description: app.description,
        disabled_by_microsoft_status: app.disabled_by_microsoft_status,
        group_membership_claims: app.group_membership_claims,
        identifier_uris: app.identifier_uris,
        informational_urls: app.info.map(|info| ManifestInformationalUrls {
            terms_of_service: info.terms_of_service_url,
            support: info.support_url,
            privacy: info.privacy_statement_url,
            marketing: info.marketing_url,
        }),
        key_credentials: app.key_credentials,
        known_client_applications: api.known_client_applications,
        logout_url: web.logout_url,
        name: app.display_name,
        notes: app.notes,
        oauth2_allow_id_token_implicit_flow: grant.enable_id_token_issuance,
        oauth2_allow_implicit_flow: grant.enable_access_token_issuance,
        oauth2_permissions: api.oauth2_permission_scopes,
        optional_claims: app.optional_claims,
        parental_control_settings: app.parental_control_settings,
        pre_authorized_applications: api.pre_authorized_applications.map(|apps| {
            apps.into_iter()
                .map(|app| ManifestPreAuthorizedApplication {
                    app_id: app.app_id,
                    permission_ids: app.delegated_permission_ids,
                })
                .collect()
        }),
        reply_urls_with_type,
        required_resource_access: app.required_resource_access,
        sign_in_url: web.home_page_url,
        sign_in_audience: app.sign_in_audience,
        tags: app.tags,
        token_encryption_key_id: app.token_encryption_key_id,
    }
}

/// Collect non-fatal problems that would break Teams single sign-on.
pub fn validate_manifest(manifest: &AadManifest) -> Vec<String> {
    let mut warnings = Vec::new();
    let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());

    if blank(&manifest.name) {
        warnings.push(WARN_NAME_MISSING.to_string());
    }
    if blank(&manifest.sign_in_audience) {
        warnings.push(WARN_SIGN_IN_AUDIENCE_MISSING.to_string());
    }

    let pre_authorized = manifest.pre_authorized_applications.as_deref().unwrap_or_default();
    let teams_authorized = [TEAMS_WEB_CLIENT_ID, TEAMS_MOBILE_DESKTOP_CLIENT_ID]
        .iter()
        .all(|client| pre_authorized.iter().any(|app| app.app_id == *client));
    if !teams_authorized {
        warnings.push(WARN_PRE_AUTHORIZED_APPLICATIONS_MISSING.to_string());
    }

    if manifest
        .oauth2_permissions
        .as_deref()
        .is_none_or(|scopes| scopes.is_empty())
    {
        warnings.push(WARN_OAUTH2_PERMISSIONS_MISSING.to_string());
    }
    if manifest.access_token_accepted_version == Some(1) {
        warnings.push(WARN_ACCESS_TOKEN_VERSION_1.to_string());
    }

    let has_idtyp = manifest
        .optional_claims
        .as_ref()
        .and_then(|claims| claims.access_token.as_deref())
        .is_some_and(|claims| claims.iter().any(|claim| claim.name == "idtyp"));
    if !has_idtyp {
        warnings.push(WARN_OPTIONAL_CLAIMS_MISSING_IDTYP.to_string());
    }

    warnings
}

/// Replace resource and permission names in `requiredResourceAccess` with their ids.
pub fn resolve_manifest_permissions(
    manifest: &mut AadManifest,
    catalog: &PermissionCatalog,
) -> ProvisionResult<()> {
    let Some(entries) = manifest.required_resource_access.as_mut() else {
        return Ok(());
    };

    for entry in entries.iter_mut() {
        if !is_guid(&entry.resource_app_id) {
            entry.resource_app_id = catalog
                .app_id_for(&entry.resource_app_id)
                .ok_or_else(|| ProvisionError::UnknownResourceAppId(entry.resource_app_id.clone()))?
                .to_string();
        }

        for access in entry.resource_access.iter_mut() {
            if is_guid(&access.id) {
                continue;
            }
            let resolved = match access.kind {
                AccessType::Scope => catalog.scope_id(&entry.resource_app_id, &access.id),
                AccessType::Role => catalog.role_id(&entry.resource_app_id, &access.id),
            };
            access.id = resolved
                .ok_or_else(|| ProvisionError::UnknownResourceAccessId(access.id.clone()))?
                .to_string();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{OptionalClaim, ResourceAccess};
    use serde_json::json;

    fn fake_manifest() -> AadManifest {
        serde_json::from_value(json!({
            "id": "fake-id",
            "appId": "fake-app-id",
            "acceptMappedClaims": false,
            "accessTokenAcceptedVersion": 2,
            "addIns": [],
            "allowPublicClient": false,
            "appRoles": [],
            "identifierUris": ["api://xxx.z13.web.core.windows.net/botid-uuid"],
            "informationalUrls": {
                "termsOfService": "https://example.com/tos",
                "support": "https://example.com/support",
                "privacy": "https://example.com/privacy",
                "marketing": "https://example.com/marketing"
            },
            "keyCredentials": [],
            "knownClientApplications": [],
            "logoutUrl": "https://example.com/logout",
            "name": "fake-display-name",
            "oauth2AllowIdTokenImplicitFlow": true,
            "oauth2AllowImplicitFlow": false,
            "oauth2Permissions": [{
                "adminConsentDescription": "Allows Teams to call the app's web APIs as the current user.",
                "adminConsentDisplayName": "Teams can access app's web APIs",
                "id": "5344c933-4245-425e-9d63-1a9b2a1bbb28",
                "isEnabled": true,
                "type": "User",
                "userConsentDescription": "Enable Teams to call this app's web APIs with the same rights that you have",
                "userConsentDisplayName": "Teams can access app's web APIs and make requests on your behalf",
                "value": "access_as_user"
            }],
            "optionalClaims": {
                "idToken": [],
                "accessToken": [{ "name": "idtyp", "essential": false, "additionalProperties": [] }],
                "saml2Token": []
            },
            "parentalControlSettings": { "countriesBlockedForMinors": [], "legalAgeGroupRule": "Allow" },
            "preAuthorizedApplications": [
                { "appId": "1fec8e78-bce4-4aaf-ab1b-5451cc387264", "permissionIds": ["5344c933-4245-425e-9d63-1a9b2a1bbb28"] },
                { "appId": "5e3ce6c0-2b1f-4285-8d4b-75ee78787346", "permissionIds": ["5344c933-4245-425e-9d63-1a9b2a1bbb28"] }
            ],
            "replyUrlsWithType": [
                { "url": "https://xxx.z13.web.core.windows.net/blank-auth-end.html", "type": "Spa" },
                { "url": "https://xxx.z13.web.core.windows.net/auth-end.html", "type": "Web" },
                { "url": "https://bot.example.com/auth-end.html", "type": "Web" },
                { "url": "https://login.microsoftonline.com/common/oauth2/nativeclient", "type": "InstalledClient" }
            ],
            "requiredResourceAccess": [{
                "resourceAppId": "00000003-0000-0000-c000-000000000000",
                "resourceAccess": [{ "id": "e1fe6dd8-ba31-4d61-89e7-88639da4683d", "type": "Scope" }]
            }],
            "signInUrl": "https://example.com/home",
            "signInAudience": "AzureADMyOrg",
            "tags": [],
            "tokenEncryptionKeyId": "key-1"
        }))
        .expect("manifest")
    }

    #[test]
    fn manifest_maps_onto_graph_fields() {
        let app = manifest_to_application(&fake_manifest());

        assert_eq!(app.display_name.as_deref(), Some("fake-display-name"));
        assert_eq!(app.is_fallback_public_client, Some(false));
        let api = app.api.as_ref().expect("api");
        assert_eq!(api.requested_access_token_version, Some(2));
        assert_eq!(
            api.pre_authorized_applications.as_ref().unwrap()[0].delegated_permission_ids,
            vec!["5344c933-4245-425e-9d63-1a9b2a1bbb28"]
        );
        let web = app.web.as_ref().expect("web");
        assert_eq!(web.home_page_url.as_deref(), Some("https://example.com/home"));
        assert_eq!(web.redirect_uris.as_ref().unwrap().len(), 2);
        assert_eq!(app.id_token_issuance(), Some(true));
        assert_eq!(
            app.spa_redirect_uris(),
            ["https://xxx.z13.web.core.windows.net/blank-auth-end.html"]
        );
        assert_eq!(
            app.info.as_ref().unwrap().privacy_statement_url.as_deref(),
            Some("https://example.com/privacy")
        );
        assert_eq!(app.public_client.as_ref().unwrap().redirect_uris.len(), 1);
    }

    #[test]
    fn manifest_round_trips_through_application() {
        let manifest = fake_manifest();
        assert_eq!(
            application_to_manifest(&manifest_to_application(&manifest)),
            manifest
        );

        let sparse = AadManifest {
            name: Some("only-name".into()),
            reply_urls_with_type: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(application_to_manifest(&manifest_to_application(&sparse)), sparse);
        assert_eq!(
            application_to_manifest(&manifest_to_application(&AadManifest::default())),
            AadManifest::default()
        );
    }

    #[test]
    fn valid_manifest_has_no_warnings() {
        assert!(validate_manifest(&fake_manifest()).is_empty());
    }

    #[test]
    fn invalid_manifest_reports_every_problem() {
        let manifest = AadManifest {
            name: Some(String::new()),
            sign_in_audience: Some(String::new()),
            access_token_accepted_version: Some(1),
            oauth2_permissions: Some(vec![]),
            pre_authorized_applications: Some(vec![]),
            optional_claims: Some(OptionalClaims {
                access_token: Some(vec![OptionalClaim {
                    name: "email".into(),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let warnings = validate_manifest(&manifest);
        for expected in [
            WARN_NAME_MISSING,
            WARN_SIGN_IN_AUDIENCE_MISSING,
            WARN_PRE_AUTHORIZED_APPLICATIONS_MISSING,
            WARN_OAUTH2_PERMISSIONS_MISSING,
            WARN_ACCESS_TOKEN_VERSION_1,
            WARN_OPTIONAL_CLAIMS_MISSING_IDTYP,
        ] {
            assert!(warnings.iter().any(|w| w == expected), "missing {expected}");
        }
    }

    fn access_entry(resource: &str, id: &str, kind: AccessType) -> RequiredResourceAccess {
        RequiredResourceAccess {
            resource_app_id: resource.into(),
            resource_access: vec![ResourceAccess { id: id.into(), kind }],
        }
    }

    #[test]
    fn resolves_permission_names_in_manifest() {
        let catalog = PermissionCatalog::builtin().unwrap();
        let mut manifest = AadManifest {
            required_resource_access: Some(vec![
                access_entry("Microsoft Graph", "User.Read", AccessType::Scope),
                access_entry("Office 365 SharePoint Online", "Sites.Read.All", AccessType::Role),
                access_entry(
                    "00000003-0000-0000-c000-000000000000",
                    "df021288-bdef-4463-88db-98f22de89214",
                    AccessType::Role,
                ),
            ]),
            ..Default::default()
        };

        resolve_manifest_permissions(&mut manifest, &catalog).expect("resolve");
        let entries = manifest.required_resource_access.unwrap();
        assert_eq!(entries[0].resource_app_id, "00000003-0000-0000-c000-000000000000");
        assert_eq!(
            entries[0].resource_access[0].id,
            "e1fe6dd8-ba31-4d61-89e7-88639da4683d"
        );
        assert_eq!(entries[1].resource_app_id, "00000003-0000-0ff1-ce00-000000000000");
        assert_eq!(
            entries[1].resource_access[0].id,
            "d13f72ca-a275-4b96-b789-48ebcc4da984"
        );
        assert_eq!(
            entries[2].resource_access[0].id,
            "df021288-bdef-4463-88db-98f22de89214"
        );
    }

    #[test]
    fn unknown_names_in_manifest_are_reported() {
        let catalog = PermissionCatalog::builtin().unwrap();

        let mut manifest = AadManifest {
            required_resource_access: Some(vec![access_entry(
                "Invalid Id",
                "User.Read",
                AccessType::Scope,
            )]),
            ..Default::default()
        };
        let err = resolve_manifest_permissions(&mut manifest, &catalog).expect_err("app id");
        assert_eq!(err.to_string(), "Unknown resourceAppId Invalid Id");

        let mut manifest = AadManifest {
            required_resource_access: Some(vec![access_entry(
                "Microsoft Graph",
                "Invalid Id",
                AccessType::Scope,
            )]),
            ..Default::default()
        };
        let err = resolve_manifest_permissions(&mut manifest, &catalog).expect_err("access id");
        assert_eq!(
            err.to_string(),
            "Unknown resourceAccess id: Invalid Id, if you're using permission as resourceAccess id, please try to use permission id instead."
        );
    }
}
