use url::Url;

use crate::error::{ProvisionError, ProvisionResult};

/// Redirect URIs a Teams app registration needs for its tab and bot SSO pages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RedirectUris {
    pub web: Vec<String>,
    pub spa: Vec<String>,
}

/// Build the SSO redirect URIs for the configured endpoints.
///
/// `is_vs` selects the Visual Studio bot page (`bot-auth-end.html`).
pub fn redirect_uris_for(
    frontend_endpoint: Option<&str>,
    bot_endpoint: Option<&str>,
    client_id: &str,
    is_vs: bool,
) -> RedirectUris {
    let mut uris = RedirectUris::default();
    if let Some(frontend) = frontend_endpoint.map(trim_endpoint) {
        uris.web.push(format!("{frontend}/auth-end.html"));
        uris.spa.push(format!("{frontend}/blank-auth-end.html"));
        uris.spa
            .push(format!("{frontend}/auth-end.html?clientId={client_id}"));
    }
    if let Some(bot) = bot_endpoint.map(trim_endpoint) {
        let page = if is_vs { "bot-auth-end.html" } else { "auth-end.html" };
        uris.web.push(format!("{bot}/{page}"));
    }
    uris
}

/// Build the `api://` application id URI.
///
/// With a bot the URI ends in `botid-{bot_id}`, otherwise in the client id.
/// `frontend_host` is a bare host such as `contoso.z13.web.core.windows.net`.
pub fn application_id_uri(
    frontend_host: Option<&str>,
    bot_id: Option<&str>,
    client_id: &str,
) -> ProvisionResult<String> {
    let host = frontend_host.map(str::trim).filter(|host| !host.is_empty());
    let bot_id = bot_id.map(str::trim).filter(|id| !id.is_empty());

    let uri = match (host, bot_id) {
        (Some(host), Some(bot_id)) => format!("api://{host}/botid-{bot_id}"),
        (None, Some(bot_id)) => format!("api://botid-{bot_id}"),
        (Some(host), None) => format!("api://{host}/{client_id}"),
        (None, None) => return Err(ProvisionError::CannotGenerateIdentifierUris),
    };

    Url::parse(&uri).map_err(|_| ProvisionError::AppIdUriInvalid(uri.clone()))?;
    Ok(uri)
}

/// Host part of an endpoint URL, used as the application id URI prefix.
pub fn endpoint_host(endpoint: &str) -> Option<String> {
    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn trim_endpoint(endpoint: &str) -> &str {
    endpoint.trim().trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_and_bot_redirects() {
        let uris = redirect_uris_for(
            Some("https://tab.example.com/"),
            Some("https://bot.example.com"),
            "client",
            false,
        );
        assert_eq!(
            uris.web,
            vec![
                "https://tab.example.com/auth-end.html",
                "https://bot.example.com/auth-end.html"
            ]
        );
        assert_eq!(
            uris.spa,
            vec![
                "https://tab.example.com/blank-auth-end.html",
                "https://tab.example.com/auth-end.html?clientId=client"
            ]
        );

        let vs = redirect_uris_for(None, Some("https://bot.example.com"), "client", true);
        assert_eq!(vs.web, vec!["https://bot.example.com/bot-auth-end.html"]);
        assert!(vs.spa.is_empty());
    }

    #[test]
    fn application_id_uri_variants() {
        assert_eq!(
            application_id_uri(Some("tab.example.com"), Some("bot-1"), "client").unwrap(),
            "api://tab.example.com/botid-bot-1"
        );
        assert_eq!(
            application_id_uri(None, Some("bot-1"), "client").unwrap(),
            "api://botid-bot-1"
        );
        assert_eq!(
            application_id_uri(Some("tab.example.com"), None, "client").unwrap(),
            "api://tab.example.com/client"
        );
        assert_eq!(
            application_id_uri(Some(" "), None, "client"),
            Err(ProvisionError::CannotGenerateIdentifierUris)
        );
        assert!(matches!(
            application_id_uri(Some("bad host"), None, "client"),
            Err(ProvisionError::AppIdUriInvalid(_))
        ));
    }

    #[test]
    fn endpoint_host_keeps_explicit_port() {
        assert_eq!(
            endpoint_host("https://localhost:53000/index.html").as_deref(),
            Some("localhost:53000")
        );
        assert_eq!(
            endpoint_host("https://tab.example.com").as_deref(),
            Some("tab.example.com")
        );
        assert_eq!(endpoint_host("not a url"), None);
    }
}
