//! Tableau client module
//!
//! Provides `TableauClient` for making REST API requests to Tableau Cloud.
//! A client starts signed out; `.sign_in(..)` returns a client carrying the
//! session token and site id that site-scoped requests need.

use super::PersonalAccessToken;
use crate::error::EtlError;
use eyre::{Context, Result, eyre};
use reqwest::{Client, Method, StatusCode, header};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Oldest REST API version that answers `serverinfo` without a session
const SERVER_INFO_VERSION: &str = "2.4";

#[derive(Clone)]
struct Session {
    token: String,
    site_id: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("site_id", &self.site_id)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    server_info: ServerInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    rest_api_version: String,
}

#[derive(Debug, Deserialize)]
struct SignInResponse {
    credentials: SignedInCredentials,
}

#[derive(Debug, Deserialize)]
struct SignedInCredentials {
    token: String,
    site: SignedInSite,
}

#[derive(Debug, Deserialize)]
struct SignedInSite {
    id: String,
}

/// Tableau REST API client.
///
/// # Example
/// ```no_run
/// use admin_insights_etl::client::{PersonalAccessToken, TableauClient};
/// use std::time::Duration;
/// use url::Url;
///
/// # async fn example() -> eyre::Result<()> {
/// let url = Url::parse("https://prod-useast-a.online.tableau.com")?;
/// let token = PersonalAccessToken::new("etl", "secret");
/// let client = TableauClient::try_new(url, Duration::from_secs(60))?
///     .use_server_version()
///     .await?
///     .sign_in(&token, "acme")
///     .await?;
///
/// let response = client.site_get("projects", &[("pageSize", "10")]).await?;
/// client.sign_out().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TableauClient {
    client: Client,
    url: Url,
    api_version: String,
    session: Option<Session>,
}

impl TableauClient {
    pub const DEFAULT_API_VERSION: &'static str = "3.19";

    /// Create a signed-out client for the server at `url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built
    pub fn try_new(mut url: Url, timeout: Duration) -> Result<Self> {
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, "application/json".parse()?);
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            api_version: Self::DEFAULT_API_VERSION.to_string(),
            session: None,
        })
    }

    /// Use a fixed REST API version instead of the default
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    /// Site LUID of the current session
    pub fn site_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.site_id.as_str())
    }

    /// `{url}/api/{version}/{path}`
    pub fn api_url(&self, path: &str) -> Result<Url> {
        self.versioned_url(&self.api_version, path)
    }

    fn versioned_url(&self, version: &str, path: &str) -> Result<Url> {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.url
            .join(&format!("api/{}/{}", version, path))
            .with_context(|| format!("Invalid API path: {}", path))
    }

    /// Ask the server for its newest REST API version and switch to it.
    ///
    /// Servers that do not answer keep the configured version.
    pub async fn use_server_version(mut self) -> Result<Self, EtlError> {
        let url = self
            .versioned_url(SERVER_INFO_VERSION, "serverinfo")
            .map_err(|e| EtlError::Config(e.to_string()))?;
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!(
                    "Failed to reach {} ({}), using REST API {}",
                    self.url,
                    e,
                    self.api_version
                );
                return Ok(self);
            }
        };

        if !response.status().is_success() {
            log::warn!(
                "Server info unavailable ({}), using REST API {}",
                response.status(),
                self.api_version
            );
            return Ok(self);
        }

        let info: ServerInfoResponse = response
            .json()
            .await
            .map_err(|e| EtlError::Platform(format!("Invalid server info response: {}", e)))?;
        log::debug!("Server supports REST API {}", info.server_info.rest_api_version);
        self.api_version = info.server_info.rest_api_version;
        Ok(self)
    }

    /// Sign in with a personal access token and return the signed-in client.
    ///
    /// # Errors
    /// `Authentication` if the token is rejected, `Platform` for any other
    /// failure.
    pub async fn sign_in(
        mut self,
        token: &PersonalAccessToken,
        site: &str,
    ) -> Result<Self, EtlError> {
        let url = self
            .api_url("auth/signin")
            .map_err(|e| EtlError::Config(e.to_string()))?;
        log::debug!("Signing in to site '{}' with {}", site, token);

        let response = self
            .client
            .post(url)
            .json(&token.sign_in_request(site))
            .send()
            .await
            .map_err(|e| EtlError::Platform(format!("Failed to reach {}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EtlError::Authentication(
                    format!("Tableau sign-in to '{}' rejected ({}): {}", site, status, body),
                ),
                _ => EtlError::Platform(format!("Tableau sign-in failed ({}): {}", status, body)),
            });
        }

        let signed_in: SignInResponse = response
            .json()
            .await
            .map_err(|e| EtlError::Platform(format!("Invalid sign-in response: {}", e)))?;

        log::info!("Signed in to Tableau site '{}'", site);
        self.session = Some(Session {
            token: signed_in.credentials.token,
            site_id: signed_in.credentials.site.id,
        });
        Ok(self)
    }

    /// End the session. Does nothing for a signed-out client.
    pub async fn sign_out(&self) -> Result<()> {
        if self.session.is_none() {
            return Ok(());
        }
        let response = self.request(Method::POST, "auth/signout", &[]).await?;
        if !response.status().is_success() {
            eyre::bail!("Tableau sign-out failed ({})", response.status());
        }
        log::debug!("Signed out of Tableau");
        Ok(())
    }

    /// Send a request to `api/{version}/{path}` with the session token.
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path below the version segment
    /// * `query` - Query string parameters
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response> {
        let url = self.api_url(path)?;
        log::trace!("{} {}", method, url);

        let mut request = self.client.request(method, url).query(query);
        if let Some(session) = &self.session {
            request = request.header("X-Tableau-Auth", &session.token);
        }
        request
            .send()
            .await
            .map_err(|e| eyre!("Failed to send request: {}", e))
    }

    /// Helper for GET requests below `sites/{site_id}/`.
    ///
    /// # Errors
    /// Returns an error if the client is not signed in
    pub async fn site_get(&self, path: &str, query: &[(&str, &str)]) -> Result<reqwest::Response> {
        let site_id = self
            .site_id()
            .ok_or_else(|| eyre!("Not signed in to a Tableau site"))?;
        let path = path.strip_prefix('/').unwrap_or(path);
        self.request(Method::GET, &format!("sites/{}/{}", site_id, path), query)
            .await
    }
}

impl std::fmt::Display for TableauClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.site_id() {
            Some(site) => write!(f, "{} (api {}, site: {})", self.url, self.api_version, site),
            None => write!(f, "{} (api {})", self.url, self.api_version),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> TableauClient {
        TableauClient::try_new(Url::parse(url).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_new_client_is_signed_out() {
        let client = client("https://prod-useast-a.online.tableau.com");
        assert!(!client.is_signed_in());
        assert_eq!(client.site_id(), None);
        assert_eq!(client.api_version(), TableauClient::DEFAULT_API_VERSION);
    }

    #[test]
    fn test_api_url() {
        let client = client("https://prod-useast-a.online.tableau.com").with_api_version("3.22");
        assert_eq!(
            client.api_url("/auth/signin").unwrap().as_str(),
            "https://prod-useast-a.online.tableau.com/api/3.22/auth/signin"
        );
    }

    #[test]
    fn test_api_url_keeps_base_path() {
        let client = client("https://tableau.example.com/proxy");
        assert_eq!(
            client.api_url("serverinfo").unwrap().as_str(),
            "https://tableau.example.com/proxy/api/3.19/serverinfo"
        );
    }

    #[test]
    fn test_parse_sign_in_response() {
        let body = r#"{
            "credentials": {
                "site": {"id": "9a8b7c6d", "contentUrl": "acme"},
                "user": {"id": "u-1"},
                "token": "tok-123",
                "estimatedTimeToExpiration": "365:23:59"
            }
        }"#;
        let response: SignInResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.credentials.token, "tok-123");
        assert_eq!(response.credentials.site.id, "9a8b7c6d");
    }

    #[test]
    fn test_parse_server_info() {
        let body = r#"{"serverInfo": {"productVersion": {"value": "2025.1.0", "build": "x"}, "restApiVersion": "3.25"}}"#;
        let info: ServerInfoResponse = serde_json::from_str(body).unwrap();
        assert_eq!(info.server_info.rest_api_version, "3.25");
    }

    #[tokio::test]
    async fn test_site_get_requires_session() {
        let client = client("http://localhost:1");
        let err = client.site_get("projects", &[]).await.unwrap_err();
        assert!(err.to_string().contains("Not signed in"));
    }

    #[tokio::test]
    async fn test_sign_out_without_session_is_noop() {
        assert!(client("http://localhost:1").sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_keeps_configured_version() {
        let client = client("http://localhost:1")
            .with_api_version("3.21")
            .use_server_version()
            .await
            .unwrap();
        assert_eq!(client.api_version(), "3.21");
    }
}
