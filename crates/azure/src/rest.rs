//! Key Vault REST API client.
//!
//! Implements [`SecretsClient`] on top of the data-plane REST API:
//! `GET {vault}/secrets` (paged through `nextLink`) and
//! `GET {vault}/secrets/{name}[/{version}]`.

use async_trait::async_trait;
use futures::StreamExt;
use kvinject_backends::SecureSecret;
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::KeyVaultError;
use crate::client::{
    ClientBuilder, ClientOptions, PageStream, Secret, SecretId, SecretProperties, SecretsClient,
};
use crate::cloud::CloudName;
use crate::credential::TokenCredential;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretListResult {
    #[serde(default)]
    value: Vec<SecretItem>,
    #[serde(default)]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct SecretItem {
    id: String,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
}

#[derive(Deserialize)]
struct SecretAttributes {
    #[serde(default)]
    enabled: Option<bool>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecretBundle {
    id: String,
    #[serde(default)]
    value: Option<String>,
    #[serde(default)]
    attributes: Option<SecretAttributes>,
    #[serde(default)]
    content_type: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Reject anything but `https://`, allowing `http://` for localhost only.
fn validate_vault_url(vault_url: &str) -> Result<Url, KeyVaultError> {
    let invalid = |reason: &str| KeyVaultError::InvalidVaultUrl {
        url: vault_url.to_string(),
        reason: reason.to_string(),
    };

    let url = Url::parse(vault_url).map_err(|e| invalid(&e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(invalid("not a base URL"));
    }
    match url.scheme() {
        "https" => Ok(url),
        "http" if matches!(url.host_str(), Some("localhost" | "127.0.0.1")) => Ok(url),
        "http" => Err(invalid(
            "only https:// is allowed (http:// is permitted for localhost/127.0.0.1 only)",
        )),
        other => Err(invalid(&format!("unsupported scheme '{other}'"))),
    }
}

/// Map a non-success response to an error, keeping the service message.
async fn error_for_status(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, KeyVaultError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let message = match resp.json::<ErrorResponse>().await {
        Ok(ErrorResponse {
            error: ErrorBody {
                code: Some(code),
                message: Some(message),
            },
        }) => format!("{code}: {message}"),
        Ok(ErrorResponse {
            error: ErrorBody {
                message: Some(message),
                ..
            },
        }) => message,
        _ => what.to_string(),
    };

    Err(match status.as_u16() {
        401 | 403 => KeyVaultError::Unauthorized(message),
        404 => KeyVaultError::NotFound(message),
        429 => KeyVaultError::RateLimited,
        code @ 500..=599 => KeyVaultError::ServerError(code),
        code => KeyVaultError::UnexpectedStatus {
            status: code,
            message,
        },
    })
}

/// Key Vault REST client bound to one vault.
///
/// The bearer token is requested from the credential on first use and reused
/// for the lifetime of the client.
pub struct KeyVaultClient {
    http: reqwest::Client,
    vault_url: Url,
    credential: Arc<dyn TokenCredential>,
    options: ClientOptions,
    scope: &'static str,
    token: OnceCell<SecureSecret>,
}

impl std::fmt::Debug for KeyVaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVaultClient")
            .field("vault_url", &self.vault_url.as_str())
            .field("api_version", &self.options.api_version)
            .field("credential", &self.credential)
            .finish_non_exhaustive()
    }
}

impl KeyVaultClient {
    /// Create a client for `vault_url`.
    ///
    /// # Errors
    ///
    /// Returns `KeyVaultError::InvalidVaultUrl` for unparsable or non-https
    /// URLs, `KeyVaultError::Network` if the HTTP client cannot be built.
    pub fn new(
        vault_url: &str,
        credential: Arc<dyn TokenCredential>,
        options: Option<&ClientOptions>,
    ) -> Result<Self, KeyVaultError> {
        let vault_url = validate_vault_url(vault_url)?;
        let options = options.cloned().unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent(options.user_agent.clone())
            .build()
            .map_err(KeyVaultError::Network)?;
        let scope = CloudName::from_vault_url(vault_url.as_str()).key_vault_scope();

        Ok(Self {
            http,
            vault_url,
            credential,
            options,
            scope,
            token: OnceCell::new(),
        })
    }

    /// Client constructor suitable for [`crate::AzureKeyVault`].
    #[must_use]
    pub fn builder() -> ClientBuilder {
        Arc::new(build_client)
    }

    /// Vault endpoint this client talks to
    #[must_use]
    pub fn vault_url(&self) -> &str {
        self.vault_url.as_str()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, KeyVaultError> {
        let mut url = self.vault_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| KeyVaultError::InvalidVaultUrl {
                    url: self.vault_url.to_string(),
                    reason: "not a base URL".to_string(),
                })?;
            path.pop_if_empty();
            path.extend(segments);
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.options.api_version);
        Ok(url)
    }

    async fn bearer_token(&self) -> Result<&SecureSecret, KeyVaultError> {
        self.token
            .get_or_try_init(|| async {
                let token = self.credential.get_token(self.scope).await?;
                Ok::<_, KeyVaultError>(token.token)
            })
            .await
    }

    async fn get(&self, url: Url, what: &str) -> Result<reqwest::Response, KeyVaultError> {
        let token = self.bearer_token().await?;
        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(KeyVaultError::Network)?;
        error_for_status(resp, what).await
    }

    /// Parse a `nextLink`. It must have the same origin as the vault.
    fn next_link(&self, link: &str) -> Result<Url, KeyVaultError> {
        let url =
            Url::parse(link).map_err(|e| KeyVaultError::Decode(format!("invalid nextLink: {e}")))?;
        if url.origin() != self.vault_url.origin() {
            return Err(KeyVaultError::Decode(format!(
                "nextLink origin {} does not match vault {}",
                url.origin().ascii_serialization(),
                self.vault_url.origin().ascii_serialization()
            )));
        }
        Ok(url)
    }

    async fn fetch_page(
        &self,
        url: Url,
    ) -> Result<(Vec<SecretProperties>, Option<Url>), KeyVaultError> {
        tracing::trace!(url = %url, "Fetching Key Vault secret listing page");

        let page: SecretListResult = self
            .get(url, "secret listing")
            .await?
            .json()
            .await
            .map_err(|e| KeyVaultError::Decode(e.to_string()))?;

        let items: Vec<_> = page
            .value
            .into_iter()
            .filter_map(|item| match SecretId::parse(&item.id) {
                Ok(id) => Some(SecretProperties {
                    id,
                    enabled: item.attributes.and_then(|a| a.enabled).unwrap_or(false),
                }),
                Err(err) => {
                    tracing::debug!(error = %err, "Skipping Key Vault listing entry");
                    None
                }
            })
            .collect();

        let next = match page.next_link.filter(|link| !link.is_empty()) {
            Some(link) => Some(self.next_link(&link)?),
            None => None,
        };

        Ok((items, next))
    }
}

fn build_client(
    vault_url: &str,
    credential: Arc<dyn TokenCredential>,
    options: Option<&ClientOptions>,
) -> Result<Box<dyn SecretsClient>, KeyVaultError> {
    Ok(Box::new(KeyVaultClient::new(vault_url, credential, options)?))
}

#[async_trait]
impl SecretsClient for KeyVaultClient {
    fn list_secret_properties(&self) -> PageStream<'_> {
        let first = self.endpoint(&["secrets"]);
        futures::stream::try_unfold(Some(first), move |cursor| async move {
            let Some(url) = cursor else {
                return Ok::<_, KeyVaultError>(None);
            };
            let (items, next) = self.fetch_page(url?).await?;
            Ok(Some((items, next.map(Ok))))
        })
        .boxed()
    }

    async fn get_secret(&self, name: &str, version: Option<&str>) -> Result<Secret, KeyVaultError> {
        let url = match version.filter(|v| !v.is_empty()) {
            Some(version) => self.endpoint(&["secrets", name, version])?,
            None => self.endpoint(&["secrets", name])?,
        };

        let bundle: SecretBundle = self
            .get(url, &format!("secret '{name}'"))
            .await?
            .json()
            .await
            .map_err(|e| KeyVaultError::Decode(e.to_string()))?;

        let value = bundle
            .value
            .ok_or_else(|| KeyVaultError::Decode(format!("secret '{name}' has no value")))?;

        Ok(Secret {
            id: SecretId::parse(&bundle.id)?,
            value: SecureSecret::new(value),
            enabled: bundle.attributes.and_then(|a| a.enabled),
            content_type: bundle.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticTokenCredential;
    use futures::TryStreamExt;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> KeyVaultClient {
        KeyVaultClient::new(
            &server.uri(),
            Arc::new(StaticTokenCredential::new("test-token")),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_vault_url() {
        assert!(validate_vault_url("https://kv.vault.azure.net").is_ok());
        assert!(validate_vault_url("http://localhost:8200").is_ok());
        assert!(validate_vault_url("http://127.0.0.1:1234").is_ok());
        assert!(matches!(
            validate_vault_url("http://kv.vault.azure.net"),
            Err(KeyVaultError::InvalidVaultUrl { .. })
        ));
        assert!(matches!(
            validate_vault_url("ftp://kv.vault.azure.net"),
            Err(KeyVaultError::InvalidVaultUrl { .. })
        ));
        assert!(matches!(
            validate_vault_url("kv"),
            Err(KeyVaultError::InvalidVaultUrl { .. })
        ));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let client = KeyVaultClient::new(
            "https://kv.vault.azure.net/",
            Arc::new(StaticTokenCredential::new("t")),
            None,
        )
        .unwrap();
        let url = client.endpoint(&["secrets", "my secret"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://kv.vault.azure.net/secrets/my%20secret?api-version=7.4"
        );
    }

    #[test]
    fn test_custom_api_version() {
        let options = ClientOptions {
            api_version: "2025-07-01".to_string(),
            ..ClientOptions::default()
        };
        let client = KeyVaultClient::new(
            "https://kv.vault.azure.net",
            Arc::new(StaticTokenCredential::new("t")),
            Some(&options),
        )
        .unwrap();
        let url = client.endpoint(&["secrets"]).unwrap();
        assert_eq!(url.query(), Some("api-version=2025-07-01"));
    }

    #[tokio::test]
    async fn test_get_secret_latest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/simple"))
            .and(query_param("api-version", "7.4"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "a_value_v1",
                "id": format!("{}/secrets/simple/v1", server.uri()),
                "attributes": { "enabled": true }
            })))
            .mount(&server)
            .await;

        let secret = client(&server).get_secret("simple", None).await.unwrap();
        assert_eq!(secret.value.expose(), "a_value_v1");
        assert_eq!(secret.id.name(), "simple");
        assert_eq!(secret.id.version(), Some("v1"));
        assert_eq!(secret.enabled, Some(true));
    }

    #[tokio::test]
    async fn test_get_secret_pinned_version() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/simple/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "a_value_v2",
                "id": format!("{}/secrets/simple/v2", server.uri()),
                "contentType": "text/plain"
            })))
            .mount(&server)
            .await;

        let secret = client(&server)
            .get_secret("simple", Some("v2"))
            .await
            .unwrap();
        assert_eq!(secret.value.expose(), "a_value_v2");
        assert_eq!(secret.content_type.as_deref(), Some("text/plain"));
        assert_eq!(secret.enabled, None);
    }

    #[tokio::test]
    async fn test_get_secret_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {
                    "code": "SecretNotFound",
                    "message": "A secret with (name/id) missing was not found in this key vault."
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_secret("missing", None).await.unwrap_err();
        match err {
            KeyVaultError::NotFound(message) => assert!(message.starts_with("SecretNotFound")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/throttled"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets/broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client(&server);
        assert!(matches!(
            client.get_secret("forbidden", None).await,
            Err(KeyVaultError::Unauthorized(_))
        ));
        assert!(matches!(
            client.get_secret("throttled", None).await,
            Err(KeyVaultError::RateLimited)
        ));
        assert!(matches!(
            client.get_secret("broken", None).await,
            Err(KeyVaultError::ServerError(503))
        ));
    }

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .and(query_param("$skiptoken", "page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "id": format!("{}/secrets/third", server.uri()),
                    "attributes": { "enabled": false }
                }],
                "nextLink": null
            })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    {
                        "id": format!("{}/secrets/first", server.uri()),
                        "attributes": { "enabled": true }
                    },
                    {
                        "id": format!("{}/secrets/second", server.uri()),
                        "attributes": { "enabled": true }
                    }
                ],
                "nextLink": format!("{}/secrets?api-version=7.4&$skiptoken=page2", server.uri())
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let client = client(&server);
        let pages: Vec<Vec<SecretProperties>> =
            client.list_secret_properties().try_collect().await.unwrap();

        assert_eq!(pages.len(), 2);
        let names: Vec<_> = pages.iter().flatten().map(|p| p.id.name()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert!(!pages[1][0].enabled);

        // A new listing starts from the first page again
        let again: Vec<Vec<SecretProperties>> =
            client.list_secret_properties().try_collect().await.unwrap();
        assert_eq!(again.len(), 2);
    }

    #[tokio::test]
    async fn test_list_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {
                    "code": "Unauthorized",
                    "message": "AKV10000: Request is missing a Bearer token."
                }
            })))
            .mount(&server)
            .await;

        let result: Result<Vec<_>, _> =
            client(&server).list_secret_properties().try_collect().await;
        assert!(matches!(result, Err(KeyVaultError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn test_list_refuses_next_link_to_other_origin() {
        let vault = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{
                    "id": format!("{}/secrets/first", vault.uri()),
                    "attributes": { "enabled": true }
                }],
                "nextLink": format!("{}/secrets?$skiptoken=page2", elsewhere.uri())
            })))
            .mount(&vault)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": []
            })))
            .expect(0)
            .mount(&elsewhere)
            .await;

        let client = client(&vault);
        let mut pages = client.list_secret_properties();
        let first = pages.try_next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert!(matches!(
            pages.try_next().await,
            Err(KeyVaultError::Decode(message)) if message.contains("nextLink origin")
        ));
        drop(pages);
        assert!(elsewhere.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_next_link_same_origin_accepted() {
        let client = KeyVaultClient::new(
            "https://kv.vault.azure.net",
            Arc::new(StaticTokenCredential::new("t")),
            None,
        )
        .unwrap();
        assert!(
            client
                .next_link("https://kv.vault.azure.net:443/secrets?$skiptoken=x")
                .is_ok()
        );
        assert!(client.next_link("http://kv.vault.azure.net/secrets").is_err());
        assert!(client.next_link("https://kv.vault.azure.net:8443/secrets").is_err());
        assert!(client.next_link("https://other.vault.azure.net/secrets").is_err());
    }

    #[tokio::test]
    async fn test_list_skips_malformed_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/secrets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [
                    { "id": "not a url", "attributes": { "enabled": false } },
                    {
                        "id": format!("{}/secrets", server.uri()),
                        "attributes": { "enabled": true }
                    },
                    {
                        "id": format!("{}/secrets/kept/v1", server.uri()),
                        "attributes": { "enabled": true }
                    }
                ]
            })))
            .mount(&server)
            .await;

        let pages: Vec<Vec<SecretProperties>> =
            client(&server).list_secret_properties().try_collect().await.unwrap();
        let names: Vec<_> = pages.iter().flatten().map(|p| p.id.name()).collect();
        assert_eq!(names, vec!["kept"]);
    }

    #[tokio::test]
    async fn test_token_requested_once_per_client() {
        #[derive(Debug, Default)]
        struct CountingCredential(std::sync::atomic::AtomicUsize);

        #[async_trait]
        impl TokenCredential for CountingCredential {
            async fn get_token(
                &self,
                scope: &str,
            ) -> Result<crate::credential::AccessToken, KeyVaultError> {
                assert_eq!(scope, "https://vault.azure.net/.default");
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(crate::credential::AccessToken {
                    token: SecureSecret::from("counted"),
                    expires_on: None,
                })
            }
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": "v",
                "id": format!("{}/secrets/a/1", server.uri())
            })))
            .mount(&server)
            .await;

        let credential = Arc::new(CountingCredential::default());
        let client = KeyVaultClient::new(&server.uri(), credential.clone(), None).unwrap();
        client.get_secret("a", None).await.unwrap();
        client.get_secret("a", Some("1")).await.unwrap();
        assert_eq!(credential.0.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_builder_rejects_bad_url() {
        let builder = KeyVaultClient::builder();
        let result = builder(
            "http://kv.vault.azure.net",
            Arc::new(StaticTokenCredential::new("t")),
            None,
        );
        assert!(matches!(result, Err(KeyVaultError::InvalidVaultUrl { .. })));
    }
}
