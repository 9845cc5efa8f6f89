//! HTTP client for the Cloud Management 1.5 API

use std::sync::LazyLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use reqwest::header::LOCATION;
use reqwest::{Method, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{CM_NAMESPACE, Client, ClientError, ClientResult, Fields, Locator, RemoteResource};
use crate::config::ProviderConfig;
use rsform_core::resource::Value;

const API_VERSION_HEADER: &str = "X-API-Version";
const API_VERSION: &str = "1.5";
const ACCOUNT_HEADER: &str = "X-Account";

/// Refresh the access token this long before the server says it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// The only RCL form the provider issues: `@res.<action>()`
static RESOURCE_ACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@res\.([a-z_]+)\(\)$").expect("valid action pattern"));

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// [`Client`] talking to Cloud Management over HTTPS
pub struct HttpClient {
    http: reqwest::Client,
    base_url: String,
    account_id: u64,
    refresh_token: String,
    token: Mutex<Option<AccessToken>>,
}

impl HttpClient {
    /// Create a client for the configured host and account
    pub fn new(config: &ProviderConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            account_id: config.account_id,
            refresh_token: config.refresh_token.clone(),
            token: Mutex::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange the refresh token for an access token, reusing it until it expires
    async fn access_token(&self) -> ClientResult<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        debug!("Refreshing access token for account {}", self.account_id);
        let response = self
            .http
            .post(format!("{}/api/oauth2", self.base_url))
            .header(API_VERSION_HEADER, API_VERSION)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", self.refresh_token.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Auth(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("token response: {}", e)))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let value = token.access_token.clone();
        *cached = Some(AccessToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        });
        Ok(value)
    }

    async fn send(
        &self,
        method: Method,
        href: &str,
        body: Option<serde_json::Value>,
    ) -> ClientResult<Response> {
        let token = self.access_token().await?;
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, href))
            .bearer_auth(token)
            .header(API_VERSION_HEADER, API_VERSION)
            .header(ACCOUNT_HEADER, self.account_id.to_string());
        if let Some(body) = body {
            request = request.json(&body);
        }

        debug!("{} {}", method, href);
        let response = request.send().await?;
        check_status(method, href, response).await
    }
}

#[async_trait]
impl Client for HttpClient {
    async fn create(
        &self,
        namespace: &str,
        type_name: &str,
        fields: Fields,
    ) -> ClientResult<RemoteResource> {
        let href = collection_href(namespace, type_name)?;
        let response = self
            .send(Method::POST, &href, Some(wrap_fields(type_name, &fields)?))
            .await?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                ClientError::InvalidResponse(format!("POST {} returned no Location header", href))
            })?;
        let locator = Locator::new(namespace, href_from_location(location));
        debug!("Created {}", locator);

        self.get(&locator).await
    }

    async fn get(&self, locator: &Locator) -> ClientResult<RemoteResource> {
        check_namespace(locator)?;
        let href = format!("{}?view=default", locator.href);
        let response = self.send(Method::GET, &href, None).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(format!("GET {}: {}", locator.href, e)))?;

        Ok(RemoteResource {
            locator: locator.clone(),
            fields: fields_from_json(&body)?,
        })
    }

    async fn update(&self, locator: &Locator, fields: Fields) -> ClientResult<()> {
        check_namespace(locator)?;
        let type_name = type_from_href(&locator.href).ok_or_else(|| {
            ClientError::Unsupported(format!("cannot infer resource type of {}", locator.href))
        })?;
        self.send(
            Method::PUT,
            &locator.href,
            Some(wrap_fields(&type_name, &fields)?),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, locator: &Locator) -> ClientResult<()> {
        check_namespace(locator)?;
        self.send(Method::DELETE, &locator.href, None).await?;
        Ok(())
    }

    async fn run(&self, locator: &Locator, rcl: &str) -> ClientResult<()> {
        check_namespace(locator)?;
        let action = parse_resource_action(rcl).ok_or_else(|| {
            ClientError::Unsupported(format!("RCL expression {:?}", rcl))
        })?;
        self.send(
            Method::POST,
            &format!("{}/{}", locator.href, action),
            None,
        )
        .await?;
        Ok(())
    }
}

async fn check_status(method: Method, href: &str, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(ClientError::NotFound);
    }
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        method: method.to_string(),
        href: href.to_string(),
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

fn check_namespace(locator: &Locator) -> ClientResult<()> {
    if locator.namespace == CM_NAMESPACE {
        Ok(())
    } else {
        Err(ClientError::UnsupportedNamespace(locator.namespace.clone()))
    }
}

/// Collection href for a resource type (e.g., "deployment" -> "/api/deployments")
fn collection_href(namespace: &str, type_name: &str) -> ClientResult<String> {
    if namespace != CM_NAMESPACE {
        return Err(ClientError::UnsupportedNamespace(namespace.to_string()));
    }
    Ok(format!("/api/{}s", type_name))
}

/// Resource type of a resource href (e.g., "/api/deployments/42" -> "deployment")
fn type_from_href(href: &str) -> Option<String> {
    let mut segments = href.split('/').filter(|s| !s.is_empty());
    if segments.next()? != "api" {
        return None;
    }
    segments
        .next()?
        .strip_suffix('s')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Strip scheme and host from a Location header, keeping the API path
fn href_from_location(location: &str) -> &str {
    location
        .find("/api/")
        .map(|i| &location[i..])
        .unwrap_or(location)
}

/// Action name of an `@res.<action>()` expression
fn parse_resource_action(rcl: &str) -> Option<String> {
    RESOURCE_ACTION
        .captures(rcl.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Request body wrapping fields under the resource type (`{"deployment": {...}}`)
fn wrap_fields(type_name: &str, fields: &Fields) -> ClientResult<serde_json::Value> {
    let fields = serde_json::to_value(fields)
        .map_err(|e| ClientError::Unsupported(format!("unencodable fields: {}", e)))?;
    let mut body = serde_json::Map::new();
    body.insert(type_name.to_string(), fields);
    Ok(serde_json::Value::Object(body))
}

/// Flatten an API resource representation into fields.
///
/// Scalars are copied; every link other than `self` becomes `<rel>_href`.
/// Nested arrays and objects (e.g., `actions`) are dropped.
fn fields_from_json(body: &serde_json::Value) -> ClientResult<Fields> {
    let object = body
        .as_object()
        .ok_or_else(|| ClientError::InvalidResponse("expected a JSON object".to_string()))?;

    let mut fields = Fields::new();
    for (key, value) in object {
        match value {
            serde_json::Value::String(s) => {
                fields.insert(key.clone(), Value::String(s.clone()));
            }
            serde_json::Value::Bool(b) => {
                fields.insert(key.clone(), Value::Bool(*b));
            }
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    fields.insert(key.clone(), Value::Int(i));
                }
            }
            serde_json::Value::Array(links) if key == "links" => {
                for link in links {
                    if let (Some(rel), Some(href)) = (
                        link.get("rel").and_then(|v| v.as_str()),
                        link.get("href").and_then(|v| v.as_str()),
                    ) && rel != "self"
                    {
                        fields.insert(format!("{}_href", rel), Value::String(href.to_string()));
                    }
                }
            }
            _ => {}
        }
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_resource_action() {
        assert_eq!(parse_resource_action("@res.lock()"), Some("lock".to_string()));
        assert_eq!(
            parse_resource_action(" @res.unlock() "),
            Some("unlock".to_string())
        );
        assert_eq!(parse_resource_action("@res.lock"), None);
        assert_eq!(parse_resource_action("@other.lock()"), None);
        assert_eq!(parse_resource_action("@res.lock(); @res.destroy()"), None);
    }

    #[test]
    fn test_collection_href() {
        assert_eq!(
            collection_href("rs_cm", "deployment").unwrap(),
            "/api/deployments"
        );
        assert!(matches!(
            collection_href("rs_ss", "deployment"),
            Err(ClientError::UnsupportedNamespace(ns)) if ns == "rs_ss"
        ));
    }

    #[test]
    fn test_type_from_href() {
        assert_eq!(
            type_from_href("/api/deployments/42"),
            Some("deployment".to_string())
        );
        assert_eq!(type_from_href("/other/deployments/42"), None);
        assert_eq!(type_from_href("/api"), None);
    }

    #[test]
    fn test_href_from_location() {
        assert_eq!(
            href_from_location("https://us-3.rightscale.com/api/deployments/42"),
            "/api/deployments/42"
        );
        assert_eq!(
            href_from_location("/api/deployments/42"),
            "/api/deployments/42"
        );
    }

    #[test]
    fn test_fields_from_json_flattens_links() {
        let body = json!({
            "name": "web",
            "description": "",
            "locked": true,
            "server_tag_scope": "deployment",
            "actions": [{"rel": "lock"}],
            "links": [
                {"rel": "self", "href": "/api/deployments/42"},
                {"rel": "resource_group", "href": "/api/resource_groups/7"}
            ]
        });

        let fields = fields_from_json(&body).unwrap();

        assert_eq!(fields.get("name"), Some(&Value::from("web")));
        assert_eq!(fields.get("locked"), Some(&Value::Bool(true)));
        assert_eq!(
            fields.get("resource_group_href"),
            Some(&Value::from("/api/resource_groups/7"))
        );
        assert!(!fields.contains_key("self_href"));
        assert!(!fields.contains_key("actions"));
        assert!(!fields.contains_key("links"));
    }

    #[test]
    fn test_fields_from_json_rejects_non_objects() {
        assert!(matches!(
            fields_from_json(&json!([1, 2])),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_wrap_fields() {
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::from("web"));
        fields.insert("server_tag_scope".to_string(), Value::from("account"));

        let body = wrap_fields("deployment", &fields).unwrap();
        assert_eq!(
            body,
            json!({"deployment": {"name": "web", "server_tag_scope": "account"}})
        );
    }

    #[test]
    fn test_new_uses_configured_host() {
        let config = ProviderConfig::new("token", 1234).with_host("us-4.rightscale.com");
        let client = HttpClient::new(&config).unwrap();
        assert_eq!(client.base_url(), "https://us-4.rightscale.com");
    }

    /// Local Cloud Management API serving a single deployment at
    /// `/api/deployments/42`. Records every request as `"<METHOD> <uri>"`.
    mod stub {
        use std::sync::{Arc, Mutex};

        use axum::Router;
        use axum::extract::State;
        use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
        use axum::response::{IntoResponse, Response};
        use serde_json::json;

        #[derive(Clone, Default)]
        pub struct Api {
            requests: Arc<Mutex<Vec<String>>>,
            bodies: Arc<Mutex<Vec<String>>>,
        }

        impl Api {
            pub fn requests(&self) -> Vec<String> {
                self.requests.lock().unwrap().clone()
            }

            pub fn bodies(&self) -> Vec<String> {
                self.bodies.lock().unwrap().clone()
            }
        }

        pub async fn start() -> (Api, String) {
            let api = Api::default();
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let base_url = format!("http://{}", listener.local_addr().unwrap());
            let router = Router::new().fallback(handle).with_state(api.clone());
            tokio::spawn(async move {
                axum::serve(listener, router).await.unwrap();
            });
            (api, base_url)
        }

        async fn handle(
            State(api): State<Api>,
            method: Method,
            uri: Uri,
            headers: HeaderMap,
            body: String,
        ) -> Response {
            api.requests.lock().unwrap().push(format!("{} {}", method, uri));
            if !body.is_empty() {
                api.bodies.lock().unwrap().push(body.clone());
            }

            if uri.path() == "/api/oauth2" {
                if body.contains("refresh_token=bad") {
                    return (StatusCode::BAD_REQUEST, "invalid_grant").into_response();
                }
                return axum::Json(json!({"access_token": "at-1", "expires_in": 7200}))
                    .into_response();
            }

            let get_header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            if get_header("authorization").as_deref() != Some("Bearer at-1") {
                return StatusCode::UNAUTHORIZED.into_response();
            }
            if get_header("x-api-version").as_deref() != Some("1.5")
                || get_header("x-account").as_deref() != Some("1234")
            {
                return (StatusCode::BAD_REQUEST, "missing API headers").into_response();
            }

            match (method.as_str(), uri.path()) {
                ("POST", "/api/deployments") => {
                    let host = get_header("host").unwrap_or_default();
                    let location = format!("http://{}/api/deployments/42", host);
                    (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
                }
                ("GET", "/api/deployments/42") => axum::Json(json!({
                    "name": "web",
                    "description": "front",
                    "locked": false,
                    "server_tag_scope": "deployment",
                    "actions": [{"rel": "lock"}],
                    "links": [
                        {"rel": "self", "href": "/api/deployments/42"},
                        {"rel": "resource_group", "href": "/api/resource_groups/7"}
                    ]
                }))
                .into_response(),
                ("PUT", "/api/deployments/42") | ("POST", "/api/deployments/42/lock") => {
                    StatusCode::NO_CONTENT.into_response()
                }
                ("DELETE", "/api/deployments/42") => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "deployment is locked").into_response()
                }
                _ => StatusCode::NOT_FOUND.into_response(),
            }
        }
    }

    fn stub_client(base_url: &str, refresh_token: &str) -> HttpClient {
        let config = ProviderConfig::new(refresh_token, 1234).with_host(base_url);
        HttpClient::new(&config).unwrap()
    }

    fn deployment() -> Locator {
        Locator::new("rs_cm", "/api/deployments/42")
    }

    #[tokio::test]
    async fn test_get_reads_default_view() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        let res = client.get(&deployment()).await.unwrap();

        assert_eq!(res.locator, deployment());
        assert_eq!(res.fields.get("name"), Some(&Value::from("web")));
        assert_eq!(
            res.fields.get("resource_group_href"),
            Some(&Value::from("/api/resource_groups/7"))
        );
        assert_eq!(
            api.requests(),
            vec!["POST /api/oauth2", "GET /api/deployments/42?view=default"]
        );
    }

    #[tokio::test]
    async fn test_access_token_is_reused() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        client.get(&deployment()).await.unwrap();
        client.get(&deployment()).await.unwrap();

        let token_requests = api
            .requests()
            .iter()
            .filter(|r| r.as_str() == "POST /api/oauth2")
            .count();
        assert_eq!(token_requests, 1);
        assert_eq!(api.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_is_auth_error() {
        let (_, base_url) = stub::start().await;
        let client = stub_client(&base_url, "bad");

        let err = client.get(&deployment()).await.unwrap_err();

        assert!(matches!(err, ClientError::Auth(msg) if msg.contains("400")));
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_found() {
        let (_, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        let err = client
            .get(&Locator::new("rs_cm", "/api/deployments/7"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let (_, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        let err = client.delete(&deployment()).await.unwrap_err();

        match err {
            ClientError::Api {
                method,
                href,
                status,
                message,
            } => {
                assert_eq!(method, "DELETE");
                assert_eq!(href, "/api/deployments/42");
                assert_eq!(status, 422);
                assert_eq!(message, "deployment is locked");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_create_follows_location_header() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::from("web"));

        let res = client.create("rs_cm", "deployment", fields).await.unwrap();

        assert_eq!(res.locator, deployment());
        assert_eq!(res.fields.get("description"), Some(&Value::from("front")));
        assert_eq!(
            api.requests(),
            vec![
                "POST /api/oauth2",
                "POST /api/deployments",
                "GET /api/deployments/42?view=default",
            ]
        );
        let body: serde_json::Value = serde_json::from_str(&api.bodies()[1]).unwrap();
        assert_eq!(body, json!({"deployment": {"name": "web"}}));
    }

    #[tokio::test]
    async fn test_update_puts_wrapped_fields() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");
        let mut fields = Fields::new();
        fields.insert("name".to_string(), Value::from("web-2"));

        client.update(&deployment(), fields).await.unwrap();

        assert_eq!(
            api.requests().last().map(String::as_str),
            Some("PUT /api/deployments/42")
        );
        let body: serde_json::Value = serde_json::from_str(&api.bodies()[1]).unwrap();
        assert_eq!(body, json!({"deployment": {"name": "web-2"}}));
    }

    #[tokio::test]
    async fn test_run_posts_resource_action() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        client.run(&deployment(), "@res.lock()").await.unwrap();

        assert_eq!(
            api.requests().last().map(String::as_str),
            Some("POST /api/deployments/42/lock")
        );
    }

    #[tokio::test]
    async fn test_other_namespaces_send_nothing() {
        let (api, base_url) = stub::start().await;
        let client = stub_client(&base_url, "token");

        let err = client
            .run(&Locator::new("rs_ss", "/api/deployments/42"), "@res.lock()")
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::UnsupportedNamespace(ns) if ns == "rs_ss"));
        assert!(api.requests().is_empty());
    }
}
