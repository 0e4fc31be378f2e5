//! HTTP implementation of [`KeycloakAdmin`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{header, Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::{
    AccessToken, ClientRepresentation, KeycloakAdmin, KeycloakError, RoleRepresentation,
    UserRepresentation,
};

/// Realm the provider's own client logs in to.
pub const LOGIN_REALM: &str = "master";

/// Tokens are refreshed this long before keycloak would reject them.
const EXPIRY_MARGIN: Duration = Duration::from_secs(10);

/// Client-credentials pair for the provider's admin client.
#[derive(Clone)]
pub struct ClientCredentials {
    /// Public client id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// Admin session against one keycloak server.
///
/// Logs in with the client-credentials grant on [`LOGIN_REALM`] and logs in
/// again whenever the cached token is about to expire.
pub struct KeycloakClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: ClientCredentials,
    token: RwLock<Option<CachedToken>>,
}

impl std::fmt::Debug for KeycloakClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeycloakClient")
            .field("base_url", &self.base_url.as_str())
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl KeycloakClient {
    /// Build a client for the server at `url`. Does not contact the server.
    pub fn new(url: &str, credentials: ClientCredentials) -> Result<Self, KeycloakError> {
        Self::with_http_client(url, credentials, reqwest::Client::new())
    }

    /// Like [`KeycloakClient::new`] with a caller-supplied HTTP client.
    pub fn with_http_client(
        url: &str,
        credentials: ClientCredentials,
        http: reqwest::Client,
    ) -> Result<Self, KeycloakError> {
        let base_url = parse_base_url(url)?;
        Ok(Self {
            http,
            base_url,
            credentials,
            token: RwLock::new(None),
        })
    }

    /// The server url every path is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Log in now, replacing any cached token.
    #[instrument(skip(self), fields(client_id = %self.credentials.client_id))]
    pub async fn login(&self) -> Result<(), KeycloakError> {
        let token = self.request_token().await?;
        *self.token.write().await = Some(token);
        Ok(())
    }

    async fn request_token(&self) -> Result<CachedToken, KeycloakError> {
        let url = self.url(&["realms", LOGIN_REALM, "protocol", "openid-connect", "token"]);
        debug!(%url, "Requesting admin token");
        let response = self
            .http
            .post(url)
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;
        let token: AccessToken = decode(check_status(response).await?).await?;
        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        })
    }

    async fn bearer(&self) -> Result<String, KeycloakError> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = guard.as_ref() {
            if token.is_fresh() {
                return Ok(token.access_token.clone());
            }
        }
        debug!("Admin token missing or expired, logging in");
        let token = self.request_token().await?;
        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn admin_url(&self, realm: &str, segments: &[&str]) -> Url {
        let mut all = vec!["admin", "realms", realm];
        all.extend_from_slice(segments);
        self.url(&all)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<Response, KeycloakError> {
        let token = self.bearer().await?;
        debug!(%method, %url, "Keycloak admin request");
        let mut request = self.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        check_status(request.send().await?).await
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, KeycloakError> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        decode(response).await
    }

    async fn post_created<B: Serialize + ?Sized>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<String, KeycloakError> {
        let response = self.send(Method::POST, url, Some(body)).await?;
        id_from_location(&response)
    }

    async fn execute<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<(), KeycloakError> {
        self.send(method, url, body).await.map(|_| ())
    }
}

#[async_trait]
impl KeycloakAdmin for KeycloakClient {
    #[instrument(skip(self))]
    async fn get_clients(
        &self,
        realm: &str,
        client_id: &str,
    ) -> Result<Vec<ClientRepresentation>, KeycloakError> {
        let mut url = self.admin_url(realm, &["clients"]);
        url.query_pairs_mut().append_pair("clientId", client_id);
        self.get(url).await
    }

    #[instrument(skip(self))]
    async fn get_client(
        &self,
        realm: &str,
        id: &str,
    ) -> Result<ClientRepresentation, KeycloakError> {
        self.get(self.admin_url(realm, &["clients", id])).await
    }

    #[instrument(skip(self, role), fields(role = role.name_or_default()))]
    async fn create_realm_role(
        &self,
        realm: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError> {
        self.post_created(self.admin_url(realm, &["roles"]), role)
            .await
    }

    #[instrument(skip(self))]
    async fn get_realm_role(
        &self,
        realm: &str,
        name: &str,
    ) -> Result<RoleRepresentation, KeycloakError> {
        self.get(self.admin_url(realm, &["roles", name])).await
    }

    #[instrument(skip(self, role))]
    async fn update_realm_role(
        &self,
        realm: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError> {
        self.execute(Method::PUT, self.admin_url(realm, &["roles", name]), Some(role))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_realm_role(&self, realm: &str, name: &str) -> Result<(), KeycloakError> {
        self.execute::<()>(Method::DELETE, self.admin_url(realm, &["roles", name]), None)
            .await
    }

    #[instrument(skip(self, role), fields(role = role.name_or_default()))]
    async fn create_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        role: &RoleRepresentation,
    ) -> Result<String, KeycloakError> {
        self.post_created(
            self.admin_url(realm, &["clients", client_uuid, "roles"]),
            role,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<RoleRepresentation, KeycloakError> {
        self.get(self.admin_url(realm, &["clients", client_uuid, "roles", name]))
            .await
    }

    #[instrument(skip(self, role))]
    async fn update_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
        role: &RoleRepresentation,
    ) -> Result<(), KeycloakError> {
        self.execute(
            Method::PUT,
            self.admin_url(realm, &["clients", client_uuid, "roles", name]),
            Some(role),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn delete_client_role(
        &self,
        realm: &str,
        client_uuid: &str,
        name: &str,
    ) -> Result<(), KeycloakError> {
        self.execute::<()>(
            Method::DELETE,
            self.admin_url(realm, &["clients", client_uuid, "roles", name]),
            None,
        )
        .await
    }

    #[instrument(skip(self, roles), fields(count = roles.len()))]
    async fn add_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        self.execute(
            Method::POST,
            self.admin_url(realm, &["roles", role_name, "composites"]),
            Some(roles),
        )
        .await
    }

    #[instrument(skip(self, roles), fields(count = roles.len()))]
    async fn delete_realm_role_composite(
        &self,
        realm: &str,
        role_name: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        self.execute(
            Method::DELETE,
            self.admin_url(realm, &["roles", role_name, "composites"]),
            Some(roles),
        )
        .await
    }

    #[instrument(skip(self, roles), fields(count = roles.len()))]
    async fn add_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        self.execute(
            Method::POST,
            self.admin_url(realm, &["roles-by-id", role_id, "composites"]),
            Some(roles),
        )
        .await
    }

    #[instrument(skip(self, roles), fields(count = roles.len()))]
    async fn delete_role_composite_by_id(
        &self,
        realm: &str,
        role_id: &str,
        roles: &[RoleRepresentation],
    ) -> Result<(), KeycloakError> {
        self.execute(
            Method::DELETE,
            self.admin_url(realm, &["roles-by-id", role_id, "composites"]),
            Some(roles),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn get_role_composites_by_id(
        &self,
        realm: &str,
        role_id: &str,
    ) -> Result<Vec<RoleRepresentation>, KeycloakError> {
        self.get(self.admin_url(realm, &["roles-by-id", role_id, "composites"]))
            .await
    }

    #[instrument(skip(self))]
    async fn get_client_service_account(
        &self,
        realm: &str,
        client_uuid: &str,
    ) -> Result<UserRepresentation, KeycloakError> {
        self.get(self.admin_url(realm, &["clients", client_uuid, "service-account-user"]))
            .await
    }

    #[instrument(skip(self))]
    async fn get_user(&self, realm: &str, id: &str) -> Result<UserRepresentation, KeycloakError> {
        self.get(self.admin_url(realm, &["users", id])).await
    }

    #[instrument(skip(self, user), fields(user_id = user.id.as_deref().unwrap_or_default()))]
    async fn update_user(
        &self,
        realm: &str,
        user: &UserRepresentation,
    ) -> Result<(), KeycloakError> {
        let Some(id) = user.id.as_deref() else {
            return Err(KeycloakError::HttpFailure {
                status: 400,
                body: "user representation has no id".to_string(),
            });
        };
        self.execute(Method::PUT, self.admin_url(realm, &["users", id]), Some(user))
            .await
    }
}

fn parse_base_url(url: &str) -> Result<Url, KeycloakError> {
    let parsed = Url::parse(url).map_err(|e| KeycloakError::InvalidUrl(format!("{url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
        return Err(KeycloakError::InvalidUrl(format!(
            "{url}: expected an http(s) base url"
        )));
    }
    Ok(parsed)
}

async fn check_status(response: Response) -> Result<Response, KeycloakError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(status = status.as_u16(), "Keycloak request failed");
    Err(KeycloakError::HttpFailure {
        status: status.as_u16(),
        body,
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, KeycloakError> {
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn id_from_location(response: &Response) -> Result<String, KeycloakError> {
    let location = response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(KeycloakError::MissingLocation)?;
    last_segment(location).ok_or(KeycloakError::MissingLocation)
}

/// Last path segment of a `Location` value, percent-decoded.
fn last_segment(location: &str) -> Option<String> {
    let segment = location.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    Some(String::from_utf8_lossy(&decoded).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio_test::{assert_err, assert_ok};

    /// One request as received by [`stub_server`].
    #[derive(Debug, Clone)]
    struct Received {
        method: String,
        path: String,
        authorization: Option<String>,
        body: String,
    }

    struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    impl Reply {
        fn json(status: u16, body: serde_json::Value) -> Self {
            Self {
                status,
                headers: vec![("Content-Type", "application/json".to_string())],
                body: body.to_string(),
            }
        }
    }

    type Handler = Arc<dyn Fn(&Received, &str) -> Reply + Send + Sync>;

    /// Serve one request per connection on a local port, answering through
    /// `handler`. The handler also gets the server's base url.
    async fn stub_server(handler: Handler) -> (String, Arc<Mutex<Vec<Received>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let log = Arc::new(Mutex::new(Vec::new()));

        let server_base = base.clone();
        let server_log = Arc::clone(&log);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let mut reader = BufReader::new(socket);

                let mut request_line = String::new();
                reader.read_line(&mut request_line).await.unwrap();
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let path = parts.next().unwrap_or_default().to_string();

                let mut content_length = 0;
                let mut authorization = None;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).await.unwrap();
                    let line = line.trim_end();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        match name.trim().to_ascii_lowercase().as_str() {
                            "content-length" => content_length = value.trim().parse().unwrap(),
                            "authorization" => authorization = Some(value.trim().to_string()),
                            _ => {},
                        }
                    }
                }
                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).await.unwrap();

                let received = Received {
                    method,
                    path,
                    authorization,
                    body: String::from_utf8(body).unwrap(),
                };
                let reply = handler(&received, &server_base);
                server_log.lock().unwrap().push(received);

                let mut response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n",
                    reply.status,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                response.push_str(&reply.body);

                let mut socket = reader.into_inner();
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (base, log)
    }

    const TOKEN_PATH: &str = "/realms/master/protocol/openid-connect/token";

    /// A keycloak stand-in that issues numbered tokens living `expires_in`
    /// seconds and hands the remaining requests to `admin`.
    fn keycloak_stub(
        expires_in: u64,
        logins: Arc<AtomicUsize>,
        admin: impl Fn(&Received, &str) -> Reply + Send + Sync + 'static,
    ) -> Handler {
        Arc::new(move |request: &Received, base: &str| {
            if request.path == TOKEN_PATH {
                let n = logins.fetch_add(1, Ordering::SeqCst) + 1;
                return Reply::json(
                    200,
                    serde_json::json!({
                        "access_token": format!("tok-{}", n),
                        "expires_in": expires_in,
                        "token_type": "Bearer"
                    }),
                );
            }
            admin(request, base)
        })
    }

    fn reader_role() -> Reply {
        Reply::json(
            200,
            serde_json::json!({
                "id": "6f1c",
                "name": "reader",
                "description": "Read access",
                "composite": false,
                "clientRole": false,
                "containerId": "acme",
                "attributes": {"scope": ["orders", "invoices"]}
            }),
        )
    }

    fn client(url: &str) -> KeycloakClient {
        KeycloakClient::new(
            url,
            ClientCredentials {
                client_id: "terraform".to_string(),
                client_secret: "s3cret".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let creds = ClientCredentials {
            client_id: "x".to_string(),
            client_secret: "y".to_string(),
        };
        assert!(matches!(
            KeycloakClient::new("not a url", creds.clone()),
            Err(KeycloakError::InvalidUrl(_))
        ));
        assert!(matches!(
            KeycloakClient::new("mailto:ops@example.com", creds),
            Err(KeycloakError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_admin_url_building() {
        let kc = client("https://sso.example.com");
        assert_eq!(
            kc.admin_url("acme", &["roles", "reader"]).as_str(),
            "https://sso.example.com/admin/realms/acme/roles/reader"
        );

        let kc = client("https://sso.example.com/auth/");
        assert_eq!(
            kc.admin_url("acme", &["roles-by-id", "r-1", "composites"]).as_str(),
            "https://sso.example.com/auth/admin/realms/acme/roles-by-id/r-1/composites"
        );
    }

    #[test]
    fn test_admin_url_encodes_segments() {
        let kc = client("https://sso.example.com");
        assert_eq!(
            kc.admin_url("acme", &["roles", "billing admin"]).as_str(),
            "https://sso.example.com/admin/realms/acme/roles/billing%20admin"
        );
    }

    #[test]
    fn test_token_url() {
        let kc = client("http://localhost:8080");
        assert_eq!(
            kc.url(&["realms", LOGIN_REALM, "protocol", "openid-connect", "token"])
                .as_str(),
            "http://localhost:8080/realms/master/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_last_segment_of_location() {
        assert_eq!(
            last_segment("https://sso/admin/realms/acme/roles/reader").as_deref(),
            Some("reader")
        );
        assert_eq!(
            last_segment("https://sso/admin/realms/acme/roles/billing%20admin").as_deref(),
            Some("billing admin")
        );
        assert_eq!(last_segment(""), None);
    }

    #[test]
    fn test_last_segment_keeps_malformed_escapes() {
        let at = |name: &str| last_segment(&format!("https://sso/admin/realms/acme/roles/{name}"));
        assert_eq!(at("a%2Fb").as_deref(), Some("a/b"));
        assert_eq!(at("a%+1b").as_deref(), Some("a%+1b"));
        assert_eq!(at("a%-1b").as_deref(), Some("a%-1b"));
        assert_eq!(at("100%").as_deref(), Some("100%"));
        assert_eq!(at("%zz").as_deref(), Some("%zz"));
        assert_eq!(at("caf%C3%A9").as_deref(), Some("café"));
    }

    #[tokio::test]
    async fn test_login_posts_client_credentials() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, Arc::clone(&logins), |_, _| {
            Reply::json(404, serde_json::json!({}))
        });
        let (base, log) = stub_server(handler).await;

        assert_ok!(client(&base).login().await);

        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].method, "POST");
        assert_eq!(log[0].path, TOKEN_PATH);
        assert!(log[0].authorization.is_none());
        assert!(log[0].body.contains("grant_type=client_credentials"));
        assert!(log[0].body.contains("client_id=terraform"));
        assert!(log[0].body.contains("client_secret=s3cret"));
    }

    #[tokio::test]
    async fn test_rejected_login_is_an_http_failure() {
        let handler: Handler = Arc::new(|_: &Received, _: &str| {
            Reply::json(401, serde_json::json!({"error": "unauthorized_client"}))
        });
        let (base, _) = stub_server(handler).await;

        let err = assert_err!(client(&base).login().await);
        assert_eq!(err.status(), Some(401));
        assert!(matches!(ProviderError::from(err), ProviderError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_create_role_returns_decoded_location_name() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, Arc::clone(&logins), |_, base| Reply {
            status: 201,
            headers: vec![(
                "Location",
                format!("{}/admin/realms/acme/roles/billing%20admin", base),
            )],
            body: String::new(),
        });
        let (base, log) = stub_server(handler).await;
        let kc = client(&base);
        assert_ok!(kc.login().await);

        let role = RoleRepresentation {
            name: Some("billing admin".to_string()),
            description: Some("Invoices".to_string()),
            ..Default::default()
        };
        let id = assert_ok!(kc.create_realm_role("acme", &role).await);
        assert_eq!(id, "billing admin");

        let log = log.lock().unwrap().clone();
        let create = &log[1];
        assert_eq!(create.method, "POST");
        assert_eq!(create.path, "/admin/realms/acme/roles");
        assert_eq!(create.authorization.as_deref(), Some("Bearer tok-1"));
        let sent: serde_json::Value = serde_json::from_str(&create.body).unwrap();
        assert_eq!(
            sent,
            serde_json::json!({"name": "billing admin", "description": "Invoices"})
        );
    }

    #[tokio::test]
    async fn test_created_without_location_is_an_error() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, logins, |_, _| Reply {
            status: 201,
            headers: vec![],
            body: String::new(),
        });
        let (base, _) = stub_server(handler).await;
        let role = RoleRepresentation {
            name: Some("reader".to_string()),
            ..Default::default()
        };

        let err = assert_err!(client(&base).create_realm_role("acme", &role).await);
        assert!(matches!(err, KeycloakError::MissingLocation));
    }

    #[tokio::test]
    async fn test_missing_role_maps_to_not_found() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, logins, |_, _| {
            Reply::json(404, serde_json::json!({"error": "Could not find role"}))
        });
        let (base, log) = stub_server(handler).await;

        let err = assert_err!(client(&base).get_realm_role("acme", "ghost").await);
        assert_eq!(err.status(), Some(404));
        assert!(err.to_string().contains("Could not find role"));
        assert!(ProviderError::from(err).is_not_found());

        let log = log.lock().unwrap().clone();
        assert_eq!(log[1].method, "GET");
        assert_eq!(log[1].path, "/admin/realms/acme/roles/ghost");
    }

    #[tokio::test]
    async fn test_get_role_decodes_representation() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, logins, |_, _| reader_role());
        let (base, _) = stub_server(handler).await;

        let role = assert_ok!(client(&base).get_realm_role("acme", "reader").await);
        assert_eq!(role.id.as_deref(), Some("6f1c"));
        assert_eq!(role.client_role, Some(false));
        assert_eq!(role.container_id.as_deref(), Some("acme"));
        assert_eq!(
            role.attributes.unwrap()["scope"],
            vec!["orders".to_string(), "invoices".to_string()]
        );
    }

    #[tokio::test]
    async fn test_client_lookup_sends_client_id_query() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, logins, |_, _| {
            Reply::json(200, serde_json::json!([{"id": "c-1", "clientId": "billing app"}]))
        });
        let (base, log) = stub_server(handler).await;

        let clients = assert_ok!(client(&base).get_clients("acme", "billing app").await);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].id.as_deref(), Some("c-1"));

        let log = log.lock().unwrap().clone();
        assert_eq!(log[1].path, "/admin/realms/acme/clients?clientId=billing+app");
    }

    #[tokio::test]
    async fn test_fresh_token_is_reused() {
        let logins = Arc::new(AtomicUsize::new(0));
        let handler = keycloak_stub(300, Arc::clone(&logins), |_, _| reader_role());
        let (base, log) = stub_server(handler).await;
        let kc = client(&base);

        assert_ok!(kc.get_realm_role("acme", "reader").await);
        assert_ok!(kc.get_realm_role("acme", "reader").await);

        assert_eq!(logins.load(Ordering::SeqCst), 1);
        let log = log.lock().unwrap().clone();
        assert_eq!(log.len(), 3);
        assert_eq!(log[2].authorization.as_deref(), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn test_expiring_token_triggers_new_login() {
        let logins = Arc::new(AtomicUsize::new(0));
        // Inside the refresh margin, so every call needs a new token.
        let handler = keycloak_stub(5, Arc::clone(&logins), |_, _| reader_role());
        let (base, log) = stub_server(handler).await;
        let kc = client(&base);

        assert_ok!(kc.login().await);
        assert_ok!(kc.get_realm_role("acme", "reader").await);

        assert_eq!(logins.load(Ordering::SeqCst), 2);
        let log = log.lock().unwrap().clone();
        let paths: Vec<_> = log.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec![TOKEN_PATH, TOKEN_PATH, "/admin/realms/acme/roles/reader"]);
        assert_eq!(log[2].authorization.as_deref(), Some("Bearer tok-2"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kc = client("https://sso.example.com");
        let printed = format!("{:?}", kc);
        assert!(printed.contains("terraform"));
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn test_cached_token_freshness() {
        let fresh = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(300),
        };
        assert!(fresh.is_fresh());

        let stale = CachedToken {
            access_token: "t".to_string(),
            expires_at: Instant::now() + Duration::from_secs(5),
        };
        assert!(!stale.is_fresh());
    }
}
