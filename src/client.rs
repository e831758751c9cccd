//! Authenticated session against the Tado API.
//!
//! - Blocking client using `ureq` (no async); one agent holds the connection pool and
//!   the cookie jar for the whole session.
//! - OAuth2 password grant on login, refresh grant on demand. Refresh is never
//!   triggered implicitly unless [`ClientConfig::refresh_on_unauthorized`] is set,
//!   and then only GET and DELETE are sent again.
//! - Every call is resolved against the v2 API base and carries the current
//!   `Referer` and `Authorization` headers.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::{Duration, Instant};

use crate::config::ClientConfig;
use crate::error::{Result, TadoError};
use crate::models::tado::{HomeId, Object, TokenResponse, User};

pub const AUTHORIZATION: &str = "Authorization";
pub const REFERER: &str = "Referer";

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    /// Whether a request rejected with 401 may be sent again after a refresh.
    /// POST and PUT carry mutations and are never repeated on the caller's behalf.
    pub fn retries_after_refresh(self) -> bool {
        matches!(self, Method::Get | Method::Delete)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        })
    }
}

#[derive(Debug, Clone)]
struct OAuthToken {
    access_token: String,
    refresh_token: String,
    expires_at: Option<Instant>,
}

impl OAuthToken {
    fn parse(body: &str) -> Result<Self> {
        let TokenResponse {
            access_token,
            refresh_token,
            expires_in,
        } = serde_json::from_str(body).map_err(|e| TadoError::Auth(format!("malformed token response: {}", e)))?;
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TadoError::Auth("token response lacks access_token".into()))?;
        let refresh_token = refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| TadoError::Auth("token response lacks refresh_token".into()))?;
        Ok(OAuthToken {
            access_token,
            refresh_token,
            expires_at: expires_in.map(|s| Instant::now() + Duration::from_secs(s)),
        })
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Debug, Clone)]
struct AuthState {
    token: OAuthToken,
    headers: BTreeMap<String, String>,
}

impl AuthState {
    fn new(token: OAuthToken, referer: &str) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(REFERER.to_string(), referer.to_string());
        headers.insert(AUTHORIZATION.to_string(), bearer(&token.access_token));
        AuthState { token, headers }
    }

    fn replace_token(&mut self, token: OAuthToken) {
        self.headers
            .insert(AUTHORIZATION.to_string(), bearer(&token.access_token));
        self.token = token;
    }
}

fn bearer(access_token: &str) -> String {
    format!("Bearer {}", access_token)
}

/// A logged-in account bound to its first home.
pub struct Session {
    agent: ureq::Agent,
    config: ClientConfig,
    username: String,
    client_secret: String,
    home_id: HomeId,
    auth: RwLock<AuthState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("home_id", &self.home_id)
            .field("api_url", &self.config.api_url)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Log in against the production endpoints.
    pub fn login(username: &str, password: &str, client_secret: &str) -> Result<Self> {
        Self::login_with(ClientConfig::default(), username, password, client_secret)
    }

    pub fn login_with(config: ClientConfig, username: &str, password: &str, client_secret: &str) -> Result<Self> {
        let agent = Self::build_agent(&config);
        info!("Logging in to Tado as {}", username);
        let token = Self::oauth_grant(
            &agent,
            &config,
            client_secret,
            &[("grant_type", "password"), ("username", username), ("password", password)],
        )?;
        Self::establish(agent, config, username, client_secret, token)
    }

    /// Start a session from a previously issued refresh token instead of a password.
    pub fn from_refresh_token(
        config: ClientConfig,
        username: &str,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<Self> {
        let agent = Self::build_agent(&config);
        info!("Resuming Tado session for {} from refresh token", username);
        let token = Self::oauth_grant(
            &agent,
            &config,
            client_secret,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token)],
        )?;
        Self::establish(agent, config, username, client_secret, token)
    }

    fn build_agent(config: &ClientConfig) -> ureq::Agent {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.timeout))
            .build();
        ureq::Agent::new_with_config(agent_config)
    }

    fn establish(
        agent: ureq::Agent,
        config: ClientConfig,
        username: &str,
        client_secret: &str,
        token: OAuthToken,
    ) -> Result<Self> {
        let auth = AuthState::new(token, &config.referer);

        // The v1 endpoint hands out the session cookie some v2 endpoints require; the
        // response itself is irrelevant and lands in the agent's cookie jar.
        match Self::send(&agent, Method::Get, &config.legacy_me_url, &auth.headers, None) {
            Ok(_) => debug!("Legacy session cookie obtained"),
            Err(TadoError::Api { status, .. }) => warn!("Legacy me call returned http {}; continuing", status),
            Err(e) => return Err(e),
        }

        let me_url = resolve(&config.api_url, "me");
        let me: User = decode(Self::send(&agent, Method::Get, &me_url, &auth.headers, None)?)?;
        let home_id = me
            .first_home_id()
            .ok_or_else(|| TadoError::MissingField("homes.0.id".into()))?;
        info!("Authenticated to Tado API (home {})", home_id);

        Ok(Session {
            agent,
            config,
            username: username.to_string(),
            client_secret: client_secret.to_string(),
            home_id,
            auth: RwLock::new(auth),
        })
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// On failure the previous tokens and headers are kept as they were.
    pub fn refresh(&self) -> Result<()> {
        let refresh_token = self.read_auth().token.refresh_token.clone();
        debug!("Refreshing access token for {}", self.username);
        let token = Self::oauth_grant(
            &self.agent,
            &self.config,
            &self.client_secret,
            &[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())],
        )?;
        self.auth
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace_token(token);
        info!("Access token refreshed");
        Ok(())
    }

    fn oauth_grant(
        agent: &ureq::Agent,
        config: &ClientConfig,
        client_secret: &str,
        grant: &[(&str, &str)],
    ) -> Result<OAuthToken> {
        let mut form = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", client_secret),
            ("scope", config.scope.as_str()),
        ];
        form.extend_from_slice(grant);

        let mut resp = agent
            .post(&config.token_url)
            .header("Accept", "application/json")
            .send_form(form)?;
        let status = resp.status();
        let body = resp.body_mut().read_to_string()?;
        if !status.is_success() {
            return Err(TadoError::Auth(format!("http {}: {}", status.as_u16(), body)));
        }
        OAuthToken::parse(&body)
    }

    /// Send `method` to `path` (relative to the API base, or absolute) and decode the JSON reply.
    pub fn request(&self, path: &str, method: Method, body: Option<&Value>) -> Result<Object> {
        let url = resolve(&self.config.api_url, path);
        let retry = self.config.refresh_on_unauthorized && method.retries_after_refresh();
        match self.send_authed(method, &url, body) {
            Err(e) if retry && e.is_unauthorized() => {
                warn!("{} {} rejected with 401; refreshing token and retrying once", method, url);
                self.refresh()?;
                self.send_authed(method, &url, body)
            }
            other => other,
        }
    }

    pub fn get(&self, path: &str) -> Result<Object> {
        self.request(path, Method::Get, None)
    }

    pub fn post(&self, path: &str, body: &Value) -> Result<Object> {
        self.request(path, Method::Post, Some(body))
    }

    pub fn put(&self, path: &str, body: &Value) -> Result<Object> {
        self.request(path, Method::Put, Some(body))
    }

    pub fn delete(&self, path: &str) -> Result<Object> {
        self.request(path, Method::Delete, None)
    }

    /// `GET` decoded into a typed model.
    pub fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        decode(self.get(path)?)
    }

    fn send_authed(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Object> {
        let headers = self.auth_headers();
        Self::send(&self.agent, method, url, &headers, body)
    }

    fn send(
        agent: &ureq::Agent,
        method: Method,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&Value>,
    ) -> Result<Object> {
        let result = match method {
            Method::Get => with_headers(agent.get(url), headers).call(),
            Method::Delete => with_headers(agent.delete(url), headers).call(),
            Method::Post => send_body(with_headers(agent.post(url), headers), body),
            Method::Put => send_body(with_headers(agent.put(url), headers), body),
        };
        let mut resp = result?;
        let status = resp.status();
        let text = resp.body_mut().read_to_string()?;
        debug!("{} {} -> {}", method, url, status.as_u16());

        if !status.is_success() {
            return Err(TadoError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn home_id(&self) -> HomeId {
        self.home_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn access_token(&self) -> String {
        self.read_auth().token.access_token.clone()
    }

    pub fn refresh_token(&self) -> String {
        self.read_auth().token.refresh_token.clone()
    }

    /// Snapshot of the headers sent with every API call.
    pub fn auth_headers(&self) -> BTreeMap<String, String> {
        self.read_auth().headers.clone()
    }

    /// Current `Authorization` header value.
    pub fn authorization(&self) -> String {
        self.read_auth()
            .headers
            .get(AUTHORIZATION)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether the access token is past the lifetime the token endpoint announced.
    /// Always `false` when no lifetime was given.
    pub fn token_expired(&self) -> bool {
        self.read_auth().token.is_expired()
    }

    fn read_auth(&self) -> RwLockReadGuard<'_, AuthState> {
        self.auth.read().unwrap_or_else(PoisonError::into_inner)
    }
}

fn with_headers<B>(mut req: ureq::RequestBuilder<B>, headers: &BTreeMap<String, String>) -> ureq::RequestBuilder<B> {
    req = req.header("Accept", "application/json");
    for (name, value) in headers {
        req = req.header(name.as_str(), value.as_str());
    }
    req
}

fn send_body(
    req: ureq::RequestBuilder<ureq::typestate::WithBody>,
    body: Option<&Value>,
) -> std::result::Result<ureq::http::Response<ureq::Body>, ureq::Error> {
    match body {
        Some(json) => req.send_json(json),
        None => req.send_empty(),
    }
}

pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_path_to_error::deserialize(value)?)
}

/// Resolve `path` against `base`; absolute URLs pass through unchanged.
pub fn resolve(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_absolute_paths() {
        let base = "https://my.tado.com/api/v2/";
        assert_eq!(resolve(base, "me"), "https://my.tado.com/api/v2/me");
        assert_eq!(resolve(base, "/homes/1/zones"), "https://my.tado.com/api/v2/homes/1/zones");
        assert_eq!(resolve(base, "https://my.tado.com/api/v1/me"), "https://my.tado.com/api/v1/me");
    }

    #[test]
    fn token_parse_requires_both_tokens() {
        let ok = OAuthToken::parse(r#"{"access_token":"A1","refresh_token":"R1","expires_in":599}"#).unwrap();
        assert_eq!(ok.access_token, "A1");
        assert_eq!(ok.refresh_token, "R1");
        assert!(ok.expires_at.is_some());

        assert!(matches!(
            OAuthToken::parse(r#"{"access_token":"A1"}"#),
            Err(TadoError::Auth(_))
        ));
        assert!(matches!(OAuthToken::parse("not json"), Err(TadoError::Auth(_))));
    }

    #[test]
    fn token_lifetime() {
        let spent = OAuthToken::parse(r#"{"access_token":"A1","refresh_token":"R1","expires_in":0}"#).unwrap();
        assert!(spent.is_expired());

        let fresh = OAuthToken::parse(r#"{"access_token":"A1","refresh_token":"R1","expires_in":600}"#).unwrap();
        assert!(!fresh.is_expired());

        let unknown = OAuthToken::parse(r#"{"access_token":"A1","refresh_token":"R1"}"#).unwrap();
        assert!(!unknown.is_expired());
    }

    #[test]
    fn auth_state_tracks_latest_token() {
        let first = OAuthToken::parse(r#"{"access_token":"A1","refresh_token":"R1"}"#).unwrap();
        let mut state = AuthState::new(first, "https://my.tado.com/");
        assert_eq!(state.headers[AUTHORIZATION], "Bearer A1");
        assert_eq!(state.headers[REFERER], "https://my.tado.com/");

        let second = OAuthToken::parse(r#"{"access_token":"A2","refresh_token":"R2"}"#).unwrap();
        state.replace_token(second);
        assert_eq!(state.headers[AUTHORIZATION], "Bearer A2");
        assert_eq!(state.token.refresh_token, "R2");
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }

    #[test]
    fn only_reads_and_deletes_are_retried() {
        assert!(Method::Get.retries_after_refresh());
        assert!(Method::Delete.retries_after_refresh());
        assert!(!Method::Put.retries_after_refresh());
        assert!(!Method::Post.retries_after_refresh());
    }
}
