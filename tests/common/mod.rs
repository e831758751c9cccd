//! Mock Tado endpoints shared by the integration tests.

#![allow(dead_code)]

use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;
use tado_client::{ClientConfig, Home, Session};

pub const HOME_ID: i64 = 42;

pub struct LoginMocks {
    pub token: Mock,
    pub legacy: Mock,
    pub me: Mock,
}

pub fn config(server: &ServerGuard) -> ClientConfig {
    ClientConfig::with_hosts(&server.url(), &server.url())
}

/// Password grant answering with `access`/`refresh`, the v1 cookie call and a `me`
/// listing [`HOME_ID`] as the first home.
pub fn mock_login(server: &mut ServerGuard, access: &str, refresh: &str) -> LoginMocks {
    let token = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::UrlEncoded("grant_type".into(), "password".into()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": access, "refresh_token": refresh, "expires_in": 599}).to_string())
        .create();
    let legacy = server
        .mock("GET", "/api/v1/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_header("set-cookie", "JSESSIONID=legacy-session; Path=/")
        .with_body("{}")
        .create();
    let me = server
        .mock("GET", "/api/v2/me")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"name": "Test", "homes": [{"id": HOME_ID, "name": "Flat"}]}).to_string())
        .create();
    LoginMocks { token, legacy, me }
}

pub fn mock_refresh(server: &mut ServerGuard, old_refresh: &str, access: &str, refresh: &str) -> Mock {
    server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), old_refresh.into()),
            Matcher::UrlEncoded("client_secret".into(), "secret".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"access_token": access, "refresh_token": refresh}).to_string())
        .create()
}

pub fn login_session(config: ClientConfig) -> Session {
    Session::login_with(config, "user", "pass", "secret").expect("login succeeds")
}

pub fn login_home(config: ClientConfig) -> Home {
    Home::new(login_session(config))
}

pub fn json_mock(server: &mut ServerGuard, method: &str, path: &str, body: serde_json::Value) -> Mock {
    server
        .mock(method, path)
        .match_header("authorization", "Bearer A1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create()
}

pub fn home_path(suffix: &str) -> String {
    format!("/api/v2/homes/{}{}", HOME_ID, suffix)
}
