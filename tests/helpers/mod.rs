#![allow(dead_code)]
//! Shared fixtures for tests that talk to a fake panel.

use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xui_exporter::panel::client::PanelClientConfig;
use xui_exporter::panel::{PanelClient, PanelFlavor, SessionCookie, SessionToken};
use xui_exporter::sink::PanelMetrics;

pub const SESSION_VALUE: &str = "MTcwMDAwMDAwMHxEdi1CQkFFQ180SUFBUkFCRUFBQV";
pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "s3cret";

/// Wraps a payload in the panel's response envelope.
pub fn envelope(obj: Value) -> Value {
    json!({ "success": true, "msg": "", "obj": obj })
}

pub fn client_config(server: &MockServer, flavor: PanelFlavor, clients_bytes_rows: usize) -> PanelClientConfig {
    PanelClientConfig {
        base_url: server.uri(),
        username: USERNAME.to_string(),
        password: PASSWORD.to_string(),
        flavor,
        session_cookie: None,
        insecure_skip_verify: false,
        request_timeout: Duration::from_secs(5),
        clients_bytes_rows,
    }
}

pub fn panel_client(server: &MockServer, clients_bytes_rows: usize) -> (PanelClient, PanelMetrics) {
    let metrics = PanelMetrics::new().unwrap();
    let client = PanelClient::new(
        client_config(server, PanelFlavor::ThreeXUi, clients_bytes_rows),
        metrics.clone(),
    )
    .unwrap();
    (client, metrics)
}

/// A session that stays valid for the duration of any test.
pub fn token() -> SessionToken {
    SessionToken::new(
        SessionCookie::new("3x-ui", SESSION_VALUE),
        Instant::now() + Duration::from_secs(3600),
    )
}

/// The login response of a 3X-UI panel that accepts the credentials.
pub fn login_ok() -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header(
            "set-cookie",
            format!("3x-ui={}; Path=/; Expires=Thu, 01 Jan 2099 00:00:00 GMT; HttpOnly", SESSION_VALUE).as_str(),
        )
        .set_body_json(json!({ "success": true, "msg": "Login Successfully", "obj": null }))
}

pub async fn mount_login(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(login_ok())
        .expect(expected_calls)
        .mount(server)
        .await;
}

pub fn server_status(version: &str) -> Value {
    json!({
        "cpu": 1.5,
        "mem": { "current": 1024, "total": 4096 },
        "xray": { "state": "running", "errorMsg": "", "version": version },
        "uptime": 86400,
        "appStats": { "threads": 9, "mem": 23456789, "uptime": 3600 }
    })
}

/// One inbound with three clients: uploads 100/50/200, downloads 10/500/20.
pub fn inbounds() -> Value {
    json!([
        {
            "id": 1,
            "remark": "vless-reality",
            "up": 1000,
            "down": 2000,
            "protocol": "vless",
            "clientStats": [
                { "id": 1, "inboundId": 1, "email": "alice@example.com", "up": 100, "down": 10 },
                { "id": 2, "inboundId": 1, "email": "bob@example.com", "up": 50, "down": 500 },
                { "id": 3, "inboundId": 1, "email": "carol@example.com", "up": 200, "down": 20 }
            ]
        }
    ])
}

/// Mounts healthy responses for all three data calls of a 3X-UI panel.
pub async fn mount_data(server: &MockServer, onlines: Value, version: &str, inbounds: Value) {
    Mock::given(method("POST"))
        .and(path("/panel/inbound/onlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(onlines)))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/server/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(server_status(version))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/panel/api/inbounds/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(inbounds)))
        .mount(server)
        .await;
}

/// Ids of every published series of a client gauge.
pub fn published_ids(metrics: &PanelMetrics, name: &str) -> Vec<String> {
    let mut ids: Vec<String> = metrics
        .series(name)
        .into_iter()
        .filter_map(|(labels, _)| {
            labels
                .into_iter()
                .find(|(key, _)| key == "id")
                .map(|(_, value)| value)
        })
        .collect();
    ids.sort();
    ids
}
