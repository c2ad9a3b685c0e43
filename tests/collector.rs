//! Integration tests for a full collection tick.

mod helpers;

use helpers::{envelope, inbounds, mount_data, mount_login, panel_client, server_status};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xui_exporter::collector::Collector;
use xui_exporter::panel::{AuthError, FetchError, SessionCache};
use xui_exporter::sink::{INBOUND_UP, ONLINE_USERS_COUNT, PANEL_THREADS, XRAY_VERSION};

fn collector(server: &MockServer) -> (Collector, xui_exporter::sink::PanelMetrics) {
    let (client, metrics) = panel_client(server, 0);
    let collector = Collector::new(
        Arc::new(client),
        Arc::new(SessionCache::new()),
        Duration::from_secs(30),
    );
    (collector, metrics)
}

#[tokio::test]
async fn test_tick_publishes_all_three_fetches() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_data(&server, json!(["a", "b"]), "1.8.4", inbounds()).await;
    let (collector, metrics) = collector(&server);

    let report = collector.run_once().await.unwrap();

    assert!(report.is_complete());
    assert_eq!(metrics.gauge_value(ONLINE_USERS_COUNT, &[]), Some(2.0));
    assert_eq!(metrics.gauge_value(XRAY_VERSION, &[("version", "1.8.4")]), Some(184.0));
    assert_eq!(metrics.series(INBOUND_UP).len(), 1);
}

#[tokio::test]
async fn test_failed_login_aborts_the_tick() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/panel/inbound/onlines"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([]))))
        .expect(0)
        .mount(&server)
        .await;
    let (collector, metrics) = collector(&server);

    let err = collector.run_once().await.unwrap_err();

    assert!(matches!(err, AuthError::Status(status) if status.as_u16() == 401));
    assert_eq!(metrics.gauge_value(ONLINE_USERS_COUNT, &[]), None);
    assert!(metrics.series(XRAY_VERSION).is_empty());
}

#[tokio::test]
async fn test_malformed_fetch_does_not_stop_the_others() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/panel/inbound/onlines"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"success\": true, \"obj\": [1, 2"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/server/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(server_status("1.8.4"))))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/panel/api/inbounds/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(inbounds())))
        .expect(1)
        .mount(&server)
        .await;
    let (collector, metrics) = collector(&server);
    metrics.set_gauge(ONLINE_USERS_COUNT, &[], 5.0);

    let report = collector.run_once().await.unwrap();

    assert!(matches!(report.online_users, Err(FetchError::Decode(_))));
    assert!(report.server_status.is_ok());
    assert!(report.inbounds.is_ok());
    assert_eq!(report.failures().len(), 1);
    assert_eq!(report.failures()[0].0, "online_users");
    assert_eq!(metrics.gauge_value(ONLINE_USERS_COUNT, &[]), Some(5.0));
    assert_eq!(metrics.gauge_value(PANEL_THREADS, &[]), Some(9.0));
    assert_eq!(metrics.series(INBOUND_UP).len(), 1);
}

#[tokio::test]
async fn test_consecutive_ticks_reuse_the_session() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_data(&server, json!([]), "1.8.4", inbounds()).await;
    let (collector, _) = collector(&server);

    collector.run_once().await.unwrap();
    collector.run_once().await.unwrap();
}

#[tokio::test]
async fn test_run_loop_stops_on_shutdown() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_data(&server, json!(["a"]), "1.8.4", inbounds()).await;
    let (collector, metrics) = collector(&server);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(collector.run(shutdown_rx));
    for _ in 0..50 {
        if metrics.gauge_value(ONLINE_USERS_COUNT, &[]).is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown_tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("collector did not stop")
        .unwrap();
    assert_eq!(metrics.gauge_value(ONLINE_USERS_COUNT, &[]), Some(1.0));
}
