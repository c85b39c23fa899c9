use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ironfly_network::types::{PortEnvelope, PortsEnvelope};
use ironfly_network::{
    DhcpOption, HttpNetworkClient, NetworkClient, NetworkClientError, NetworkConfig, NetworkPort,
    PortBody, PortFilter,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Clone, Default)]
struct FakeController {
    ports: Arc<Mutex<Vec<NetworkPort>>>,
    tokens: Arc<Mutex<Vec<Option<String>>>>,
}

async fn create_port(
    State(state): State<FakeController>,
    headers: axum::http::HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.tokens.lock().unwrap().push(
        headers
            .get("X-Auth-Token")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    let mut ports = state.ports.lock().unwrap();
    let port = NetworkPort {
        id: format!("port-{}", ports.len() + 1),
        network_id: body["port"]["network_id"].as_str().unwrap_or_default().to_string(),
        mac_address: body["port"]["mac_address"].as_str().unwrap_or_default().to_string(),
        ..Default::default()
    };
    ports.push(port.clone());
    (StatusCode::CREATED, Json(json!({ "port": port })))
}

async fn list_ports(
    State(state): State<FakeController>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<PortsEnvelope> {
    let ports = state.ports.lock().unwrap();
    let filtered = ports
        .iter()
        .filter(|p| query.get("network_id").map_or(true, |n| &p.network_id == n))
        .cloned()
        .collect();
    Json(PortsEnvelope { ports: filtered })
}

async fn show_port(
    State(state): State<FakeController>,
    Path(id): Path<String>,
) -> Result<Json<PortEnvelope<NetworkPort>>, StatusCode> {
    let ports = state.ports.lock().unwrap();
    ports
        .iter()
        .find(|p| p.id == id)
        .cloned()
        .map(|port| Json(PortEnvelope { port }))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_port(
    State(state): State<FakeController>,
    Path(id): Path<String>,
    Json(body): Json<PortEnvelope<PortBody>>,
) -> Result<Json<PortEnvelope<NetworkPort>>, StatusCode> {
    let mut ports = state.ports.lock().unwrap();
    let port = ports.iter_mut().find(|p| p.id == id).ok_or(StatusCode::NOT_FOUND)?;
    if let Some(opts) = body.port.extra_dhcp_opts {
        port.extra_dhcp_opts = opts;
    }
    Ok(Json(PortEnvelope { port: port.clone() }))
}

async fn delete_port(State(state): State<FakeController>, Path(id): Path<String>) -> StatusCode {
    let mut ports = state.ports.lock().unwrap();
    let before = ports.len();
    ports.retain(|p| p.id != id);
    if ports.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn spawn_controller() -> (String, FakeController) {
    let state = FakeController::default();
    let app = Router::new()
        .route("/v2.0/ports", post(create_port).get(list_ports))
        .route(
            "/v2.0/ports/{id}",
            get(show_port).put(update_port).delete(delete_port),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

fn create_body(network: &str, mac: &str) -> PortBody {
    PortBody {
        network_id: Some(network.to_string()),
        mac_address: Some(mac.to_string()),
        admin_state_up: Some(true),
        ..Default::default()
    }
}

#[tokio::test]
async fn port_lifecycle_over_http() {
    let (url, _state) = spawn_controller().await;
    let client = HttpNetworkClient::new(&NetworkConfig::default().with_url(url)).unwrap();

    let created = client
        .create_port(&create_body("net-1", "52:54:00:00:00:01"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(created.id, "port-1");
    client
        .create_port(&create_body("net-2", "52:54:00:00:00:02"))
        .await
        .unwrap();

    let on_net1 = client.list_ports(&PortFilter::network("net-1")).await.unwrap();
    assert_eq!(on_net1.len(), 1);
    assert_eq!(on_net1[0].mac_address, "52:54:00:00:00:01");

    let updated = client
        .update_port(
            "port-1",
            &PortBody::dhcp_opts(vec![DhcpOption::new("bootfile-name", "pxelinux.0")]),
        )
        .await
        .unwrap();
    assert_eq!(updated.extra_dhcp_opts.len(), 1);
    assert_eq!(client.show_port("port-1").await.unwrap().extra_dhcp_opts.len(), 1);

    client.delete_port("port-1").await.unwrap();
    assert!(matches!(
        client.show_port("port-1").await,
        Err(NetworkClientError::NotFound(_))
    ));
    assert!(matches!(
        client.delete_port("port-1").await,
        Err(NetworkClientError::NotFound(_))
    ));
}

#[tokio::test]
async fn token_auth_sends_header() {
    let (url, state) = spawn_controller().await;
    let mut config = NetworkConfig::default().with_url(url);
    config.auth_strategy = ironfly_network::AuthStrategy::Token;
    config.auth_token = Some("s3cret".to_string());
    let client = HttpNetworkClient::new(&config).unwrap();

    client
        .create_port(&create_body("net-1", "52:54:00:00:00:01"))
        .await
        .unwrap();
    assert_eq!(state.tokens.lock().unwrap()[0].as_deref(), Some("s3cret"));
}

#[tokio::test]
async fn unreachable_controller_is_connection_failure() {
    // bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = NetworkConfig::default().with_url(format!("http://{}", addr));
    config.retries = 1;
    let client = HttpNetworkClient::new(&config).unwrap();
    assert!(matches!(
        client.list_ports(&PortFilter::default()).await,
        Err(NetworkClientError::ConnectionFailed(_))
    ));
}

/// Answers too late for the client and counts how many requests arrived.
async fn slow_reply(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    StatusCode::NO_CONTENT
}

async fn spawn_slow_controller() -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/v2.0/ports", post(slow_reply).get(slow_reply))
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), hits)
}

#[tokio::test]
async fn timed_out_create_is_not_resent() {
    let (url, hits) = spawn_slow_controller().await;
    let mut config = NetworkConfig::default().with_url(url);
    config.url_timeout_secs = 1;
    config.retries = 1;
    let client = HttpNetworkClient::new(&config).unwrap();

    assert!(matches!(
        client.create_port(&create_body("net-1", "52:54:00:00:00:01")).await,
        Err(NetworkClientError::ConnectionFailed(_))
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // listing is safe to repeat
    assert!(client.list_ports(&PortFilter::default()).await.is_err());
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}
