//! End-to-end tests against a live server on a loopback port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tank_arena::network::{ServerError, INVALID_ROUTE_MESSAGE};
use tank_arena::{GameServer, Role, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn start_server() -> (Arc<GameServer>, SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let config = ServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        log_level: 0,
        tank_names: vec!["Alpha".into(), "Bravo".into(), "Charlie".into(), "Delta".into()],
        ..Default::default()
    };
    let server = Arc::new(GameServer::new(config));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };
    (server, addr, handle)
}

async fn connect(addr: SocketAddr, path: &str) -> Client {
    let (ws, _) = connect_async(format!("ws://{}{}", addr, path)).await.unwrap();
    ws
}

/// Next text frame, or `None` once the server hangs up.
async fn next_text(ws: &mut Client) -> Option<String> {
    loop {
        match tokio::time::timeout(WAIT, ws.next()).await.ok()?? {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn test_invalid_path_is_rejected() {
    let (server, addr, _handle) = start_server().await;
    let mut ws = connect(addr, "/pyTanksAPI/spectator").await;

    assert_eq!(next_text(&mut ws).await.as_deref(), Some(INVALID_ROUTE_MESSAGE));
    assert_eq!(next_text(&mut ws).await, None);
    assert_eq!(server.connection_count(), 0);

    server.shutdown();
}

#[tokio::test]
async fn test_player_receives_clean_state() {
    let (server, addr, _handle) = start_server().await;
    let mut ws = connect(addr, "/pyTanksAPI/player").await;

    let text = next_text(&mut ws).await.unwrap();
    let state: serde_json::Value = serde_json::from_str(&text).unwrap();

    let ids = server.registry().ids_of_role(Role::Player);
    assert_eq!(ids.len(), 1);
    assert!(ids[0] < 4);

    // The first broadcast can race the first frame; wait for the tank.
    let mut state = state;
    while state["my_tank"].is_null() {
        state = serde_json::from_str(&next_text(&mut ws).await.unwrap()).unwrap();
    }
    let my_tank = state["my_tank"].as_object().unwrap();
    assert!(!my_tank.contains_key("kills"));
    assert!(!my_tank.contains_key("wins"));
    assert_eq!(my_tank["status"], "alive");

    server.shutdown();
}

#[tokio::test]
async fn test_viewer_receives_full_state() {
    let (server, addr, _handle) = start_server().await;
    let mut viewer = connect(addr, "/pyTanksAPI/viewer").await;
    let _player = connect(addr, "/pyTanksAPI/player").await;

    assert!(wait_for(|| server.role_count(Role::Viewer) == 1).await);

    let mut scored = None;
    for _ in 0..50 {
        let state: serde_json::Value =
            serde_json::from_str(&next_text(&mut viewer).await.unwrap()).unwrap();
        if let Some(tank) = state["tanks"].as_array().and_then(|t| t.first()) {
            scored = Some(tank.clone());
            break;
        }
    }

    let tank = scored.expect("viewer never saw a tank");
    assert_eq!(tank["kills"], 0);
    assert_eq!(tank["wins"], 0);
    assert!(tank["name"].is_string());
    let viewer_id = server.registry().ids_of_role(Role::Viewer)[0];
    assert!((1000..=9999).contains(&viewer_id));

    server.shutdown();
}

#[tokio::test]
async fn test_disconnect_frees_identity() {
    let (server, addr, _handle) = start_server().await;
    let mut ws = connect(addr, "/pyTanksAPI/player").await;
    assert!(wait_for(|| server.connection_count() == 1).await);

    ws.close(None).await.unwrap();
    assert!(wait_for(|| server.connection_count() == 0).await);

    server.shutdown();
}

#[tokio::test]
async fn test_malformed_command_disconnects_player() {
    let (server, addr, _handle) = start_server().await;
    let mut ws = connect(addr, "/pyTanksAPI/player").await;
    assert!(wait_for(|| server.connection_count() == 1).await);

    ws.send(Message::Text("fire everything".to_string())).await.unwrap();
    assert!(wait_for(|| server.connection_count() == 0).await);

    // Drain whatever was queued; the stream must end.
    while next_text(&mut ws).await.is_some() {}

    server.shutdown();
}

#[tokio::test]
async fn test_shutdown_closes_sessions() {
    // Repeated because the scheduler stops on the same signal as the server.
    for _ in 0..5 {
        let (server, addr, handle) = start_server().await;
        let _viewer = connect(addr, "/pyTanksAPI/viewer").await;
        assert!(wait_for(|| server.connection_count() == 1).await);

        server.shutdown();
        let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(server.connection_count(), 0);
    }
}
