//! Shared scaffolding: boot the whole hub on ephemeral ports.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use robohub_server::bus::EventBus;
use robohub_server::db::MemoryStore;
use robohub_server::http;
use robohub_server::manager::{RegisteringRobot, RobotManager};
use robohub_server::robot::registry;
use robohub_server::sse::EventsGateway;
use robohub_server::state::AppState;
use robohub_server::{tcp, terminal};

pub const OPERATOR_USER: &str = "admin";
pub const OPERATOR_PASSWORD: &str = "test-password";

pub struct TestHub {
    pub http_addr: SocketAddr,
    pub tcp_addr: SocketAddr,
    pub terminal_addr: SocketAddr,
    pub bus: Arc<EventBus>,
    pub manager: Arc<RobotManager>,
    pub gateway: Arc<EventsGateway>,
    pub token: CancellationToken,
    jwt_secret: Vec<u8>,
}

impl TestHub {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.http_addr)
    }

    pub fn operator_token(&self) -> String {
        robohub_server::http::auth::issue_session_token(&self.jwt_secret, OPERATOR_USER)
            .expect("token issuance")
    }

    /// Mirror the binary's shutdown sequence.
    pub fn shutdown(&self) {
        self.token.cancel();
        self.bus.close();
        self.gateway.shutdown();
    }

    /// Wait for the pending admission to appear and return it.
    pub async fn pending_admission(&self) -> RegisteringRobot {
        for _ in 0..200 {
            if let Some(reg) = self.manager.get_registering_robots().pop() {
                return reg;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("no pending admission appeared");
    }

    /// Operator accept/reject over the REST surface.
    pub async fn decide(&self, reg: &RegisteringRobot, accept: bool) {
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{}/robot/register", self.base_url()))
            .bearer_auth(self.operator_token())
            .json(&serde_json::json!({
                "registering_robot": reg,
                "accept": if accept { "yes" } else { "no" },
            }))
            .send()
            .await
            .expect("decision request");
        assert!(response.status().is_success());
    }
}

pub async fn start_hub() -> TestHub {
    let token = CancellationToken::new();
    let bus = Arc::new(EventBus::new(64));
    let store = MemoryStore::shared();
    let registry = registry::builtin().expect("builtin registry");
    let manager = Arc::new(RobotManager::new(
        Arc::clone(&bus),
        Arc::clone(&store),
        registry,
        token.clone(),
    ));
    let gateway = Arc::new(EventsGateway::new(Arc::clone(&bus)));
    let jwt_secret = vec![7u8; 32];

    let state = AppState {
        manager: Arc::clone(&manager),
        bus: Arc::clone(&bus),
        gateway: Arc::clone(&gateway),
        store,
        jwt_secret: Arc::new(jwt_secret.clone()),
        operator_user: OPERATOR_USER.to_string(),
        operator_password: OPERATOR_PASSWORD.to_string(),
    };

    let http_listener = TcpListener::bind("127.0.0.1:0").await.expect("http bind");
    let http_addr = http_listener.local_addr().expect("http addr");
    let app = http::build_router(state);
    let http_token = token.clone();
    tokio::spawn(async move {
        let _ = axum::serve(http_listener, app)
            .with_graceful_shutdown(http_token.cancelled_owned())
            .await;
    });

    let tcp_listener = TcpListener::bind("127.0.0.1:0").await.expect("tcp bind");
    let tcp_addr = tcp_listener.local_addr().expect("tcp addr");
    tokio::spawn(tcp::serve(tcp_listener, Arc::clone(&manager), token.clone()));

    let terminal_listener = TcpListener::bind("127.0.0.1:0").await.expect("terminal bind");
    let terminal_addr = terminal_listener.local_addr().expect("terminal addr");
    tokio::spawn(terminal::serve(
        terminal_listener,
        Arc::clone(&manager),
        Arc::clone(&bus),
        token.clone(),
    ));

    TestHub {
        http_addr,
        tcp_addr,
        terminal_addr,
        bus,
        manager,
        gateway,
        token,
        jwt_secret,
    }
}

/// A robot-side TCP session speaking the line protocol.
pub struct RobotClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl RobotClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("robot connect");
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    pub async fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("robot write");
    }

    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("robot read timed out")
            .expect("robot read");
        assert!(read > 0, "connection closed while expecting a line");
        line.trim_end().to_string()
    }
}
