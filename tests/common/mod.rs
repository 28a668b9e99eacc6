#![allow(dead_code)]

use marinedb::connection::config::MIN_BCRYPT_COST;
use marinedb::storage::{MemoryGateway, PersistenceGateway, SharedStore};
use marinedb::{
    ClientConfig, ClientSession, MeleeWeapon, Server, ServerConfig, ServerHandle, SpaceMarine,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const PASSWORD: &str = "secret_1";

pub struct TestServer {
    pub handle: ServerHandle,
    pub store: Arc<SharedStore>,
    pub gateway: Arc<MemoryGateway>,
}

impl TestServer {
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }
}

pub fn server_config(port: u16) -> ServerConfig {
    ServerConfig::new()
        .host("127.0.0.1")
        .port(port)
        .workers(4)
        .tick_wait(Duration::from_millis(10))
        .bcrypt_cost(MIN_BCRYPT_COST)
}

/// Starts a server with an empty store on an ephemeral port.
pub async fn start_server() -> TestServer {
    let store = Arc::new(SharedStore::new());
    let gateway = Arc::new(MemoryGateway::with_cost(MIN_BCRYPT_COST));
    start_with(0, store, gateway).await
}

/// Starts a server on `port` over existing state.
pub async fn start_with(
    port: u16,
    store: Arc<SharedStore>,
    gateway: Arc<MemoryGateway>,
) -> TestServer {
    let server = Server::bind(server_config(port)).await.unwrap();
    let dyn_gateway: Arc<dyn PersistenceGateway> = gateway.clone();
    let handle = server.start(Arc::clone(&store), dyn_gateway).unwrap();
    TestServer {
        handle,
        store,
        gateway,
    }
}

pub fn client_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new("127.0.0.1", addr.port()).retry_tick(Duration::from_millis(10))
}

pub async fn connect(addr: SocketAddr) -> ClientSession {
    ClientSession::connect(client_config(addr)).await.unwrap()
}

/// Connects and registers `login`.
pub async fn user(addr: SocketAddr, login: &str) -> ClientSession {
    let mut session = connect(addr).await;
    session.register(login, PASSWORD).await.unwrap();
    session
}

pub fn marine(name: &str, height: i64) -> SpaceMarine {
    SpaceMarine::new(name, height, MeleeWeapon::ChainSword)
}
