//! Shared harness for relay and cluster integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use ss_cluster::config::{FailurePolicy, ListenerConfig, RelayConfig};
use ss_cluster::health::HealthTracker;
use ss_cluster::load_balancer::{BackendDescriptor, BackendRegistry};
use ss_cluster::net::{ConnectionRelay, ConnectionTracker, Listener};
use ss_cluster::Shutdown;

/// Start a backend that greets every connection with `tag\n`, then echoes.
/// Returns its address and a count of accepted connections.
pub async fn start_tagged_backend(tag: &'static str) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                if writer.write_all(format!("{tag}\n").as_bytes()).await.is_err() {
                    return;
                }
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    (addr, accepted)
}

/// Start a backend that resets every connection shortly after accepting it.
/// The delay lets the relay's dial complete first, so the reset lands on an
/// established relay rather than on the connect.
pub async fn start_resetting_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                #[allow(deprecated)]
                let _ = socket.set_linger(Some(Duration::ZERO));
                drop(socket);
            });
        }
    });

    addr
}

/// Start a backend that accepts connections and then never reads, writes or
/// closes them. Returns its address and a count of accepted connections.
pub async fn start_idle_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            held.push(socket);
        }
    });

    (addr, accepted)
}

/// A localhost port nothing is listening on.
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Descriptor whose relay address is `relay`.
pub fn descriptor(index: usize, relay: SocketAddr, cooldown: Duration) -> BackendDescriptor {
    BackendDescriptor {
        index,
        server_addr: "198.51.100.1".into(),
        server_port: 8388,
        local_addr: relay.ip().to_string(),
        local_port: relay.port(),
        method: "aes-256-gcm".into(),
        password: "secret".into(),
        timeout_secs: 600,
        cooldown,
    }
}

/// Descriptor whose relay address refuses connections.
pub fn dead_descriptor(index: usize, cooldown: Duration) -> BackendDescriptor {
    let addr: SocketAddr = format!("127.0.0.1:{}", unused_port()).parse().unwrap();
    descriptor(index, addr, cooldown)
}

/// A relay running in the background over a fixed backend list.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub health: Arc<HealthTracker>,
    pub connections: ConnectionTracker,
    pub shutdown: Shutdown,
    pub task: JoinHandle<()>,
}

impl TestRelay {
    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Options for `spawn_relay`.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    pub policy: FailurePolicy,
    pub retry_on_dial_failure: bool,
    pub max_connections: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::DialOnly,
            retry_on_dial_failure: false,
            max_connections: 1_000,
        }
    }
}

pub async fn spawn_relay(backends: Vec<BackendDescriptor>, options: RelayOptions) -> TestRelay {
    let registry = Arc::new(BackendRegistry::new(backends).unwrap());
    let health = Arc::new(HealthTracker::new(&registry, options.policy));

    let listener = Listener::bind(&ListenerConfig {
        bind_address: "127.0.0.1:0".into(),
        max_connections: options.max_connections,
        drain_timeout_secs: 1,
    })
    .await
    .unwrap();

    let relay_config = RelayConfig {
        connect_timeout_ms: 1_000,
        retry_on_dial_failure: options.retry_on_dial_failure,
    };
    let relay = ConnectionRelay::new(listener, Arc::clone(&registry), Arc::clone(&health), &relay_config)
        .with_drain_timeout(Duration::from_secs(1));
    let addr = relay.local_addr().unwrap();
    let connections = relay.connections();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let task = tokio::spawn(async move {
        relay.run(receiver).await.unwrap();
    });

    TestRelay {
        addr,
        registry,
        health,
        connections,
        shutdown,
        task,
    }
}

/// Connect through `addr` and read the backend greeting.
/// `None` means the connection was closed without one.
pub async fn fetch_tag(addr: SocketAddr) -> Option<String> {
    let stream = TcpStream::connect(addr).await.unwrap();
    read_tag(stream).await.map(|(tag, _)| tag)
}

/// Read the greeting line and hand the connection back.
pub async fn read_tag(stream: TcpStream) -> Option<(String, BufReader<TcpStream>)> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match tokio::time::timeout(Duration::from_secs(3), reader.read_line(&mut line)).await {
        Ok(Ok(n)) if n > 0 => Some((line.trim_end().to_string(), reader)),
        _ => None,
    }
}

/// Poll `check` until it holds or `limit` passes.
pub async fn eventually<F: Fn() -> bool>(limit: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
