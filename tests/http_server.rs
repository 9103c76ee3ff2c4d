//! The demo HTTP server as hosted by a worker.

use std::time::Duration;

use reqwest::header::CONNECTION;
use reqwest::StatusCode;
use tokio::sync::mpsc;

use graceful_cluster::config::ServerConfig;
use graceful_cluster::http::HttpServer;
use graceful_cluster::ipc::WorkerMessage;
use graceful_cluster::{GracefulFlag, ServerResource, WorkerContext};

fn local_config() -> ServerConfig {
    ServerConfig {
        bind_address: "127.0.0.1:0".into(),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn serves_until_draining_then_refuses_keep_alive() {
    let (outbox, mut to_coordinator) = mpsc::unbounded_channel();
    let flag = GracefulFlag::new();
    let ctx = WorkerContext::new(4242, outbox, flag.clone());

    let server = HttpServer::bind(&local_config(), ctx).unwrap();
    let addr = server.local_addr();
    let resource = server.spawn();
    let client = reqwest::Client::new();

    let res = client.get(format!("http://{}/", addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get(CONNECTION).is_none());
    assert!(res.text().await.unwrap().contains("4242"));

    let res = client.post(format!("http://{}/restart", addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    assert_eq!(
        to_coordinator.recv().await,
        Some(WorkerMessage::ConfirmRestart { pid: 4242 })
    );

    flag.set();
    let res = client.get(format!("http://{}/", addr)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers().get(CONNECTION).unwrap(), "close");

    resource.close();
    tokio::time::timeout(Duration::from_secs(5), resource.closed())
        .await
        .expect("server should stop once idle connections are closed");
    assert!(client.get(format!("http://{}/", addr)).send().await.is_err());
}

#[tokio::test]
async fn counts_open_connections() {
    let (outbox, _rx) = mpsc::unbounded_channel();
    let ctx = WorkerContext::new(1, outbox, GracefulFlag::new());
    let server = HttpServer::bind(&local_config(), ctx).unwrap();
    let addr = server.local_addr();
    let resource = server.spawn();
    assert_eq!(resource.connection_count(), 0);

    let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut waited = Duration::ZERO;
    while resource.connection_count() == 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(resource.connection_count(), 1);

    drop(stream);
    while resource.connection_count() != 0 && waited < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
        waited += Duration::from_millis(10);
    }
    assert_eq!(resource.connection_count(), 0);
}

#[tokio::test]
async fn rejects_bad_bind_address() {
    let (outbox, _rx) = mpsc::unbounded_channel();
    let ctx = WorkerContext::new(1, outbox, GracefulFlag::new());
    let config = ServerConfig {
        bind_address: "not-an-address".into(),
        ..ServerConfig::default()
    };
    assert!(HttpServer::bind(&config, ctx).is_err());
}
