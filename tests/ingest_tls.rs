//! End-to-end tests over HTTPS.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::TestServer;
use post_ingest::config::TransportMode;
use post_ingest::net::BoundAddress;

fn https_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .build()
        .unwrap()
}

#[tokio::test]
async fn post_over_https_negotiates_h2() {
    let server = TestServer::start(TransportMode::Tls).await;

    let response = https_client()
        .post(server.url("/secure/upload"))
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.version(), reqwest::Version::HTTP_2);
    assert_eq!(response.text().await.unwrap(), "5");

    let files = server.files();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with("127.0.0.1:"), "{}", files[0]);
    assert!(files[0].ends_with("_secure_upload_000000"), "{}", files[0]);
    assert_eq!(server.read(&files[0]), b"hello");

    server.stop().await;
}

#[tokio::test]
async fn http1_over_tls_is_served() {
    let server = TestServer::start(TransportMode::Tls).await;

    let response = reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .http1_only()
        .build()
        .unwrap()
        .post(server.url("/one"))
        .body(vec![1u8; 70_000])
        .send()
        .await
        .unwrap();

    assert_eq!(response.version(), reqwest::Version::HTTP_11);
    assert_eq!(response.text().await.unwrap(), "70000");
    let files = server.files();
    assert_eq!(server.read(&files[0]), vec![1u8; 70_000]);

    server.stop().await;
}

#[tokio::test]
async fn failed_handshake_leaves_listener_serving() {
    let server = TestServer::start(TransportMode::Tls).await;
    let BoundAddress::Tcp(addr) = server.address.clone() else {
        panic!("expected a TCP address");
    };

    // Plaintext HTTP against the TLS port is not a ClientHello.
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(b"POST /plain HTTP/1.1\r\nHost: test\r\nContent-Length: 3\r\n\r\nabc")
        .await
        .unwrap();
    let mut discard = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut discard)).await;
    drop(stream);

    let response = https_client()
        .post(server.url("/after"))
        .body("still here")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "10");

    let files = server.files();
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("_after_000000"), "{}", files[0]);

    server.stop().await;
}
