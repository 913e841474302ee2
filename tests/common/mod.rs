//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use post_ingest::config::{IngestConfig, TransportMode};
use post_ingest::gateway::params::encode_pair;
use post_ingest::gateway::record::{Record, RecordCodec, RecordType, Role, MAX_CONTENT_LEN};
use post_ingest::lifecycle::startup::prepare_in;
use post_ingest::net::BoundAddress;
use post_ingest::{IngestServer, Shutdown};

/// A server running on an ephemeral port or a scratch socket.
pub struct TestServer {
    pub address: BoundAddress,
    mode: TransportMode,
    pub output: PathBuf,
    shutdown: Shutdown,
    handle: JoinHandle<()>,
    scratch: TempDir,
}

impl TestServer {
    pub async fn start(mode: TransportMode) -> Self {
        let scratch = tempfile::tempdir().unwrap();

        let mut config = IngestConfig::default();
        config.listener.mode = mode;
        config.listener.address = match mode {
            TransportMode::Gateway => "ingest.sock".to_string(),
            _ => "127.0.0.1:0".to_string(),
        };
        config.output.directory = "posts".to_string();
        config.lifecycle.shutdown_grace_secs = 5;

        if mode == TransportMode::Tls {
            write_self_signed(scratch.path());
            // Relative on purpose: credentials resolve against the origin.
            config.listener.tls.cert_path = "cert.pem".to_string();
            config.listener.tls.key_path = "key.pem".to_string();
        }

        let prepared = prepare_in(&config, scratch.path()).await.unwrap();
        let address = prepared.listener.local_addr();
        let output = prepared.store.root().to_path_buf();

        let server = IngestServer::new(&config, prepared.store);
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(server.run(prepared.listener, shutdown.subscribe()));

        Self {
            address,
            mode,
            output,
            shutdown,
            handle,
            scratch,
        }
    }

    pub fn url(&self, path: &str) -> String {
        match &self.address {
            BoundAddress::Tcp(addr) => {
                let scheme = if self.mode == TransportMode::Tls {
                    "https"
                } else {
                    "http"
                };
                format!("{}://{}{}", scheme, addr, path)
            }
            BoundAddress::Unix(path) => panic!("no URL for socket {}", path.display()),
        }
    }

    pub fn socket_path(&self) -> &Path {
        match &self.address {
            BoundAddress::Unix(path) => path,
            BoundAddress::Tcp(addr) => panic!("no socket path for {}", addr),
        }
    }

    /// Names of stored files, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.output)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn read(&self, name: &str) -> Vec<u8> {
        std::fs::read(self.output.join(name)).unwrap()
    }

    /// Trigger shutdown and wait for the server to finish draining.
    ///
    /// The scratch directory is handed back so it outlives the server.
    pub async fn stop(self) -> (BoundAddress, TempDir) {
        self.shutdown.trigger();
        self.handle.await.unwrap();
        (self.address, self.scratch)
    }
}

/// Write a self-signed `cert.pem`/`key.pem` pair for localhost into `dir`.
pub fn write_self_signed(dir: &Path) {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    std::fs::write(dir.join("cert.pem"), cert.pem()).unwrap();
    std::fs::write(dir.join("key.pem"), key_pair.serialize_pem()).unwrap();
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    check()
}

/// A response read back from the gateway.
#[derive(Debug)]
pub struct GatewayResponse {
    pub head: String,
    pub body: Vec<u8>,
    pub protocol_status: u8,
}

impl GatewayResponse {
    pub fn status(&self) -> u16 {
        self.head
            .lines()
            .find_map(|line| line.strip_prefix("Status: "))
            .and_then(|rest| rest.split(' ').next())
            .and_then(|code| code.parse().ok())
            .unwrap()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(": ")?;
            key.eq_ignore_ascii_case(name).then_some(value)
        })
    }
}

/// Minimal FastCGI front-end for driving the responder.
pub struct GatewayClient {
    framed: Framed<UnixStream, RecordCodec>,
}

impl GatewayClient {
    pub async fn connect(path: &Path) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        Self {
            framed: Framed::new(stream, RecordCodec),
        }
    }

    pub async fn send(&mut self, record: Record) {
        self.framed.send(record).await.unwrap();
    }

    pub async fn recv(&mut self) -> Option<Record> {
        self.framed.next().await.map(Result::unwrap)
    }

    pub async fn begin(&mut self, id: u16, role: Role, keep_conn: bool) {
        self.send(Record::begin_request(id, role, keep_conn)).await;
    }

    pub async fn params(&mut self, id: u16, pairs: &[(&str, &str)]) {
        let mut encoded = BytesMut::new();
        for (name, value) in pairs {
            encode_pair(&mut encoded, name.as_bytes(), value.as_bytes());
        }
        self.send(Record::new(RecordType::Params, id, encoded.freeze()))
            .await;
        self.send(Record::new(RecordType::Params, id, Vec::new())).await;
    }

    /// Send body bytes without terminating the stream.
    pub async fn stdin_chunk(&mut self, id: u16, data: &[u8]) {
        for piece in data.chunks(MAX_CONTENT_LEN) {
            self.send(Record::new(RecordType::Stdin, id, piece.to_vec()))
                .await;
        }
    }

    pub async fn stdin(&mut self, id: u16, data: &[u8]) {
        self.stdin_chunk(id, data).await;
        self.send(Record::new(RecordType::Stdin, id, Vec::new())).await;
    }

    /// Full responder request with the usual CGI variables.
    pub async fn request(
        &mut self,
        id: u16,
        method: &str,
        uri: &str,
        body: &[u8],
        keep_conn: bool,
    ) -> GatewayResponse {
        let length = body.len().to_string();
        self.begin(id, Role::Responder, keep_conn).await;
        self.params(
            id,
            &[
                ("REQUEST_METHOD", method),
                ("REQUEST_URI", uri),
                ("SERVER_PROTOCOL", "HTTP/1.1"),
                ("HTTP_HOST", "ingest.test"),
                ("HTTP_USER_AGENT", "gateway-test"),
                ("CONTENT_LENGTH", &length),
                ("REMOTE_ADDR", "192.0.2.7"),
                ("REMOTE_PORT", "4000"),
            ],
        )
        .await;
        self.stdin(id, body).await;
        self.read_response(id).await
    }

    /// Collect STDOUT for `id` until its END_REQUEST.
    pub async fn read_response(&mut self, id: u16) -> GatewayResponse {
        let mut stdout = Vec::new();
        loop {
            let record = self.recv().await.expect("connection closed before END_REQUEST");
            assert_eq!(record.request_id, id);
            match record.kind {
                RecordType::Stdout => stdout.extend_from_slice(&record.content),
                RecordType::EndRequest => {
                    let split = stdout
                        .windows(4)
                        .position(|w| w == b"\r\n\r\n")
                        .unwrap_or(stdout.len());
                    let head = String::from_utf8(stdout[..split].to_vec()).unwrap();
                    let body = stdout.get(split + 4..).unwrap_or_default().to_vec();
                    return GatewayResponse {
                        head,
                        body,
                        protocol_status: record.content[4],
                    };
                }
                other => panic!("unexpected record {:?}", other),
            }
        }
    }
}
