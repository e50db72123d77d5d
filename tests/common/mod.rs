//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, UnixListener, UnixStream};

use tech_web_server::config::parse_config;
use tech_web_server::fastcgi::record::{encode_stream, EndRequest, REQUEST_COMPLETE};
use tech_web_server::fastcgi::{CgiParams, Record, RecordType};
use tech_web_server::lifecycle::{Services, Shutdown};

/// What the fake interpreter sends back for one request.
#[derive(Debug, Clone, Default)]
pub struct FpmReply {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl FpmReply {
    pub fn stdout(body: impl Into<Vec<u8>>) -> Self {
        Self {
            stdout: body.into(),
            stderr: Vec::new(),
        }
    }
}

/// Start a scripted FastCGI responder on a Unix socket.
///
/// The handler sees the decoded parameters and the request body.
pub async fn start_fake_fpm<F>(socket: &Path, handler: F)
where
    F: Fn(CgiParams, Vec<u8>) -> FpmReply + Send + Sync + 'static,
{
    let listener = UnixListener::bind(socket).unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let _ = serve_one(stream, handler.as_ref()).await;
            });
        }
    });
}

async fn serve_one<F>(mut stream: UnixStream, handler: &F) -> std::io::Result<()>
where
    F: Fn(CgiParams, Vec<u8>) -> FpmReply,
{
    let mut params = Vec::new();
    let mut stdin = Vec::new();
    let mut request_id = 1;

    loop {
        let Ok(Some(record)) = Record::read_from(&mut stream).await else {
            return Ok(());
        };
        request_id = record.request_id;
        match record.record_type {
            RecordType::Params => params.extend_from_slice(&record.content),
            RecordType::Stdin if record.content.is_empty() => break,
            RecordType::Stdin => stdin.extend_from_slice(&record.content),
            _ => {}
        }
    }

    let params = CgiParams::decode(&params).unwrap();
    let reply = handler(params, stdin);

    let mut out = Vec::new();
    encode_stream(RecordType::Stdout, request_id, &reply.stdout, &mut out).unwrap();
    if !reply.stderr.is_empty() {
        encode_stream(RecordType::Stderr, request_id, &reply.stderr, &mut out).unwrap();
    }
    let end = EndRequest {
        app_status: 0,
        protocol_status: REQUEST_COMPLETE,
    };
    Record::new(RecordType::EndRequest, request_id, end.encode())
        .encode_into(&mut out)
        .unwrap();

    stream.write_all(&out).await?;
    stream.shutdown().await
}

/// A document root populated with the given files.
pub struct Site {
    pub dir: TempDir,
}

impl Site {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (path, contents) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, contents).unwrap();
        }
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

/// A running plaintext server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub services: Services,
    pub shutdown: Shutdown,
    task: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl TestServer {
    pub async fn start(config_toml: &str) -> Self {
        let config = parse_config(config_toml).unwrap();
        let services = Services::build(config).unwrap();
        let server = services.server();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        let task = tokio::spawn(async move { server.serve(listener, rx).await });

        Self {
            addr,
            services,
            shutdown,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}

/// HTTP client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
