//! Mock HTTP server for the identity provider and mail API
//!
//! Accepts one request per connection, records it, and answers with the
//! response configured for its path (or the default response).
//!
//! # Example
//!
//! ```rust,no_run
//! use support::mock_http::MockHttpServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = MockHttpServer::builder()
//!     .with_response("/tenant/oauth2/v2.0/token", 200, r#"{"access_token":"abc"}"#)
//!     .with_default_response(202, "")
//!     .build()
//!     .await?;
//!
//! // Point the config at server.url()
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::RwLock,
    task::JoinHandle,
    time::timeout,
};

/// A request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

#[derive(Debug, Clone)]
struct MockResponse {
    status: u16,
    body: String,
}

impl MockResponse {
    fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        format!(
            "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            self.status,
            self.body.len(),
            self.body
        )
        .into_bytes()
    }
}

#[derive(Debug, Clone)]
struct MockServerConfig {
    routes: HashMap<String, MockResponse>,
    default: MockResponse,
}

/// Mock HTTP server for testing
pub struct MockHttpServer {
    addr: SocketAddr,
    requests: Arc<RwLock<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockHttpServer {
    #[must_use]
    pub fn builder() -> MockHttpServerBuilder {
        MockHttpServerBuilder {
            config: MockServerConfig {
                routes: HashMap::new(),
                default: MockResponse::new(404, r#"{"error":"not_found"}"#),
            },
        }
    }

    #[must_use]
    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL, without a trailing slash
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request received so far, in arrival order
    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.read().await.clone()
    }

    /// Requests whose path ends with `suffix`
    pub async fn requests_to(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests
            .read()
            .await
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .cloned()
            .collect()
    }

    async fn handle_client(
        stream: TcpStream,
        config: Arc<MockServerConfig>,
        requests: Arc<RwLock<Vec<RecordedRequest>>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        let mut request_line = String::new();
        if timeout(Duration::from_secs(10), reader.read_line(&mut request_line)).await?? == 0 {
            return Ok(());
        }

        let mut parts = request_line.split_whitespace();
        let method = parts.next().unwrap_or_default().to_string();
        let path = parts.next().unwrap_or_default().to_string();

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                break;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
            }
        }

        let length = headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await?;

        tracing::debug!("Mock server received: {method} {path}");

        let response = config.routes.get(&path).unwrap_or(&config.default).clone();

        requests.write().await.push(RecordedRequest {
            method,
            path,
            headers,
            body,
        });

        writer.write_all(&response.to_bytes()).await?;
        writer.flush().await?;
        writer.shutdown().await?;

        Ok(())
    }
}

impl Drop for MockHttpServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Builder for configuring a `MockHttpServer`
pub struct MockHttpServerBuilder {
    config: MockServerConfig,
}

impl MockHttpServerBuilder {
    /// Answer requests for exactly `path` with `status` and `body`
    #[must_use]
    pub fn with_response(mut self, path: &str, status: u16, body: impl Into<String>) -> Self {
        self.config
            .routes
            .insert(path.to_string(), MockResponse::new(status, body));
        self
    }

    /// Answer every other path with `status` and `body`
    #[must_use]
    pub fn with_default_response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.config.default = MockResponse::new(status, body);
        self
    }

    /// Bind to a random local port and start serving
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to a port
    pub async fn build(self) -> Result<MockHttpServer, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let config = Arc::new(self.config);
        let requests = Arc::new(RwLock::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = Arc::clone(&config);
                let requests = Arc::clone(&recorded);
                tokio::spawn(async move {
                    if let Err(e) = MockHttpServer::handle_client(stream, config, requests).await {
                        tracing::debug!("Mock server connection error: {e}");
                    }
                });
            }
        });

        Ok(MockHttpServer {
            addr,
            requests,
            handle,
        })
    }
}
