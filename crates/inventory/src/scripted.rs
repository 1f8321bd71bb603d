//! Scripted HTTP endpoint for driving [`RestConnector`](crate::RestConnector)
//! over a real socket.
//!
//! Answers each request from a fixed route table and records everything it
//! received, so callers can assert on headers, logouts and mutation calls.
//! One request per connection; unknown targets get a 404.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Canned response for one route.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn no_content() -> Self {
        Self::json(204, "")
    }

    /// Hold the response back for `delay` after the request arrives.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// A request as the endpoint saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string
    pub target: String,
    /// Header names are lowercased
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

struct Route {
    method: String,
    target: String,
    reply: Reply,
}

/// Route table, matched on method and exact target (query included).
#[derive(Default)]
pub struct ScriptedEndpoint {
    routes: Vec<Route>,
}

impl ScriptedEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, method: &str, target: &str, reply: Reply) -> Self {
        self.routes.push(Route {
            method: method.to_string(),
            target: target.to_string(),
            reply,
        });
        self
    }

    /// Bind a loopback port and start answering.
    pub async fn start(self) -> std::io::Result<RunningEndpoint> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let routes = Arc::new(self.routes);
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let accept = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let recorded = recorded.clone();
                tokio::spawn(async move {
                    if let Err(e) = answer(stream, &routes, &recorded).await {
                        debug!(error = %e, "Scripted endpoint connection failed");
                    }
                });
            }
        });

        Ok(RunningEndpoint {
            addr,
            requests,
            accept,
        })
    }
}

/// A started [`ScriptedEndpoint`]. Stops listening when dropped.
pub struct RunningEndpoint {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    accept: JoinHandle<()>,
}

impl RunningEndpoint {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().await.clone()
    }

    /// How many requests hit `method` + `target`.
    pub async fn count(&self, method: &str, target: &str) -> usize {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|r| r.method == method && r.target == target)
            .count()
    }
}

impl Drop for RunningEndpoint {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn answer(
    stream: TcpStream,
    routes: &[Route],
    recorded: &Mutex<Vec<RecordedRequest>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let mut request_line = line.split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();

    let mut headers = Vec::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            break;
        }
        let header = line.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    let length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    reader.read_exact(&mut body).await?;

    let reply = routes
        .iter()
        .find(|route| route.method == method && route.target == target)
        .map(|route| route.reply.clone())
        .unwrap_or_else(|| Reply::json(404, r#"{"error_type":"NOT_FOUND"}"#));

    recorded.lock().await.push(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let mut stream = reader.into_inner();
    let head = if reply.status == 204 {
        "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_string()
    } else {
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            reply.status,
            reason(reply.status),
            reply.body.len()
        )
    };
    stream.write_all(head.as_bytes()).await?;
    if reply.status != 204 {
        stream.write_all(reply.body.as_bytes()).await?;
    }
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Status",
    }
}
