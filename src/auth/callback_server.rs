//! OAuth2 redirect listener
//!
//! A short-lived local HTTP server that waits for the browser to be
//! redirected back with the authorization code. Stray requests (favicons,
//! other paths, oversized or slow clients) are answered and ignored; the
//! first well-formed callback is handed to the caller together with its
//! still-open connection so the browser only gets the confirmation page
//! once the token is safely stored.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use url::Url;
use crate::Result;
use crate::config::CallbackConfig;
use crate::error::Error;

const READ_CHUNK: usize = 4096;

/// Page shown when the callback could not be turned into a token
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>SaferViewer | Authorization Failed</title>
</head>
<body style="font-family: -apple-system, system-ui, sans-serif; text-align: center; margin-top: 20vh;">
    <h1>Authorization Failed</h1>
    <p>SaferViewer could not complete the sign-in.<br>Check /tmp/SaferViewer.log and try again.</p>
</body>
</html>"#;

/// Query parameters the authorization server appended to the redirect
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorizationCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// What an inbound request turned out to be
#[derive(Debug, PartialEq)]
enum Inbound {
    Callback(AuthorizationCallback),
    Reject(&'static str),
}

/// Outcome of reading a request head off the socket
enum RequestHead {
    Complete(String),
    TooLarge,
    Closed,
}

/// The accepted callback, with the browser still waiting for an answer
pub struct PendingCallback {
    stream: TcpStream,
    code: String,
    callback: AuthorizationCallback,
    write_timeout: Duration,
}

impl PendingCallback {
    /// Authorization code carried by the redirect
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn callback(&self) -> &AuthorizationCallback {
        &self.callback
    }

    /// Answer 200 with the confirmation page
    pub async fn respond_success(mut self, body: &str) -> Result<()> {
        write_response(&mut self.stream, "200 OK", body, self.write_timeout).await
    }

    /// Answer 500 with the failure page
    pub async fn respond_failure(mut self) -> Result<()> {
        write_response(&mut self.stream, "500 Internal Server Error", ERROR_HTML, self.write_timeout).await
    }
}

/// Local listener catching the authorization redirect
pub struct CallbackServer {
    listener: TcpListener,
    config: CallbackConfig,
}

impl CallbackServer {
    /// Bind the listener on the configured loopback address
    pub async fn bind(config: &CallbackConfig) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).await
            .map_err(|e| Error::OAuth(format!("Failed to start callback server on {}: {}", addr, e)))?;

        tracing::info!("Callback server listening on {}", addr);

        Ok(Self {
            listener,
            config: config.clone(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Redirect URI announced to the authorization server
    ///
    /// Uses the bound port, so an ephemeral port (0) works too. The root
    /// route is written without a trailing slash to match the URI
    /// registered for desktop clients.
    pub fn redirect_uri(&self) -> Result<String> {
        let port = self.local_addr()?.port();
        let path = if self.config.path == "/" { "" } else { self.config.path.as_str() };
        Ok(format!("http://{}:{}{}", self.config.host, port, path))
    }

    /// Serve requests until the authorization callback arrives
    ///
    /// Connections are read concurrently, each bounded by the read timeout,
    /// so an idle socket cannot hold back the redirect behind it. A callback
    /// carrying an `error`, or a `state` other than `expected_state`, is
    /// answered with the failure page and ends the wait with an error.
    pub async fn next_callback(&self, expected_state: &str) -> Result<PendingCallback> {
        let mut connections = JoinSet::new();

        loop {
            let served = tokio::select! {
                accepted = self.listener.accept() => {
                    let (stream, peer) = accepted
                        .map_err(|e| Error::OAuth(format!("Failed to accept connection: {}", e)))?;
                    connections.spawn(serve_connection(stream, peer, self.config.clone()));
                    continue;
                }
                Some(joined) = connections.join_next() => match joined {
                    Ok(served) => served,
                    Err(e) => {
                        tracing::debug!("Connection task failed: {}", e);
                        continue;
                    }
                },
            };

            let Served::Callback { mut stream, peer, callback } = served else {
                continue;
            };
            let write_timeout = self.config.write_timeout();

            if let Some(error) = &callback.error {
                let description = callback.error_description.as_deref().unwrap_or("Unknown error");
                send_error_page(&mut stream, write_timeout).await;
                return Err(Error::OAuth(format!("Authorization failed: {} - {}", error, description)));
            }

            let Some(code) = callback.code.clone() else {
                continue;
            };

            if callback.state.as_deref() != Some(expected_state) {
                send_error_page(&mut stream, write_timeout).await;
                return Err(Error::OAuth(format!(
                    "State mismatch: expected {}, got {}",
                    expected_state,
                    callback.state.as_deref().unwrap_or("nothing")
                )));
            }

            tracing::info!("Authorization callback received from {}", peer);
            return Ok(PendingCallback {
                stream,
                code,
                callback,
                write_timeout,
            });
        }
    }

    /// Stop accepting connections
    pub fn shutdown(self) {
        tracing::debug!("Callback server stopped");
        drop(self.listener);
    }
}

/// Result of serving one connection up to its request head
enum Served {
    Ignored,
    Callback {
        stream: TcpStream,
        peer: SocketAddr,
        callback: AuthorizationCallback,
    },
}

/// Read one request head and answer it unless it is a callback
///
/// Callbacks without `code` or `error` are answered 400 here; the rest are
/// handed back with the connection still open.
async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, config: CallbackConfig) -> Served {
    let head = match timeout(config.read_timeout(), read_head(&mut stream, config.max_header_bytes)).await {
        Ok(Ok(RequestHead::Complete(head))) => head,
        Ok(Ok(RequestHead::TooLarge)) => {
            reject(&mut stream, "431 Request Header Fields Too Large", config.write_timeout()).await;
            return Served::Ignored;
        }
        Ok(Ok(RequestHead::Closed)) => return Served::Ignored,
        Ok(Err(e)) => {
            tracing::debug!("Dropping connection from {}: {}", peer, e);
            return Served::Ignored;
        }
        Err(_) => {
            tracing::debug!("Read timeout on connection from {}", peer);
            return Served::Ignored;
        }
    };

    match classify_request(&head, &config.path) {
        Inbound::Callback(callback) if callback.code.is_none() && callback.error.is_none() => {
            tracing::debug!("Callback from {} carries no code, still waiting", peer);
            reject(&mut stream, "400 Bad Request", config.write_timeout()).await;
            Served::Ignored
        }
        Inbound::Callback(callback) => Served::Callback { stream, peer, callback },
        Inbound::Reject(status) => {
            tracing::debug!("Ignoring request from {}: {}", peer, status);
            reject(&mut stream, status, config.write_timeout()).await;
            Served::Ignored
        }
    }
}

async fn reject(stream: &mut TcpStream, status: &str, write_timeout: Duration) {
    if let Err(e) = write_response(stream, status, status, write_timeout).await {
        tracing::debug!("Failed to answer stray request: {}", e);
    }
}

async fn send_error_page(stream: &mut TcpStream, write_timeout: Duration) {
    if let Err(e) = write_response(stream, "400 Bad Request", ERROR_HTML, write_timeout).await {
        tracing::warn!("Failed to send error page: {}", e);
    }
}

/// Read up to the blank line ending the request head
async fn read_head(stream: &mut TcpStream, max_header_bytes: usize) -> std::io::Result<RequestHead> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(RequestHead::Closed);
        }
        buffer.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buffer) {
            if end > max_header_bytes {
                return Ok(RequestHead::TooLarge);
            }
            return Ok(RequestHead::Complete(String::from_utf8_lossy(&buffer[..end]).into_owned()));
        }
        if buffer.len() > max_header_bytes {
            return Ok(RequestHead::TooLarge);
        }
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn write_response(stream: &mut TcpStream, status: &str, body: &str, write_timeout: Duration) -> Result<()> {
    let content_type = if body.starts_with('<') { "text/html; charset=utf-8" } else { "text/plain" };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );

    let write = async {
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
        stream.shutdown().await
    };

    timeout(write_timeout, write).await
        .map_err(|_| Error::OAuth(format!("Timed out writing {} response", status)))??;
    Ok(())
}

/// Decide what a request head is, without judging `state` or `code`
fn classify_request(head: &str, callback_path: &str) -> Inbound {
    let Some(request_line) = head.lines().next() else {
        return Inbound::Reject("400 Bad Request");
    };

    // GET /?state=xxx&code=yyy&scope=zzz HTTP/1.1
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    if parts.len() < 2 {
        return Inbound::Reject("400 Bad Request");
    }

    let Ok(url) = Url::parse(&format!("http://localhost{}", parts[1])) else {
        return Inbound::Reject("400 Bad Request");
    };
    if url.path() != callback_path {
        return Inbound::Reject("404 Not Found");
    }
    if parts[0] != "GET" {
        return Inbound::Reject("405 Method Not Allowed");
    }

    let mut callback = AuthorizationCallback::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => callback.code = Some(value.into_owned()),
            "state" => callback.state = Some(value.into_owned()),
            "error" => callback.error = Some(value.into_owned()),
            "error_description" => callback.error_description = Some(value.into_owned()),
            _ => {}
        }
    }

    Inbound::Callback(callback)
}
