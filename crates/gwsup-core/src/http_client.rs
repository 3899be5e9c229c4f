//! HTTP client: one ureq Agent, retry with exponential backoff on transient failures.

use std::io::Read;
use std::time::Duration;

use crate::config::{DEFAULT_HTTP_RETRIES, DEFAULT_HTTP_RETRY_BACKOFF_MS, DEFAULT_HTTP_TIMEOUT_MS};
use crate::error::{utils::network_error, Result};

const MAX_BACKOFF_MS: u64 = 5_000;
const USER_AGENT: &str = concat!("gwsup/", env!("CARGO_PKG_VERSION"));

pub struct HttpClient {
    agent: ureq::Agent,
    retries: usize,
    backoff_ms: u64,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new(DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_HTTP_RETRIES, DEFAULT_HTTP_RETRY_BACKOFF_MS)
    }
}

/// Open response body plus its declared length, if any.
pub struct Download {
    pub content_length: Option<u64>,
    pub reader: Box<dyn Read + Send + Sync + 'static>,
}

impl HttpClient {
    pub fn new(timeout_ms: u64, retries: usize, backoff_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .user_agent(USER_AGENT)
            .redirects(10)
            .build();
        Self {
            agent,
            retries,
            backoff_ms,
        }
    }

    /// GET url and return the body as a stream.
    pub fn open(&self, url: &str) -> Result<Download> {
        let resp = self.send_with_retry(url, || self.agent.get(url).call())?;
        let content_length = resp
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u64>().ok());
        Ok(Download {
            content_length,
            reader: resp.into_reader(),
        })
    }

    fn send_with_retry<F>(&self, url: &str, mut send: F) -> Result<ureq::Response>
    where
        F: FnMut() -> std::result::Result<ureq::Response, ureq::Error>,
    {
        let mut attempt = 0usize;
        let mut backoff = self.backoff_ms;
        loop {
            attempt += 1;
            match send() {
                Ok(resp) => {
                    if resp.status() == 200 {
                        return Ok(resp);
                    }
                    let status = resp.status();
                    if attempt <= self.retries && is_transient(status) {
                        std::thread::sleep(Duration::from_millis(backoff));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    return Err(network_error(url, Some(status), format!("HTTP {}", status)));
                }
                Err(ureq::Error::Status(code, _resp)) => {
                    if attempt <= self.retries && is_transient(code) {
                        std::thread::sleep(Duration::from_millis(backoff));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    return Err(network_error(url, Some(code), format!("HTTP {}", code)));
                }
                Err(e) => {
                    if attempt <= self.retries {
                        std::thread::sleep(Duration::from_millis(backoff));
                        backoff = backoff.saturating_mul(2).min(MAX_BACKOFF_MS);
                        continue;
                    }
                    return Err(network_error(url, None, e));
                }
            }
        }
    }
}

fn is_transient(status: u16) -> bool {
    status >= 500 || status == 429
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serve `responses` in order, one per connection.
    fn serve(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        std::thread::spawn(move || {
            for resp in responses {
                let Ok((mut stream, _)) = listener.accept() else { return };
                counter.fetch_add(1, Ordering::SeqCst);
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut line = String::new();
                while reader.read_line(&mut line).map(|n| n > 0).unwrap_or(false) {
                    if line == "\r\n" {
                        break;
                    }
                    line.clear();
                }
                let _ = stream.write_all(resp.as_bytes());
            }
        });
        (format!("http://{}/asset.tar.gz", addr), hits)
    }

    fn body(client: &HttpClient, url: &str) -> Vec<u8> {
        let mut buf = Vec::new();
        client.open(url).unwrap().reader.read_to_end(&mut buf).unwrap();
        buf
    }

    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
    const UNAVAILABLE: &str = "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
    const NOT_FOUND: &str = "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[test]
    fn test_retries_transient_status() {
        let (url, hits) = serve(vec![UNAVAILABLE, OK]);
        let client = HttpClient::new(5_000, 2, 1);
        assert_eq!(body(&client, &url), b"hello");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let (url, hits) = serve(vec![NOT_FOUND, OK]);
        let client = HttpClient::new(5_000, 2, 1);
        let Err(err) = client.open(&url) else { panic!("404 should fail") };
        assert!(matches!(err, crate::GwsupError::Network { status: Some(404), .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_content_length_reported() {
        let (url, _) = serve(vec![OK]);
        let client = HttpClient::new(5_000, 0, 1);
        let download = client.open(&url).unwrap();
        assert_eq!(download.content_length, Some(5));
    }
}
