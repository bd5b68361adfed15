use crate::decoder::{ENC_NONE, decode_body};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Certificate, Client, StatusCode, Url,
    header::{CONTENT_ENCODING, HeaderMap, HeaderName, HeaderValue},
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt::Debug;
use thiserror::Error;

const HEALTH_PATH: &str = "/healthz";

pub trait ConnectionProfile {
    fn endpoint(&self) -> &Url;
    fn insecure(&self) -> bool;
    fn ca_cert(&self) -> Option<&String>;
    fn headers(&self) -> &HashMap<String, String>;
}

#[derive(Debug, Serialize)]
struct CleanRequest<'a> {
    text: &'a str,
}

/// Response body of the clean endpoint. Both fields are optional; any other
/// keys are ignored, and a body that is valid JSON but not an object carries
/// neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanBody {
    clean: Option<String>,
    detail: Option<Value>,
}

impl From<Value> for CleanBody {
    fn from(value: Value) -> Self {
        let Value::Object(mut fields) = value else {
            return CleanBody::default();
        };
        let clean = match fields.remove("clean") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        };
        CleanBody {
            clean,
            detail: fields.remove("detail"),
        }
    }
}

impl<'de> Deserialize<'de> for CleanBody {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(CleanBody::from)
    }
}

impl CleanBody {
    pub fn cleaned(text: impl Into<String>) -> Self {
        CleanBody {
            clean: Some(text.into()),
            detail: None,
        }
    }

    pub fn clean(&self) -> Option<&str> {
        self.clean.as_deref()
    }

    /// The server's explanation of a failure, if it gave a non-empty one.
    /// Structured details (validation error lists) are rendered as JSON.
    pub fn detail(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanReply {
    status: StatusCode,
    body: CleanBody,
}

impl CleanReply {
    pub fn new(status: StatusCode, body: CleanBody) -> Self {
        CleanReply { status, body }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &CleanBody {
        &self.body
    }
}

/// The request did not complete or its response could not be read.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),
    #[error("failed to decode response body")]
    Decode(#[from] std::io::Error),
    #[error("invalid JSON in response")]
    Json(#[from] serde_json::Error),
}

impl TransportError {
    /// One-line description including every underlying cause.
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = self.source();
        while let Some(cause) = source {
            let cause_text = cause.to_string();
            if !text.ends_with(&cause_text) {
                text.push_str(": ");
                text.push_str(&cause_text);
            }
            source = cause.source();
        }
        text
    }
}

#[async_trait]
pub trait CleanService: Send + Sync {
    async fn clean(&self, token: &str, text: &str) -> Result<CleanReply, TransportError>;
}

pub struct HttpCleanClient {
    client: Client,
    endpoint: Url,
}

impl Debug for HttpCleanClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCleanClient")
            .field("client", &"Client")
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

impl HttpCleanClient {
    pub fn new(profile: &impl ConnectionProfile) -> Result<Self> {
        let client = Self::build_client(profile)?;
        Ok(HttpCleanClient {
            client,
            endpoint: profile.endpoint().clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Probes `/healthz` on the endpoint's origin.
    pub async fn health(&self) -> Result<bool, TransportError> {
        let mut url = self.endpoint.clone();
        url.set_path(HEALTH_PATH);
        url.set_query(None);

        tracing::debug!(%url, "checking service health");
        let res = self.client.get(url).send().await?;
        if !res.status().is_success() {
            return Ok(false);
        }
        let body: Value = Self::read_json(res).await?;
        Ok(body.get("ok").and_then(Value::as_bool).unwrap_or(false))
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        res: reqwest::Response,
    ) -> Result<T, TransportError> {
        let content_encoding = res
            .headers()
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(ENC_NONE)
            .to_string();
        let body_bytes = res.bytes().await?;
        let body_bytes = decode_body(body_bytes, &content_encoding)?;
        Ok(serde_json::from_slice(&body_bytes)?)
    }

    fn build_client(profile: &impl ConnectionProfile) -> Result<Client> {
        let insecure_access = profile.insecure();
        let mut cli_builder = Client::builder()
            .user_agent(concat!("cleanc/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(insecure_access)
            .danger_accept_invalid_hostnames(insecure_access);

        if let Some(ca_cert) = profile.ca_cert() {
            let ca_cert = shellexpand::tilde(ca_cert).to_string();
            let pem = std::fs::read(&ca_cert)
                .with_context(|| format!("Failed to read CA certificate {ca_cert}"))?;
            let cert = Certificate::from_pem(&pem)
                .with_context(|| format!("Invalid CA certificate {ca_cert}"))?;
            cli_builder = cli_builder.use_rustls_tls().add_root_certificate(cert);
        }

        if !profile.headers().is_empty() {
            let headers = profile
                .headers()
                .iter()
                .map(|(key, value)| {
                    let name = HeaderName::from_bytes(key.as_bytes())
                        .with_context(|| format!("Invalid header name '{key}'"))?;
                    let value = HeaderValue::from_str(value)
                        .with_context(|| format!("Invalid value for header '{key}'"))?;
                    Ok::<_, anyhow::Error>((name, value))
                })
                .collect::<Result<HeaderMap>>()?;
            cli_builder = cli_builder.default_headers(headers);
        }

        cli_builder.build().context("Failed to build HTTP client")
    }
}

#[async_trait]
impl CleanService for HttpCleanClient {
    async fn clean(&self, token: &str, text: &str) -> Result<CleanReply, TransportError> {
        tracing::debug!(endpoint = %self.endpoint, chars = text.chars().count(), "posting clean request");
        let res = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .json(&CleanRequest { text })
            .send()
            .await?;

        let status = res.status();
        let body: CleanBody = Self::read_json(res).await?;
        tracing::debug!(%status, "clean request settled");

        Ok(CleanReply { status, body })
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serves one canned HTTP response on a loopback port and hands back the
    /// raw request it received.
    pub async fn serve_once(
        status_line: &'static str,
        extra_headers: &'static str,
        body: Vec<u8>,
    ) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let head = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\n{extra_headers}Content-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&request).to_string());
        });

        (format!("http://{addr}/clean"), rx)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }
}

#[cfg(test)]
mod tests {
    use super::stub::serve_once;
    use super::*;
    use crate::args::{CommandLineArgs, Parser};
    use crate::profile::Connection;
    use flate2::{Compression, write::GzEncoder};
    use std::io::Write;

    fn client_for(url: &str) -> HttpCleanClient {
        HttpCleanClient::new(&Connection::new(Url::parse(url).unwrap())).unwrap()
    }

    #[tokio::test]
    async fn posts_bearer_token_and_json_body() {
        let (url, request) = serve_once("200 OK", "", br#"{"clean":"hello!"}"#.to_vec()).await;
        let reply = client_for(&url).clean("abc", "hello").await.unwrap();

        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body().clean(), Some("hello!"));

        let request = request.await.unwrap();
        let lower = request.to_ascii_lowercase();
        assert!(request.starts_with("POST /clean HTTP/1.1"));
        assert!(lower.contains("authorization: bearer abc"));
        assert!(lower.contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"text":"hello"}"#));
    }

    #[tokio::test]
    async fn error_status_keeps_detail() {
        let (url, _) = serve_once(
            "401 Unauthorized",
            "",
            br#"{"detail":"invalid token"}"#.to_vec(),
        )
        .await;
        let reply = client_for(&url).clean("abc", "hello").await.unwrap();

        assert_eq!(reply.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body().detail(), Some("invalid token".to_string()));
        assert_eq!(reply.body().clean(), None);
    }

    #[tokio::test]
    async fn gzip_encoded_response_is_decoded() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"clean":"zipped"}"#).unwrap();
        let body = encoder.finish().unwrap();

        let (url, _) = serve_once("200 OK", "Content-Encoding: gzip\r\n", body).await;
        let reply = client_for(&url).clean("abc", "x").await.unwrap();
        assert_eq!(reply.body().clean(), Some("zipped"));
    }

    #[tokio::test]
    async fn non_json_body_is_a_transport_error() {
        let (url, _) = serve_once("500 Internal Server Error", "", b"<html>oops</html>".to_vec()).await;
        let err = client_for(&url).clean("abc", "x").await.unwrap_err();
        assert!(matches!(err, TransportError::Json(_)));
        assert!(err.describe().starts_with("invalid JSON in response: "));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}/clean"))
            .clean("abc", "x")
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Request(_)));
        assert!(!err.describe().is_empty());
    }

    #[tokio::test]
    async fn health_reads_ok_flag() {
        let (url, request) = serve_once("200 OK", "", br#"{"ok":true}"#.to_vec()).await;
        assert!(client_for(&url).health().await.unwrap());
        assert!(request.await.unwrap().starts_with("GET /healthz HTTP/1.1"));

        let (url, _) = serve_once("503 Service Unavailable", "", b"{}".to_vec()).await;
        assert!(!client_for(&url).health().await.unwrap());
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let body: CleanBody =
            serde_json::from_str(r#"{"detail":[{"loc":["body","text"],"msg":"field required"}]}"#)
                .unwrap();
        assert!(body.detail().unwrap().contains("field required"));

        let body: CleanBody = serde_json::from_str(r#"{"detail":""}"#).unwrap();
        assert_eq!(body.detail(), None);
    }

    #[tokio::test]
    async fn non_object_json_is_an_empty_body() {
        let (url, _) = serve_once(
            "500 Internal Server Error",
            "",
            br#""Internal Server Error""#.to_vec(),
        )
        .await;
        let reply = client_for(&url).clean("abc", "x").await.unwrap();

        assert_eq!(reply.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body(), &CleanBody::default());
    }

    #[test]
    fn body_fields_of_other_types() {
        let body: CleanBody = serde_json::from_str(r#"[1, 2]"#).unwrap();
        assert_eq!(body.clean(), None);
        assert_eq!(body.detail(), None);

        let body: CleanBody = serde_json::from_str(r#"{"clean":42,"detail":null}"#).unwrap();
        assert_eq!(body.clean(), Some("42"));
        assert_eq!(body.detail(), None);

        let body: CleanBody = serde_json::from_str(r#"{"clean":null}"#).unwrap();
        assert_eq!(body.clean(), None);
    }

    #[test]
    fn invalid_profile_header_fails_client_build() {
        let args = CommandLineArgs::parse_from(["cleanc", "-H", "Bad Header: x"]);
        let conn = Connection::resolve(&args, None).unwrap();
        assert!(HttpCleanClient::new(&conn).is_err());
    }
}
