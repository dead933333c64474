//! The HTTP capability that requests are submitted through.
//!
//! The client only needs "send this request, give me the status and body";
//! connection pooling, TLS and retries are the transport's concern.

use async_trait::async_trait;
use bytes::Bytes;
use elasticsearch::http::headers::{HeaderMap, HeaderName, HeaderValue};
use elasticsearch::http::Method as LibMethod;
use elasticsearch::{Elasticsearch, Error as LibError};
use std::time::Duration;
use thiserror::Error;

pub const UTF_8: &str = "UTF-8";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// An outbound request, assembled before being handed to a [`Transport`]
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<String>,
    pub charset: Option<&'static str>,
    pub headers: Vec<(String, String)>,
    pub query_params: Vec<(String, String)>,
    pub request_timeout: Option<Duration>,
}

impl PreparedRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            charset: None,
            headers: Vec::new(),
            query_params: Vec::new(),
            request_timeout: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn charset(mut self, charset: &'static str) -> Self {
        self.charset = Some(charset);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((name.into(), value.into()));
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Looks up the last header with the given (case-insensitive) name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Status line and body of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout(#[source] Option<Box<dyn std::error::Error + Send + Sync>>),
    #[error("request could not be prepared: {0}")]
    InvalidRequest(String),
    #[error("sending the request failed")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Asynchronous request submission.
/// Implementations complete once the full response body has been read.
#[async_trait]
pub trait Transport: Send + Sync {
    fn prepare_post(&self, path: &str) -> PreparedRequest {
        PreparedRequest::new(Method::Post, path)
    }

    fn prepare_delete(&self, path: &str) -> PreparedRequest {
        PreparedRequest::new(Method::Delete, path)
    }

    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by the official `elasticsearch` crate,
/// using its untyped `send` API so that raw bodies are passed through untouched
pub struct ElasticsearchTransport {
    inner: Elasticsearch,
}

impl ElasticsearchTransport {
    pub const fn new(inner: Elasticsearch) -> Self {
        Self { inner }
    }

    pub const fn inner(&self) -> &Elasticsearch {
        &self.inner
    }
}

fn convert_error(err: LibError) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(Some(Box::new(err)))
    } else {
        TransportError::Failed(Box::new(err))
    }
}

fn build_headers(request: &PreparedRequest) -> Result<HeaderMap, TransportError> {
    let mut headers = HeaderMap::new();
    for (name, value) in &request.headers {
        let is_content_type = name.eq_ignore_ascii_case("content-type");
        let value = match (is_content_type, request.charset) {
            (true, Some(charset)) => format!("{}; charset={}", value, charset),
            _ => value.clone(),
        };
        let header_name = HeaderName::try_from(name.as_str())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        let header_value = HeaderValue::try_from(value.as_str())
            .map_err(|err| TransportError::InvalidRequest(err.to_string()))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

#[async_trait]
impl Transport for ElasticsearchTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError> {
        let headers = build_headers(&request)?;
        let method = match request.method {
            Method::Get => LibMethod::Get,
            Method::Post => LibMethod::Post,
            Method::Delete => LibMethod::Delete,
        };
        let query_string = if request.query_params.is_empty() {
            None
        } else {
            Some(request.query_params.as_slice())
        };
        let body = request.body.map(Bytes::from);

        let response = self
            .inner
            .send(
                method,
                &request.path,
                headers,
                query_string,
                body,
                request.request_timeout,
            )
            .await
            .map_err(convert_error)?;

        let status_code = response.status_code();
        let status_text = status_code
            .canonical_reason()
            .map(String::from)
            .unwrap_or_default();
        let body = response.text().await.map_err(convert_error)?;

        Ok(HttpResponse {
            status_code: status_code.as_u16(),
            status_text,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{build_headers, HttpResponse, Method, PreparedRequest, Transport, UTF_8};
    use crate::testutils::MockTransport;
    use std::time::Duration;

    #[test]
    fn test_prepared_request_chaining() {
        let transport = MockTransport::new();
        let request = transport
            .prepare_post("/idx/_search")
            .body("{}")
            .charset(UTF_8)
            .header("Content-Type", "application/json")
            .query_param("scroll", "1m")
            .request_timeout(Duration::from_millis(54321));

        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, "/idx/_search");
        assert_eq!(request.body.as_deref(), Some("{}"));
        assert_eq!(request.charset, Some("UTF-8"));
        assert_eq!(request.header_value("content-type"), Some("application/json"));
        assert_eq!(
            request.query_params,
            vec![(String::from("scroll"), String::from("1m"))]
        );
        assert_eq!(request.request_timeout, Some(Duration::from_millis(54321)));
    }

    #[test]
    fn test_content_type_carries_charset() {
        let request = PreparedRequest::new(Method::Post, "/")
            .charset(UTF_8)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json");
        let headers = build_headers(&request).unwrap();
        assert_eq!(
            headers.get("content-type").unwrap().to_str().unwrap(),
            "application/json; charset=UTF-8"
        );
        assert_eq!(
            headers.get("accept").unwrap().to_str().unwrap(),
            "application/json"
        );
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let request = PreparedRequest::new(Method::Post, "/").header("bad header", "x");
        assert!(build_headers(&request).is_err());
    }

    #[test]
    fn test_response_success_range() {
        let response = |status_code| HttpResponse {
            status_code,
            status_text: String::new(),
            body: String::new(),
        };
        assert!(response(200).is_success());
        assert!(response(201).is_success());
        assert!(!response(404).is_success());
    }
}
