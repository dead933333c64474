use crate::transport::{HttpResponse, PreparedRequest, Transport, TransportError};
use async_trait::async_trait;
use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::types::{Format, Severity};
use sloggers::Build;
use std::collections::VecDeque;
use std::sync::Mutex;

lazy_static::lazy_static! {
    static ref LOGGER: slog::Logger = {
        let mut builder = TerminalLoggerBuilder::new();
        builder.level(Severity::Debug);
        builder.destination(Destination::Stderr);
        builder.format(Format::Full);
        builder.build().unwrap()
    };
}

pub fn logger(test_name: &'static str) -> slog::Logger {
    LOGGER.new(slog::o!("test_name" => test_name))
}

/// Transport that records every request
/// and answers with queued responses in order
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<PreparedRequest>>,
    responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, status_code: u16, body: impl Into<String>) {
        self.respond_with_status(status_code, "", body);
    }

    pub fn respond_with_status(
        &self,
        status_code: u16,
        status_text: &str,
        body: impl Into<String>,
    ) {
        self.responses.lock().unwrap().push_back(Ok(HttpResponse {
            status_code,
            status_text: String::from(status_text),
            body: body.into(),
        }));
    }

    pub fn fail_with(&self, err: TransportError) {
        self.responses.lock().unwrap().push_back(Err(err));
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> PreparedRequest {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request was sent")
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: PreparedRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::InvalidRequest(String::from("no response queued"))))
    }
}
