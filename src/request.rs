//! Assembles a search request body, submits it and parses the response

use crate::aggregations::{self, AggregationBuilder};
use crate::api_bindings::search::Response;
use crate::json::{object, string_array};
use crate::query::QueryBuilder;
use crate::response::{ScrollContext, SearchResponse};
use crate::sort::SortOrder;
use crate::transport::{PreparedRequest, Transport, TransportError, UTF_8};
use serde_json::{Map, Value};
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SearchError {
    /// The message is the outbound request body
    #[error("{query}")]
    Transport {
        query: String,
        #[source]
        source: TransportError,
    },
    #[error("search failed with a non-success status code {status_code} {status_text}: {body}")]
    ErrorStatusCode {
        status_code: u16,
        status_text: String,
        body: String,
        query: String,
    },
    #[error("failed to decode response body JSON as expected response shape")]
    ResponseShapeDecodeError {
        query: String,
        #[source]
        source: serde_json::Error,
    },
}

impl SearchError {
    /// The request body that was being sent when the error occurred
    pub fn query(&self) -> &str {
        match self {
            Self::Transport { query, .. }
            | Self::ErrorStatusCode { query, .. }
            | Self::ResponseShapeDecodeError { query, .. } => query,
        }
    }
}

/// Accumulates the parameters of a single search against one index.
///
/// Body fields are rendered in a fixed order, each only when set:
/// `query`, `stored_fields`, `_source`, `from`, `size`, `sort`, `post_filter`, `aggregations`.
pub struct SearchRequestBuilder {
    transport: Arc<dyn Transport>,
    logger: Logger,
    index: String,
    query: Option<QueryBuilder>,
    post_filter: Option<QueryBuilder>,
    stored_fields: Vec<String>,
    source_filters: Vec<String>,
    from: Option<u64>,
    size: Option<u64>,
    sorts: Vec<(String, SortOrder)>,
    aggregations: Vec<AggregationBuilder>,
    scroll: Option<String>,
    timeout: Option<Duration>,
}

impl SearchRequestBuilder {
    pub(crate) fn new(transport: Arc<dyn Transport>, logger: Logger, index: String) -> Self {
        Self {
            transport,
            logger,
            index,
            query: None,
            post_filter: None,
            stored_fields: Vec::new(),
            source_filters: Vec::new(),
            from: None,
            size: None,
            sorts: Vec::new(),
            aggregations: Vec::new(),
            scroll: None,
            timeout: None,
        }
    }

    pub fn query(mut self, query: impl Into<QueryBuilder>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn post_filter(mut self, filter: impl Into<QueryBuilder>) -> Self {
        self.post_filter = Some(filter.into());
        self
    }

    /// Requests a stored field; adding the same field twice has no effect
    pub fn add_stored_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.stored_fields.contains(&field) {
            self.stored_fields.push(field);
        }
        self
    }

    /// Restricts `_source` to the given field; adding the same field twice has no effect
    pub fn add_source_filter(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        if !self.source_filters.contains(&field) {
            self.source_filters.push(field);
        }
        self
    }

    pub fn from(mut self, from: u64) -> Self {
        self.from = Some(from);
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Sorts are applied in the order they were added
    pub fn add_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sorts.push((field.into(), order));
        self
    }

    pub fn add_aggregation(mut self, aggregation: AggregationBuilder) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Keeps the search context alive for the given duration (e.g. `"1m"`)
    /// and makes the response hits scroll through the whole result set
    pub fn scroll(mut self, keep_alive: impl Into<String>) -> Self {
        self.scroll = Some(keep_alive.into());
        self
    }

    /// Request timeout handed to the transport
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_millis(self, millis: u64) -> Self {
        self.timeout(Duration::from_millis(millis))
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// Renders the request body
    pub fn build(&self) -> Value {
        let mut body = Map::new();
        if let Some(query) = &self.query {
            body.insert(String::from("query"), query.build());
        }
        if !self.stored_fields.is_empty() {
            body.insert(
                String::from("stored_fields"),
                string_array(&self.stored_fields),
            );
        }
        if !self.source_filters.is_empty() {
            body.insert(String::from("_source"), string_array(&self.source_filters));
        }
        if let Some(from) = self.from {
            body.insert(String::from("from"), Value::from(from));
        }
        if let Some(size) = self.size {
            body.insert(String::from("size"), Value::from(size));
        }
        if !self.sorts.is_empty() {
            let sorts = self
                .sorts
                .iter()
                .map(|(field, order)| object(field.as_str(), object("order", order.as_str())))
                .collect::<Vec<_>>();
            body.insert(String::from("sort"), Value::Array(sorts));
        }
        if let Some(post_filter) = &self.post_filter {
            body.insert(String::from("post_filter"), post_filter.build());
        }
        if !self.aggregations.is_empty() {
            body.insert(
                String::from("aggregations"),
                aggregations::build_all(&self.aggregations),
            );
        }
        Value::Object(body)
    }

    /// Sends the search and parses the response.
    /// If a scroll keep-alive was set, the returned hits are scrolling hits.
    pub async fn execute(self) -> Result<SearchResponse, SearchError> {
        let body = self.build().to_string();
        let logger = self.logger.new(slog::o!("index" => self.index.clone()));
        slog::debug!(logger, "sending search body to Elasticsearch"; "body" => body.as_str());

        let mut request = self
            .transport
            .prepare_post(&format!("/{}/_search", self.index))
            .body(body.as_str())
            .charset(UTF_8)
            .header("Content-Type", "application/json");
        if let Some(scroll) = &self.scroll {
            request = request.query_param("scroll", scroll.as_str());
        }
        if let Some(timeout) = self.timeout {
            request = request.request_timeout(timeout);
        }

        let response = send_search(self.transport.as_ref(), &logger, request, &body).await?;

        let Self {
            transport,
            scroll,
            timeout,
            ..
        } = self;
        let scroll_context = scroll.map(|scroll| ScrollContext {
            transport,
            logger,
            scroll,
            request_timeout: timeout,
        });
        Ok(SearchResponse::from_response(response, scroll_context))
    }
}

/// Submits a request whose response is a search envelope
/// (used both for the initial search and for scroll continuation)
pub(crate) async fn send_search(
    transport: &dyn Transport,
    logger: &Logger,
    request: PreparedRequest,
    query: &str,
) -> Result<Response, SearchError> {
    let response = transport.execute(request).await.map_err(|source| {
        slog::warn!(logger, "sending search request failed"; "error" => ?source);
        SearchError::Transport {
            query: String::from(query),
            source,
        }
    })?;

    if !response.is_success() {
        slog::warn!(
            logger,
            "search returned non-success status code";
            "status_code" => response.status_code,
            "body" => response.body.as_str(),
        );
        return Err(SearchError::ErrorStatusCode {
            status_code: response.status_code,
            status_text: response.status_text,
            body: response.body,
            query: String::from(query),
        });
    }
    slog::debug!(logger, "received response from Elasticsearch"; "status_code" => response.status_code);

    serde_json::from_str::<Response>(&response.body).map_err(|source| {
        SearchError::ResponseShapeDecodeError {
            query: String::from(query),
            source,
        }
    })
}
