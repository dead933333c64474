//! Client for composing Elasticsearch search and bulk requests
//! and reading their responses as typed results.
//!
//! Queries, aggregations and bulk actions are plain values that render themselves
//! into the exact JSON Elasticsearch expects; a [`Client`] sends them through a [`Transport`].

pub mod aggregations;
pub mod api_bindings;
pub mod bulk;
pub mod config;
pub mod connect;
pub mod json;
pub mod query;
pub mod request;
pub mod response;
pub mod sort;
pub mod transport;

#[cfg(test)]
mod testutils;

pub use crate::aggregations::{AggregationBuilder, TermsAggregation};
pub use crate::bulk::{BulkActionBuilder, BulkActionError, BulkError, BulkRequestBuilder};
pub use crate::query::{BoolQuery, QueryBuilder, RangeQuery};
pub use crate::request::{SearchError, SearchRequestBuilder};
pub use crate::response::{AggregationResult, SearchHit, SearchHits, SearchResponse};
pub use crate::sort::SortOrder;
pub use crate::transport::{ElasticsearchTransport, Transport, TransportError};

use slog::Logger;
use std::sync::Arc;
use std::time::Duration;

/// Entry point for building requests; cheap to clone
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    logger: Logger,
    default_timeout: Option<Duration>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, logger: Logger) -> Self {
        Self {
            transport,
            logger,
            default_timeout: None,
        }
    }

    /// Sets the timeout used by requests that don't set their own
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Starts a search against the given index
    pub fn prepare_search(&self, index: impl Into<String>) -> SearchRequestBuilder {
        let builder = SearchRequestBuilder::new(
            Arc::clone(&self.transport),
            self.logger.clone(),
            index.into(),
        );
        match self.default_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    pub fn prepare_bulk(&self) -> BulkRequestBuilder {
        let builder = BulkRequestBuilder::new(Arc::clone(&self.transport), self.logger.clone());
        match self.default_timeout {
            Some(timeout) => builder.timeout(timeout),
            None => builder,
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub const fn logger(&self) -> &Logger {
        &self.logger
    }
}
