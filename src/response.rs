//! Typed, read-only views over parsed search responses

use crate::api_bindings::search::{HitObject, Response};
use crate::request::{send_search, SearchError};
use crate::transport::{Transport, UTF_8};
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use slog::Logger;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Keys inside an aggregation (or bucket) object that never hold a sub-aggregation
const NON_AGGREGATION_KEYS: &[&str] = &["key", "meta", "after_key", "hits", "values"];

/// An object nested in an aggregation is only a sub-aggregation if it carries one of these
const AGGREGATION_RESULT_KEYS: &[&str] =
    &["buckets", "doc_count", "value", "values", "hits", "count"];

#[derive(Debug)]
pub struct SearchResponse {
    took_in_millis: u64,
    timed_out: bool,
    hits: SearchHits,
    scroll_id: Option<String>,
    aggregations: HashMap<String, AggregationResult>,
}

impl SearchResponse {
    /// Converts the decoded response envelope.
    /// A scroll context turns the hits into a lazily scrolled sequence.
    pub(crate) fn from_response(response: Response, scroll: Option<ScrollContext>) -> Self {
        let Response {
            took,
            timed_out,
            hits: raw_hits,
            aggregations,
            scroll_id,
            ..
        } = response;

        let total_hits = raw_hits.total.map_or(0, |total| total.value());
        let max_score = raw_hits.max_score;
        let hits = raw_hits
            .hits
            .into_iter()
            .map(SearchHit::from)
            .collect::<Vec<_>>();
        let hits = match scroll {
            // An empty first batch means there is nothing left to scroll through
            Some(context) => SearchHits::Scrolling(ScrollingSearchHits {
                context,
                scroll_id: scroll_id.clone(),
                total_hits,
                max_score,
                exhausted: hits.is_empty(),
                batch: hits.into_iter(),
            }),
            None => SearchHits::Simple(SimpleSearchHits {
                total_hits,
                max_score,
                hits,
            }),
        };

        Self {
            took_in_millis: took.unwrap_or(0),
            timed_out: timed_out.unwrap_or(false),
            hits,
            scroll_id,
            aggregations: aggregations
                .as_ref()
                .map(AggregationResult::parse_all)
                .unwrap_or_default(),
        }
    }

    pub const fn took_in_millis(&self) -> u64 {
        self.took_in_millis
    }

    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }

    pub const fn hits(&self) -> &SearchHits {
        &self.hits
    }

    pub fn hits_mut(&mut self) -> &mut SearchHits {
        &mut self.hits
    }

    pub fn into_hits(self) -> SearchHits {
        self.hits
    }

    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    pub const fn aggregations(&self) -> &HashMap<String, AggregationResult> {
        &self.aggregations
    }

    pub fn aggregation(&self, name: &str) -> Option<&AggregationResult> {
        self.aggregations.get(name)
    }
}

/// A single matching document
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    id: String,
    score: Option<f64>,
    index: Option<String>,
    hit_type: Option<String>,
    source: Option<Value>,
    fields: HashMap<String, Value>,
    sort: Vec<Value>,
}

impl From<HitObject> for SearchHit {
    fn from(hit: HitObject) -> Self {
        Self {
            id: hit.id,
            score: hit.score,
            index: hit.index,
            hit_type: hit.hit_type,
            source: hit.source,
            fields: hit.fields,
            sort: hit.sort,
        }
    }
}

impl SearchHit {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn score(&self) -> Option<f64> {
        self.score
    }

    pub fn index(&self) -> Option<&str> {
        self.index.as_deref()
    }

    pub fn hit_type(&self) -> Option<&str> {
        self.hit_type.as_deref()
    }

    /// The `_source` document, absent when source filtering excluded it
    pub const fn source(&self) -> Option<&Value> {
        self.source.as_ref()
    }

    /// Requested stored fields, each holding the array of values Elasticsearch returned
    pub const fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn sort_values(&self) -> &[Value] {
        &self.sort
    }
}

/// The hits of a response.
/// `Simple` hits are fully loaded and can be iterated any number of times;
/// `Scrolling` hits fetch further batches on demand and can be consumed only once.
#[derive(Debug)]
pub enum SearchHits {
    Simple(SimpleSearchHits),
    Scrolling(ScrollingSearchHits),
}

impl SearchHits {
    pub const fn total_hits(&self) -> u64 {
        match self {
            Self::Simple(hits) => hits.total_hits,
            Self::Scrolling(hits) => hits.total_hits,
        }
    }

    pub const fn max_score(&self) -> Option<f64> {
        match self {
            Self::Simple(hits) => hits.max_score,
            Self::Scrolling(hits) => hits.max_score,
        }
    }

    pub const fn is_scrolling(&self) -> bool {
        matches!(self, Self::Scrolling(_))
    }

    /// Hits that are already loaded in memory
    /// (for scrolling hits, the unconsumed part of the current batch)
    pub fn loaded(&self) -> &[SearchHit] {
        match self {
            Self::Simple(hits) => &hits.hits,
            Self::Scrolling(hits) => hits.batch.as_slice(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.loaded().iter()
    }

    /// Streams every hit, fetching further scroll batches if needed
    pub fn into_stream(self) -> BoxStream<'static, Result<SearchHit, SearchError>> {
        match self {
            Self::Simple(hits) => stream::iter(hits.hits.into_iter().map(Ok)).boxed(),
            Self::Scrolling(hits) => hits.into_stream(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleSearchHits {
    total_hits: u64,
    max_score: Option<f64>,
    hits: Vec<SearchHit>,
}

impl SimpleSearchHits {
    pub fn iter(&self) -> std::slice::Iter<'_, SearchHit> {
        self.hits.iter()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

impl<'a> IntoIterator for &'a SimpleSearchHits {
    type Item = &'a SearchHit;
    type IntoIter = std::slice::Iter<'a, SearchHit>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.iter()
    }
}

/// Everything needed to continue a scroll after the initial search
pub(crate) struct ScrollContext {
    pub transport: Arc<dyn Transport>,
    pub logger: Logger,
    pub scroll: String,
    pub request_timeout: Option<Duration>,
}

impl std::fmt::Debug for ScrollContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrollContext")
            .field("scroll", &self.scroll)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Hits of a scrolled search.
///
/// Once the current batch is drained, the next one is requested from
/// `/_search/scroll` using the latest scroll id. The sequence cannot be restarted,
/// and since advancing takes `&mut self` only one consumer can drive a scroll id.
#[derive(Debug)]
pub struct ScrollingSearchHits {
    context: ScrollContext,
    scroll_id: Option<String>,
    total_hits: u64,
    max_score: Option<f64>,
    batch: std::vec::IntoIter<SearchHit>,
    exhausted: bool,
}

impl ScrollingSearchHits {
    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    /// Yields the next hit, fetching a new batch when the current one is drained.
    /// Returns `None` once a batch comes back empty, there is no scroll id,
    /// or a previous fetch failed.
    pub async fn next_hit(&mut self) -> Option<Result<SearchHit, SearchError>> {
        loop {
            if let Some(hit) = self.batch.next() {
                return Some(Ok(hit));
            }
            if self.exhausted {
                return None;
            }
            let scroll_id = match &self.scroll_id {
                Some(scroll_id) => scroll_id.clone(),
                None => {
                    self.exhausted = true;
                    return None;
                }
            };

            match self.fetch_batch(&scroll_id).await {
                Ok(response) => {
                    if response.scroll_id.is_some() {
                        self.scroll_id = response.scroll_id;
                    }
                    if response.hits.hits.is_empty() {
                        self.exhausted = true;
                    }
                    let hits = response
                        .hits
                        .hits
                        .into_iter()
                        .map(SearchHit::from)
                        .collect::<Vec<_>>();
                    self.batch = hits.into_iter();
                }
                Err(err) => {
                    self.exhausted = true;
                    return Some(Err(err));
                }
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<SearchHit, SearchError>> {
        stream::unfold(self, |mut hits| async move {
            hits.next_hit().await.map(|item| (item, hits))
        })
        .boxed()
    }

    /// Releases the server-side search context.
    /// Does nothing if the response carried no scroll id.
    pub async fn clear(self) -> Result<(), SearchError> {
        let scroll_id = match self.scroll_id {
            Some(scroll_id) => scroll_id,
            None => return Ok(()),
        };

        let body = serde_json::json!({ "scroll_id": [scroll_id] }).to_string();
        let mut request = self
            .context
            .transport
            .prepare_delete("/_search/scroll")
            .body(body.as_str())
            .charset(UTF_8)
            .header("Content-Type", "application/json");
        if let Some(timeout) = self.context.request_timeout {
            request = request.request_timeout(timeout);
        }

        slog::debug!(self.context.logger, "clearing scroll context");
        let response = self
            .context
            .transport
            .execute(request)
            .await
            .map_err(|source| SearchError::Transport {
                query: body.clone(),
                source,
            })?;

        // A context that already expired is reported as 404, which is fine here
        if response.is_success() || response.status_code == 404 {
            Ok(())
        } else {
            Err(SearchError::ErrorStatusCode {
                status_code: response.status_code,
                status_text: response.status_text,
                body: response.body,
                query: body,
            })
        }
    }

    async fn fetch_batch(&self, scroll_id: &str) -> Result<Response, SearchError> {
        let body = serde_json::json!({
            "scroll": self.context.scroll,
            "scroll_id": scroll_id,
        })
        .to_string();

        let mut request = self
            .context
            .transport
            .prepare_post("/_search/scroll")
            .body(body.as_str())
            .charset(UTF_8)
            .header("Content-Type", "application/json");
        if let Some(timeout) = self.context.request_timeout {
            request = request.request_timeout(timeout);
        }

        slog::debug!(self.context.logger, "fetching next scroll batch");
        send_search(
            self.context.transport.as_ref(),
            &self.context.logger,
            request,
            &body,
        )
        .await
    }
}

/// Result of one aggregation, mirroring the shape of the requested aggregation tree
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    doc_count: Option<u64>,
    value: Option<f64>,
    buckets: Vec<Bucket>,
    nested_aggregations: HashMap<String, AggregationResult>,
}

impl AggregationResult {
    /// Parses the top-level `aggregations` object, where every key is an aggregation name
    pub(crate) fn parse_all(aggregations: &Map<String, Value>) -> HashMap<String, Self> {
        aggregations
            .iter()
            .filter_map(|(key, value)| {
                value
                    .as_object()
                    .map(|object| (key.clone(), Self::parse(object)))
            })
            .collect()
    }

    /// Parses the sub-aggregations of an aggregation or bucket object,
    /// skipping the fields that belong to the result itself
    fn parse_nested(parent: &Map<String, Value>) -> HashMap<String, Self> {
        parent
            .iter()
            .filter(|(key, _)| !NON_AGGREGATION_KEYS.contains(&key.as_str()))
            .filter_map(|(key, value)| value.as_object().map(|object| (key, object)))
            .filter(|(_, object)| {
                AGGREGATION_RESULT_KEYS
                    .iter()
                    .any(|result_key| object.contains_key(*result_key))
            })
            .map(|(key, object)| (key.clone(), Self::parse(object)))
            .collect()
    }

    fn parse(object: &Map<String, Value>) -> Self {
        let buckets = object
            .get("buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .filter_map(Value::as_object)
                    .map(Bucket::parse)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            doc_count: object.get("doc_count").and_then(Value::as_u64),
            value: object.get("value").and_then(Value::as_f64),
            buckets,
            nested_aggregations: Self::parse_nested(object),
        }
    }

    /// Number of documents in a single-bucket aggregation (`nested`, `filter`)
    pub const fn doc_count(&self) -> Option<u64> {
        self.doc_count
    }

    /// Value of a metric aggregation (`max`, `min`, `cardinality`)
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    pub const fn nested_aggregations(&self) -> &HashMap<String, AggregationResult> {
        &self.nested_aggregations
    }

    pub fn nested_aggregation(&self, name: &str) -> Option<&AggregationResult> {
        self.nested_aggregations.get(name)
    }
}

/// One group within a bucket aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    key: Value,
    doc_count: u64,
    aggregations: HashMap<String, AggregationResult>,
}

impl Bucket {
    fn parse(object: &Map<String, Value>) -> Self {
        Self {
            key: object.get("key").cloned().unwrap_or(Value::Null),
            doc_count: object.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            aggregations: AggregationResult::parse_nested(object),
        }
    }

    pub const fn key(&self) -> &Value {
        &self.key
    }

    /// The key as a string, for buckets over keyword fields
    pub fn key_as_str(&self) -> Option<&str> {
        self.key.as_str()
    }

    pub const fn doc_count(&self) -> u64 {
        self.doc_count
    }

    pub const fn aggregations(&self) -> &HashMap<String, AggregationResult> {
        &self.aggregations
    }

    pub fn aggregation(&self, name: &str) -> Option<&AggregationResult> {
        self.aggregations.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{AggregationResult, SearchHits, SearchResponse};
    use crate::api_bindings::search::Response;
    use futures::TryStreamExt;
    use serde_json::json;

    fn decode(value: serde_json::Value) -> Response {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_parses_aggregation_tree() {
        let aggregations = json!({
            "categories_distinct": {
                "doc_count": 2,
                "categories_unique_id_distinct": {
                    "doc_count_error_upper_bound": 0,
                    "sum_other_doc_count": 0,
                    "buckets": [
                        {"key": "Spielzeug>Path>More§spielzeug§damen", "doc_count": 1},
                        {
                            "key": "Spielzeug>Path§spielzeug§herren",
                            "doc_count": 1,
                            "max_price": {"value": 19.99}
                        }
                    ]
                }
            }
        });
        let parsed = AggregationResult::parse_all(aggregations.as_object().unwrap());

        assert_eq!(parsed.len(), 1);
        let categories = &parsed["categories_distinct"];
        assert_eq!(categories.doc_count(), Some(2));
        assert!(categories.buckets().is_empty());
        let unique_ids = categories
            .nested_aggregation("categories_unique_id_distinct")
            .unwrap();
        assert_eq!(unique_ids.buckets().len(), 2);
        assert!(unique_ids.nested_aggregations().is_empty());

        let second = &unique_ids.buckets()[1];
        assert_eq!(second.key_as_str(), Some("Spielzeug>Path§spielzeug§herren"));
        assert_eq!(second.doc_count(), 1);
        assert_eq!(
            second.aggregation("max_price").and_then(AggregationResult::value),
            Some(19.99)
        );
    }

    #[test]
    fn test_result_fields_are_not_sub_aggregations() {
        let aggregations = json!({
            "load_time_outlier": {
                "values": {"1.0": 5.0, "99.0": 982.0}
            },
            "top_products": {
                "doc_count": 12,
                "latest": {
                    "hits": {"total": {"value": 12, "relation": "eq"}, "hits": [{"_id": "P0"}]}
                },
                "price_stats": {"count": 12, "min": 1.0, "max": 99.0},
                "_ignored_settings": {"shard_size": 10}
            }
        });
        let parsed = AggregationResult::parse_all(aggregations.as_object().unwrap());

        assert_eq!(parsed.len(), 2);
        assert!(parsed["load_time_outlier"].nested_aggregations().is_empty());
        let top_products = &parsed["top_products"];
        assert_eq!(top_products.nested_aggregations().len(), 2);
        let latest = top_products.nested_aggregation("latest").unwrap();
        assert!(latest.nested_aggregations().is_empty());
        assert!(top_products.nested_aggregation("price_stats").is_some());
        assert!(top_products.nested_aggregation("_ignored_settings").is_none());
    }

    #[test]
    fn test_absent_optionals_degrade_to_empty() {
        let response = SearchResponse::from_response(
            decode(json!({"took": 3, "hits": {"max_score": null, "total": 0, "hits": []}})),
            None,
        );
        assert_eq!(response.took_in_millis(), 3);
        assert!(!response.timed_out());
        assert_eq!(response.hits().max_score(), None);
        assert_eq!(response.hits().total_hits(), 0);
        assert!(response.aggregations().is_empty());
        assert!(response.scroll_id().is_none());
        assert!(!response.hits().is_scrolling());
    }

    #[test]
    fn test_hit_accessors() {
        let response = SearchResponse::from_response(
            decode(json!({
                "took": 1,
                "hits": {"total": 1, "max_score": null, "hits": [{
                    "_index": "product",
                    "_id": "P0",
                    "_score": null,
                    "fields": {"brand": ["adidas"]},
                    "sort": [1460618266743_u64, "P0"]
                }]}
            })),
            None,
        );
        let hit = response.hits().iter().next().unwrap();
        assert_eq!(hit.id(), "P0");
        assert_eq!(hit.index(), Some("product"));
        assert_eq!(hit.hit_type(), None);
        assert_eq!(hit.score(), None);
        assert_eq!(hit.source(), None);
        assert_eq!(hit.field("brand"), Some(&json!(["adidas"])));
        assert_eq!(hit.sort_values(), &[json!(1460618266743_u64), json!("P0")][..]);
    }

    #[tokio::test]
    async fn test_simple_hits_stream_and_restart() -> anyhow::Result<()> {
        let response = SearchResponse::from_response(
            decode(json!({
                "took": 1,
                "hits": {"total": 2, "hits": [{"_id": "a"}, {"_id": "b"}]}
            })),
            None,
        );
        let ids = |hits: &SearchHits| hits.iter().map(|h| h.id().to_owned()).collect::<Vec<_>>();
        assert_eq!(ids(response.hits()), vec!["a", "b"]);
        assert_eq!(ids(response.hits()), vec!["a", "b"]);

        if let SearchHits::Simple(simple) = response.hits() {
            assert_eq!(simple.len(), 2);
            assert_eq!((&*simple).into_iter().count(), 2);
        } else {
            panic!("expected simple hits");
        }

        let streamed = response.into_hits().into_stream().try_collect::<Vec<_>>().await?;
        assert_eq!(streamed.len(), 2);
        Ok(())
    }
}
