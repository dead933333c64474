//! Aggregation clause builders.
//!
//! Each aggregation renders as `{"<type>":{..params..}}`,
//! with sub-aggregations placed in a sibling `"aggregations"` object keyed by name:
//! `https://www.elastic.co/guide/en/elasticsearch/reference/7.10/search-aggregations.html`

use crate::json::{object, object_of};
use crate::query::QueryBuilder;
use crate::sort::SortOrder;
use serde_json::{Map, Value};

/// Named aggregation together with its ordered sub-aggregations
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationBuilder {
    name: String,
    aggregation: Aggregation,
    sub_aggregations: Vec<AggregationBuilder>,
}

/// The supported aggregation types
#[derive(Debug, Clone, PartialEq)]
pub enum Aggregation {
    Terms(TermsAggregation),
    Nested { path: String },
    Filter(QueryBuilder),
    Cardinality { field: String },
    Max { field: String },
    Min { field: String },
}

impl AggregationBuilder {
    pub fn new(name: impl Into<String>, aggregation: Aggregation) -> Self {
        Self {
            name: name.into(),
            aggregation,
            sub_aggregations: Vec::new(),
        }
    }

    pub fn terms(name: impl Into<String>, terms: TermsAggregation) -> Self {
        Self::new(name, Aggregation::Terms(terms))
    }

    pub fn nested(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(name, Aggregation::Nested { path: path.into() })
    }

    pub fn filter(name: impl Into<String>, filter: impl Into<QueryBuilder>) -> Self {
        Self::new(name, Aggregation::Filter(filter.into()))
    }

    pub fn cardinality(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, Aggregation::Cardinality { field: field.into() })
    }

    pub fn max(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, Aggregation::Max { field: field.into() })
    }

    pub fn min(name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(name, Aggregation::Min { field: field.into() })
    }

    pub fn sub_aggregation(mut self, sub_aggregation: Self) -> Self {
        self.sub_aggregations.push(sub_aggregation);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sub_aggregations(&self) -> &[Self] {
        &self.sub_aggregations
    }

    /// Renders the aggregation body (without its name)
    pub fn build(&self) -> Value {
        let (kind, params) = match &self.aggregation {
            Aggregation::Terms(terms) => ("terms", terms.build()),
            Aggregation::Nested { path } => ("nested", object("path", path.as_str())),
            Aggregation::Filter(filter) => ("filter", filter.build()),
            Aggregation::Cardinality { field } => ("cardinality", object("field", field.as_str())),
            Aggregation::Max { field } => ("max", object("field", field.as_str())),
            Aggregation::Min { field } => ("min", object("field", field.as_str())),
        };

        let mut body = Map::new();
        body.insert(String::from(kind), params);
        if !self.sub_aggregations.is_empty() {
            body.insert(
                String::from("aggregations"),
                build_all(&self.sub_aggregations),
            );
        }
        Value::Object(body)
    }
}

/// Renders a list of aggregations into an object keyed by their names.
/// A later aggregation replaces an earlier one with the same name.
pub fn build_all(aggregations: &[AggregationBuilder]) -> Value {
    object_of(
        aggregations
            .iter()
            .map(|aggregation| (aggregation.name.as_str(), aggregation.build())),
    )
}

/// Parameters of a `terms` bucket aggregation
#[derive(Debug, Clone, PartialEq)]
pub struct TermsAggregation {
    field: String,
    size: Option<u64>,
    min_doc_count: Option<u64>,
    order: Option<(String, SortOrder)>,
}

impl TermsAggregation {
    pub fn field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            size: None,
            min_doc_count: None,
            order: None,
        }
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn min_doc_count(mut self, min_doc_count: u64) -> Self {
        self.min_doc_count = Some(min_doc_count);
        self
    }

    /// Orders buckets by a key such as `_count` or `_key`
    pub fn order(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.order = Some((key.into(), order));
        self
    }

    fn build(&self) -> Value {
        let mut params = Map::new();
        params.insert(String::from("field"), Value::from(self.field.as_str()));
        if let Some(size) = self.size {
            params.insert(String::from("size"), Value::from(size));
        }
        if let Some(min_doc_count) = self.min_doc_count {
            params.insert(String::from("min_doc_count"), Value::from(min_doc_count));
        }
        if let Some((key, order)) = &self.order {
            params.insert(String::from("order"), object(key.as_str(), order.as_str()));
        }
        Value::Object(params)
    }
}
