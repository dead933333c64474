//! Query DSL clause builders.
//!
//! Every clause renders to an object with a single top-level key naming the clause type:
//! `https://www.elastic.co/guide/en/elasticsearch/reference/7.10/query-dsl.html`

use crate::json::{empty_object, object, object_of, string_array};
use serde_json::{Map, Value};

/// A single query clause, possibly holding its own sub-clauses
#[derive(Debug, Clone, PartialEq)]
pub enum QueryBuilder {
    MatchAll,
    Term {
        field: String,
        value: Value,
    },
    Terms {
        field: String,
        values: Vec<Value>,
    },
    Match {
        field: String,
        query: Value,
    },
    Prefix {
        field: String,
        value: String,
    },
    Wildcard {
        field: String,
        value: String,
    },
    Exists {
        field: String,
    },
    Ids {
        values: Vec<String>,
    },
    Range(RangeQuery),
    Bool(BoolQuery),
    HasChild {
        child_type: String,
        query: Box<QueryBuilder>,
    },
    HasParent {
        parent_type: String,
        query: Box<QueryBuilder>,
    },
    Nested {
        path: String,
        query: Box<QueryBuilder>,
    },
    ConstantScore {
        filter: Box<QueryBuilder>,
        boost: Option<f64>,
    },
}

impl QueryBuilder {
    /// Renders the clause into its JSON fragment.
    /// Sub-clauses are rendered again on every call.
    pub fn build(&self) -> Value {
        match self {
            Self::MatchAll => object("match_all", empty_object()),
            Self::Term { field, value } => object("term", object(field.as_str(), value.clone())),
            Self::Terms { field, values } => object(
                "terms",
                object(field.as_str(), Value::Array(values.clone())),
            ),
            Self::Match { field, query } => object(
                "match",
                object(field.as_str(), object("query", query.clone())),
            ),
            Self::Prefix { field, value } => {
                object("prefix", object(field.as_str(), value.as_str()))
            }
            Self::Wildcard { field, value } => object(
                "wildcard",
                object(field.as_str(), object("value", value.as_str())),
            ),
            Self::Exists { field } => object("exists", object("field", field.as_str())),
            Self::Ids { values } => object("ids", object("values", string_array(values))),
            Self::Range(range) => range.build(),
            Self::Bool(bool_query) => bool_query.build(),
            Self::HasChild { child_type, query } => object(
                "has_child",
                object_of(vec![
                    ("type", Value::from(child_type.as_str())),
                    ("query", query.build()),
                ]),
            ),
            Self::HasParent { parent_type, query } => object(
                "has_parent",
                object_of(vec![
                    ("parent_type", Value::from(parent_type.as_str())),
                    ("query", query.build()),
                ]),
            ),
            Self::Nested { path, query } => object(
                "nested",
                object_of(vec![
                    ("path", Value::from(path.as_str())),
                    ("query", query.build()),
                ]),
            ),
            Self::ConstantScore { filter, boost } => {
                let mut body = Map::new();
                body.insert(String::from("filter"), filter.build());
                if let Some(boost) = boost {
                    body.insert(String::from("boost"), Value::from(*boost));
                }
                object("constant_score", Value::Object(body))
            }
        }
    }
}

impl From<BoolQuery> for QueryBuilder {
    fn from(bool_query: BoolQuery) -> Self {
        Self::Bool(bool_query)
    }
}

impl From<RangeQuery> for QueryBuilder {
    fn from(range: RangeQuery) -> Self {
        Self::Range(range)
    }
}

/// Compound boolean clause:
/// `https://www.elastic.co/guide/en/elasticsearch/reference/current/query-dsl-bool-query.html`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoolQuery {
    must: Vec<QueryBuilder>,
    should: Vec<QueryBuilder>,
    must_not: Vec<QueryBuilder>,
    filter: Vec<QueryBuilder>,
    minimum_should_match: Option<Value>,
    boost: Option<f64>,
}

impl BoolQuery {
    pub fn must(mut self, query: impl Into<QueryBuilder>) -> Self {
        self.must.push(query.into());
        self
    }

    pub fn should(mut self, query: impl Into<QueryBuilder>) -> Self {
        self.should.push(query.into());
        self
    }

    pub fn must_not(mut self, query: impl Into<QueryBuilder>) -> Self {
        self.must_not.push(query.into());
        self
    }

    pub fn filter(mut self, query: impl Into<QueryBuilder>) -> Self {
        self.filter.push(query.into());
        self
    }

    /// Accepts either a count (`2`) or a percentage string (`"75%"`)
    pub fn minimum_should_match(mut self, minimum: impl Into<Value>) -> Self {
        self.minimum_should_match = Some(minimum.into());
        self
    }

    pub fn boost(mut self, boost: f64) -> Self {
        self.boost = Some(boost);
        self
    }

    /// Whether no clauses have been added yet
    pub fn is_empty(&self) -> bool {
        self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
            && self.filter.is_empty()
    }

    pub fn build(&self) -> Value {
        let mut body = Map::new();
        for (key, clauses) in &[
            ("must", &self.must),
            ("should", &self.should),
            ("must_not", &self.must_not),
            ("filter", &self.filter),
        ] {
            if !clauses.is_empty() {
                let rendered = clauses.iter().map(QueryBuilder::build).collect::<Vec<_>>();
                body.insert(String::from(*key), Value::Array(rendered));
            }
        }
        if let Some(minimum) = &self.minimum_should_match {
            body.insert(String::from("minimum_should_match"), minimum.clone());
        }
        if let Some(boost) = self.boost {
            body.insert(String::from("boost"), Value::from(boost));
        }
        object("bool", Value::Object(body))
    }
}

/// Range clause over a single field:
/// `https://www.elastic.co/guide/en/elasticsearch/reference/current/query-dsl-range-query.html`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeQuery {
    field: String,
    bounds: Vec<(&'static str, Value)>,
}

impl RangeQuery {
    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.bound("gt", value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.bound("gte", value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.bound("lt", value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.bound("lte", value.into())
    }

    /// Replaces an existing bound of the same kind in place
    fn bound(mut self, kind: &'static str, value: Value) -> Self {
        match self.bounds.iter_mut().find(|(k, _)| *k == kind) {
            Some(existing) => existing.1 = value,
            None => self.bounds.push((kind, value)),
        }
        self
    }

    pub fn build(&self) -> Value {
        let bounds = object_of(self.bounds.iter().map(|(k, v)| (*k, v.clone())));
        object("range", object(self.field.as_str(), bounds))
    }
}

pub fn match_all() -> QueryBuilder {
    QueryBuilder::MatchAll
}

pub fn term(field: impl Into<String>, value: impl Into<Value>) -> QueryBuilder {
    QueryBuilder::Term {
        field: field.into(),
        value: value.into(),
    }
}

pub fn terms<V: Into<Value>>(
    field: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> QueryBuilder {
    QueryBuilder::Terms {
        field: field.into(),
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn match_query(field: impl Into<String>, query: impl Into<Value>) -> QueryBuilder {
    QueryBuilder::Match {
        field: field.into(),
        query: query.into(),
    }
}

pub fn prefix(field: impl Into<String>, value: impl Into<String>) -> QueryBuilder {
    QueryBuilder::Prefix {
        field: field.into(),
        value: value.into(),
    }
}

pub fn wildcard(field: impl Into<String>, value: impl Into<String>) -> QueryBuilder {
    QueryBuilder::Wildcard {
        field: field.into(),
        value: value.into(),
    }
}

pub fn exists(field: impl Into<String>) -> QueryBuilder {
    QueryBuilder::Exists {
        field: field.into(),
    }
}

pub fn ids<S: Into<String>>(values: impl IntoIterator<Item = S>) -> QueryBuilder {
    QueryBuilder::Ids {
        values: values.into_iter().map(Into::into).collect(),
    }
}

pub fn range(field: impl Into<String>) -> RangeQuery {
    RangeQuery {
        field: field.into(),
        bounds: Vec::new(),
    }
}

pub fn bool_query() -> BoolQuery {
    BoolQuery::default()
}

pub fn has_child(child_type: impl Into<String>, query: impl Into<QueryBuilder>) -> QueryBuilder {
    QueryBuilder::HasChild {
        child_type: child_type.into(),
        query: Box::new(query.into()),
    }
}

pub fn has_parent(parent_type: impl Into<String>, query: impl Into<QueryBuilder>) -> QueryBuilder {
    QueryBuilder::HasParent {
        parent_type: parent_type.into(),
        query: Box::new(query.into()),
    }
}

pub fn nested(path: impl Into<String>, query: impl Into<QueryBuilder>) -> QueryBuilder {
    QueryBuilder::Nested {
        path: path.into(),
        query: Box::new(query.into()),
    }
}

pub fn constant_score(filter: impl Into<QueryBuilder>, boost: Option<f64>) -> QueryBuilder {
    QueryBuilder::ConstantScore {
        filter: Box::new(filter.into()),
        boost,
    }
}
