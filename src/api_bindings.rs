//! Contains bindings for the Elasticsearch response bodies,
//! used to make working with responses more ergonomic

/// Source: `https://www.elastic.co/guide/en/elasticsearch/reference/7.10/search-search.html#search-api-response-body`
pub mod search {
    use serde::{Deserialize, Serialize};
    use serde_json::{Map, Value};
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Response {
        pub took: Option<u64>,
        pub timed_out: Option<bool>,
        #[serde(rename = "_shards")]
        pub shards: Option<Shards>,
        #[serde(default)]
        pub hits: Hits,
        pub aggregations: Option<Map<String, Value>>,
        #[serde(rename = "_scroll_id")]
        pub scroll_id: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Shards {
        pub total: i64,
        pub successful: i64,
        #[serde(default)]
        pub skipped: i64,
        pub failed: i64,
    }

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    pub struct Hits {
        pub total: Option<HitsTotal>,
        pub max_score: Option<f64>,
        #[serde(default)]
        pub hits: Vec<HitObject>,
    }

    /// Before 7.0 the total is a bare number;
    /// from 7.0 on it is an object that also says whether the count is exact
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(untagged)]
    pub enum HitsTotal {
        Count(u64),
        Object {
            value: u64,
            /// Missing or unrecognized relations are read as `None`
            #[serde(default, deserialize_with = "lenient_relation")]
            relation: Option<HitsTotalRelation>,
        },
    }

    impl HitsTotal {
        pub fn value(&self) -> u64 {
            match self {
                Self::Count(value) | Self::Object { value, .. } => *value,
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub enum HitsTotalRelation {
        #[serde(rename = "eq")]
        Accurate,
        #[serde(rename = "gte")]
        LowerBound,
    }

    fn lenient_relation<'de, D>(deserializer: D) -> Result<Option<HitsTotalRelation>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let relation = Option::<String>::deserialize(deserializer)?;
        Ok(match relation.as_deref() {
            Some("eq") => Some(HitsTotalRelation::Accurate),
            Some("gte") => Some(HitsTotalRelation::LowerBound),
            _ => None,
        })
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct HitObject {
        #[serde(rename = "_index")]
        pub index: Option<String>,
        #[serde(rename = "_type")]
        pub hit_type: Option<String>,
        #[serde(rename = "_id")]
        pub id: String,
        #[serde(rename = "_score")]
        pub score: Option<f64>,
        #[serde(rename = "_source")]
        pub source: Option<Value>,
        #[serde(default)]
        pub fields: HashMap<String, Value>,
        #[serde(default)]
        pub sort: Vec<Value>,
    }

    #[cfg(test)]
    mod tests {
        use super::{HitsTotal, HitsTotalRelation, Response};

        #[test]
        fn test_total_as_number() {
            let response = serde_json::from_value::<Response>(serde_json::json!({
                "took": 1,
                "hits": {"total": 7, "max_score": null, "hits": []}
            }))
            .unwrap();
            let total = response.hits.total.unwrap();
            assert!(matches!(total, HitsTotal::Count(7)));
            assert_eq!(total.value(), 7);
            assert_eq!(response.hits.max_score, None);
        }

        #[test]
        fn test_total_as_object() {
            let response = serde_json::from_value::<Response>(serde_json::json!({
                "took": 1,
                "hits": {"total": {"value": 10000, "relation": "gte"}, "hits": []}
            }))
            .unwrap();
            let total = response.hits.total.unwrap();
            assert_eq!(total.value(), 10000);
            assert!(matches!(
                total,
                HitsTotal::Object {
                    relation: Some(HitsTotalRelation::LowerBound),
                    ..
                }
            ));
        }

        #[test]
        fn test_total_object_without_relation() {
            let response = serde_json::from_value::<Response>(serde_json::json!({
                "hits": {"total": {"value": 1}, "hits": [{"_id": "P0"}]}
            }))
            .unwrap();
            let total = response.hits.total.unwrap();
            assert_eq!(total.value(), 1);
            assert!(matches!(total, HitsTotal::Object { relation: None, .. }));
            assert_eq!(response.hits.hits[0].id, "P0");

            let unknown = serde_json::from_value::<Response>(serde_json::json!({
                "hits": {"total": {"value": 3, "relation": "approx"}, "hits": []}
            }))
            .unwrap();
            assert_eq!(unknown.hits.total.unwrap().value(), 3);
        }

        #[test]
        fn test_minimal_envelope() {
            let response = serde_json::from_value::<Response>(serde_json::json!({})).unwrap();
            assert!(response.took.is_none());
            assert!(response.scroll_id.is_none());
            assert!(response.aggregations.is_none());
            assert!(response.hits.hits.is_empty());
        }
    }
}

/// Source: `https://www.elastic.co/guide/en/elasticsearch/reference/7.10/docs-bulk.html#bulk-api-response-body`
pub mod bulk {
    use elasticsearch::http::StatusCode;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Response {
        pub took: i64,
        pub errors: bool,
        pub items: Vec<ResultItem>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ResultItem {
        pub create: Option<ResultItemAction>,
        pub delete: Option<ResultItemAction>,
        pub index: Option<ResultItemAction>,
        pub update: Option<ResultItemAction>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ResultItemAction {
        #[serde(rename = "_index")]
        pub index: String,
        #[serde(rename = "_type")]
        pub r#type: Option<String>,
        #[serde(rename = "_id")]
        pub id: String,
        #[serde(rename = "_version")]
        pub version: Option<i64>,
        pub result: Option<String>,
        #[serde(rename = "_seq_no")]
        pub seq_no: Option<i64>,
        #[serde(rename = "_primary_term")]
        pub primary_term: Option<i64>,
        #[serde(with = "serde_status_code")]
        pub status: StatusCode,
        pub error: Option<Error>,
    }

    mod serde_status_code {
        use elasticsearch::http::StatusCode;
        use serde::Deserialize;

        pub fn deserialize<'de, D>(deserializer: D) -> Result<StatusCode, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            StatusCode::from_u16(u16::deserialize(deserializer)?).map_err(serde::de::Error::custom)
        }

        pub fn serialize<S>(status_code: &StatusCode, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_u16(status_code.as_u16())
        }
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Error {
        pub r#type: String,
        pub reason: String,
        pub index: Option<String>,
    }

    #[cfg(test)]
    mod tests {
        use super::Response;

        #[test]
        fn test_response_with_failed_item() {
            let response = serde_json::from_value::<Response>(serde_json::json!({
                "took": 486,
                "errors": true,
                "items": [
                    {
                        "update": {
                            "_index": "index1",
                            "_type" : "_doc",
                            "_id": "5",
                            "status": 404,
                            "error": {
                                "type": "document_missing_exception",
                                "reason": "[_doc][5]: document missing",
                                "index_uuid": "aAsFqTI0Tc2W0LCWgPNrOA",
                                "shard": "0",
                                "index": "index1"
                            }
                        }
                    },
                    {
                        "delete": {
                            "_index": "index1",
                            "_id": "6",
                            "_version": 3,
                            "result": "deleted",
                            "status": 200,
                            "_seq_no": 5,
                            "_primary_term": 1
                        }
                    }
                ]
            }))
            .unwrap();

            assert!(response.errors);
            let update = response.items[0].update.as_ref().unwrap();
            assert_eq!(update.status.as_u16(), 404);
            assert_eq!(
                update.error.as_ref().map(|e| e.r#type.as_str()),
                Some("document_missing_exception")
            );
            let delete = response.items[1].delete.as_ref().unwrap();
            assert!(delete.r#type.is_none());
            assert_eq!(delete.result.as_deref(), Some("deleted"));
        }
    }
}
