//! Bulk write actions and the request that submits them:
//! `https://www.elastic.co/guide/en/elasticsearch/reference/7.10/docs-bulk.html`

use crate::api_bindings;
use crate::json::{object, object_of};
use crate::transport::{Transport, TransportError, UTF_8};
use serde_json::Value;
use slog::Logger;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BulkVerb {
    Index,
    Update,
    Delete,
}

impl BulkVerb {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BulkActionError {
    #[error("missing property '{0}'")]
    MissingProperty(&'static str),
}

/// One action of a bulk request.
/// Index, id and type are all required; they are checked when the action is rendered.
#[derive(Clone, Debug, PartialEq)]
pub struct BulkActionBuilder {
    verb: BulkVerb,
    index: String,
    id: String,
    doc_type: String,
    payload: Option<Value>,
}

impl BulkActionBuilder {
    /// Creates or replaces a whole document
    pub fn index(
        index: impl Into<String>,
        id: impl Into<String>,
        doc_type: impl Into<String>,
        source: Value,
    ) -> Self {
        Self::new(BulkVerb::Index, index, id, doc_type, Some(source))
    }

    /// Merges the given partial document into an existing one
    pub fn update(
        index: impl Into<String>,
        id: impl Into<String>,
        doc_type: impl Into<String>,
        doc: Value,
    ) -> Self {
        Self::new(BulkVerb::Update, index, id, doc_type, Some(object("doc", doc)))
    }

    pub fn delete(
        index: impl Into<String>,
        id: impl Into<String>,
        doc_type: impl Into<String>,
    ) -> Self {
        Self::new(BulkVerb::Delete, index, id, doc_type, None)
    }

    fn new(
        verb: BulkVerb,
        index: impl Into<String>,
        id: impl Into<String>,
        doc_type: impl Into<String>,
        payload: Option<Value>,
    ) -> Self {
        Self {
            verb,
            index: index.into(),
            id: id.into(),
            doc_type: doc_type.into(),
            payload,
        }
    }

    pub const fn verb(&self) -> BulkVerb {
        self.verb
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reports the first missing property, checking `id`, then `index`, then `type`
    pub fn validate(&self) -> Result<(), BulkActionError> {
        let required = [
            ("id", &self.id),
            ("index", &self.index),
            ("type", &self.doc_type),
        ];
        match required.into_iter().find(|(_, value)| value.is_empty()) {
            Some((name, _)) => Err(BulkActionError::MissingProperty(name)),
            None => Ok(()),
        }
    }

    /// Renders the action line, followed by the payload line for index and update
    pub fn to_bulk_request_action(&self) -> Result<String, BulkActionError> {
        self.validate()?;

        let metadata = object_of(vec![
            ("_index", Value::from(self.index.as_str())),
            ("_id", Value::from(self.id.as_str())),
            ("_type", Value::from(self.doc_type.as_str())),
        ]);
        let action = object(self.verb.as_str(), metadata).to_string();
        match &self.payload {
            Some(payload) => Ok(format!("{}\n{}", action, payload)),
            None => Ok(action),
        }
    }
}

#[derive(Clone, Debug)]
pub struct BulkStatus {
    pub took: i64,
    pub errors: bool,
    pub items: Vec<BulkItem>,
}

#[derive(Clone, Debug)]
pub enum BulkItem {
    Create(api_bindings::bulk::ResultItemAction),
    Delete(api_bindings::bulk::ResultItemAction),
    Index(api_bindings::bulk::ResultItemAction),
    Update(api_bindings::bulk::ResultItemAction),
}

impl BulkItem {
    const fn action(&self) -> &api_bindings::bulk::ResultItemAction {
        match self {
            Self::Create(action)
            | Self::Delete(action)
            | Self::Index(action)
            | Self::Update(action) => action,
        }
    }

    pub fn id(&self) -> &str {
        &self.action().id
    }

    /// Whether Elasticsearch reported an error for this item
    pub fn is_failure(&self) -> bool {
        self.action().error.is_some()
    }
}

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("a bulk action was invalid")]
    InvalidAction(#[from] BulkActionError),
    #[error("performing bulk operation failed")]
    Transport(#[source] TransportError),
    #[error("bulk operation failed with a non-success status code {status_code} {status_text}: {body}")]
    ErrorStatusCode {
        status_code: u16,
        status_text: String,
        body: String,
    },
    #[error("failed to decode response body from elasticsearch")]
    FailedToDecode(#[source] serde_json::Error),
}

/// Collects bulk actions and submits them as one newline-delimited request to `/_bulk`
pub struct BulkRequestBuilder {
    transport: Arc<dyn Transport>,
    logger: Logger,
    actions: Vec<BulkActionBuilder>,
    timeout: Option<Duration>,
}

impl BulkRequestBuilder {
    pub(crate) fn new(transport: Arc<dyn Transport>, logger: Logger) -> Self {
        Self {
            transport,
            logger,
            actions: Vec::new(),
            timeout: None,
        }
    }

    pub fn add(mut self, action: BulkActionBuilder) -> Self {
        self.actions.push(action);
        self
    }

    pub fn add_all(mut self, actions: impl IntoIterator<Item = BulkActionBuilder>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Renders the NDJSON body, every line terminated by a newline
    pub fn build(&self) -> Result<String, BulkActionError> {
        let mut body = String::new();
        for action in &self.actions {
            body.push_str(&action.to_bulk_request_action()?);
            body.push('\n');
        }
        Ok(body)
    }

    /// Sends all actions. An empty bulk is not sent at all.
    pub async fn execute(self) -> Result<BulkStatus, BulkError> {
        if self.actions.is_empty() {
            slog::debug!(self.logger, "skipping empty bulk request");
            return Ok(BulkStatus {
                took: 0,
                errors: false,
                items: Vec::new(),
            });
        }

        let body = self.build()?;
        slog::debug!(self.logger, "sending bulk request"; "action_count" => self.actions.len());

        let mut request = self
            .transport
            .prepare_post("/_bulk")
            .body(body)
            .charset(UTF_8)
            .header("Content-Type", "application/x-ndjson");
        if let Some(timeout) = self.timeout {
            request = request.request_timeout(timeout);
        }

        let response = self.transport.execute(request).await.map_err(|err| {
            slog::warn!(self.logger, "sending bulk request failed"; "error" => ?err);
            BulkError::Transport(err)
        })?;
        if !response.is_success() {
            slog::warn!(
                self.logger,
                "bulk request returned non-success status code";
                "status_code" => response.status_code,
            );
            return Err(BulkError::ErrorStatusCode {
                status_code: response.status_code,
                status_text: response.status_text,
                body: response.body,
            });
        }

        let response_struct =
            serde_json::from_str::<api_bindings::bulk::Response>(&response.body)
                .map_err(BulkError::FailedToDecode)?;
        Ok(self.convert_to_status(response_struct))
    }

    fn convert_to_status(&self, response: api_bindings::bulk::Response) -> BulkStatus {
        let api_bindings::bulk::Response {
            took,
            errors,
            items: raw_items,
        } = response;

        let mut items = Vec::<BulkItem>::with_capacity(raw_items.len());
        for raw_item in raw_items {
            let actions = vec![
                raw_item.create.map(BulkItem::Create),
                raw_item.delete.map(BulkItem::Delete),
                raw_item.index.map(BulkItem::Index),
                raw_item.update.map(BulkItem::Update),
            ];
            let mut already_had_action = false;
            for item in actions.into_iter().flatten() {
                if already_had_action {
                    slog::warn!(
                        self.logger,
                        "bulk response from elasticsearch contained more than one action in an item";
                        "last_action" => ?items.last(),
                        "this_action" => ?item
                    );
                }
                already_had_action = true;
                items.push(item);
            }
        }

        if errors {
            let failed = items.iter().filter(|item| item.is_failure()).count();
            slog::warn!(self.logger, "bulk request had failed items"; "failed_count" => failed);
        }

        BulkStatus {
            took,
            errors,
            items,
        }
    }
}
