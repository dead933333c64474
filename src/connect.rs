//! Contains utility functions that connect to Elasticsearch,
//! used when the embedding application initializes its client

use crate::config::Configuration;
use crate::transport::ElasticsearchTransport;
use crate::Client;
use anyhow::Context;
use elasticsearch::auth::Credentials;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::http::Url;
use elasticsearch::Elasticsearch;
use slog::Logger;
use std::sync::Arc;

/// Creates the underlying Elasticsearch client without contacting the cluster
pub fn new_elasticsearch(config: &Configuration) -> anyhow::Result<Elasticsearch> {
    let es_config = &config.elasticsearch;
    let url = Url::parse(&es_config.url).context("could not parse the elasticsearch url")?;
    let mut builder = TransportBuilder::new(SingleNodeConnectionPool::new(url));
    if let Some(username) = &es_config.auth_username {
        let password = es_config.auth_password.clone().unwrap_or_default();
        builder = builder.auth(Credentials::Basic(username.clone(), password));
    }
    let es_transport = builder
        .build()
        .context("could not create elasticsearch client")?;
    Ok(Elasticsearch::new(es_transport))
}

/// Creates a new client
/// and pings the cluster to ensure that the connection is live.
pub async fn to_elasticsearch(config: &Configuration, logger: Logger) -> anyhow::Result<Client> {
    let elasticsearch = new_elasticsearch(config)?;

    let logger = logger.new(slog::o!("url" => config.elasticsearch.url.clone()));
    let wait_until_reachable = || async {
        let response = elasticsearch.ping().send().await.map_err(|err| {
            slog::info!(logger, "cluster is not reachable yet, retrying"; "error" => ?err);
            backoff::Error::Transient(anyhow::Error::from(err))
        })?;
        response.error_for_status_code().map_err(|err| {
            slog::info!(logger, "cluster rejected the ping, retrying"; "error" => ?err);
            backoff::Error::Transient(anyhow::Error::from(err))
        })?;
        Ok::<(), backoff::Error<anyhow::Error>>(())
    };

    backoff::future::retry(config.initialization_backoff.build(), wait_until_reachable)
        .await
        .context("elasticsearch stayed unreachable for the whole initialization backoff")?;

    slog::info!(logger, "elasticsearch is reachable, client ready");
    let transport = Arc::new(ElasticsearchTransport::new(elasticsearch));
    let mut client = Client::new(transport, logger);
    if let Some(timeout) = config.default_request_timeout {
        client = client.with_default_timeout(timeout);
    }
    Ok(client)
}
