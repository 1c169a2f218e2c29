use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{MissedTickBehavior, interval};

use super::{Document, DocumentStore, Fields, Query, Subscription};
use crate::error::StoreError;

// Consecutive failed polls a live subscription rides out before giving up
const MAX_MISSED_POLLS: u32 = 5;

// Error body returned by the hosted store
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// Client for a hosted document store speaking JSON over HTTP.
///
/// The store pushes nothing itself, so subscriptions poll their query every
/// `poll_interval` and only emit when the snapshot actually changed.
#[derive(Clone)]
pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
}

impl RestStore {
    pub fn new(base_url: &str, poll_interval: Duration) -> Self {
        // add http:// if not present
        let base_url = if base_url.starts_with("http") {
            base_url.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", base_url.trim_end_matches('/'))
        };
        Self {
            client: reqwest::Client::new(),
            base_url,
            poll_interval,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!("{}/v1/{}/{}", self.base_url, collection, id)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        collection: &str,
        id: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let res = request
            .timeout(Duration::from_secs(10))
            .send()
            .await
            .map_err(|e| StoreError::unavailable(format!("request failed: {}", e)))?;

        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let body = res.json::<ErrorBody>().await.unwrap_or_default();
        Err(map_status(status, body, collection, id))
    }
}

fn map_status(status: StatusCode, body: ErrorBody, collection: &str, id: &str) -> StoreError {
    let message = body
        .message
        .unwrap_or_else(|| format!("store responded {}", status));
    let failed_precondition = body.code.as_deref() == Some("failed-precondition");

    if status == StatusCode::PRECONDITION_FAILED || failed_precondition {
        StoreError::IndexMissing(message)
    } else if status == StatusCode::NOT_FOUND {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    } else {
        StoreError::BackendUnavailable(message)
    }
}

// Snapshot identity, used to suppress unchanged poll results
fn fingerprint(docs: &[Document]) -> String {
    let mut hasher = Sha256::new();
    for doc in docs {
        hasher.update(doc.id.as_bytes());
        hasher.update(serde_json::to_vec(&doc.fields).unwrap_or_default());
    }
    format!("{:x}", hasher.finalize())
}

async fn parse<T: serde::de::DeserializeOwned>(res: reqwest::Response) -> Result<T, StoreError> {
    res.json::<T>()
        .await
        .map_err(|e| StoreError::unavailable(format!("parse error: {}", e)))
}

#[async_trait]
impl DocumentStore for RestStore {
    async fn create(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let url = format!("{}/v1/{}", self.base_url, collection);
        let res = self
            .send(self.client.post(url).json(&fields), collection, "")
            .await?;
        Ok(parse::<Created>(res).await?.id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let request = self.client.put(self.doc_url(collection, id)).json(&fields);
        self.send(request, collection, id).await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let request = self.client.get(self.doc_url(collection, id));
        match self.send(request, collection, id).await {
            Ok(res) => Ok(Some(parse(res).await?)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, collection: &str, id: &str, patch: Fields) -> Result<(), StoreError> {
        let request = self.client.patch(self.doc_url(collection, id)).json(&patch);
        self.send(request, collection, id).await?;
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let request = self.client.delete(self.doc_url(collection, id));
        match self.send(request, collection, id).await {
            Ok(_) | Err(StoreError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        let url = format!("{}/v1/query", self.base_url);
        let res = self
            .send(self.client.post(url).json(query), &query.collection, "")
            .await?;
        parse(res).await
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<String> = None;
            let mut missed = 0u32;

            loop {
                tokio::select! {
                    // fires on explicit release and when the Subscription is dropped
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {}
                }

                match store.query(&query).await {
                    Ok(docs) => {
                        if missed > 0 {
                            tracing::info!(collection = %query.collection, missed, "poll recovered");
                            missed = 0;
                        }
                        let current = fingerprint(&docs);
                        if last.as_deref() == Some(current.as_str()) {
                            continue;
                        }
                        last = Some(current);
                        if tx.send(Ok(docs)).is_err() {
                            break;
                        }
                    }
                    // outages after the first snapshot are retried on the next tick
                    Err(StoreError::BackendUnavailable(reason))
                        if last.is_some() && missed + 1 < MAX_MISSED_POLLS =>
                    {
                        missed += 1;
                        tracing::warn!(collection = %query.collection, missed, %reason, "poll failed, retrying");
                    }
                    Err(e) => {
                        tracing::debug!(collection = %query.collection, error = %e, "poll failed");
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(rx, move || {
            let _ = stop_tx.send(());
        }))
    }
}
