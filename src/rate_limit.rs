use std::sync::Arc;

use serde::Serialize;

use crate::clock::{Clock, RateWindow};
use crate::error::StoreError;
use crate::metrics::SUBMISSIONS;
use crate::models::timestamp;
use crate::store::{DocumentStore, Fields, Filter, Query};

pub const DEFAULT_QUOTA: u32 = 5;

// Usage figures for one owner in the current window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitStatus {
    pub count: u32,
    pub limit: u32,
    pub limit_reached: bool,
}

// Outcome of an admission attempt. Rejection is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(String),
    Rejected { count: u32, limit: u32 },
}

impl Admission {
    pub fn rejection_message(count: u32, limit: u32) -> String {
        format!(
            "Monthly limit reached! You can only post {} videos per month. You've posted {} this month.",
            limit, count
        )
    }
}

/// Counts an owner's creation events inside a window.
///
/// Only the creation timestamp is consulted, so later edits and deletions of
/// other fields never move a submission in or out of a window.
pub struct SubmissionCounter {
    store: Arc<dyn DocumentStore>,
    collection: String,
    owner_field: String,
    created_field: String,
}

impl SubmissionCounter {
    pub fn new(store: Arc<dyn DocumentStore>, collection: &str) -> Self {
        Self {
            store,
            collection: collection.to_string(),
            owner_field: "createdBy".to_string(),
            created_field: "createdAt".to_string(),
        }
    }

    pub async fn count_in_window(
        &self,
        owner_id: &str,
        window: &RateWindow,
    ) -> Result<u32, StoreError> {
        let query = Query::collection(&self.collection)
            .filter(Filter::eq(&self.owner_field, owner_id))
            .filter(Filter::gte(&self.created_field, timestamp(window.start)))
            .filter(Filter::lt(&self.created_field, timestamp(window.end)));

        let docs = self.store.query(&query).await?;
        Ok(u32::try_from(docs.len()).unwrap_or(u32::MAX))
    }
}

/// Monthly admission control for one collection.
///
/// The check and the create are two separate store calls, so concurrent
/// admissions by the same owner can overshoot the quota. This is a soft cap.
pub struct RateLimiter {
    store: Arc<dyn DocumentStore>,
    counter: SubmissionCounter,
    clock: Arc<dyn Clock>,
    quota: u32,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        collection: &str,
        quota: u32,
    ) -> Self {
        Self {
            counter: SubmissionCounter::new(Arc::clone(&store), collection),
            store,
            clock,
            quota,
        }
    }

    pub fn quota(&self) -> u32 {
        self.quota
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn check_limit(&self, owner_id: &str) -> Result<LimitStatus, StoreError> {
        let window = self.clock.current_window();
        let count = self.counter.count_in_window(owner_id, &window).await?;

        Ok(LimitStatus {
            count,
            limit: self.quota,
            limit_reached: count >= self.quota,
        })
    }

    /// Re-check the quota and create the submission when under it.
    ///
    /// `payload` gets the owner and creation time stamped in. A failing
    /// re-check aborts the create.
    pub async fn admit(&self, owner_id: &str, mut payload: Fields) -> Result<Admission, StoreError> {
        let status = self.check_limit(owner_id).await?;
        if status.limit_reached {
            SUBMISSIONS.with_label_values(&["rejected"]).inc();
            tracing::info!(
                owner = %owner_id,
                count = status.count,
                limit = status.limit,
                "submission rejected: monthly limit reached"
            );
            return Ok(Admission::Rejected {
                count: status.count,
                limit: status.limit,
            });
        }

        payload.insert(
            self.counter.owner_field.clone(),
            owner_id.to_string().into(),
        );
        payload.insert(
            self.counter.created_field.clone(),
            timestamp(self.clock.now()),
        );
        let id = self.store.create(&self.counter.collection, payload).await?;

        SUBMISSIONS.with_label_values(&["admitted"]).inc();
        tracing::info!(owner = %owner_id, id = %id, count = status.count + 1, "submission admitted");
        Ok(Admission::Admitted(id))
    }
}
