//! Live, client-side ordered copies of remote collections.
//!
//! A mirror owns one store subscription and is the only writer of the list it
//! emits. Each notification is converted, sorted newest-first and handed to
//! the caller as a fresh `Vec`; notifications are applied strictly in
//! delivery order.
//!
//! Opening follows a two-stage strategy. The primary attempt asks the store
//! to filter and order. If the store answers that the ordering needs a
//! composite index it does not have, the mirror reopens with the filter alone
//! and orders on its side. The output is identical either way, because the
//! client sort is always applied and it is stable.
//!
//! ```text
//! Uninitialized -> Subscribing -> Streaming -> Cancelled
//!                  Subscribing -> Degraded -> Streaming
//!                  any live state -> Failed
//! ```

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::StoreError;
use crate::metrics::{MIRROR_EVENTS, MIRRORED_ITEMS};
use crate::models::Record;
use crate::store::{Document, DocumentStore, Query, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MirrorState {
    Uninitialized = 0,
    Subscribing = 1,
    Degraded = 2,
    Streaming = 3,
    Cancelled = 4,
    Failed = 5,
}

impl MirrorState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => MirrorState::Uninitialized,
            1 => MirrorState::Subscribing,
            2 => MirrorState::Degraded,
            3 => MirrorState::Streaming,
            4 => MirrorState::Cancelled,
            _ => MirrorState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, MirrorState::Cancelled | MirrorState::Failed)
    }
}

struct Shared {
    state: AtomicU8,
    cancel: watch::Sender<bool>,
}

impl Shared {
    fn state(&self) -> MirrorState {
        MirrorState::from_u8(self.state.load(Ordering::Acquire))
    }

    // Terminal states are never left; returns false if already terminal
    fn advance(&self, next: MirrorState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (!MirrorState::from_u8(raw).is_terminal()).then_some(next as u8)
            })
            .is_ok()
    }
}

/// Stops a mirror. Cloneable; every call after the first is a no-op.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        if self.shared.advance(MirrorState::Cancelled) {
            tracing::debug!("mirror cancelled");
        }
        self.shared.cancel.send_replace(true);
    }

    pub fn state(&self) -> MirrorState {
        self.shared.state()
    }
}

// A successfully opened subscription together with its first snapshot
struct Opened {
    subscription: Subscription,
    first: Vec<Document>,
}

async fn open(store: &dyn DocumentStore, query: Query) -> Result<Opened, StoreError> {
    let mut subscription = store.subscribe(query).await?;
    match subscription.next().await {
        Some(Ok(first)) => Ok(Opened {
            subscription,
            first,
        }),
        Some(Err(e)) => Err(e),
        None => Err(StoreError::unavailable("subscription closed before first snapshot")),
    }
}

// Failures the filter-only attempt can recover from
fn recoverable(err: &StoreError) -> bool {
    err.is_index_missing()
}

async fn establish(
    store: &dyn DocumentStore,
    query: &Query,
    shared: &Shared,
) -> Result<Opened, StoreError> {
    match open(store, query.clone()).await {
        Err(e) if recoverable(&e) => {
            shared.advance(MirrorState::Degraded);
            MIRROR_EVENTS.with_label_values(&["fallback"]).inc();
            tracing::warn!(
                collection = %query.collection,
                reason = %e,
                "missing index, falling back to client-side ordering"
            );
            open(store, query.filter_only()).await
        }
        other => other,
    }
}

/// Convert and order one snapshot of `query`: newest first, ties in arrival
/// order.
///
/// Documents lacking the query's ordered field are dropped before conversion,
/// as the store does when it orders server-side, so a filter-only snapshot
/// yields the same list as an ordered one.
pub fn materialize<T: Record>(mut docs: Vec<Document>, query: &Query) -> Result<Vec<T>, StoreError> {
    if let Some(order) = &query.order_by {
        docs.retain(|doc| doc.fields.contains_key(&order.field));
    }
    let mut items = docs
        .into_iter()
        .map(T::from_document)
        .collect::<Result<Vec<T>, _>>()?;
    items.sort_by(|a, b| b.sort_key().cmp(&a.sort_key()));
    if let Some(limit) = query.limit {
        items.truncate(limit);
    }
    Ok(items)
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|cancelled| *cancelled).await;
}

async fn run<T, D, E>(
    shared: Arc<Shared>,
    store: Arc<dyn DocumentStore>,
    query: Query,
    mut on_data: D,
    mut on_error: E,
) where
    T: Record,
    D: FnMut(Vec<T>) + Send + 'static,
    E: FnMut(StoreError) + Send + 'static,
{
    let mut cancel_rx = shared.cancel.subscribe();
    if !shared.advance(MirrorState::Subscribing) {
        return;
    }

    let opened = tokio::select! {
        _ = cancelled(&mut cancel_rx) => return,
        opened = establish(&*store, &query, &shared) => opened,
    };
    let Opened {
        mut subscription,
        first,
    } = match opened {
        Ok(opened) => opened,
        Err(e) => {
            fail(&shared, &query, e, &mut on_error);
            return;
        }
    };
    if !shared.advance(MirrorState::Streaming) {
        return;
    }

    let mut pending = Some(first);
    loop {
        let docs = match pending.take() {
            Some(docs) => docs,
            None => tokio::select! {
                _ = cancelled(&mut cancel_rx) => break,
                event = subscription.next() => match event {
                    Some(Ok(docs)) => docs,
                    Some(Err(e)) => {
                        fail(&shared, &query, e, &mut on_error);
                        break;
                    }
                    None => {
                        let e = StoreError::unavailable("subscription closed by store");
                        fail(&shared, &query, e, &mut on_error);
                        break;
                    }
                },
            },
        };

        MIRROR_EVENTS.with_label_values(&["notification"]).inc();
        match materialize::<T>(docs, &query) {
            Ok(items) => on_data(items),
            // keep streaming, the previous list stays current
            Err(e) => on_error(e),
        }
    }
    // dropping the subscription releases the store channel
    drop(subscription);
}

fn fail<E: FnMut(StoreError)>(shared: &Shared, query: &Query, err: StoreError, on_error: &mut E) {
    if !shared.advance(MirrorState::Failed) {
        return;
    }
    MIRROR_EVENTS.with_label_values(&["failure"]).inc();
    tracing::error!(collection = %query.collection, error = %err, "mirror failed");
    on_error(err);
}

/// Start mirroring `query` into `on_data`.
///
/// `query` should carry the server-side ordering on `T::SORT_FIELD`; the
/// mirror drops it on its own if the store cannot serve it. `on_error` is
/// called for unrecoverable subscription errors and for snapshots that fail
/// to convert. Must be called from within a tokio runtime.
pub fn subscribe<T, D, E>(
    store: Arc<dyn DocumentStore>,
    query: Query,
    on_data: D,
    on_error: E,
) -> CancelHandle
where
    T: Record,
    D: FnMut(Vec<T>) + Send + 'static,
    E: FnMut(StoreError) + Send + 'static,
{
    let (cancel, _) = watch::channel(false);
    let shared = Arc::new(Shared {
        state: AtomicU8::new(MirrorState::Uninitialized as u8),
        cancel,
    });

    tokio::spawn(run::<T, D, E>(
        Arc::clone(&shared),
        store,
        query,
        on_data,
        on_error,
    ));
    CancelHandle { shared }
}

const RETRY_INITIAL: Duration = Duration::from_millis(250);
const RETRY_MAX: Duration = Duration::from_secs(30);

fn lock(current: &Mutex<CancelHandle>) -> MutexGuard<'_, CancelHandle> {
    current.lock().unwrap_or_else(PoisonError::into_inner)
}

// One mirror feeding a live list; failures are signalled on `failed`
fn start<T>(
    store: Arc<dyn DocumentStore>,
    query: Query,
    name: &'static str,
    latest: Arc<watch::Sender<Vec<T>>>,
    delivered: Arc<AtomicBool>,
    failed: mpsc::UnboundedSender<()>,
) -> CancelHandle
where
    T: Record + Clone + Sync,
{
    subscribe::<T, _, _>(
        store,
        query,
        move |items: Vec<T>| {
            MIRRORED_ITEMS
                .with_label_values(&[name])
                .set(items.len() as i64);
            delivered.store(true, Ordering::Release);
            latest.send_replace(items);
        },
        move |err| {
            tracing::warn!(list = name, error = %err, "live list error");
            let _ = failed.send(());
        },
    )
}

/// Latest list of a mirror, readable from anywhere.
///
/// Errors leave the last list in place. When the mirror fails it is reopened
/// after a backoff that doubles up to 30s and resets once a snapshot arrives.
/// Dropping the `LiveList` cancels its mirror.
pub struct LiveList<T> {
    latest: watch::Receiver<Vec<T>>,
    current: Arc<Mutex<CancelHandle>>,
    stop: watch::Sender<bool>,
}

impl<T> LiveList<T>
where
    T: Record + Clone + Sync,
{
    pub fn spawn(store: Arc<dyn DocumentStore>, query: Query, name: &'static str) -> Self {
        let (tx, latest) = watch::channel(Vec::new());
        let tx = Arc::new(tx);
        let delivered = Arc::new(AtomicBool::new(false));
        let (failed_tx, mut failed_rx) = mpsc::unbounded_channel();
        let (stop, mut stop_rx) = watch::channel(false);

        let first = start(
            Arc::clone(&store),
            query.clone(),
            name,
            Arc::clone(&tx),
            Arc::clone(&delivered),
            failed_tx.clone(),
        );
        let current = Arc::new(Mutex::new(first));
        let supervised = Arc::clone(&current);

        tokio::spawn(async move {
            let mut delay = RETRY_INITIAL;
            loop {
                tokio::select! {
                    _ = cancelled(&mut stop_rx) => break,
                    _ = failed_rx.recv() => {}
                }
                // conversion errors keep the mirror streaming
                if lock(&supervised).state() != MirrorState::Failed {
                    continue;
                }
                if delivered.swap(false, Ordering::AcqRel) {
                    delay = RETRY_INITIAL;
                }

                tokio::select! {
                    _ = cancelled(&mut stop_rx) => break,
                    _ = tokio::time::sleep(delay) => {}
                }
                MIRROR_EVENTS.with_label_values(&["retry"]).inc();
                tracing::info!(list = name, delay_ms = delay.as_millis() as u64, "reopening live list");

                let handle = start(
                    Arc::clone(&store),
                    query.clone(),
                    name,
                    Arc::clone(&tx),
                    Arc::clone(&delivered),
                    failed_tx.clone(),
                );
                *lock(&supervised) = handle;
                // dropped while reopening
                if *stop_rx.borrow() {
                    lock(&supervised).cancel();
                    break;
                }
                delay = (delay * 2).min(RETRY_MAX);
            }
        });

        Self {
            latest,
            current,
            stop,
        }
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.latest.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.latest.clone()
    }

    pub fn state(&self) -> MirrorState {
        lock(&self.current).state()
    }
}

impl<T> Drop for LiveList<T> {
    fn drop(&mut self) {
        self.stop.send_replace(true);
        lock(&self.current).cancel();
    }
}
