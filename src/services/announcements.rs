use std::sync::Arc;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::mirror::{self, CancelHandle};
use crate::models::{
    Announcement, CreateAnnouncementDto, Record, UpdateAnnouncementDto, timestamp, to_fields,
};
use crate::session::Session;
use crate::store::{Direction, DocumentStore, Filter, Query};

pub const RECENT_LIMIT: usize = 10;
pub const IMPORTANT_LIMIT: usize = 5;

#[derive(Clone)]
pub struct Announcements {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl Announcements {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn recent_query(limit: usize) -> Query {
        Query::collection(Announcement::COLLECTION)
            .order_by(Announcement::SORT_FIELD, Direction::Desc)
            .limit(limit)
    }

    pub fn important_query(limit: usize) -> Query {
        Query::collection(Announcement::COLLECTION)
            .filter(Filter::eq("isImportant", true))
            .order_by(Announcement::SORT_FIELD, Direction::Desc)
            .limit(limit)
    }

    pub async fn create(
        &self,
        session: &Session,
        dto: &CreateAnnouncementDto,
    ) -> Result<String, StoreError> {
        let now = timestamp(self.clock.now());
        let mut fields = to_fields(dto)?;
        fields.insert("createdBy".into(), session.user_id.clone().into());
        fields.insert("createdByName".into(), session.display_name.clone().into());
        fields.insert("createdAt".into(), now.clone());
        fields.insert("updatedAt".into(), now);

        let id = self.store.create(Announcement::COLLECTION, fields).await?;
        tracing::info!(id = %id, author = %session.user_id, "announcement created");
        Ok(id)
    }

    pub async fn update(&self, id: &str, dto: &UpdateAnnouncementDto) -> Result<(), StoreError> {
        let mut patch = to_fields(dto)?;
        patch.insert("updatedAt".into(), timestamp(self.clock.now()));
        self.store.update(Announcement::COLLECTION, id, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(Announcement::COLLECTION, id).await?;
        tracing::info!(id = %id, "announcement deleted");
        Ok(())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Announcement>, StoreError> {
        self.fetch(Self::recent_query(limit)).await
    }

    pub async fn important(&self, limit: usize) -> Result<Vec<Announcement>, StoreError> {
        self.fetch(Self::important_query(limit)).await
    }

    async fn fetch(&self, query: Query) -> Result<Vec<Announcement>, StoreError> {
        super::fetch(&*self.store, &query).await
    }

    pub fn subscribe_recent<D, E>(&self, limit: usize, on_data: D, on_error: E) -> CancelHandle
    where
        D: FnMut(Vec<Announcement>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        mirror::subscribe::<Announcement, _, _>(
            Arc::clone(&self.store),
            Self::recent_query(limit),
            on_data,
            on_error,
        )
    }

    // Falls back to client-side ordering when the composite index is missing
    pub fn subscribe_important<D, E>(&self, limit: usize, on_data: D, on_error: E) -> CancelHandle
    where
        D: FnMut(Vec<Announcement>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        mirror::subscribe::<Announcement, _, _>(
            Arc::clone(&self.store),
            Self::important_query(limit),
            on_data,
            on_error,
        )
    }
}
