use std::sync::Arc;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::mirror::{self, CancelHandle};
use crate::models::{
    Course, CreateCourseDto, DEFAULT_DURATION, Level, Record, UpdateCourseDto, timestamp,
    to_fields,
};
use crate::rate_limit::{Admission, LimitStatus, RateLimiter};
use crate::session::Session;
use crate::store::{Direction, DocumentStore, Filter, Query};
use crate::youtube::{self, ThumbnailQuality};

pub const PUBLISHED_LIMIT: usize = 10;
pub const ALL_LIMIT: usize = 100;

pub struct Courses {
    store: Arc<dyn DocumentStore>,
    limiter: RateLimiter,
}

impl Courses {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>, quota: u32) -> Self {
        Self {
            limiter: RateLimiter::new(Arc::clone(&store), clock, Course::COLLECTION, quota),
            store,
        }
    }

    fn newest_first(query: Query, limit: usize) -> Query {
        query
            .order_by(Course::SORT_FIELD, Direction::Desc)
            .limit(limit)
    }

    pub fn published_query(limit: usize) -> Query {
        Self::newest_first(
            Query::collection(Course::COLLECTION).filter(Filter::eq("isPublished", true)),
            limit,
        )
    }

    pub fn all_query(limit: usize) -> Query {
        Self::newest_first(Query::collection(Course::COLLECTION), limit)
    }

    pub fn category_query(category: &str, limit: usize) -> Query {
        Self::newest_first(
            Query::collection(Course::COLLECTION)
                .filter(Filter::eq("category", category))
                .filter(Filter::eq("isPublished", true)),
            limit,
        )
    }

    pub fn level_query(level: Level, limit: usize) -> Query {
        Self::newest_first(
            Query::collection(Course::COLLECTION)
                .filter(Filter::eq("level", level.as_str()))
                .filter(Filter::eq("isPublished", true)),
            limit,
        )
    }

    pub async fn monthly_limit(&self, session: &Session) -> Result<LimitStatus, StoreError> {
        self.limiter.check_limit(&session.user_id).await
    }

    /// Create a course if the author is under the monthly quota.
    pub async fn create(
        &self,
        session: &Session,
        dto: &CreateCourseDto,
    ) -> Result<Admission, StoreError> {
        let mut fields = to_fields(dto)?;
        fields.insert(
            "thumbnailUrl".into(),
            youtube::thumbnail_url(&dto.youtube_url, ThumbnailQuality::default()).into(),
        );
        fields.insert("duration".into(), DEFAULT_DURATION.into());
        fields.insert("createdByName".into(), session.display_name.clone().into());
        fields.insert("updatedAt".into(), timestamp(self.limiter.clock().now()));

        self.limiter.admit(&session.user_id, fields).await
    }

    pub async fn update(&self, id: &str, dto: &UpdateCourseDto) -> Result<(), StoreError> {
        let mut patch = to_fields(dto)?;
        if let Some(url) = &dto.youtube_url {
            patch.insert(
                "thumbnailUrl".into(),
                youtube::thumbnail_url(url, ThumbnailQuality::default()).into(),
            );
        }
        if dto.duration.is_none() {
            patch.insert("duration".into(), DEFAULT_DURATION.into());
        }
        patch.insert("updatedAt".into(), timestamp(self.limiter.clock().now()));

        self.store.update(Course::COLLECTION, id, patch).await?;
        tracing::info!(id = %id, "course updated");
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(Course::COLLECTION, id).await?;
        tracing::info!(id = %id, "course deleted");
        Ok(())
    }

    pub async fn published(&self, limit: usize) -> Result<Vec<Course>, StoreError> {
        super::fetch(&*self.store, &Self::published_query(limit)).await
    }

    pub async fn all(&self, limit: usize) -> Result<Vec<Course>, StoreError> {
        super::fetch(&*self.store, &Self::all_query(limit)).await
    }

    pub async fn by_category(&self, category: &str, limit: usize) -> Result<Vec<Course>, StoreError> {
        super::fetch(&*self.store, &Self::category_query(category, limit)).await
    }

    pub async fn by_level(&self, level: Level, limit: usize) -> Result<Vec<Course>, StoreError> {
        super::fetch(&*self.store, &Self::level_query(level, limit)).await
    }

    pub fn subscribe_published<D, E>(&self, limit: usize, on_data: D, on_error: E) -> CancelHandle
    where
        D: FnMut(Vec<Course>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        mirror::subscribe::<Course, _, _>(
            Arc::clone(&self.store),
            Self::published_query(limit),
            on_data,
            on_error,
        )
    }
}
