use std::sync::Arc;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::mirror::{self, CancelHandle};
use crate::models::{
    CreateMaterialDto, Material, Record, UpdateMaterialDto, timestamp, to_fields,
};
use crate::session::Session;
use crate::store::{Direction, DocumentStore, Filter, Query};

pub const RECENT_LIMIT: usize = 5;

#[derive(Clone)]
pub struct Materials {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl Materials {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn recent_query(limit: usize) -> Query {
        Query::collection(Material::COLLECTION)
            .order_by(Material::SORT_FIELD, Direction::Desc)
            .limit(limit)
    }

    pub fn course_query(course_id: &str) -> Query {
        Query::collection(Material::COLLECTION)
            .filter(Filter::eq("courseId", course_id))
            .order_by(Material::SORT_FIELD, Direction::Desc)
    }

    pub async fn create(
        &self,
        session: &Session,
        dto: &CreateMaterialDto,
    ) -> Result<String, StoreError> {
        let now = timestamp(self.clock.now());
        let mut fields = to_fields(dto)?;
        fields.insert("uploadedBy".into(), session.user_id.clone().into());
        fields.insert("uploadedByName".into(), session.display_name.clone().into());
        fields.insert("uploadedAt".into(), now.clone());
        fields.insert("updatedAt".into(), now);

        let id = self.store.create(Material::COLLECTION, fields).await?;
        tracing::info!(id = %id, uploader = %session.user_id, "material uploaded");
        Ok(id)
    }

    pub async fn update(&self, id: &str, dto: &UpdateMaterialDto) -> Result<(), StoreError> {
        let mut patch = to_fields(dto)?;
        patch.insert("updatedAt".into(), timestamp(self.clock.now()));
        self.store.update(Material::COLLECTION, id, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(Material::COLLECTION, id).await?;
        tracing::info!(id = %id, "material deleted");
        Ok(())
    }

    pub async fn recent(&self, limit: usize) -> Result<Vec<Material>, StoreError> {
        super::fetch(&*self.store, &Self::recent_query(limit)).await
    }

    pub async fn by_course(&self, course_id: &str) -> Result<Vec<Material>, StoreError> {
        super::fetch(&*self.store, &Self::course_query(course_id)).await
    }

    pub fn subscribe_recent<D, E>(&self, limit: usize, on_data: D, on_error: E) -> CancelHandle
    where
        D: FnMut(Vec<Material>) + Send + 'static,
        E: FnMut(StoreError) + Send + 'static,
    {
        mirror::subscribe::<Material, _, _>(
            Arc::clone(&self.store),
            Self::recent_query(limit),
            on_data,
            on_error,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{Role, search};
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeDelta, Utc};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn build(store: &MemoryStore) -> (Materials, Arc<ManualClock>) {
        let start: DateTime<Utc> = "2024-03-15T09:00:00Z".parse().unwrap();
        let clock = Arc::new(ManualClock::new(start));
        (Materials::new(Arc::new(store.clone()), clock.clone()), clock)
    }

    fn uploader() -> Session {
        Session {
            user_id: "lecturer".into(),
            display_name: "Lecturer".into(),
            role: Role::Admin,
        }
    }

    fn dto(title: &str, code: &str, course_id: Option<&str>) -> CreateMaterialDto {
        CreateMaterialDto {
            title: title.into(),
            course_code: code.into(),
            course_name: "Numerical Methods".into(),
            file_url: format!("https://files.example.edu/{code}.pdf"),
            file_type: "PDF".into(),
            file_size: "1.2 MB".into(),
            course_id: course_id.map(Into::into),
        }
    }

    #[tokio::test]
    async fn recent_lists_newest_uploads_first() {
        let store = MemoryStore::new();
        let (materials, clock) = build(&store);
        for week in 1..=6 {
            materials
                .create(&uploader(), &dto(&format!("Week {week}"), "MTH301", None))
                .await
                .unwrap();
            clock.advance(TimeDelta::days(7));
        }

        let recent = materials.recent(RECENT_LIMIT).await.unwrap();
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].title, "Week 6");
        assert_eq!(recent[0].uploaded_by.as_deref(), Some("lecturer"));
        assert_eq!(recent[4].title, "Week 2");
    }

    #[tokio::test]
    async fn by_course_filters_on_course_id() {
        let store = MemoryStore::new();
        let (materials, _) = build(&store);
        materials.create(&uploader(), &dto("Slides", "MTH301", Some("c1"))).await.unwrap();
        materials.create(&uploader(), &dto("Other", "PHY101", Some("c2"))).await.unwrap();

        let for_c1 = materials.by_course("c1").await.unwrap();
        assert_eq!(for_c1.len(), 1);
        assert_eq!(for_c1[0].title, "Slides");
    }

    #[tokio::test]
    async fn update_and_search() {
        let store = MemoryStore::new();
        let (materials, _) = build(&store);
        let id = materials.create(&uploader(), &dto("Slides", "MTH301", None)).await.unwrap();
        materials.create(&uploader(), &dto("Lab sheet", "PHY101", None)).await.unwrap();

        materials
            .update(
                &id,
                &UpdateMaterialDto {
                    title: Some("Lecture slides".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let all = materials.recent(RECENT_LIMIT).await.unwrap();
        let hits = search(&all, "mth");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].title, "Lecture slides");
        assert_eq!(search(&all, "numerical").len(), 2);
    }

    #[tokio::test]
    async fn by_course_skips_undated_uploads_with_or_without_index() {
        let indexed = MemoryStore::with_indexes(vec![
            Materials::course_query("c1").required_index().unwrap(),
        ]);
        let bare = MemoryStore::new();

        let mut lists = Vec::new();
        for store in [&indexed, &bare] {
            let (materials, clock) = build(store);
            let id = materials.create(&uploader(), &dto("Slides", "MTH301", Some("c1"))).await.unwrap();
            // an upload from before timestamps were stamped
            let mut old = store.get(Material::COLLECTION, &id).await.unwrap().unwrap().fields;
            old.remove("uploadedAt");
            store.create(Material::COLLECTION, old).await.unwrap();
            clock.advance(TimeDelta::days(1));
            materials.create(&uploader(), &dto("Notes", "MTH301", Some("c1"))).await.unwrap();

            let titles: Vec<_> = materials
                .by_course("c1")
                .await
                .unwrap()
                .into_iter()
                .map(|m| m.title)
                .collect();
            lists.push(titles);
        }
        assert_eq!(lists[0], vec!["Notes", "Slides"]);
        assert_eq!(lists[0], lists[1]);
    }

    #[tokio::test]
    async fn recent_subscription_follows_uploads() {
        let store = MemoryStore::new();
        let (materials, clock) = build(&store);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = materials.subscribe_recent(
            RECENT_LIMIT,
            move |items: Vec<Material>| {
                let _ = tx.send(items.into_iter().map(|m| m.title).collect::<Vec<_>>());
            },
            |err| panic!("unexpected error {err}"),
        );
        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert!(first.is_empty());

        clock.advance(TimeDelta::days(1));
        materials.create(&uploader(), &dto("Slides", "MTH301", None)).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(next, vec!["Slides"]);

        handle.cancel();
        assert_eq!(handle.state(), mirror::MirrorState::Cancelled);
    }
}
