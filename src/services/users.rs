use std::sync::Arc;

use serde_json::Value;

use crate::clock::Clock;
use crate::error::StoreError;
use crate::models::{
    AccountStatus, Record, RegisterProfileDto, Role, UserProfile, timestamp, to_fields,
};
use crate::store::{Direction, DocumentStore, Fields, Query};

/// Profiles kept next to the auth provider's accounts, keyed by user id.
#[derive(Clone)]
pub struct Users {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl Users {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        self.store
            .get(UserProfile::COLLECTION, user_id)
            .await?
            .map(UserProfile::from_document)
            .transpose()
    }

    // Unknown users are plain users
    pub async fn role_of(&self, user_id: &str) -> Result<Role, StoreError> {
        Ok(self.get(user_id).await?.map(|u| u.role).unwrap_or_default())
    }

    /// Create the profile on first sign-in. An existing profile is returned
    /// untouched so a re-registration never demotes an admin.
    pub async fn register(
        &self,
        user_id: &str,
        dto: &RegisterProfileDto,
    ) -> Result<UserProfile, StoreError> {
        if let Some(existing) = self.get(user_id).await? {
            return Ok(existing);
        }

        let now = timestamp(self.clock.now());
        let mut fields = to_fields(dto)?;
        fields.insert("role".into(), Value::from("user"));
        fields.insert("status".into(), Value::from("active"));
        fields.insert("createdAt".into(), now.clone());
        fields.insert("updatedAt".into(), now);
        self.store
            .set(UserProfile::COLLECTION, user_id, fields)
            .await?;
        tracing::info!(user = %user_id, "profile registered");

        self.get(user_id).await?.ok_or_else(|| StoreError::NotFound {
            collection: UserProfile::COLLECTION.to_string(),
            id: user_id.to_string(),
        })
    }

    pub async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let query = Query::collection(UserProfile::COLLECTION)
            .order_by(UserProfile::SORT_FIELD, Direction::Desc);
        super::fetch(&*self.store, &query).await
    }

    async fn require(&self, user_id: &str) -> Result<UserProfile, StoreError> {
        self.get(user_id).await?.ok_or_else(|| StoreError::NotFound {
            collection: UserProfile::COLLECTION.to_string(),
            id: user_id.to_string(),
        })
    }

    async fn patch(&self, user_id: &str, field: &str, value: Value) -> Result<(), StoreError> {
        let mut patch = Fields::new();
        patch.insert(field.to_string(), value);
        patch.insert("updatedAt".into(), timestamp(self.clock.now()));
        self.store
            .update(UserProfile::COLLECTION, user_id, patch)
            .await
    }

    // active <-> suspended
    pub async fn toggle_status(&self, user_id: &str) -> Result<AccountStatus, StoreError> {
        let next = match self.require(user_id).await?.status {
            AccountStatus::Active => AccountStatus::Suspended,
            AccountStatus::Suspended => AccountStatus::Active,
        };
        let value = serde_json::to_value(next).unwrap_or(Value::Null);
        self.patch(user_id, "status", value).await?;
        tracing::info!(user = %user_id, status = ?next, "account status changed");
        Ok(next)
    }

    // user <-> admin
    pub async fn toggle_role(&self, user_id: &str) -> Result<Role, StoreError> {
        let next = match self.require(user_id).await?.role {
            Role::User => Role::Admin,
            Role::Admin => Role::User,
        };
        let value = serde_json::to_value(next).unwrap_or(Value::Null);
        self.patch(user_id, "role", value).await?;
        tracing::info!(user = %user_id, role = ?next, "role changed");
        Ok(next)
    }

    pub async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.delete(UserProfile::COLLECTION, user_id).await?;
        tracing::info!(user = %user_id, "profile deleted");
        Ok(())
    }
}
