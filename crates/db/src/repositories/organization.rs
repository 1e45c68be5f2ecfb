//! Organization repository for database operations.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::{organization_users, organizations, service_accounts};
use boxvault_core::artifact::{ArtifactError, Organization, OrganizationDirectory};

/// Organization repository for membership and service account lookups.
#[derive(Debug, Clone)]
pub struct OrganizationRepository {
    db: DatabaseConnection,
}

impl OrganizationRepository {
    /// Creates a new organization repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. duplicate name).
    pub async fn create(&self, name: &str) -> Result<organizations::Model, DbErr> {
        organizations::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Adds a user to an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn add_user(
        &self,
        org_id: Uuid,
        user_id: Uuid,
        role: &str,
    ) -> Result<organization_users::Model, DbErr> {
        organization_users::ActiveModel {
            organization_id: Set(org_id),
            user_id: Set(user_id),
            role: Set(role.to_string()),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }

    /// Creates a service account scoped to an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_service_account(
        &self,
        org_id: Uuid,
        name: &str,
        expires_at: Option<chrono::DateTime<Utc>>,
    ) -> Result<service_accounts::Model, DbErr> {
        service_accounts::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(org_id),
            name: Set(name.to_string()),
            expires_at: Set(expires_at.map(Into::into)),
            created_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
    }
}

impl OrganizationDirectory for OrganizationRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Organization>, ArtifactError> {
        let model = organizations::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Organization>, ArtifactError> {
        let model = organizations::Entity::find()
            .filter(organizations::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn is_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool, ArtifactError> {
        let count = organization_users::Entity::find()
            .filter(organization_users::Column::OrganizationId.eq(organization_id))
            .filter(organization_users::Column::UserId.eq(user_id))
            .count(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(count > 0)
    }

    async fn is_service_account(
        &self,
        organization_id: Uuid,
        subject_id: Uuid,
    ) -> Result<bool, ArtifactError> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let count = service_accounts::Entity::find_by_id(subject_id)
            .filter(service_accounts::Column::OrganizationId.eq(organization_id))
            .filter(
                Condition::any()
                    .add(service_accounts::Column::ExpiresAt.is_null())
                    .add(service_accounts::Column::ExpiresAt.gt(now)),
            )
            .count(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(count > 0)
    }
}

fn to_domain(model: organizations::Model) -> Organization {
    Organization {
        id: model.id,
        name: model.name,
    }
}
