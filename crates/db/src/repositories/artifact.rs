//! Artifact repository for database operations.
//!
//! Implements artifact persistence using SeaORM.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, SqlErr,
};
use tracing::warn;
use uuid::Uuid;

use crate::entities::artifacts;
use boxvault_core::artifact::{
    ArtifactError, ArtifactRecord, ArtifactRepository as ArtifactRepoTrait, ChecksumAlgorithm,
    CreateArtifactInput,
};

/// Artifact repository implementation.
#[derive(Debug, Clone)]
pub struct ArtifactRepository {
    db: DatabaseConnection,
}

impl ArtifactRepository {
    /// Create a new artifact repository.
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl ArtifactRepoTrait for ArtifactRepository {
    async fn create(&self, input: CreateArtifactInput) -> Result<ArtifactRecord, ArtifactError> {
        let active_model = artifacts::ActiveModel {
            id: Set(Uuid::new_v4()),
            organization_id: Set(input.organization_id),
            name: Set(input.name.clone()),
            checksum: Set(input.checksum.clone()),
            checksum_algorithm: Set(input.checksum_algorithm.as_str().to_string()),
            storage_path: Set(input.storage_path().to_string()),
            size: Set(input.size),
            is_public: Set(input.is_public),
            created_at: Set(Utc::now().into()),
        };

        let model = active_model
            .insert(&self.db)
            .await
            .map_err(|e| map_insert_error(e, &input.name))?;

        Ok(to_domain(model))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ArtifactRecord>, ArtifactError> {
        let model = artifacts::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn find_by_name(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Option<ArtifactRecord>, ArtifactError> {
        let model = artifacts::Entity::find()
            .filter(artifacts::Column::OrganizationId.eq(organization_id))
            .filter(artifacts::Column::Name.eq(name))
            .one(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(model.map(to_domain))
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<ArtifactRecord>, ArtifactError> {
        let mut query =
            artifacts::Entity::find().filter(artifacts::Column::OrganizationId.eq(organization_id));
        if !include_private {
            query = query.filter(artifacts::Column::IsPublic.eq(true));
        }

        let models = query
            .order_by_desc(artifacts::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(models.into_iter().map(to_domain).collect())
    }

    async fn count_by_checksum(&self, checksum: &str) -> Result<u64, ArtifactError> {
        artifacts::Entity::find()
            .filter(artifacts::Column::Checksum.eq(checksum))
            .count(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))
    }

    async fn find_ids_by_checksum(&self, checksum: &str) -> Result<Vec<Uuid>, ArtifactError> {
        artifacts::Entity::find()
            .select_only()
            .column(artifacts::Column::Id)
            .filter(artifacts::Column::Checksum.eq(checksum))
            .into_tuple::<Uuid>()
            .all(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ArtifactError> {
        let result = artifacts::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(|e| ArtifactError::repository(e.to_string()))?;

        Ok(result.rows_affected > 0)
    }
}

fn map_insert_error(err: DbErr, name: &str) -> ArtifactError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => ArtifactError::name_conflict(name),
        _ => ArtifactError::repository(err.to_string()),
    }
}

/// Convert database model to domain record.
fn to_domain(model: artifacts::Model) -> ArtifactRecord {
    let checksum_algorithm = ChecksumAlgorithm::parse(&model.checksum_algorithm).unwrap_or_else(|| {
        warn!(
            artifact_id = %model.id,
            algorithm = %model.checksum_algorithm,
            "Unknown checksum algorithm, assuming sha256"
        );
        ChecksumAlgorithm::Sha256
    });

    ArtifactRecord {
        id: model.id,
        name: model.name,
        organization_id: model.organization_id,
        checksum: model.checksum,
        checksum_algorithm,
        storage_path: model.storage_path,
        size: model.size,
        is_public: model.is_public,
        created_at: model.created_at.with_timezone(&Utc),
    }
}
