//! Artifact service implementation.

use std::sync::Arc;

use boxvault_shared::JwtService;
use bytes::Bytes;
use futures::Stream;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::access::{self, AccessGrant, AccessRequest, Decision, TokenCredential};
use super::error::{ArtifactError, classify_storage};
use super::locks::ChecksumLocks;
use super::types::{
    ArtifactRecord, CreateArtifactInput, DeletedArtifact, DownloadLink, Organization, Subject,
    SweepReport, UploadInput, validate_name,
};
use crate::storage::{ByteRange, ContentReader, ContentStore, StorageError, StoredEntryKind};

/// Repository trait for artifact persistence.
///
/// This trait is implemented by the db crate to provide actual database operations.
pub trait ArtifactRepository: Send + Sync {
    /// Create a new artifact record.
    ///
    /// Must fail with `ArtifactError::NameConflict` if the organization
    /// already has a record with the same name.
    fn create(
        &self,
        input: CreateArtifactInput,
    ) -> impl std::future::Future<Output = Result<ArtifactRecord, ArtifactError>> + Send;

    /// Find artifact by ID.
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ArtifactRecord>, ArtifactError>> + Send;

    /// Find artifact by organization and display name.
    fn find_by_name(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<ArtifactRecord>, ArtifactError>> + Send;

    /// List artifacts of an organization, newest first.
    fn list_by_organization(
        &self,
        organization_id: Uuid,
        include_private: bool,
    ) -> impl std::future::Future<Output = Result<Vec<ArtifactRecord>, ArtifactError>> + Send;

    /// Count records referencing a checksum across all organizations.
    fn count_by_checksum(
        &self,
        checksum: &str,
    ) -> impl std::future::Future<Output = Result<u64, ArtifactError>> + Send;

    /// IDs of records referencing a checksum.
    fn find_ids_by_checksum(
        &self,
        checksum: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Uuid>, ArtifactError>> + Send;

    /// Delete artifact by ID. Returns false if no row was deleted.
    fn delete(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, ArtifactError>> + Send;
}

/// Organization lookups needed for authorization.
pub trait OrganizationDirectory: Send + Sync {
    /// Find organization by ID.
    fn find_by_id(
        &self,
        id: Uuid,
    ) -> impl std::future::Future<Output = Result<Option<Organization>, ArtifactError>> + Send;

    /// Find organization by unique name.
    fn find_by_name(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Organization>, ArtifactError>> + Send;

    /// Check if a user belongs to the organization.
    fn is_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, ArtifactError>> + Send;

    /// Check if a service account is scoped to the organization.
    fn is_service_account(
        &self,
        organization_id: Uuid,
        subject_id: Uuid,
    ) -> impl std::future::Future<Output = Result<bool, ArtifactError>> + Send;
}

/// Artifact service: upload, authorize, deliver and reclaim content.
pub struct ArtifactService<R: ArtifactRepository, D: OrganizationDirectory> {
    content: Arc<ContentStore>,
    repo: Arc<R>,
    directory: Arc<D>,
    jwt: Arc<JwtService>,
    locks: ChecksumLocks,
}

impl<R: ArtifactRepository, D: OrganizationDirectory> ArtifactService<R, D> {
    /// Create a new artifact service.
    #[must_use]
    pub fn new(
        content: Arc<ContentStore>,
        repo: Arc<R>,
        directory: Arc<D>,
        jwt: Arc<JwtService>,
    ) -> Self {
        Self {
            content,
            repo,
            directory,
            jwt,
            locks: ChecksumLocks::new(),
        }
    }

    /// The underlying content store.
    #[must_use]
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Reject a declared length above the limit.
    ///
    /// # Errors
    ///
    /// Returns `ArtifactError::SizeLimitExceeded` if `declared` exceeds the limit.
    pub fn check_declared_size(&self, declared: Option<u64>) -> Result<(), ArtifactError> {
        self.content
            .check_declared_size(declared)
            .map_err(classify_storage)
    }

    /// Stream an upload into the store and record it.
    ///
    /// Identical bytes already on disk are reused; the new record then
    /// shares the existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Declared or streamed size exceeds the limit
    /// - Name is invalid or already used in the organization
    /// - Organization not found or subject is not a member
    /// - Storage or repository operation fails
    pub async fn upload<S, E>(
        &self,
        input: UploadInput,
        subject: Subject,
        body: S,
    ) -> Result<ArtifactRecord, ArtifactError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::fmt::Display,
    {
        self.check_declared_size(input.declared_size)?;
        let name = validate_name(&input.name)?;

        let organization = self.resolve_organization(&input.organization).await?;
        if !self.belongs_to(organization.id, subject).await? {
            return Err(ArtifactError::forbidden(
                "not a member of the target organization",
            ));
        }
        if self.repo.find_by_name(organization.id, &name).await?.is_some() {
            return Err(ArtifactError::name_conflict(name));
        }

        let staged = self.content.stage(body).await.map_err(classify_storage)?;
        debug!(checksum = %staged.checksum(), size = staged.size(), "Upload staged");

        let _lock = self.locks.lock(staged.checksum()).await;
        let stored = self.content.commit(staged).await.map_err(classify_storage)?;

        let size = i64::try_from(stored.size).map_err(|_| ArtifactError::SizeLimitExceeded {
            size: stored.size,
            max: self.content.config().max_upload_size,
        })?;
        let create = CreateArtifactInput::new(
            name,
            organization.id,
            &stored.checksum,
            size,
            input.is_public,
            &self.content.config().extension,
        );

        let record = self.repo.create(create).await.inspect_err(|e| {
            if !stored.deduplicated {
                warn!(
                    checksum = %stored.checksum,
                    error = %e,
                    "Record commit failed after placing content; left for orphan sweep"
                );
            }
        })?;

        info!(
            artifact_id = %record.id,
            organization = %organization.name,
            checksum = %record.checksum,
            size = record.size,
            deduplicated = stored.deduplicated,
            "Artifact uploaded"
        );

        Ok(record)
    }

    /// Run the access order for `record`.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized`, `TokenInvalid` or `Forbidden` when access is
    /// refused, or a repository error if the membership lookup fails.
    pub async fn authorize(
        &self,
        record: &ArtifactRecord,
        request: &AccessRequest,
    ) -> Result<AccessGrant, ArtifactError> {
        let token = request
            .token
            .as_deref()
            .map(|raw| TokenCredential::verify(&self.jwt, raw));

        match access::evaluate(record, token.as_ref(), request.subject) {
            Decision::Allow(grant) => Ok(grant),
            Decision::Deny(err) => {
                debug!(artifact_id = %record.id, error = %err, "Artifact access denied");
                Err(err)
            }
            Decision::CheckMembership(subject) => {
                if self.belongs_to(record.organization_id, subject).await? {
                    Ok(AccessGrant::Member(subject))
                } else {
                    Err(ArtifactError::forbidden(
                        "not a member of the owning organization",
                    ))
                }
            }
        }
    }

    /// Get an artifact the requester may access.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if absent, or the access error.
    pub async fn get(
        &self,
        id: Uuid,
        request: &AccessRequest,
    ) -> Result<ArtifactRecord, ArtifactError> {
        let record = self.find(id).await?;
        self.authorize(&record, request).await?;
        Ok(record)
    }

    /// Get an artifact by organization name and display name.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the organization or artifact is absent, or the
    /// access error.
    pub async fn get_by_name(
        &self,
        organization: &str,
        name: &str,
        request: &AccessRequest,
    ) -> Result<ArtifactRecord, ArtifactError> {
        let organization = self.resolve_organization(organization).await?;
        let record = self
            .repo
            .find_by_name(organization.id, name)
            .await?
            .ok_or_else(|| ArtifactError::NotFound(format!("artifact {name}")))?;

        self.authorize(&record, request).await?;
        Ok(record)
    }

    /// List artifacts visible to the requester.
    ///
    /// Members and scoped service accounts see every record; everyone else
    /// sees public records only.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the organization is absent.
    pub async fn list(
        &self,
        organization: &str,
        subject: Option<Subject>,
    ) -> Result<Vec<ArtifactRecord>, ArtifactError> {
        let organization = self.resolve_organization(organization).await?;
        let include_private = match subject {
            Some(subject) => self.belongs_to(organization.id, subject).await?,
            None => false,
        };

        self.repo
            .list_by_organization(organization.id, include_private)
            .await
    }

    /// Open the content of an authorized record, optionally windowed.
    ///
    /// # Errors
    ///
    /// Returns `Integrity` if the file is missing or unreadable, `Validation` for a
    /// malformed range and `RangeNotSatisfiable` for a start past the end.
    pub async fn open_content(
        &self,
        record: &ArtifactRecord,
        range: Option<&str>,
    ) -> Result<ContentReader, ArtifactError> {
        let opened = match self.content.open(&record.storage_path).await {
            Ok(opened) => opened,
            Err(e @ StorageError::PathTraversal(_)) => return Err(classify_storage(e)),
            Err(e) => {
                error!(
                    artifact_id = %record.id,
                    storage_path = %record.storage_path,
                    error = %e,
                    "Content file missing or unreadable for live artifact"
                );
                return Err(ArtifactError::integrity(record.id, &record.storage_path));
            }
        };

        let range = range
            .map(|header| ByteRange::parse(header, opened.total_size()))
            .transpose()?;

        opened.into_reader(range).await.map_err(classify_storage)
    }

    /// Authorize and open a download by record ID.
    ///
    /// # Errors
    ///
    /// See [`Self::get`] and [`Self::open_content`].
    pub async fn download(
        &self,
        id: Uuid,
        request: &AccessRequest,
        range: Option<&str>,
    ) -> Result<(ArtifactRecord, ContentReader), ArtifactError> {
        let record = self.get(id, request).await?;
        let reader = self.open_content(&record, range).await?;
        Ok((record, reader))
    }

    /// Authorize and open a download by organization and display name.
    ///
    /// # Errors
    ///
    /// See [`Self::get_by_name`] and [`Self::open_content`].
    pub async fn download_by_name(
        &self,
        organization: &str,
        name: &str,
        request: &AccessRequest,
        range: Option<&str>,
    ) -> Result<(ArtifactRecord, ContentReader), ArtifactError> {
        let record = self.get_by_name(organization, name, request).await?;
        let reader = self.open_content(&record, range).await?;
        Ok((record, reader))
    }

    /// Issue a short-lived download token bound to one record.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without a session subject, `NotFound` if the
    /// record is absent, or the access error for the subject.
    pub async fn issue_download_link(
        &self,
        id: Uuid,
        subject: Option<Subject>,
    ) -> Result<DownloadLink, ArtifactError> {
        let subject =
            subject.ok_or_else(|| ArtifactError::unauthorized("authentication required"))?;
        let record = self.find(id).await?;
        self.authorize(&record, &AccessRequest::session(subject))
            .await?;

        let organization = self
            .directory
            .find_by_id(record.organization_id)
            .await?
            .ok_or_else(|| ArtifactError::NotFound(format!("organization {}", record.organization_id)))?;

        let signed = self
            .jwt
            .generate_download_token(
                subject.id,
                subject.is_service_account,
                record.id,
                &organization.name,
            )
            .map_err(|e| ArtifactError::Signing(e.to_string()))?;

        info!(
            artifact_id = %record.id,
            subject = %subject.id,
            expires_at = %signed.expires_at,
            "Download link issued"
        );

        Ok(DownloadLink {
            record_id: record.id,
            token: signed.token,
            expires_at: signed.expires_at,
        })
    }

    /// Delete a record and unlink its file if no other record references it.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` without a session subject, `NotFound` if the
    /// record is absent (including a lost delete race) and `Forbidden` for
    /// non-members.
    pub async fn delete(
        &self,
        id: Uuid,
        subject: Option<Subject>,
    ) -> Result<DeletedArtifact, ArtifactError> {
        let subject =
            subject.ok_or_else(|| ArtifactError::unauthorized("authentication required"))?;
        let record = self.find(id).await?;
        if !self.belongs_to(record.organization_id, subject).await? {
            return Err(ArtifactError::forbidden(
                "not a member of the owning organization",
            ));
        }

        let _lock = self.locks.lock(&record.checksum).await;

        if !self.repo.delete(record.id).await? {
            return Err(ArtifactError::not_found(id));
        }

        let content_reclaimed = self.reclaim_if_unreferenced(&record).await;

        info!(
            artifact_id = %record.id,
            subject = %subject.id,
            content_reclaimed,
            "Artifact deleted"
        );

        Ok(DeletedArtifact {
            id: record.id,
            content_reclaimed,
        })
    }

    /// Remove stale temp uploads and unreferenced content files.
    ///
    /// Only files older than the configured grace period are considered.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage root cannot be listed or a repository
    /// lookup fails.
    pub async fn sweep_orphans(&self) -> Result<SweepReport, ArtifactError> {
        let grace = self.content.config().orphan_grace;
        let entries = self.content.scan().await.map_err(classify_storage)?;
        let mut report = SweepReport::default();

        for entry in entries.into_iter().filter(|e| e.age >= grace) {
            match entry.kind {
                StoredEntryKind::Upload => {
                    if self.remove_quietly(&entry.file_name).await {
                        report.uploads_removed += 1;
                    }
                }
                StoredEntryKind::Content { checksum } => {
                    let _lock = self.locks.lock(&checksum).await;
                    if self.repo.count_by_checksum(&checksum).await? == 0
                        && self.remove_quietly(&entry.file_name).await
                    {
                        info!(checksum = %checksum, "Removed unreferenced content");
                        report.content_removed += 1;
                    }
                }
            }
        }

        info!(
            uploads_removed = report.uploads_removed,
            content_removed = report.content_removed,
            "Orphan sweep finished"
        );

        Ok(report)
    }

    async fn find(&self, id: Uuid) -> Result<ArtifactRecord, ArtifactError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ArtifactError::not_found(id))
    }

    async fn resolve_organization(&self, name: &str) -> Result<Organization, ArtifactError> {
        self.directory
            .find_by_name(name)
            .await?
            .ok_or_else(|| ArtifactError::organization_not_found(name))
    }

    async fn belongs_to(&self, organization_id: Uuid, subject: Subject) -> Result<bool, ArtifactError> {
        if subject.is_service_account {
            self.directory
                .is_service_account(organization_id, subject.id)
                .await
        } else {
            self.directory.is_member(organization_id, subject.id).await
        }
    }

    /// Must be called under the checksum lock, after the row is gone.
    ///
    /// Any failure keeps the file; the sweeper reclaims it later.
    async fn reclaim_if_unreferenced(&self, record: &ArtifactRecord) -> bool {
        let remaining = match self.repo.count_by_checksum(&record.checksum).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(checksum = %record.checksum, error = %e, "Reference count failed; keeping content");
                return false;
            }
        };

        if remaining > 0 {
            let siblings = self
                .repo
                .find_ids_by_checksum(&record.checksum)
                .await
                .unwrap_or_default();
            info!(
                checksum = %record.checksum,
                remaining,
                siblings = ?siblings,
                "Content retained for sibling artifacts"
            );
            return false;
        }

        match self.content.remove(&record.storage_path).await {
            Ok(true) => true,
            Ok(false) => {
                warn!(
                    artifact_id = %record.id,
                    storage_path = %record.storage_path,
                    "Content file already absent"
                );
                false
            }
            Err(e) => {
                warn!(storage_path = %record.storage_path, error = %e, "Failed to remove content file");
                false
            }
        }
    }

    async fn remove_quietly(&self, storage_path: &str) -> bool {
        match self.content.remove(storage_path).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(storage_path = %storage_path, error = %e, "Failed to remove orphaned file");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
