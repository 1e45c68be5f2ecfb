use super::*;

use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use boxvault_shared::JwtConfig;
use chrono::Utc;
use futures::stream;
use tokio::io::AsyncReadExt;

use crate::artifact::types::ChecksumAlgorithm;
use crate::storage::StorageConfig;

const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

/// Mock repository for testing.
#[derive(Default)]
struct MockArtifactRepository {
    records: Mutex<HashMap<Uuid, ArtifactRecord>>,
    fail_create: AtomicBool,
}

impl MockArtifactRepository {
    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

impl ArtifactRepository for MockArtifactRepository {
    async fn create(&self, input: CreateArtifactInput) -> Result<ArtifactRecord, ArtifactError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ArtifactError::repository("connection reset"));
        }

        let mut records = self.records.lock().unwrap();
        if records
            .values()
            .any(|r| r.organization_id == input.organization_id && r.name == input.name)
        {
            return Err(ArtifactError::name_conflict(input.name));
        }

        let record = ArtifactRecord {
            id: Uuid::new_v4(),
            storage_path: input.storage_path().to_string(),
            name: input.name,
            organization_id: input.organization_id,
            checksum: input.checksum,
            checksum_algorithm: input.checksum_algorithm,
            size: input.size,
            is_public: input.is_public,
            created_at: Utc::now(),
        };
        records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ArtifactRecord>, ArtifactError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_name(
        &self,
        organization_id: Uuid,
        name: &str,
    ) -> Result<Option<ArtifactRecord>, ArtifactError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.organization_id == organization_id && r.name == name)
            .cloned())
    }

    async fn list_by_organization(
        &self,
        organization_id: Uuid,
        include_private: bool,
    ) -> Result<Vec<ArtifactRecord>, ArtifactError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.organization_id == organization_id && (include_private || r.is_public))
            .cloned()
            .collect())
    }

    async fn count_by_checksum(&self, checksum: &str) -> Result<u64, ArtifactError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.checksum == checksum)
            .count() as u64)
    }

    async fn find_ids_by_checksum(&self, checksum: &str) -> Result<Vec<Uuid>, ArtifactError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.checksum == checksum)
            .map(|r| r.id)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, ArtifactError> {
        Ok(self.records.lock().unwrap().remove(&id).is_some())
    }
}

/// Mock organization directory for testing.
#[derive(Default)]
struct MockDirectory {
    organizations: Mutex<Vec<Organization>>,
    members: Mutex<HashSet<(Uuid, Uuid)>>,
    service_accounts: Mutex<HashSet<(Uuid, Uuid)>>,
}

impl MockDirectory {
    fn add_organization(&self, name: &str) -> Organization {
        let org = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
        };
        self.organizations.lock().unwrap().push(org.clone());
        org
    }

    fn add_member(&self, organization_id: Uuid, user_id: Uuid) {
        self.members.lock().unwrap().insert((organization_id, user_id));
    }

    fn add_service_account(&self, organization_id: Uuid, subject_id: Uuid) {
        self.service_accounts
            .lock()
            .unwrap()
            .insert((organization_id, subject_id));
    }
}

impl OrganizationDirectory for MockDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Organization>, ArtifactError> {
        Ok(self
            .organizations
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Organization>, ArtifactError> {
        Ok(self
            .organizations
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.name == name)
            .cloned())
    }

    async fn is_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<bool, ArtifactError> {
        Ok(self
            .members
            .lock()
            .unwrap()
            .contains(&(organization_id, user_id)))
    }

    async fn is_service_account(
        &self,
        organization_id: Uuid,
        subject_id: Uuid,
    ) -> Result<bool, ArtifactError> {
        Ok(self
            .service_accounts
            .lock()
            .unwrap()
            .contains(&(organization_id, subject_id)))
    }
}

type Service = ArtifactService<MockArtifactRepository, MockDirectory>;

struct Fixture {
    _dir: tempfile::TempDir,
    service: Arc<Service>,
    repo: Arc<MockArtifactRepository>,
    directory: Arc<MockDirectory>,
    org: Organization,
    member: Subject,
    outsider: Subject,
}

impl Fixture {
    fn files(&self) -> Vec<String> {
        let mut names: Vec<String> =
            std::fs::read_dir(self.service.content().resolver().storage_root())
                .unwrap()
                .map(|e| e.unwrap().file_name().into_string().unwrap())
                .collect();
        names.sort();
        names
    }

    async fn upload(&self, name: &str, body: &'static [u8], is_public: bool) -> ArtifactRecord {
        self.service
            .upload(
                upload_input(&self.org.name, name, body, is_public),
                self.member,
                body_of(body),
            )
            .await
            .unwrap()
    }
}

async fn fixture_with(config: impl FnOnce(StorageConfig) -> StorageConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let content = ContentStore::new(config(StorageConfig::new(dir.path())));
    content.ensure_root().await.unwrap();

    let repo = Arc::new(MockArtifactRepository::default());
    let directory = Arc::new(MockDirectory::default());
    let jwt = Arc::new(JwtService::new(JwtConfig {
        secret: "test-secret".to_string(),
        ..JwtConfig::default()
    }));

    let org = directory.add_organization("acme");
    let member = Subject::user(Uuid::new_v4());
    directory.add_member(org.id, member.id);

    let service = Arc::new(ArtifactService::new(
        Arc::new(content),
        Arc::clone(&repo),
        Arc::clone(&directory),
        jwt,
    ));

    Fixture {
        _dir: dir,
        service,
        repo,
        directory,
        org,
        member,
        outsider: Subject::user(Uuid::new_v4()),
    }
}

async fn fixture() -> Fixture {
    fixture_with(|c| c).await
}

fn upload_input(org: &str, name: &str, body: &[u8], is_public: bool) -> UploadInput {
    UploadInput {
        organization: org.to_string(),
        name: name.to_string(),
        declared_size: Some(body.len() as u64),
        is_public,
    }
}

fn body_of(body: &'static [u8]) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let chunks: Vec<Result<Bytes, Infallible>> = body
        .chunks(4)
        .map(|c| Ok(Bytes::from_static(c)))
        .collect();
    stream::iter(chunks)
}

async fn read_all(reader: ContentReader) -> Vec<u8> {
    let mut buf = Vec::new();
    reader.into_inner().read_to_end(&mut buf).await.unwrap();
    buf
}

#[tokio::test]
async fn test_upload_checksum_and_download_roundtrip() {
    let fx = fixture().await;

    let record = fx.upload("hello.iso", b"hello world", false).await;

    assert_eq!(record.checksum, HELLO_SHA256);
    assert_eq!(record.checksum_algorithm, ChecksumAlgorithm::Sha256);
    assert_eq!(record.size, 11);
    assert_eq!(record.storage_path, format!("{HELLO_SHA256}.iso"));

    let (_, reader) = fx
        .service
        .download(record.id, &AccessRequest::session(fx.member), None)
        .await
        .unwrap();
    assert_eq!(reader.content_length(), 11);
    assert_eq!(read_all(reader).await, b"hello world");
}

#[tokio::test]
async fn test_same_bytes_under_two_names_share_one_file() {
    let fx = fixture().await;

    let a = fx.upload("a.iso", b"hello world", false).await;
    let b = fx.upload("b.iso", b"hello world", true).await;

    assert_ne!(a.id, b.id);
    assert_eq!(a.checksum, b.checksum);
    assert_eq!(a.storage_path, b.storage_path);
    assert_eq!(fx.files(), vec![format!("{HELLO_SHA256}.iso")]);
}

#[tokio::test]
async fn test_concurrent_identical_uploads_share_one_file() {
    let fx = fixture().await;

    let uploads = (0..6).map(|i| {
        let service = Arc::clone(&fx.service);
        let input = upload_input(&fx.org.name, &format!("copy-{i}.iso"), b"hello world", false);
        let member = fx.member;
        tokio::spawn(async move { service.upload(input, member, body_of(b"hello world")).await })
    });

    for handle in uploads.collect::<Vec<_>>() {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(fx.repo.len(), 6);
    assert_eq!(fx.files(), vec![format!("{HELLO_SHA256}.iso")]);
}

#[tokio::test]
async fn test_reference_counted_delete() {
    let fx = fixture().await;
    let r1 = fx.upload("one.iso", b"hello world", false).await;
    let r2 = fx.upload("two.iso", b"hello world", false).await;

    let first = fx.service.delete(r1.id, Some(fx.member)).await.unwrap();
    assert!(!first.content_reclaimed);
    assert_eq!(fx.files().len(), 1);

    let second = fx.service.delete(r2.id, Some(fx.member)).await.unwrap();
    assert!(second.content_reclaimed);
    assert!(fx.files().is_empty());

    let again = fx.service.delete(r1.id, Some(fx.member)).await;
    assert!(matches!(again, Err(ArtifactError::NotFound(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sibling_deletes_reclaim_once() {
    let fx = fixture().await;
    let r1 = fx.upload("one.iso", b"hello world", false).await;
    let r2 = fx.upload("two.iso", b"hello world", false).await;

    let deletes = [r1.id, r2.id].map(|id| {
        let service = Arc::clone(&fx.service);
        let member = fx.member;
        tokio::spawn(async move { service.delete(id, Some(member)).await })
    });

    let mut reclaimed = 0;
    for handle in deletes {
        if handle.await.unwrap().unwrap().content_reclaimed {
            reclaimed += 1;
        }
    }

    assert_eq!(reclaimed, 1);
    assert_eq!(fx.repo.len(), 0);
    assert!(fx.files().is_empty());
}

#[tokio::test]
async fn test_delete_requires_membership() {
    let fx = fixture().await;
    let record = fx.upload("one.iso", b"hello world", true).await;

    assert!(matches!(
        fx.service.delete(record.id, None).await,
        Err(ArtifactError::Unauthorized(_))
    ));
    assert!(matches!(
        fx.service.delete(record.id, Some(fx.outsider)).await,
        Err(ArtifactError::Forbidden(_))
    ));
    assert_eq!(fx.repo.len(), 1);
}

#[tokio::test]
async fn test_delete_with_missing_file_still_removes_row() {
    let fx = fixture().await;
    let record = fx.upload("one.iso", b"hello world", false).await;
    fx.service.content().remove(&record.storage_path).await.unwrap();

    let deleted = fx.service.delete(record.id, Some(fx.member)).await.unwrap();

    assert!(!deleted.content_reclaimed);
    assert_eq!(fx.repo.len(), 0);
}

#[tokio::test]
async fn test_range_windows() {
    let fx = fixture().await;
    let record = fx.upload("r.iso", b"0123456789", true).await;
    let anon = AccessRequest::anonymous();

    let (_, full) = fx.service.download(record.id, &anon, None).await.unwrap();
    assert_eq!(full.range(), None);
    assert_eq!(full.content_length(), 10);

    let (_, open) = fx
        .service
        .download(record.id, &anon, Some("bytes=0-"))
        .await
        .unwrap();
    assert_eq!(open.range(), Some(ByteRange { start: 0, end: 9 }));
    assert_eq!(open.content_length(), 10);

    let (_, single) = fx
        .service
        .download(record.id, &anon, Some("bytes=0-0"))
        .await
        .unwrap();
    assert_eq!(single.content_length(), 1);
    assert_eq!(read_all(single).await, b"0");

    let (_, tail) = fx
        .service
        .download(record.id, &anon, Some("bytes=7-100"))
        .await
        .unwrap();
    assert_eq!(read_all(tail).await, b"789");
}

#[tokio::test]
async fn test_bad_ranges() {
    let fx = fixture().await;
    let record = fx.upload("r.iso", b"0123456789", true).await;
    let anon = AccessRequest::anonymous();

    assert!(matches!(
        fx.service.download(record.id, &anon, Some("bytes=10-")).await,
        Err(ArtifactError::RangeNotSatisfiable { total: 10 })
    ));
    assert!(matches!(
        fx.service.download(record.id, &anon, Some("bytes=0-1,3-4")).await,
        Err(ArtifactError::Validation(_))
    ));
    assert!(matches!(
        fx.service.download(record.id, &anon, Some("lines=1-2")).await,
        Err(ArtifactError::Validation(_))
    ));
}

#[tokio::test]
async fn test_access_matrix() {
    let fx = fixture().await;
    let public = fx.upload("public.iso", b"public bytes", true).await;
    let private = fx.upload("private.iso", b"private bytes", false).await;
    let other = fx.upload("other.iso", b"other bytes", false).await;

    assert_eq!(
        fx.service
            .authorize(&public, &AccessRequest::anonymous())
            .await
            .unwrap(),
        AccessGrant::Public
    );
    assert!(matches!(
        fx.service
            .authorize(&private, &AccessRequest::anonymous())
            .await,
        Err(ArtifactError::Unauthorized(_))
    ));
    assert_eq!(
        fx.service
            .authorize(&private, &AccessRequest::session(fx.member))
            .await
            .unwrap(),
        AccessGrant::Member(fx.member)
    );
    assert!(matches!(
        fx.service
            .authorize(&private, &AccessRequest::session(fx.outsider))
            .await,
        Err(ArtifactError::Forbidden(_))
    ));

    let link = fx
        .service
        .issue_download_link(other.id, Some(fx.member))
        .await
        .unwrap();
    let mismatched = AccessRequest::session(fx.outsider).with_token(link.token);
    assert!(matches!(
        fx.service.authorize(&private, &mismatched).await,
        Err(ArtifactError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_service_account_scoped_to_org() {
    let fx = fixture().await;
    let record = fx.upload("private.iso", b"private bytes", false).await;
    let scoped = Subject::service_account(Uuid::new_v4());
    let unscoped = Subject::service_account(Uuid::new_v4());
    fx.directory.add_service_account(fx.org.id, scoped.id);
    fx.directory.add_member(fx.org.id, unscoped.id);

    assert!(fx
        .service
        .authorize(&record, &AccessRequest::session(scoped))
        .await
        .is_ok());
    assert!(matches!(
        fx.service
            .authorize(&record, &AccessRequest::session(unscoped))
            .await,
        Err(ArtifactError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_download_link_grants_anonymous_access_to_one_record() {
    let fx = fixture().await;
    let x = fx.upload("x.iso", b"xxxx", false).await;
    let y = fx.upload("y.iso", b"yyyy", false).await;

    let link = fx
        .service
        .issue_download_link(x.id, Some(fx.member))
        .await
        .unwrap();
    assert_eq!(link.record_id, x.id);
    assert!(link.expires_at > Utc::now());

    let with_token = AccessRequest::anonymous().with_token(link.token);
    let (_, reader) = fx.service.download(x.id, &with_token, None).await.unwrap();
    assert_eq!(read_all(reader).await, b"xxxx");

    assert!(matches!(
        fx.service.download(y.id, &with_token, None).await,
        Err(ArtifactError::Forbidden(_))
    ));
}

#[tokio::test]
async fn test_download_link_requires_authorized_session() {
    let fx = fixture().await;
    let record = fx.upload("x.iso", b"xxxx", false).await;

    assert!(matches!(
        fx.service.issue_download_link(record.id, None).await,
        Err(ArtifactError::Unauthorized(_))
    ));
    assert!(matches!(
        fx.service
            .issue_download_link(record.id, Some(fx.outsider))
            .await,
        Err(ArtifactError::Forbidden(_))
    ));
    assert!(matches!(
        fx.service
            .issue_download_link(Uuid::new_v4(), Some(fx.member))
            .await,
        Err(ArtifactError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_declared_size_over_limit_fails_before_any_file() {
    let fx = fixture_with(|c| c.with_max_upload_size(4)).await;
    let input = UploadInput {
        organization: fx.org.name.clone(),
        name: "big.iso".to_string(),
        declared_size: Some(5),
        is_public: false,
    };

    let result = fx
        .service
        .upload(input, fx.member, body_of(b"12345"))
        .await;

    assert!(matches!(
        result,
        Err(ArtifactError::SizeLimitExceeded { size: 5, max: 4 })
    ));
    assert!(fx.files().is_empty());
    assert_eq!(fx.repo.len(), 0);
}

#[tokio::test]
async fn test_undeclared_size_over_limit_fails_mid_stream() {
    let fx = fixture_with(|c| c.with_max_upload_size(4)).await;
    let input = UploadInput {
        organization: fx.org.name.clone(),
        name: "big.iso".to_string(),
        declared_size: None,
        is_public: false,
    };

    let result = fx
        .service
        .upload(input, fx.member, body_of(b"123456789"))
        .await;

    assert!(matches!(result, Err(ArtifactError::SizeLimitExceeded { .. })));
    assert!(fx.files().is_empty());
    assert_eq!(fx.repo.len(), 0);
}

#[tokio::test]
async fn test_upload_rejects_non_member_and_bad_names() {
    let fx = fixture().await;

    let result = fx
        .service
        .upload(
            upload_input(&fx.org.name, "a.iso", b"abc", false),
            fx.outsider,
            body_of(b"abc"),
        )
        .await;
    assert!(matches!(result, Err(ArtifactError::Forbidden(_))));

    let result = fx
        .service
        .upload(
            upload_input(&fx.org.name, "../a.iso", b"abc", false),
            fx.member,
            body_of(b"abc"),
        )
        .await;
    assert!(matches!(result, Err(ArtifactError::Validation(_))));

    let result = fx
        .service
        .upload(
            upload_input("missing-org", "a.iso", b"abc", false),
            fx.member,
            body_of(b"abc"),
        )
        .await;
    assert!(matches!(result, Err(ArtifactError::NotFound(_))));

    assert!(fx.files().is_empty());
}

#[tokio::test]
async fn test_duplicate_name_conflicts() {
    let fx = fixture().await;
    fx.upload("dup.iso", b"first", false).await;

    let result = fx
        .service
        .upload(
            upload_input(&fx.org.name, "dup.iso", b"second", false),
            fx.member,
            body_of(b"second"),
        )
        .await;

    assert!(matches!(result, Err(ArtifactError::NameConflict(_))));
    assert_eq!(fx.files().len(), 1);
}

#[tokio::test]
async fn test_missing_content_is_integrity_error() {
    let fx = fixture().await;
    let record = fx.upload("gone.iso", b"hello world", true).await;
    fx.service.content().remove(&record.storage_path).await.unwrap();

    let result = fx
        .service
        .download(record.id, &AccessRequest::anonymous(), None)
        .await;

    assert!(matches!(result, Err(ArtifactError::Integrity { id, .. }) if id == record.id));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_content_is_integrity_error() {
    let fx = fixture().await;
    let record = fx.upload("loop.iso", b"hello world", true).await;
    let path = fx
        .service
        .content()
        .resolver()
        .storage_root()
        .join(&record.storage_path);
    std::fs::remove_file(&path).unwrap();
    std::os::unix::fs::symlink(&path, &path).unwrap();

    let result = fx
        .service
        .download(record.id, &AccessRequest::anonymous(), None)
        .await;

    assert!(matches!(result, Err(ArtifactError::Integrity { id, .. }) if id == record.id));
}

#[tokio::test]
async fn test_directory_in_place_of_content_is_integrity_error() {
    let fx = fixture().await;
    let record = fx.upload("dir.iso", b"hello world", true).await;
    let path = fx
        .service
        .content()
        .resolver()
        .storage_root()
        .join(&record.storage_path);
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();

    let result = fx
        .service
        .download(record.id, &AccessRequest::anonymous(), None)
        .await;

    assert!(matches!(result, Err(ArtifactError::Integrity { id, .. }) if id == record.id));
}

#[tokio::test]
async fn test_download_by_name() {
    let fx = fixture().await;
    fx.upload("named.iso", b"named", true).await;

    let (record, reader) = fx
        .service
        .download_by_name("acme", "named.iso", &AccessRequest::anonymous(), None)
        .await
        .unwrap();
    assert_eq!(record.name, "named.iso");
    assert_eq!(read_all(reader).await, b"named");

    assert!(matches!(
        fx.service
            .download_by_name("acme", "nope.iso", &AccessRequest::anonymous(), None)
            .await,
        Err(ArtifactError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_visibility() {
    let fx = fixture().await;
    fx.upload("public.iso", b"public", true).await;
    fx.upload("private.iso", b"private", false).await;

    assert_eq!(fx.service.list("acme", Some(fx.member)).await.unwrap().len(), 2);
    assert_eq!(fx.service.list("acme", Some(fx.outsider)).await.unwrap().len(), 1);
    assert_eq!(fx.service.list("acme", None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failed_record_commit_keeps_content_for_sweeper() {
    let fx = fixture_with(|c| c.with_orphan_grace(Duration::ZERO)).await;
    fx.repo.fail_create.store(true, Ordering::SeqCst);

    let result = fx
        .service
        .upload(
            upload_input(&fx.org.name, "a.iso", b"hello world", false),
            fx.member,
            body_of(b"hello world"),
        )
        .await;
    assert!(matches!(result, Err(ArtifactError::Repository(_))));
    assert_eq!(fx.files(), vec![format!("{HELLO_SHA256}.iso")]);

    let report = fx.service.sweep_orphans().await.unwrap();
    assert_eq!(report.content_removed, 1);
    assert!(fx.files().is_empty());
}

#[tokio::test]
async fn test_sweep_keeps_referenced_and_young_files() {
    let fx = fixture_with(|c| c.with_orphan_grace(Duration::ZERO)).await;
    let kept = fx.upload("kept.iso", b"kept", false).await;
    let root = fx.service.content().resolver().storage_root().to_path_buf();
    std::fs::write(root.join(".upload-stale.part"), b"partial").unwrap();

    let report = fx.service.sweep_orphans().await.unwrap();

    assert_eq!(report.uploads_removed, 1);
    assert_eq!(report.content_removed, 0);
    assert_eq!(fx.files(), vec![kept.storage_path.clone()]);

    let patient = fixture_with(|c| c.with_orphan_grace(Duration::from_secs(3600))).await;
    let root = patient.service.content().resolver().storage_root().to_path_buf();
    std::fs::write(root.join(".upload-fresh.part"), b"partial").unwrap();

    let report = patient.service.sweep_orphans().await.unwrap();
    assert_eq!(report, SweepReport::default());
    assert_eq!(patient.files().len(), 1);
}
