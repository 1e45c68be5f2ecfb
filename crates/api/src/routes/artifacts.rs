//! Artifact upload, download and management routes.

use axum::{
    Json, Router,
    body::Body,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{
            ACCEPT_RANGES, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE,
            RANGE,
        },
    },
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    AppState,
    error::ApiError,
    middleware::{AuthUser, MaybeAuthUser},
};
use boxvault_core::artifact::{AccessRequest, ArtifactError, ArtifactRecord, UploadInput};
use boxvault_core::storage::ContentReader;

/// Header carrying the display name of an upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";
/// Header carrying the visibility of an upload.
pub const IS_PUBLIC_HEADER: &str = "x-is-public";

/// Read size per body frame when streaming content.
const DOWNLOAD_CHUNK_SIZE: usize = 512 * 1024;

/// Creates the artifact routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/organizations/{organization}/artifacts",
            post(upload_artifact)
                .get(list_artifacts)
                .layer(DefaultBodyLimit::disable()),
        )
        .route(
            "/organizations/{organization}/artifacts/{name}/download",
            get(download_by_name),
        )
        .route("/artifacts/{id}", get(get_artifact).delete(delete_artifact))
        .route("/artifacts/{id}/download", get(download_artifact))
        .route("/artifacts/{id}/download-link", post(create_download_link))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for downloads.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    /// Download token from a signed link.
    pub token: Option<String>,
}

/// Response for a download link.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadLinkResponse {
    /// Absolute URL including the token.
    pub download_url: String,
    /// When the token expires (ISO 8601).
    pub expires_at: String,
}

/// Response for a delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    /// Deleted artifact ID.
    pub deleted: Uuid,
    /// True if the stored file was removed with the last reference.
    pub content_reclaimed: bool,
}

// ============================================================================
// Helper Functions
// ============================================================================

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ArtifactError::validation(format!("{name} header is not valid text")))
        })
        .transpose()
        .map_err(ApiError::from)
}

fn parse_declared_size(headers: &HeaderMap) -> Result<Option<u64>, ApiError> {
    header_str(headers, CONTENT_LENGTH.as_str())?
        .map(|value| {
            value
                .trim()
                .parse::<u64>()
                .map_err(|_| ArtifactError::validation("Content-Length must be an integer").into())
        })
        .transpose()
}

fn parse_is_public(value: Option<&str>) -> Result<bool, ApiError> {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        None | Some("" | "false" | "0") => Ok(false),
        Some("true" | "1") => Ok(true),
        Some(_) => Err(ArtifactError::validation("x-is-public must be true or false").into()),
    }
}

/// `Content-Disposition` value with an ASCII-safe `filename` and, for
/// non-ASCII names, an RFC 5987 `filename*`.
fn content_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() => c,
            _ => '_',
        })
        .collect();

    if name.is_ascii() {
        format!("attachment; filename=\"{fallback}\"")
    } else {
        let clean: String = name.chars().filter(|c| !c.is_control()).collect();
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            urlencoding::encode(&clean)
        )
    }
}

/// Build a 200 or 206 streaming response for an opened artifact.
fn download_response(record: &ArtifactRecord, reader: ContentReader) -> Response {
    let total = reader.total_size();
    let length = reader.content_length();
    let range = reader.range();
    let artifact_id = record.id;

    let stream = ReaderStream::with_capacity(reader.into_inner(), DOWNLOAD_CHUNK_SIZE)
        .inspect_err(move |e| {
            error!(artifact_id = %artifact_id, error = %e, "Download stream failed");
        });

    let mut builder = Response::builder()
        .status(if range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        })
        .header(CONTENT_TYPE, "application/octet-stream")
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_LENGTH, length);

    if let Ok(value) = HeaderValue::from_str(&content_disposition(&record.name)) {
        builder = builder.header(CONTENT_DISPOSITION, value);
    }
    if let Some(range) = range {
        builder = builder.header(CONTENT_RANGE, range.content_range(total));
    }

    builder
        .body(Body::from_stream(stream))
        .unwrap_or_else(|e| {
            error!(artifact_id = %artifact_id, error = %e, "Failed to build download response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

fn access_request(auth: &MaybeAuthUser, query: DownloadQuery) -> AccessRequest {
    AccessRequest {
        token: query.token,
        subject: auth.subject(),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/organizations/{organization}/artifacts`
/// Stream the request body into storage and record it.
async fn upload_artifact(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(organization): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let declared_size = parse_declared_size(&headers)?;
    state.artifacts.check_declared_size(declared_size)?;

    let name = header_str(&headers, FILE_NAME_HEADER)?
        .ok_or_else(|| ArtifactError::validation("x-file-name header is required"))?
        .to_string();
    let is_public = parse_is_public(header_str(&headers, IS_PUBLIC_HEADER)?)?;

    let input = UploadInput {
        organization,
        name,
        declared_size,
        is_public,
    };

    let record = state
        .artifacts
        .upload(input, auth.subject(), body.into_data_stream())
        .await?;

    Ok((StatusCode::CREATED, Json(record)).into_response())
}

/// GET `/organizations/{organization}/artifacts`
/// List artifacts visible to the caller.
async fn list_artifacts(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(organization): Path<String>,
) -> Result<Response, ApiError> {
    let records = state.artifacts.list(&organization, auth.subject()).await?;
    Ok(Json(records).into_response())
}

/// GET `/artifacts/{id}`
/// Artifact metadata under the download access rules.
async fn get_artifact(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let record = state
        .artifacts
        .get(id, &access_request(&auth, query))
        .await?;
    Ok(Json(record).into_response())
}

/// GET `/artifacts/{id}/download`
/// Stream the artifact, honoring a single `Range`.
async fn download_artifact(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = header_str(&headers, RANGE.as_str())?;
    let (record, reader) = state
        .artifacts
        .download(id, &access_request(&auth, query), range)
        .await?;

    info!(
        artifact_id = %record.id,
        ranged = reader.range().is_some(),
        bytes = reader.content_length(),
        "Artifact download started"
    );

    Ok(download_response(&record, reader))
}

/// GET `/organizations/{organization}/artifacts/{name}/download`
/// Stream the artifact resolved by organization and display name.
async fn download_by_name(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path((organization, name)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let range = header_str(&headers, RANGE.as_str())?;
    let (record, reader) = state
        .artifacts
        .download_by_name(&organization, &name, &access_request(&auth, query), range)
        .await?;

    info!(
        artifact_id = %record.id,
        ranged = reader.range().is_some(),
        bytes = reader.content_length(),
        "Artifact download started"
    );

    Ok(download_response(&record, reader))
}

/// POST `/artifacts/{id}/download-link`
/// Issue a signed, record-scoped download URL.
async fn create_download_link(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let link = state
        .artifacts
        .issue_download_link(id, auth.subject())
        .await?;

    let response = DownloadLinkResponse {
        download_url: format!(
            "{}/api/v1/artifacts/{}/download?token={}",
            state.public_url, link.record_id, link.token
        ),
        expires_at: link.expires_at.to_rfc3339(),
    };

    Ok(Json(response).into_response())
}

/// DELETE `/artifacts/{id}`
/// Delete the record; the file goes with the last reference.
async fn delete_artifact(
    State(state): State<AppState>,
    auth: MaybeAuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let deleted = state.artifacts.delete(id, auth.subject()).await?;

    Ok(Json(DeleteResponse {
        deleted: deleted.id,
        content_reclaimed: deleted.content_reclaimed,
    })
    .into_response())
}

#[cfg(test)]
#[path = "artifacts_tests.rs"]
mod tests;
