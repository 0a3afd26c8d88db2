//! HTTP handlers for the file-storage API.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use bytes::Bytes;
use futures::stream::Stream;

use crate::pipeline::{encode_batch, zip_stream, Base64Record};
use crate::store::{ChunkedStore, NewObject, StoredObject};
use crate::StashError;

use super::dto::{FileDto, MessageResponse, MultiUploadResponse, RenameRequest, UploadResponse};
use super::error::ApiError;

/// Shared application state injected into every handler.
pub struct AppState {
    /// The chunked object store.
    pub store: ChunkedStore,
}

impl AppState {
    /// Create application state around a connected store.
    pub fn new(store: ChunkedStore) -> Self {
        Self { store }
    }
}

/// Generate a safe Content-Disposition header value for downloads.
///
/// Control characters are stripped and quotes/backslashes replaced to
/// prevent header injection; non-ASCII names additionally get an RFC
/// 5987 `filename*` parameter.
fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && !filename.chars().any(|c| c.is_control() || c == '"' || c == '\\') {
        return format!("attachment; filename=\"{filename}\"");
    }

    let encoded = urlencoding::encode(filename);
    format!("attachment; filename=\"{sanitized}\"; filename*=UTF-8''{encoded}")
}

/// Adapt a multipart field into the store's input stream shape.
fn field_stream(field: Field<'_>) -> impl Stream<Item = crate::Result<Bytes>> + '_ {
    futures::stream::try_unfold(field, |mut field| async move {
        match field.chunk().await {
            Ok(Some(bytes)) => Ok(Some((bytes, field))),
            Ok(None) => Ok(None),
            Err(e) => Err(StashError::Io(std::io::Error::other(e))),
        }
    })
}

/// Stream one multipart field into the store.
async fn store_field(state: &AppState, field: Field<'_>) -> crate::Result<StoredObject> {
    let filename = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "upload.bin".to_string());

    let content_type = field
        .content_type()
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(&filename)
                .first_or_octet_stream()
                .to_string()
        });

    let meta = NewObject::new(filename).with_content_type(content_type);
    state.store.create(meta, field_stream(field)).await
}

/// POST /upload/file - Upload a single file.
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("failed to read multipart field: {e}");
        ApiError::bad_request("Unable to upload the file").with_detail(e.to_string())
    })? {
        if field.name() != Some("file") {
            continue;
        }

        let object = store_field(&state, field)
            .await
            .map_err(|e| ApiError::from_store("Unable to upload the file", e))?;

        return Ok((
            StatusCode::CREATED,
            Json(UploadResponse {
                text: "File uploaded successfully !".to_string(),
                file: object.into(),
            }),
        ));
    }

    Err(ApiError::bad_request("Unable to upload the file").with_detail("missing 'file' field"))
}

/// POST /upload/files - Upload multiple files.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MultiUploadResponse>), ApiError> {
    let mut stored: Vec<FileDto> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::error!("failed to read multipart field: {e}");
        ApiError::bad_request("Unable to upload files").with_detail(e.to_string())
    })? {
        if field.name() != Some("files") {
            continue;
        }

        let object = store_field(&state, field)
            .await
            .map_err(|e| ApiError::from_store("Unable to upload files", e))?;
        stored.push(object.into());
    }

    if stored.is_empty() {
        return Err(
            ApiError::bad_request("Unable to upload files").with_detail("missing 'files' field")
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(MultiUploadResponse {
            text: "Files uploaded successfully !".to_string(),
            files: stored,
        }),
    ))
}

/// GET /files - List all stored files.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FileDto>>, ApiError> {
    let objects = state
        .store
        .list()
        .await
        .map_err(|e| ApiError::from_store("Unable to retrieve files", e))?;

    Ok(Json(objects.into_iter().map(Into::into).collect()))
}

/// GET /download/files/:id - Download a single file.
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let (meta, stream) = state
        .store
        .open_read(&id)
        .await
        .map_err(|e| ApiError::from_store("Unable to download file", e))?;

    Response::builder()
        .header(header::CONTENT_TYPE, meta.content_type.as_str())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition_header(&meta.filename),
        )
        .header(header::CONTENT_LENGTH, meta.length)
        .body(Body::from_stream(stream))
        .map_err(|e| {
            tracing::error!("failed to build download response: {e}");
            ApiError::bad_request("Unable to download file").with_detail(e.to_string())
        })
}

/// GET /download/files-zip - Download all files as one zip archive.
pub async fn download_zip(
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let objects = state
        .store
        .list()
        .await
        .map_err(|e| ApiError::from_store("Unable to download files", e))?;

    // EmptyCollection surfaces here, before any response byte is written
    let stream = zip_stream(state.store.clone(), objects)
        .map_err(|e| ApiError::from_store("Unable to download files", e))?;

    Response::builder()
        .header(header::CONTENT_TYPE, "application/zip")
        .header(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"files.zip\"",
        )
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(Body::from_stream(stream))
        .map_err(|e| {
            tracing::error!("failed to build zip response: {e}");
            ApiError::bad_request("Unable to download files").with_detail(e.to_string())
        })
}

/// GET /download/files-base64 - Download all files as base64 records.
pub async fn download_base64(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Base64Record>>, ApiError> {
    let objects = state
        .store
        .list()
        .await
        .map_err(|e| ApiError::from_store("Unable to retrieve files", e))?;

    let records = encode_batch(&state.store, &objects)
        .await
        .map_err(|e| ApiError::from_store("Unable to retrieve files", e))?;

    Ok(Json(records))
}

/// PUT /rename/file/:id - Rename a file.
pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenameRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .store
        .rename(&id, &request.filename)
        .await
        .map_err(|e| ApiError::from_store("Unable to rename file", e))?;

    Ok(Json(MessageResponse::new("File renamed successfully !")))
}

/// DELETE /delete/file/:id - Delete a file.
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .store
        .delete(&id)
        .await
        .map_err(|e| ApiError::from_store("Unable to delete file", e))?;

    Ok(Json(MessageResponse::new("File deleted successfully !")))
}
