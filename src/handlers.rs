use std::sync::Arc;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection,
        rejection::QueryRejection,
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::warn;

use crate::{
    error::{ApiError, PhotoResult},
    form::{self, CardForm},
    models::{photo_url, Card, CardSummary, HealthResponse, TagCount},
    photos::{PhotoManager, StagedPhoto},
    store::Store,
};

pub struct AppState {
    pub store: Store,
    pub photos: PhotoManager,
}

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::Validation(format!("invalid card id: {raw}")))
}

async fn load_card(store: &Store, id: i64) -> ApiResult<Card> {
    store
        .call(move |store| store.get(id))
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("card {id} not found")))
}

/// Commits and links a photo that came with a create/update form. The card
/// itself is already saved; a failure here is logged and the card is
/// returned without the new photo.
async fn link_form_photo(photos: &PhotoManager, card_id: i64, staged: StagedPhoto) {
    let result: PhotoResult<()> = async {
        let path = photos.commit(card_id, staged).await?;
        photos.attach(card_id, &path).await
    }
    .await;
    if let Err(err) = result {
        warn!(card_id, error = %err, "card saved without its new photo");
    }
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub tag: Option<String>,
}

pub async fn list_cards(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<Vec<CardSummary>>> {
    let Query(params) = params?;
    let cards = state
        .store
        .call(move |store| store.list(params.q.as_deref(), params.tag.as_deref()))
        .await?;
    Ok(Json(cards))
}

pub async fn get_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Card>> {
    let id = parse_id(&id)?;
    Ok(Json(load_card(&state.store, id).await?))
}

pub async fn create_card(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let CardForm { input, photo } = form::read_card_form(multipart?, &state.photos).await?;

    let id = state.store.call(move |store| store.create(&input)).await?;
    if let Some(staged) = photo {
        link_form_photo(&state.photos, id, staged).await;
    }

    Ok((StatusCode::CREATED, Json(load_card(&state.store, id).await?)))
}

pub async fn update_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Card>> {
    let id = parse_id(&id)?;
    if !state.store.call(move |store| store.exists(id)).await? {
        return Err(ApiError::NotFound(format!("card {id} not found")));
    }
    let CardForm { input, photo } = form::read_card_form(multipart?, &state.photos).await?;

    state.store.call(move |store| store.update(id, &input)).await?;
    if let Some(staged) = photo {
        link_form_photo(&state.photos, id, staged).await;
    }

    Ok(Json(load_card(&state.store, id).await?))
}

pub async fn delete_card(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let photo_path = state.store.call(move |store| store.delete(id)).await?;
    if let Err(err) = state.photos.remove(&photo_path).await {
        warn!(card_id = id, path = %photo_path, error = %err, "photo of deleted card left on disk");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = parse_id(&id)?;
    if !state.store.call(move |store| store.exists(id)).await? {
        return Err(ApiError::NotFound(format!("card {id} not found")));
    }

    let staged = form::read_photo_form(multipart?, &state.photos).await?;
    let path = state.photos.commit(id, staged).await?;
    state.photos.attach(id, &path).await?;

    Ok(Json(json!({ "photo_url": photo_url(&path) })))
}

pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    state.photos.detach(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_tags(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<TagCount>>> {
    let tags = state.store.call(|store| store.list_tags()).await?;
    Ok(Json(tags))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = state.store.call(|store| Ok(store.ping())).await.unwrap_or(false);
    Json(HealthResponse {
        status: "ok".to_string(),
        db: if db_ok { "ok" } else { "error" }.to_string(),
    })
}

pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> ApiResult<Response> {
    let path = state.photos.locate(&filename)?;
    let file = File::open(&path).await.map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => ApiError::NotFound("file not found".to_string()),
        _ => ApiError::FileSystem(format!("reading {filename}: {err}")),
    })?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream().to_string();
    let body = Body::from_stream(ReaderStream::new(file));
    Ok(([(header::CONTENT_TYPE, mime)], body).into_response())
}
