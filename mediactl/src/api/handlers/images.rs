//! Storage-URL resolution.

use axum::{
    Json,
    extract::{RawQuery, State},
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::{IntoParams, ToSchema};

use crate::{
    AppState,
    errors::{Error, Result},
};

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ImageUrlQuery {
    /// Storage identifier issued by the document backend
    pub storage_id: Option<String>,
}

impl ImageUrlQuery {
    /// Takes the first `storageId`; repeats are ignored and undecodable bytes are replaced.
    fn from_raw(raw: Option<&str>) -> Self {
        let storage_id = raw.and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(key, _)| key == "storageId")
                .map(|(_, value)| value.into_owned())
        });
        Self { storage_id }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ImageUrlResponse {
    pub url: String,
}

#[utoipa::path(
    get,
    path = "/get-image-url",
    tag = "images",
    summary = "Resolve image URL",
    description = "Resolve a storage identifier to the URL the document backend serves it from. \
        The URL is returned exactly as the backend produced it.",
    params(ImageUrlQuery),
    responses(
        (status = 200, description = "URL resolved", body = ImageUrlResponse),
        (status = 400, description = "storageId missing or empty"),
        (status = 404, description = "No object for this storage id"),
        (status = 500, description = "Backend call failed"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn get_image_url(State(state): State<AppState>, RawQuery(raw): RawQuery) -> Result<Json<ImageUrlResponse>> {
    let storage_id = ImageUrlQuery::from_raw(raw.as_deref())
        .storage_id.filter(|id| !id.is_empty()).ok_or_else(|| Error::BadRequest {
        message: "Storage ID is required".to_string(),
    })?;

    let url = state.backend.image_url(&storage_id).await.map_err(|e| {
        error!(storage_id = %storage_id, error = %e, "Error getting image URL");
        Error::upstream("get image URL", e)
    })?;

    let url = url.ok_or_else(|| Error::NotFound {
        resource: "Image".to_string(),
    })?;

    if !state.images.is_allowed(&url) {
        warn!(storage_id = %storage_id, url = %url, "Resolved image URL is outside images.remote_patterns");
    }

    Ok(Json(ImageUrlResponse { url }))
}
