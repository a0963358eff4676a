use axum::{Json, extract::State, response::IntoResponse};
use serde_json::{Map, Value};
use storefront_auth::AuthenticatedIdentity;

use crate::error::ApiError;
use crate::listing::{CachedListing, user_cache_key};
use crate::server::AppState;

pub const USERS_COLLECTION: &str = "users";

pub async fn root() -> impl IntoResponse {
    "Storefront backend API running"
}

pub async fn get_categories(
    State(state): State<AppState>,
) -> Result<Json<CachedListing>, ApiError> {
    let listing = state
        .read_through
        .fetch_listing(&state.listings.categories)
        .await?;
    Ok(Json(listing))
}

pub async fn get_products(State(state): State<AppState>) -> Result<Json<CachedListing>, ApiError> {
    let listing = state
        .read_through
        .fetch_listing(&state.listings.products)
        .await?;
    Ok(Json(listing))
}

/// The caller's own user document.
pub async fn me(
    State(state): State<AppState>,
    identity: AuthenticatedIdentity,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let key = user_cache_key(&identity.subject_id);
    let found = state
        .read_through
        .fetch_document(
            &key,
            USERS_COLLECTION,
            &identity.subject_id,
            state.user_ttl,
        )
        .await?;

    match found {
        Some((fields, source)) => {
            tracing::debug!(subject_id = %identity.subject_id, ?source, "Served user profile");
            Ok(Json(fields))
        }
        None => Err(ApiError::not_found("user not found")),
    }
}
