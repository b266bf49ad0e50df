//! Campaign endpoints
//!
//! - GET /api/v1/campaigns/{slug}/variant - Weighted pick; counts a view
//! - POST /api/v1/campaigns/variants/{id}/view - Count a view for a variant the client already shows
//! - /api/v1/admin/campaigns - Editor CRUD with variants and their counters

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::responses::ApiError;
use crate::api::state::AppState;
use crate::models::{Campaign, CampaignVariant, CampaignWithVariants, CreateCampaignInput, CreateVariantInput, UpdateCampaignInput};

/// What the public site needs to render a variant and attribute a conversion
#[derive(Debug, Serialize)]
pub struct PublicVariant {
    pub id: i64,
    pub campaign_id: i64,
    pub headline: String,
    pub body: Option<String>,
}

impl From<CampaignVariant> for PublicVariant {
    fn from(v: CampaignVariant) -> Self {
        Self {
            id: v.id,
            campaign_id: v.campaign_id,
            headline: v.headline,
            body: v.body,
        }
    }
}

/// Variant with its conversion rate, for the admin
#[derive(Debug, Serialize)]
pub struct VariantStats {
    #[serde(flatten)]
    pub variant: CampaignVariant,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct CampaignDetailResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub variants: Vec<VariantStats>,
}

impl From<CampaignWithVariants> for CampaignDetailResponse {
    fn from(c: CampaignWithVariants) -> Self {
        Self {
            campaign: c.campaign,
            variants: c
                .variants
                .into_iter()
                .map(|variant| VariantStats {
                    conversion_rate: variant.conversion_rate(),
                    variant,
                })
                .collect(),
        }
    }
}

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/{slug}/variant", get(pick_variant))
        .route("/variants/{id}/view", post(record_view))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_campaigns).post(create_campaign))
        .route("/{id}", get(get_campaign).put(update_campaign).delete(delete_campaign))
        .route("/{id}/variants", post(add_variant))
        .route("/variants/{id}", delete(delete_variant))
}

async fn pick_variant(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<PublicVariant>, ApiError> {
    let variant = state.content_service.pick_variant(&slug).await?;
    Ok(Json(variant.into()))
}

async fn record_view(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.record_variant_view(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_campaigns(State(state): State<AppState>) -> Result<Json<Vec<Campaign>>, ApiError> {
    Ok(Json(state.content_service.list_campaigns().await?))
}

async fn get_campaign(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CampaignDetailResponse>, ApiError> {
    Ok(Json(state.content_service.get_campaign(id).await?.into()))
}

async fn create_campaign(
    State(state): State<AppState>,
    Json(input): Json<CreateCampaignInput>,
) -> Result<impl IntoResponse, ApiError> {
    let campaign = state.content_service.create_campaign(input).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn update_campaign(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCampaignInput>,
) -> Result<Json<Campaign>, ApiError> {
    Ok(Json(state.content_service.update_campaign(id, input).await?))
}

async fn delete_campaign(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.delete_campaign(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn add_variant(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<CreateVariantInput>,
) -> Result<impl IntoResponse, ApiError> {
    let variant = state.content_service.add_variant(id, input).await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

async fn delete_variant(State(state): State<AppState>, Path(id): Path<i64>) -> Result<StatusCode, ApiError> {
    state.content_service.delete_variant(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_public_variant_hides_counters() {
        let variant = CampaignVariant {
            id: 3,
            campaign_id: 1,
            name: "B".to_string(),
            headline: "Boka en demo".to_string(),
            body: None,
            weight: 2,
            views: 40,
            conversions: 4,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(PublicVariant::from(variant)).unwrap();
        assert_eq!(json["headline"], "Boka en demo");
        assert!(json.get("views").is_none());
        assert!(json.get("weight").is_none());
    }
}
