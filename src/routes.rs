use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

use crate::{
    catalog,
    coordinator::{GenerationCoordinator, GenerationError},
    models::{GenerationRecord, GenerationRequest, GenerationResult},
    preprocess::{self, PRODUCT_QUALITY, SCENE_QUALITY},
    prompt,
    records::RecordStore,
};

const BRAND_MARK_FILE: &str = "herborist-logo.png";
/// Scene photos arrive straight from phone cameras and are shrunk server-side.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<GenerationCoordinator>,
    pub records: Arc<RecordStore>,
    pub assets_dir: Arc<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("缺少产品选择")]
    MissingProduct,
    #[error("无效的产品选择")]
    UnknownProduct,
    #[error("invalid upload: {0}")]
    Upload(String),
    #[error("product asset unavailable: {0}")]
    Asset(String),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::MissingProduct | ApiError::UnknownProduct | ApiError::Upload(_) => StatusCode::BAD_REQUEST,
            ApiError::Asset(_) | ApiError::Generation(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct GenerateResponse {
    success: bool,
    #[serde(flatten)]
    result: GenerationResult,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/generate", post(generate).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)))
        .route("/api/records", get(list_records))
        .route("/api/products", get(list_products))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut product_id: Option<String> = None;
    let mut scene: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::Upload(e.to_string()))? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "productId" => {
                product_id = Some(field.text().await.map_err(|e| ApiError::Upload(e.to_string()))?);
            }
            "envFile" => {
                let data = field.bytes().await.map_err(|e| ApiError::Upload(e.to_string()))?;
                if !data.is_empty() {
                    scene = Some(data);
                }
            }
            _ => {}
        }
    }

    let product_id = product_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::MissingProduct)?;
    let product = catalog::find(&product_id).ok_or(ApiError::UnknownProduct)?;
    tracing::info!(
        "🚀 Generate request for {} ({}), scene upload: {}",
        product.name,
        product.id,
        scene.as_ref().map(|s| s.len()).unwrap_or(0)
    );

    let product_path = state.assets_dir.join("products").join(format!("{}.webp", product.id));
    let product_bytes = tokio::fs::read(&product_path)
        .await
        .map_err(|e| ApiError::Asset(format!("{}: {}", product_path.display(), e)))?;

    let brand_path = state.assets_dir.join(BRAND_MARK_FILE);
    let brand_mark = match tokio::fs::read(&brand_path).await {
        Ok(bytes) => Some(Bytes::from(bytes)),
        Err(e) => {
            tracing::warn!("⚠️ Brand mark {} unavailable: {}", brand_path.display(), e);
            None
        }
    };

    let (product_reference, scene_image) = tokio::join!(
        preprocess::normalize_blocking(Bytes::from(product_bytes), PRODUCT_QUALITY, "product"),
        async {
            match scene {
                Some(scene) => Some(preprocess::normalize_blocking(scene, SCENE_QUALITY, "scene").await),
                None => None,
            }
        },
    );

    let request = GenerationRequest {
        product_id: product.id.to_string(),
        product_name: product.name.to_string(),
        scene_image,
        product_reference,
        brand_mark,
    };
    let has_env = prompt::has_scene(request.scene_image.as_deref());

    let result = state.coordinator.generate(&request).await?;

    if let Err(e) = state.records.append(GenerationRecord::from_result(product.id, has_env, &result)) {
        tracing::warn!("⚠️ Failed to persist generation record: {}", e);
    }
    Ok(Json(GenerateResponse { success: true, result }))
}

pub async fn list_records(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "success": true, "records": state.records.list() }))
}

pub async fn list_products() -> impl IntoResponse {
    Json(json!({ "products": catalog::PRODUCTS }))
}
