use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::database::models::Product;
use crate::models::product::ProductRequest;
use crate::models::response::ApiResponse;
use crate::services::ProductService;
use crate::utils::error::ApiError;

pub async fn create_product_handler(
    State(service): State<Arc<ProductService>>,
    Json(request): Json<ProductRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    let product = service.create(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

pub async fn create_products_batch_handler(
    State(service): State<Arc<ProductService>>,
    Json(requests): Json<Vec<ProductRequest>>,
) -> Result<(StatusCode, Json<ApiResponse<Vec<Product>>>), ApiError> {
    let products = service.create_batch(requests).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(products))))
}

pub async fn get_product_handler(
    State(service): State<Arc<ProductService>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let product = service.get(id).await?;
    Ok(Json(ApiResponse::success(product)))
}
