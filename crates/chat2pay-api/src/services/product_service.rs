use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::models::{NewProduct, Product};
use crate::database::ProductRepository;
use crate::models::product::ProductRequest;
use crate::services::llm::LlmProvider;
use crate::utils::error::ApiError;

/// Product creation and lookup. Each product gets its embedding at creation time.
pub struct ProductService {
    repo: Arc<dyn ProductRepository>,
    llm: Arc<dyn LlmProvider>,
}

impl ProductService {
    pub fn new(repo: Arc<dyn ProductRepository>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { repo, llm }
    }

    /// Embed first so a provider failure leaves nothing behind
    pub async fn create(&self, request: ProductRequest) -> Result<Product, ApiError> {
        let new_product = request.into_new_product()?;

        let embedding = self
            .llm
            .embed(&new_product.embedding_text())
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to embed product {}: {}", new_product.name, e)))?;

        let product = self.store(new_product, &embedding).await?;
        info!("Created product {} with embedding", product.id);

        Ok(product)
    }

    /// Validate every request, embed them in one batch call, then write
    pub async fn create_batch(&self, requests: Vec<ProductRequest>) -> Result<Vec<Product>, ApiError> {
        if requests.is_empty() {
            return Err(ApiError::BadRequest("at least one product is required".to_string()));
        }

        let new_products = requests
            .into_iter()
            .enumerate()
            .map(|(i, r)| {
                r.into_new_product().map_err(|e| match e {
                    ApiError::BadRequest(msg) => ApiError::BadRequest(format!("product[{}]: {}", i, msg)),
                    other => other,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let texts: Vec<String> = new_products.iter().map(NewProduct::embedding_text).collect();
        let embeddings = self
            .llm
            .embed_batch(&texts)
            .await
            .map_err(|e| ApiError::LlmError(format!("Failed to embed product batch: {}", e)))?;

        if embeddings.len() != new_products.len() {
            return Err(ApiError::LlmError(format!(
                "Embedding batch size mismatch: expected {}, got {}",
                new_products.len(),
                embeddings.len()
            )));
        }

        let mut products = Vec::with_capacity(new_products.len());
        for (new_product, embedding) in new_products.into_iter().zip(&embeddings) {
            products.push(self.store(new_product, embedding).await?);
        }

        debug!("Created {} products with embeddings", products.len());

        Ok(products)
    }

    async fn store(&self, new_product: NewProduct, embedding: &[f32]) -> Result<Product, ApiError> {
        let label = new_product.embedding_label();

        let product = self
            .repo
            .create(new_product)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        self.repo
            .create_embedding(product.id, &label, embedding)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?;

        Ok(product)
    }

    pub async fn get(&self, id: Uuid) -> Result<Product, ApiError> {
        self.repo
            .find_by_id(id)
            .await
            .map_err(|e| ApiError::DatabaseError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound(format!("product {} not found", id)))
    }
}
