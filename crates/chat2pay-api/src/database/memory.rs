use super::models::{NewProduct, Product, RetrievedCandidate};
use super::repository::ProductRepository;
use crate::utils::similarity::{cosine_similarity, normalize};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Catalog {
    products: HashMap<Uuid, Product>,
    embeddings: HashMap<Uuid, Vec<f32>>,
}

/// Process-local product catalog with brute-force cosine search.
/// Backs the `memory` storage backend.
#[derive(Clone, Default)]
pub struct InMemoryProductRepository {
    catalog: Arc<RwLock<Catalog>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed product (keeps its id)
    pub fn insert(&self, product: Product) {
        self.catalog.write().products.insert(product.id, product);
    }

    pub fn len(&self) -> usize {
        self.catalog.read().products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let now = Utc::now();
        let created = Product {
            id: Uuid::new_v4(),
            merchant_id: product.merchant_id,
            outlet_id: product.outlet_id,
            category_id: product.category_id,
            name: product.name,
            description: product.description,
            sku: product.sku,
            price: product.price,
            stock: product.stock,
            status: product.status.as_str().to_string(),
            created_at: now,
            updated_at: now,
        };
        self.insert(created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.catalog.read().products.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let catalog = self.catalog.read();
        Ok(ids
            .iter()
            .filter_map(|id| catalog.products.get(id).cloned())
            .collect())
    }

    async fn create_embedding(&self, product_id: Uuid, _content: &str, embedding: &[f32]) -> Result<()> {
        let mut catalog = self.catalog.write();
        if !catalog.products.contains_key(&product_id) {
            anyhow::bail!("Product {} does not exist", product_id);
        }
        catalog.embeddings.insert(product_id, normalize(embedding));
        Ok(())
    }

    async fn nearest_by_similarity(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        max_price: Option<f64>,
    ) -> Result<Vec<RetrievedCandidate>> {
        let query = normalize(embedding);
        let catalog = self.catalog.read();

        let mut candidates = Vec::new();
        for (id, stored) in &catalog.embeddings {
            let Some(product) = catalog.products.get(id) else {
                continue;
            };
            if !product.is_available() {
                continue;
            }
            // Price ceiling applies before ranking
            if matches!(max_price, Some(ceiling) if product.price > ceiling) {
                continue;
            }

            let similarity = cosine_similarity(&query, stored)?;
            if similarity >= min_similarity {
                candidates.push(RetrievedCandidate {
                    product_id: *id,
                    similarity,
                });
            }
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        candidates.truncate(limit);

        debug!("In-memory search returned {} candidates", candidates.len());

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::ProductStatus;

    fn new_product(name: &str, price: f64, stock: i32, status: ProductStatus) -> NewProduct {
        NewProduct {
            merchant_id: Uuid::nil(),
            outlet_id: None,
            category_id: None,
            name: name.to_string(),
            description: None,
            sku: None,
            price,
            stock,
            status,
        }
    }

    async fn seed(
        repo: &InMemoryProductRepository,
        name: &str,
        price: f64,
        embedding: &[f32],
    ) -> Uuid {
        let p = repo
            .create(new_product(name, price, 5, ProductStatus::Active))
            .await
            .unwrap();
        repo.create_embedding(p.id, name, embedding).await.unwrap();
        p.id
    }

    #[tokio::test]
    async fn test_price_ceiling_applies_before_top_k() {
        let repo = InMemoryProductRepository::new();
        let expensive = seed(&repo, "expensive", 20_000_000.0, &[1.0, 0.0]).await;
        let cheap = seed(&repo, "cheap", 9_000_000.0, &[0.9, 0.1]).await;

        // Top-1 without a ceiling is the expensive one
        let hits = repo.nearest_by_similarity(&[1.0, 0.0], 0.7, 1, None).await.unwrap();
        assert_eq!(hits[0].product_id, expensive);

        // With a ceiling the cheap one makes the top-1 cut
        let hits = repo
            .nearest_by_similarity(&[1.0, 0.0], 0.7, 1, Some(15_000_000.0))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].product_id, cheap);
    }

    #[tokio::test]
    async fn test_skips_unavailable_products() {
        let repo = InMemoryProductRepository::new();
        let p = repo
            .create(new_product("habis", 100.0, 0, ProductStatus::Active))
            .await
            .unwrap();
        repo.create_embedding(p.id, "habis", &[1.0, 0.0]).await.unwrap();
        let q = repo
            .create(new_product("nonaktif", 100.0, 3, ProductStatus::Inactive))
            .await
            .unwrap();
        repo.create_embedding(q.id, "nonaktif", &[1.0, 0.0]).await.unwrap();

        let hits = repo.nearest_by_similarity(&[1.0, 0.0], 0.0, 10, None).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_requires_existing_product() {
        let repo = InMemoryProductRepository::new();
        assert!(repo.create_embedding(Uuid::new_v4(), "x", &[1.0]).await.is_err());
    }
}
