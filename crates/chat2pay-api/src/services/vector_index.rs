use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::models::{Product, RetrievedCandidate};
use crate::database::ProductRepository;

/// Read path of the product vector index.
///
/// Guarantees, regardless of backend: every candidate meets the similarity
/// floor, results are ordered by descending similarity, at most `max_results`
/// are returned, and the price ceiling is applied before the top-K cut.
#[derive(Clone)]
pub struct ProductVectorIndex {
    repo: Arc<dyn ProductRepository>,
    min_similarity: f32,
    max_results: usize,
}

impl ProductVectorIndex {
    pub fn new(repo: Arc<dyn ProductRepository>, min_similarity: f32, max_results: usize) -> Self {
        Self {
            repo,
            min_similarity,
            max_results,
        }
    }

    pub async fn nearest(
        &self,
        query_embedding: &[f32],
        max_price: Option<f64>,
    ) -> Result<Vec<RetrievedCandidate>> {
        let max_price = max_price.filter(|p| *p > 0.0);

        let mut candidates = self
            .repo
            .nearest_by_similarity(
                query_embedding,
                self.min_similarity,
                self.max_results,
                max_price,
            )
            .await?;

        let returned = candidates.len();
        candidates.retain(|c| c.similarity >= self.min_similarity);
        if candidates.len() != returned {
            warn!(
                "Dropped {} candidates below similarity floor {}",
                returned - candidates.len(),
                self.min_similarity
            );
        }

        candidates.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        candidates.truncate(self.max_results);

        debug!(
            "Vector index returned {} candidates (max_price={:?})",
            candidates.len(),
            max_price
        );

        Ok(candidates)
    }

    /// Resolve candidates to products in candidate order. Products that are
    /// missing, unavailable, or above the ceiling are dropped.
    pub async fn resolve(
        &self,
        candidates: &[RetrievedCandidate],
        max_price: Option<f64>,
    ) -> Result<Vec<Product>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = candidates.iter().map(|c| c.product_id).collect();
        let mut by_id: HashMap<Uuid, Product> = self
            .repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let ceiling = max_price.filter(|p| *p > 0.0);
        Ok(ids
            .iter()
            .filter_map(|id| by_id.remove(id))
            .filter(|p| p.is_available())
            .filter(|p| ceiling.map_or(true, |max| p.price <= max))
            .collect())
    }

    /// `nearest` followed by `resolve`
    pub async fn search(&self, query_embedding: &[f32], max_price: Option<f64>) -> Result<Vec<Product>> {
        let candidates = self.nearest(query_embedding, max_price).await?;
        self.resolve(&candidates, max_price).await
    }
}
