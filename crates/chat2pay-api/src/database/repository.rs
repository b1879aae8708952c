use super::models::{NewProduct, Product, RetrievedCandidate};
use super::DbPool;
use anyhow::Result;
use async_trait::async_trait;
use pgvector::Vector;
use tracing::debug;
use uuid::Uuid;

/// Product catalog storage consumed by the dialogue pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: NewProduct) -> Result<Product>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>>;

    /// Bulk lookup. Result order is not guaranteed to match `ids`.
    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>>;

    async fn create_embedding(&self, product_id: Uuid, content: &str, embedding: &[f32]) -> Result<()>;

    /// Cosine nearest neighbours over active, in-stock products.
    /// The price ceiling is applied before ranking.
    async fn nearest_by_similarity(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        max_price: Option<f64>,
    ) -> Result<Vec<RetrievedCandidate>>;
}

pub struct PgProductRepository {
    pub pool: DbPool,
}

impl PgProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn create(&self, product: NewProduct) -> Result<Product> {
        let created = sqlx::query_as::<_, Product>(
            r#"INSERT INTO products
                (id, merchant_id, outlet_id, category_id, name, description,
                 sku, price, stock, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW(), NOW())
               RETURNING id, merchant_id, outlet_id, category_id, name, description,
                         sku, price, stock, status, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(product.merchant_id)
        .bind(product.outlet_id)
        .bind(product.category_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(&product.sku)
        .bind(product.price)
        .bind(product.stock)
        .bind(product.status.as_str())
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Created product {} ({})", created.id, created.name);

        Ok(created)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(
            r#"SELECT id, merchant_id, outlet_id, category_id, name, description,
                      sku, price, stock, status, created_at, updated_at
               FROM products
               WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(self.pool.get_pool())
        .await?;

        Ok(product)
    }

    async fn find_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let products = sqlx::query_as::<_, Product>(
            r#"SELECT id, merchant_id, outlet_id, category_id, name, description,
                      sku, price, stock, status, created_at, updated_at
               FROM products
               WHERE id = ANY($1)"#,
        )
        .bind(ids.to_vec())
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(products)
    }

    async fn create_embedding(&self, product_id: Uuid, content: &str, embedding: &[f32]) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO product_embeddings (product_id, content, embedding, created_at)
               VALUES ($1, $2, $3, NOW())
               ON CONFLICT (product_id)
               DO UPDATE SET content = EXCLUDED.content, embedding = EXCLUDED.embedding"#,
        )
        .bind(product_id)
        .bind(content)
        .bind(Vector::from(embedding.to_vec()))
        .execute(self.pool.get_pool())
        .await?;

        debug!("Stored embedding for product {}", product_id);

        Ok(())
    }

    async fn nearest_by_similarity(
        &self,
        embedding: &[f32],
        min_similarity: f32,
        limit: usize,
        max_price: Option<f64>,
    ) -> Result<Vec<RetrievedCandidate>> {
        // `<=>` is pgvector cosine distance; similarity = 1 - distance
        let candidates = sqlx::query_as::<_, RetrievedCandidate>(
            r#"SELECT
                e.product_id,
                (1 - (e.embedding <=> $1))::float4 AS similarity
               FROM product_embeddings e
               JOIN products p ON p.id = e.product_id
               WHERE p.status = 'active'
                 AND p.stock > 0
                 AND ($4::float8 IS NULL OR p.price <= $4)
                 AND (1 - (e.embedding <=> $1)) >= $2
               ORDER BY e.embedding <=> $1 ASC
               LIMIT $3"#,
        )
        .bind(Vector::from(embedding.to_vec()))
        .bind(min_similarity as f64)
        .bind(limit as i64)
        .bind(max_price)
        .persistent(false)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!(
            "Found {} product candidates (floor={}, max_price={:?})",
            candidates.len(),
            min_similarity,
            max_price
        );

        Ok(candidates)
    }
}
