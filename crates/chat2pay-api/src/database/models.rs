use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    OutOfStock,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Only active, in-stock products are eligible for recommendation
    pub fn is_available(&self) -> bool {
        self.status == ProductStatus::Active.as_str() && self.stock > 0
    }
}

/// Insertable product (validated request)
#[derive(Debug, Clone, PartialEq)]
pub struct NewProduct {
    pub merchant_id: Uuid,
    pub outlet_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub name: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub stock: i32,
    pub status: ProductStatus,
}

impl NewProduct {
    /// Canonical text embedded for this product at creation time
    pub fn embedding_text(&self) -> String {
        format!(
            "Nama: {}\nDeskripsi: {}\nHarga: {:.0}\n",
            self.name,
            self.description.as_deref().unwrap_or(""),
            self.price
        )
    }

    /// Short content label stored beside the embedding
    pub fn embedding_label(&self) -> String {
        match self.description.as_deref() {
            Some(desc) => format!("{} - {}", self.name, desc),
            None => self.name.clone(),
        }
    }
}

/// Nearest-neighbour hit, ordered by descending similarity
#[derive(Debug, Clone, Copy, FromRow, Serialize, PartialEq)]
pub struct RetrievedCandidate {
    pub product_id: Uuid,
    pub similarity: f32,
}
