use serde::Deserialize;
use uuid::Uuid;

use crate::database::models::{NewProduct, ProductStatus};
use crate::utils::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
pub struct ProductRequest {
    pub merchant_id: Uuid,
    #[serde(default)]
    pub outlet_id: Option<Uuid>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sku: String,
    pub price: f64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub status: Option<ProductStatus>,
}

impl ProductRequest {
    /// Validate and convert into an insertable product
    pub fn into_new_product(self) -> Result<NewProduct, ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::BadRequest("name is required".to_string()));
        }
        if self.price.is_nan() || self.price <= 0.0 {
            return Err(ApiError::BadRequest("price must be greater than 0".to_string()));
        }
        if self.stock < 0 {
            return Err(ApiError::BadRequest("stock must not be negative".to_string()));
        }

        Ok(NewProduct {
            merchant_id: self.merchant_id,
            outlet_id: self.outlet_id,
            category_id: self.category_id,
            name: self.name.trim().to_string(),
            description: non_empty(self.description),
            sku: non_empty(self.sku),
            price: self.price,
            stock: self.stock,
            status: self.status.unwrap_or(ProductStatus::Active),
        })
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProductRequest {
        ProductRequest {
            merchant_id: Uuid::new_v4(),
            outlet_id: None,
            category_id: None,
            name: " Laptop ROG ".to_string(),
            description: String::new(),
            sku: "ROG-1".to_string(),
            price: 14_500_000.0,
            stock: 3,
            status: None,
        }
    }

    #[test]
    fn test_defaults_to_active_and_drops_empty_strings() {
        let product = request().into_new_product().unwrap();
        assert_eq!(product.status, ProductStatus::Active);
        assert_eq!(product.name, "Laptop ROG");
        assert!(product.description.is_none());
        assert_eq!(product.sku.as_deref(), Some("ROG-1"));
    }

    #[test]
    fn test_rejects_invalid_price_and_stock() {
        let mut req = request();
        req.price = 0.0;
        assert!(req.into_new_product().is_err());

        let mut req = request();
        req.stock = -1;
        assert!(req.into_new_product().is_err());

        let mut req = request();
        req.name = "  ".to_string();
        assert!(req.into_new_product().is_err());
    }
}
