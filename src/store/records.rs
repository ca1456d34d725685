//! Reference-data records cached from server snapshots.
//!
//! The client never originates entity data: records arrive as JSON arrays
//! from the backend and are replaced wholesale by id. Every record carries
//! the `business_id` it belongs to; reads are always scoped to one partition.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Trait for records held in the business-partitioned entity cache.
pub trait CacheRecord: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Server-assigned id, unique within the business partition.
  fn record_id(&self) -> i64;

  /// Owning business partition.
  fn business_id(&self) -> i64;

  /// Stamp the partition on a record from a snapshot (the server omits it
  /// on business-scoped endpoints).
  fn set_business_id(&mut self, business_id: i64);

  /// Category partition within the business, if the kind has one.
  fn category_id(&self) -> Option<i64> {
    None
  }

  /// Human-readable name, searched by substring.
  fn display_name(&self) -> &str;

  /// Secondary identifier for search (SKU, phone).
  fn secondary_key(&self) -> Option<&str> {
    None
  }

  /// Kind name for storage organization (e.g. "product").
  fn entity_kind() -> &'static str;
}

/// Catalog item sold at the point of sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
  pub id: i64,
  #[serde(default)]
  pub business_id: i64,
  pub name: String,
  #[serde(default)]
  pub sku: Option<String>,
  #[serde(default)]
  pub category_id: Option<i64>,
  pub price: f64,
  #[serde(default)]
  pub stock: i64,
}

impl CacheRecord for Product {
  fn record_id(&self) -> i64 {
    self.id
  }

  fn business_id(&self) -> i64 {
    self.business_id
  }

  fn set_business_id(&mut self, business_id: i64) {
    self.business_id = business_id;
  }

  fn category_id(&self) -> Option<i64> {
    self.category_id
  }

  fn display_name(&self) -> &str {
    &self.name
  }

  fn secondary_key(&self) -> Option<&str> {
    self.sku.as_deref()
  }

  fn entity_kind() -> &'static str {
    "product"
  }
}

/// Product category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
  pub id: i64,
  #[serde(default)]
  pub business_id: i64,
  pub name: String,
}

impl CacheRecord for Category {
  fn record_id(&self) -> i64 {
    self.id
  }

  fn business_id(&self) -> i64 {
    self.business_id
  }

  fn set_business_id(&mut self, business_id: i64) {
    self.business_id = business_id;
  }

  fn display_name(&self) -> &str {
    &self.name
  }

  fn entity_kind() -> &'static str {
    "category"
  }
}

/// Customer on file with a business.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
  pub id: i64,
  #[serde(default)]
  pub business_id: i64,
  pub name: String,
  #[serde(default)]
  pub phone: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

impl CacheRecord for Customer {
  fn record_id(&self) -> i64 {
    self.id
  }

  fn business_id(&self) -> i64 {
    self.business_id
  }

  fn set_business_id(&mut self, business_id: i64) {
    self.business_id = business_id;
  }

  fn display_name(&self) -> &str {
    &self.name
  }

  fn secondary_key(&self) -> Option<&str> {
    self.phone.as_deref().or(self.email.as_deref())
  }

  fn entity_kind() -> &'static str {
    "customer"
  }
}
