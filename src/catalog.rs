//! Offline-first read path for reference data.
//!
//! Reads go to the network through the interception layer and land in the
//! entity caches; when the network (and its transport-cache fallback) is
//! exhausted, the business partition is served from the structured cache.
//! Filtering, sorting into pages and searching happen over cached records
//! so behavior is identical online and offline.

use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::net::{ApiClient, FetchProxy, FetchRequest, ServedFrom};
use crate::store::{
  snapshot_hash, CacheRecord, Category, Customer, EntityCache, Product, SyncMeta,
};
use std::sync::Arc;

/// Filters applied to a catalog listing.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
  pub search: Option<String>,
  pub category_id: Option<i64>,
  pub sort: Option<SortBy>,
  pub descending: bool,
  /// 1-based page number; 0 is treated as the first page
  pub page: usize,
  /// Page size; 0 falls back to the default of 20
  pub per_page: usize,
}

/// Sort key for product listings. Without one, records stay in id order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
  Name,
  Price,
  Stock,
}

/// One page of a filtered listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: usize,
  pub page: usize,
  pub last_page: usize,
}

/// A served collection plus whether it came from the local cache.
#[derive(Debug, Clone)]
pub struct CatalogResult<T> {
  pub data: T,
  pub from_cache: bool,
}

pub struct Catalog {
  proxy: Arc<FetchProxy>,
  api: ApiClient,
  products: EntityCache<Product>,
  categories: EntityCache<Category>,
  customers: EntityCache<Customer>,
  meta: SyncMeta,
}

impl Catalog {
  pub fn new(
    proxy: Arc<FetchProxy>,
    api: ApiClient,
    products: EntityCache<Product>,
    categories: EntityCache<Category>,
    customers: EntityCache<Customer>,
    meta: SyncMeta,
  ) -> Self {
    Self {
      proxy,
      api,
      products,
      categories,
      customers,
      meta,
    }
  }

  /// Products for one business, filtered and paginated.
  pub async fn products(
    &self,
    business_id: i64,
    query: &ListQuery,
  ) -> Result<CatalogResult<Page<Product>>> {
    match self
      .refresh(&self.products, "api/products", "products", business_id)
      .await
    {
      Ok((records, fresh)) => match self.products.get_all(business_id) {
        Ok(all) => Ok(CatalogResult {
          data: paginate(filter_products(all, query), query),
          from_cache: !fresh,
        }),
        Err(e) => {
          // Store unavailable: serve the snapshot we just fetched directly
          warn!(error = %e, "entity cache unavailable, serving network data");
          Ok(CatalogResult {
            data: paginate(filter_products(records, query), query),
            from_cache: !fresh,
          })
        }
      },
      Err(e) => {
        debug!(error = %e, "serving products from cache");
        let all = self.products.get_all(business_id)?;
        Ok(CatalogResult {
          data: paginate(filter_products(all, query), query),
          from_cache: true,
        })
      }
    }
  }

  /// Categories for one business.
  pub async fn categories(&self, business_id: i64) -> Result<CatalogResult<Vec<Category>>> {
    match self
      .refresh(&self.categories, "api/categories", "categories", business_id)
      .await
    {
      Ok((records, fresh)) => match self.categories.get_all(business_id) {
        Ok(all) => Ok(CatalogResult {
          data: all,
          from_cache: !fresh,
        }),
        Err(e) => {
          warn!(error = %e, "entity cache unavailable, serving network data");
          Ok(CatalogResult {
            data: records,
            from_cache: !fresh,
          })
        }
      },
      Err(e) => {
        debug!(error = %e, "serving categories from cache");
        Ok(CatalogResult {
          data: self.categories.get_all(business_id)?,
          from_cache: true,
        })
      }
    }
  }

  /// Customers for one business, filtered and paginated.
  pub async fn customers(
    &self,
    business_id: i64,
    query: &ListQuery,
  ) -> Result<CatalogResult<Page<Customer>>> {
    match self
      .refresh(&self.customers, "api/customers", "customers", business_id)
      .await
    {
      Ok((records, fresh)) => match self.customers.get_all(business_id) {
        Ok(all) => Ok(CatalogResult {
          data: paginate(filter_customers(all, query), query),
          from_cache: !fresh,
        }),
        Err(e) => {
          warn!(error = %e, "entity cache unavailable, serving network data");
          Ok(CatalogResult {
            data: paginate(filter_customers(records, query), query),
            from_cache: !fresh,
          })
        }
      },
      Err(e) => {
        debug!(error = %e, "serving customers from cache");
        let all = self.customers.get_all(business_id)?;
        Ok(CatalogResult {
          data: paginate(filter_customers(all, query), query),
          from_cache: true,
        })
      }
    }
  }

  /// Product search, cache-first: the partition index answers immediately
  /// when it has matches; the network is only consulted on an empty result.
  pub async fn search_products(
    &self,
    business_id: i64,
    term: &str,
  ) -> Result<CatalogResult<Vec<Product>>> {
    match self.products.search(business_id, term) {
      Ok(hits) if !hits.is_empty() => {
        return Ok(CatalogResult {
          data: hits,
          from_cache: true,
        })
      }
      Ok(_) => {}
      Err(e) => warn!(error = %e, "cache search failed, trying network"),
    }

    match self
      .refresh(&self.products, "api/products", "products", business_id)
      .await
    {
      Ok((records, fresh)) => {
        let query = ListQuery {
          search: Some(term.to_string()),
          ..Default::default()
        };
        Ok(CatalogResult {
          data: filter_products(records, &query),
          from_cache: !fresh,
        })
      }
      Err(_) => Ok(CatalogResult {
        data: Vec::new(),
        from_cache: true,
      }),
    }
  }

  /// Warm the caches for a business. Individual failures are logged and
  /// skipped; preload never blocks startup on a missing collection.
  pub async fn preload(&self, business_id: i64) -> Result<()> {
    info!(business_id, "preloading reference data");

    let bulk = ListQuery {
      per_page: 100,
      ..Default::default()
    };

    let (products, categories, customers) = futures::join!(
      self.products(business_id, &bulk),
      self.categories(business_id),
      self.customers(business_id, &bulk),
    );

    match products {
      Ok(result) => info!(total = result.data.total, "products preloaded"),
      Err(e) => warn!(error = %e, "product preload failed"),
    }
    match categories {
      Ok(result) => info!(total = result.data.len(), "categories preloaded"),
      Err(e) => warn!(error = %e, "category preload failed"),
    }
    match customers {
      Ok(result) => info!(total = result.data.total, "customers preloaded"),
      Err(e) => warn!(error = %e, "customer preload failed"),
    }

    Ok(())
  }

  /// Drop one business's cached reference data. Called on logout or when
  /// switching the business context.
  pub fn clear(&self, business_id: i64) -> Result<()> {
    self.products.clear(business_id)?;
    self.categories.clear(business_id)?;
    self.customers.clear(business_id)?;
    info!(business_id, "cleared cached reference data");
    Ok(())
  }

  /// Fetch the latest snapshot for one collection through the interception
  /// layer and apply it to the entity cache. Returns the records and
  /// whether they are fresh from the network (as opposed to the transport
  /// cache's stale fallback).
  async fn refresh<T: CacheRecord>(
    &self,
    cache: &EntityCache<T>,
    endpoint: &str,
    collection: &str,
    business_id: i64,
  ) -> Result<(Vec<T>, bool)> {
    let mut url = self
      .api
      .base_url()
      .join(endpoint)
      .map_err(|e| EngineError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
    url
      .query_pairs_mut()
      .append_pair("business_id", &business_id.to_string());

    let api = self.api.clone();
    let served = self
      .proxy
      .handle(FetchRequest::get(url), move |req| async move {
        api.fetch_raw(&req).await
      })
      .await?;

    if !served.response.is_success() {
      return Err(EngineError::NetworkUnavailable(format!(
        "snapshot fetch returned {}",
        served.response.status
      )));
    }

    let mut records: Vec<T> = serde_json::from_slice(&served.response.body)?;
    for record in &mut records {
      record.set_business_id(business_id);
    }

    let fresh = served.from == ServedFrom::Network;
    if let Err(e) = apply_snapshot(cache, &self.meta, collection, business_id, &records, fresh) {
      warn!(error = %e, collection, "failed to store snapshot, serving network data directly");
    }

    Ok((records, fresh))
  }
}

/// Apply a snapshot to the entity cache, skipping the write when the
/// snapshot hash matches what was last applied. Sync metadata is only
/// stamped for data that actually came from the network.
fn apply_snapshot<T: CacheRecord>(
  cache: &EntityCache<T>,
  meta: &SyncMeta,
  collection: &str,
  business_id: i64,
  records: &[T],
  fresh: bool,
) -> Result<()> {
  let hash = snapshot_hash(&serde_json::to_vec(records)?);
  let key = format!("{}:{}", collection, business_id);

  if meta.needs_full_sync(&key, &hash)? {
    cache.upsert(records)?;
  }

  if fresh {
    meta.record_sync(&key, Some(&hash))?;
  }

  Ok(())
}

fn filter_products(mut records: Vec<Product>, query: &ListQuery) -> Vec<Product> {
  if let Some(term) = &query.search {
    let term = term.to_lowercase();
    records.retain(|p| {
      p.name.to_lowercase().contains(&term)
        || p.sku.as_deref().is_some_and(|s| s.to_lowercase().contains(&term))
    });
  }

  if let Some(category_id) = query.category_id {
    records.retain(|p| p.category_id == Some(category_id));
  }

  if let Some(sort) = query.sort {
    match sort {
      SortBy::Name => records.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
      SortBy::Price => records.sort_by(|a, b| a.price.total_cmp(&b.price)),
      SortBy::Stock => records.sort_by_key(|p| p.stock),
    }
    if query.descending {
      records.reverse();
    }
  }

  records
}

fn filter_customers(mut records: Vec<Customer>, query: &ListQuery) -> Vec<Customer> {
  if let Some(term) = &query.search {
    let term = term.to_lowercase();
    records.retain(|c| {
      c.name.to_lowercase().contains(&term)
        || c.phone.as_deref().is_some_and(|p| p.contains(&term))
        || c.email.as_deref().is_some_and(|e| e.to_lowercase().contains(&term))
    });
  }

  records
}

fn paginate<T>(records: Vec<T>, query: &ListQuery) -> Page<T> {
  let per_page = if query.per_page == 0 { 20 } else { query.per_page };
  let page = query.page.max(1);
  let total = records.len();
  let last_page = total.div_ceil(per_page).max(1);

  let items = records
    .into_iter()
    .skip((page - 1) * per_page)
    .take(per_page)
    .collect();

  Page {
    items,
    total,
    page,
    last_page,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::db::Database;

  fn product(id: i64, name: &str, sku: &str, category_id: Option<i64>) -> Product {
    Product {
      id,
      business_id: 1,
      name: name.to_string(),
      sku: Some(sku.to_string()),
      category_id,
      price: 10000.0,
      stock: 5,
    }
  }

  #[test]
  fn test_filter_matches_name_or_sku_case_insensitive() {
    let records = vec![
      product(1, "Kopi Susu", "KS-01", Some(1)),
      product(2, "Es Teh", "ET-01", Some(1)),
    ];

    let query = ListQuery {
      search: Some("KOPI".to_string()),
      ..Default::default()
    };
    let hits = filter_products(records.clone(), &query);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 1);

    let query = ListQuery {
      search: Some("et-01".to_string()),
      ..Default::default()
    };
    let hits = filter_products(records, &query);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);
  }

  #[test]
  fn test_filter_by_category() {
    let records = vec![
      product(1, "Kopi", "K", Some(1)),
      product(2, "Nasi Goreng", "N", Some(2)),
    ];

    let query = ListQuery {
      category_id: Some(2),
      ..Default::default()
    };
    let hits = filter_products(records, &query);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, 2);
  }

  #[test]
  fn test_sort_by_price_descending() {
    let mut a = product(1, "Kopi", "K", None);
    a.price = 15000.0;
    let mut b = product(2, "Teh", "T", None);
    b.price = 8000.0;
    let mut c = product(3, "Jus", "J", None);
    c.price = 20000.0;

    let query = ListQuery {
      sort: Some(SortBy::Price),
      descending: true,
      ..Default::default()
    };
    let sorted = filter_products(vec![a, b, c], &query);
    assert_eq!(
      sorted.iter().map(|p| p.id).collect::<Vec<_>>(),
      vec![3, 1, 2]
    );
  }

  #[test]
  fn test_paginate_clamps_and_reports_totals() {
    let records: Vec<Product> = (1..=45)
      .map(|i| product(i, &format!("P{}", i), "S", None))
      .collect();

    let query = ListQuery {
      page: 3,
      per_page: 20,
      ..Default::default()
    };
    let page = paginate(records.clone(), &query);
    assert_eq!(page.items.len(), 5);
    assert_eq!(page.total, 45);
    assert_eq!(page.last_page, 3);

    // Past the end: empty page, same totals
    let query = ListQuery {
      page: 9,
      per_page: 20,
      ..Default::default()
    };
    let page = paginate(records, &query);
    assert!(page.items.is_empty());
    assert_eq!(page.last_page, 3);
  }

  #[test]
  fn test_apply_snapshot_skips_unchanged_data() {
    let db = Arc::new(Database::open_in_memory().unwrap());
    let cache: EntityCache<Product> = EntityCache::new(Arc::clone(&db));
    let meta = SyncMeta::new(db);

    let records = vec![product(1, "Kopi", "K", None)];
    apply_snapshot(&cache, &meta, "products", 1, &records, true).unwrap();
    assert_eq!(cache.count(1).unwrap(), 1);
    let first_sync = meta.last_sync("products:1").unwrap().unwrap();

    // Same snapshot again: no full re-sync needed, metadata still stamped
    apply_snapshot(&cache, &meta, "products", 1, &records, true).unwrap();
    assert_eq!(cache.count(1).unwrap(), 1);
    assert!(meta.last_sync("products:1").unwrap().unwrap() >= first_sync);

    // Stale (transport-cache) data never advances the sync clock
    let hash_before = meta.data_hash("products:1").unwrap();
    let changed = vec![product(2, "Teh", "T", None)];
    apply_snapshot(&cache, &meta, "products", 1, &changed, false).unwrap();
    assert_eq!(meta.data_hash("products:1").unwrap(), hash_before);
    assert_eq!(cache.count(1).unwrap(), 2);
  }
}
