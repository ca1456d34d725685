//! Business-partitioned entity cache over the local store.

use rusqlite::params;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::db::Database;
use crate::error::Result;

use super::records::CacheRecord;

/// Read cache for one record kind, always scoped to a single business
/// partition per call. Records are stored as serialized JSON plus the index
/// columns needed for partition scans and category lookups.
pub struct EntityCache<T: CacheRecord> {
  db: Arc<Database>,
  _kind: PhantomData<T>,
}

impl<T: CacheRecord> EntityCache<T> {
  pub fn new(db: Arc<Database>) -> Self {
    Self {
      db,
      _kind: PhantomData,
    }
  }

  /// All records in the business partition, ordered by record id.
  pub fn get_all(&self, business_id: i64) -> Result<Vec<T>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT data FROM entity_cache
         WHERE entity_kind = ? AND business_id = ?
         ORDER BY record_id",
      )?;

      let rows = stmt
        .query_map(params![T::entity_kind(), business_id], |row| {
          row.get::<_, Vec<u8>>(0)
        })?
        .filter_map(|r| r.ok())
        .filter_map(|data| serde_json::from_slice(&data).ok())
        .collect();

      Ok(rows)
    })
  }

  /// Records in one category of the business partition. Served by the
  /// composite index, never a full-table scan.
  pub fn get_by_category(&self, business_id: i64, category_id: i64) -> Result<Vec<T>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT data FROM entity_cache
         WHERE entity_kind = ? AND business_id = ? AND category_id = ?
         ORDER BY record_id",
      )?;

      let rows = stmt
        .query_map(params![T::entity_kind(), business_id, category_id], |row| {
          row.get::<_, Vec<u8>>(0)
        })?
        .filter_map(|r| r.ok())
        .filter_map(|data| serde_json::from_slice(&data).ok())
        .collect();

      Ok(rows)
    })
  }

  /// A single record by id within the business partition.
  pub fn get(&self, business_id: i64, record_id: i64) -> Result<Option<T>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT data FROM entity_cache
         WHERE entity_kind = ? AND business_id = ? AND record_id = ?",
      )?;

      let data: Option<Vec<u8>> = stmt
        .query_row(params![T::entity_kind(), business_id, record_id], |row| {
          row.get(0)
        })
        .ok();

      Ok(data.and_then(|d| serde_json::from_slice(&d).ok()))
    })
  }

  /// Bulk replace-by-id upsert of a server snapshot. All rows become visible
  /// together or not at all; re-applying the same snapshot is a no-op beyond
  /// the cached_at timestamps.
  pub fn upsert(&self, records: &[T]) -> Result<()> {
    if records.is_empty() {
      return Ok(());
    }

    self.db.with_conn(|conn| {
      conn.execute("BEGIN TRANSACTION", [])?;

      for record in records {
        let data = match serde_json::to_vec(record) {
          Ok(data) => data,
          Err(e) => {
            conn.execute("ROLLBACK", [])?;
            return Err(rusqlite::Error::ToSqlConversionFailure(Box::new(e)));
          }
        };

        let result = conn.execute(
          "INSERT OR REPLACE INTO entity_cache
             (entity_kind, business_id, record_id, category_id, name, secondary, data, cached_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
          params![
            T::entity_kind(),
            record.business_id(),
            record.record_id(),
            record.category_id(),
            record.display_name(),
            record.secondary_key(),
            data,
          ],
        );

        if let Err(e) = result {
          conn.execute("ROLLBACK", [])?;
          return Err(e);
        }
      }

      conn.execute("COMMIT", [])?;
      Ok(())
    })
  }

  /// Remove one business partition. Used on logout or business switch so a
  /// following session never sees another tenant's data.
  pub fn clear(&self, business_id: i64) -> Result<usize> {
    self.db.with_conn(|conn| {
      conn.execute(
        "DELETE FROM entity_cache WHERE entity_kind = ? AND business_id = ?",
        params![T::entity_kind(), business_id],
      )
    })
  }

  pub fn count(&self, business_id: i64) -> Result<i64> {
    self.db.with_conn(|conn| {
      conn.query_row(
        "SELECT COUNT(*) FROM entity_cache WHERE entity_kind = ? AND business_id = ?",
        params![T::entity_kind(), business_id],
        |row| row.get(0),
      )
    })
  }

  /// Case-insensitive substring search over name and the secondary
  /// identifier, scanning only the business partition.
  pub fn search(&self, business_id: i64, term: &str) -> Result<Vec<T>> {
    let term = term.to_lowercase();

    self.db.with_conn(|conn| {
      let mut stmt = conn.prepare(
        "SELECT data FROM entity_cache
         WHERE entity_kind = ? AND business_id = ?
           AND (instr(lower(name), ?) > 0 OR instr(lower(secondary), ?) > 0)
         ORDER BY record_id",
      )?;

      let rows = stmt
        .query_map(params![T::entity_kind(), business_id, term, term], |row| {
          row.get::<_, Vec<u8>>(0)
        })?
        .filter_map(|r| r.ok())
        .filter_map(|data| serde_json::from_slice(&data).ok())
        .collect();

      Ok(rows)
    })
  }
}

impl<T: CacheRecord> Clone for EntityCache<T> {
  fn clone(&self) -> Self {
    Self {
      db: Arc::clone(&self.db),
      _kind: PhantomData,
    }
  }
}
