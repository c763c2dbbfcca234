//! Record storage.
//!
//! The [`RecordStore`] trait is the seam between the HTTP layer and
//! wherever sales and spiffs actually live.  [`MemoryStore`] keeps them
//! in process, which is what the binary and the tests use.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{SaleRecord, SpiffEntry};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Owner and date-range filter shared by sale and spiff queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordQuery {
    pub owner_id: Uuid,
    /// Inclusive lower bound.
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound.
    pub to: Option<NaiveDate>,
    pub order: SortOrder,
}

impl RecordQuery {
    pub fn for_owner(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            from: None,
            to: None,
            order: SortOrder::default(),
        }
    }

    fn matches(&self, owner_id: Uuid, date: NaiveDate) -> bool {
        owner_id == self.owner_id
            && self.from.map_or(true, |from| date >= from)
            && self.to.map_or(true, |to| date < to)
    }

    fn compare(&self, a: (NaiveDate, DateTime<Utc>), b: (NaiveDate, DateTime<Utc>)) -> Ordering {
        match self.order {
            SortOrder::Asc => a.cmp(&b),
            SortOrder::Desc => b.cmp(&a),
        }
    }
}

/// Persistence operations for the two record kinds.
///
/// Implementations must be thread-safe (`Send + Sync`) because the
/// router shares a single store across all requests.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn insert_sale(&self, sale: SaleRecord) -> AppResult<SaleRecord>;
    async fn update_sale(&self, sale: SaleRecord) -> AppResult<SaleRecord>;
    async fn delete_sale(&self, id: Uuid) -> AppResult<()>;
    async fn get_sale(&self, id: Uuid) -> AppResult<Option<SaleRecord>>;
    async fn query_sales(&self, query: &RecordQuery) -> AppResult<Vec<SaleRecord>>;

    async fn insert_spiff(&self, spiff: SpiffEntry) -> AppResult<SpiffEntry>;
    async fn update_spiff(&self, spiff: SpiffEntry) -> AppResult<SpiffEntry>;
    async fn delete_spiff(&self, id: Uuid) -> AppResult<()>;
    async fn get_spiff(&self, id: Uuid) -> AppResult<Option<SpiffEntry>>;
    async fn query_spiffs(&self, query: &RecordQuery) -> AppResult<Vec<SpiffEntry>>;
}

#[derive(Default)]
pub struct MemoryStore {
    sales: RwLock<HashMap<Uuid, SaleRecord>>,
    spiffs: RwLock<HashMap<Uuid, SpiffEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert_sale(&self, sale: SaleRecord) -> AppResult<SaleRecord> {
        let mut sales = self.sales.write().await;
        if sales.contains_key(&sale.id) {
            return Err(AppError::Conflict(format!("sale {} already exists", sale.id)));
        }
        sales.insert(sale.id, sale.clone());
        Ok(sale)
    }

    async fn update_sale(&self, sale: SaleRecord) -> AppResult<SaleRecord> {
        let mut sales = self.sales.write().await;
        let slot = sales.get_mut(&sale.id).ok_or(AppError::NotFound)?;
        *slot = sale.clone();
        Ok(sale)
    }

    async fn delete_sale(&self, id: Uuid) -> AppResult<()> {
        self.sales
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn get_sale(&self, id: Uuid) -> AppResult<Option<SaleRecord>> {
        Ok(self.sales.read().await.get(&id).cloned())
    }

    async fn query_sales(&self, query: &RecordQuery) -> AppResult<Vec<SaleRecord>> {
        let sales = self.sales.read().await;
        let mut found: Vec<SaleRecord> = sales
            .values()
            .filter(|s| query.matches(s.owner_id, s.sold_on))
            .cloned()
            .collect();
        found.sort_by(|a, b| query.compare((a.sold_on, a.created_at), (b.sold_on, b.created_at)));
        Ok(found)
    }

    async fn insert_spiff(&self, spiff: SpiffEntry) -> AppResult<SpiffEntry> {
        let mut spiffs = self.spiffs.write().await;
        if spiffs.contains_key(&spiff.id) {
            return Err(AppError::Conflict(format!("spiff {} already exists", spiff.id)));
        }
        spiffs.insert(spiff.id, spiff.clone());
        Ok(spiff)
    }

    async fn update_spiff(&self, spiff: SpiffEntry) -> AppResult<SpiffEntry> {
        let mut spiffs = self.spiffs.write().await;
        let slot = spiffs.get_mut(&spiff.id).ok_or(AppError::NotFound)?;
        *slot = spiff.clone();
        Ok(spiff)
    }

    async fn delete_spiff(&self, id: Uuid) -> AppResult<()> {
        self.spiffs
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }

    async fn get_spiff(&self, id: Uuid) -> AppResult<Option<SpiffEntry>> {
        Ok(self.spiffs.read().await.get(&id).cloned())
    }

    async fn query_spiffs(&self, query: &RecordQuery) -> AppResult<Vec<SpiffEntry>> {
        let spiffs = self.spiffs.read().await;
        let mut found: Vec<SpiffEntry> = spiffs
            .values()
            .filter(|s| query.matches(s.owner_id, s.awarded_on))
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            query.compare((a.awarded_on, a.created_at), (b.awarded_on, b.created_at))
        });
        Ok(found)
    }
}
