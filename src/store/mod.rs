//! Persistence seam.
//!
//! All reads and writes happen on a `CrmTx`. Dropping a transaction without
//! calling `commit` rolls it back, so an early `?` return never leaves half of
//! a conversion behind.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Contact, ContactOwner, Customer, CustomerType, Lead, LeadSource, LeadStatus, PreLead, PreLeadStatus, Priority,
    RecordStatus, User,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("foreign key constraint violated: {0}")]
    ForeignKeyViolation(String),

    #[error(transparent)]
    Database(sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let constraint = db_err.constraint().unwrap_or("unknown").to_string();
            match db_err.code().as_deref() {
                Some("23505") => return StoreError::UniqueViolation(constraint),
                Some("23503") => return StoreError::ForeignKeyViolation(constraint),
                _ => {}
            }
        }
        StoreError::Database(err)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Clamp caller input: pages start at 1, sizes at 1..=max
    pub fn new(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(default_size).clamp(1, max_size.max(1)),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageMeta {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageMeta,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        let size = i64::from(request.page_size);
        Self {
            items,
            pagination: PageMeta {
                page: request.page,
                page_size: request.page_size,
                total,
                total_pages: (total + size - 1) / size,
            },
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreLeadFilter {
    pub status: Option<PreLeadStatus>,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub is_converted: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    pub status: Option<RecordStatus>,
    pub lead_status: Option<LeadStatus>,
    pub priority: Option<Priority>,
    pub source: Option<LeadSource>,
    pub assigned_to: Option<Uuid>,
    pub is_converted: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CustomerFilter {
    pub customer_type: Option<CustomerType>,
    pub account_manager: Option<Uuid>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ContactFilter {
    pub lead_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn CrmTx>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

/// One unit of work. `save_*` inserts or replaces the row with the record's id.
#[async_trait]
pub trait CrmTx: Send {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn save_user(&mut self, user: &User) -> Result<(), StoreError>;

    async fn pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError>;
    /// Like `pre_lead`, holding a row lock until the transaction ends
    async fn lock_pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError>;
    async fn list_pre_leads(
        &mut self,
        filter: &PreLeadFilter,
        page: PageRequest,
    ) -> Result<(Vec<PreLead>, i64), StoreError>;
    async fn save_pre_lead(&mut self, pre_lead: &PreLead) -> Result<(), StoreError>;
    async fn delete_pre_lead(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn lock_lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError>;
    async fn list_leads(&mut self, filter: &LeadFilter, page: PageRequest) -> Result<(Vec<Lead>, i64), StoreError>;
    async fn save_lead(&mut self, lead: &Lead) -> Result<(), StoreError>;
    async fn delete_lead(&mut self, id: Uuid) -> Result<bool, StoreError>;

    async fn customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError>;
    async fn lock_customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError>;
    async fn list_customers(
        &mut self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<(Vec<Customer>, i64), StoreError>;
    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError>;
    async fn customer_code_exists(&mut self, code: &str) -> Result<bool, StoreError>;
    /// Take the generation lock for `month` (`YYYYMM`) and return the codes
    /// already issued with that month's prefix
    async fn lock_customer_codes(&mut self, month: &str) -> Result<Vec<String>, StoreError>;

    async fn contact(&mut self, id: Uuid) -> Result<Option<Contact>, StoreError>;
    async fn list_contacts(
        &mut self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, i64), StoreError>;
    async fn save_contact(&mut self, contact: &Contact) -> Result<(), StoreError>;
    async fn delete_contact(&mut self, id: Uuid) -> Result<bool, StoreError>;
    /// Unset `is_primary` on the owner's contacts other than `except`
    async fn clear_primary(&mut self, owner: ContactOwner, except: Option<Uuid>) -> Result<u64, StoreError>;
    /// Move every contact of the lead to the customer
    async fn transfer_contacts(&mut self, lead_id: Uuid, customer_id: Uuid) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_request_clamps_input() {
        let req = PageRequest::new(Some(0), Some(1000), 20, 100);
        assert_eq!(req, PageRequest { page: 1, page_size: 100 });
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(Some(3), None, 20, 100);
        assert_eq!(req.offset(), 40);
        assert_eq!(req.limit(), 20);
    }

    #[test]
    fn page_meta_rounds_total_pages_up() {
        let page = Page::new(vec![1, 2], 41, PageRequest::new(Some(1), Some(20), 20, 100));
        assert_eq!(page.pagination.total_pages, 3);
        let empty: Page<u8> = Page::new(vec![], 0, PageRequest::new(None, None, 20, 100));
        assert_eq!(empty.pagination.total_pages, 0);
    }
}
