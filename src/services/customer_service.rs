use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::domain::{Customer, UpdateCustomer};
use crate::events::{EventSink, LifecycleEvent};
use crate::store::{CrmStore, CustomerFilter, Page, PageRequest};

/// Customers are created only by lead conversion; see `LeadService::convert`.
#[derive(Clone)]
pub struct CustomerService {
    store: Arc<dyn CrmStore>,
    events: Arc<dyn EventSink>,
}

impl CustomerService {
    pub fn new(store: Arc<dyn CrmStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub async fn list(&self, filter: &CustomerFilter, page: PageRequest) -> ServiceResult<Page<Customer>> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_customers(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Customer> {
        let mut tx = self.store.begin().await?;
        tx.customer(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))
    }

    pub async fn update(&self, id: Uuid, input: UpdateCustomer) -> ServiceResult<Customer> {
        ServiceError::check(input.validate())?;
        self.modify(id, |customer| input.apply_to(customer)).await
    }

    /// Customers keep their lineage, so delete only deactivates the account
    pub async fn deactivate(&self, id: Uuid) -> ServiceResult<Customer> {
        self.modify(id, |customer| customer.is_active = false).await
    }

    async fn modify(&self, id: Uuid, change: impl FnOnce(&mut Customer) + Send) -> ServiceResult<Customer> {
        let mut tx = self.store.begin().await?;
        let mut customer = tx
            .lock_customer(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Customer", id))?;

        change(&mut customer);
        ServiceError::check(customer.validate())?;
        customer.updated_at = Utc::now();
        tx.save_customer(&customer).await?;
        tx.commit().await?;

        info!(customer_id = %id, is_active = customer.is_active, "customer updated");
        self.events
            .publish(LifecycleEvent::CustomerUpdated { customer_id: id })
            .await;
        Ok(customer)
    }
}
