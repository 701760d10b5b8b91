use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::conversion::{self, customer_code, ConvertLead, Discard};
use crate::domain::status::{MAX_STAGE, MIN_STAGE};
use crate::domain::{Customer, Lead, LeadStatus, NewLead, UpdateLead};
use crate::events::{EventSink, LifecycleEvent};
use crate::store::{CrmStore, CrmTx, LeadFilter, Page, PageRequest};

#[derive(Debug, Clone, Serialize)]
pub struct LeadConversion {
    pub lead: Lead,
    pub customer: Customer,
    pub contacts_moved: u64,
}

#[derive(Clone)]
pub struct LeadService {
    store: Arc<dyn CrmStore>,
    events: Arc<dyn EventSink>,
}

async fn locked(tx: &mut Box<dyn CrmTx>, id: Uuid) -> ServiceResult<Lead> {
    tx.lock_lead(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Lead", id))
}

impl LeadService {
    pub fn new(store: Arc<dyn CrmStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub async fn list(&self, filter: &LeadFilter, page: PageRequest) -> ServiceResult<Page<Lead>> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_leads(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Lead> {
        let mut tx = self.store.begin().await?;
        tx.lead(id).await?.ok_or_else(|| ServiceError::not_found("Lead", id))
    }

    pub async fn create(&self, input: NewLead, created_by: Option<Uuid>) -> ServiceResult<Lead> {
        ServiceError::check(input.validate())?;

        let lead = input.into_lead(created_by, Utc::now());
        let mut tx = self.store.begin().await?;
        tx.save_lead(&lead).await?;
        tx.commit().await?;

        info!(lead_id = %lead.id, source = lead.source.as_str(), "lead created");
        self.events.publish(LifecycleEvent::LeadCreated { lead_id: lead.id }).await;
        Ok(lead)
    }

    pub async fn update(&self, id: Uuid, input: UpdateLead) -> ServiceResult<Lead> {
        ServiceError::check(input.validate())?;

        let mut tx = self.store.begin().await?;
        let mut lead = locked(&mut tx, id).await?;
        conversion::ensure_lead_editable(&lead)?;

        input.apply_to(&mut lead);
        ServiceError::check(lead.validate())?;
        lead.updated_at = Utc::now();
        tx.save_lead(&lead).await?;
        tx.commit().await?;
        info!(lead_id = %id, "lead updated");
        Ok(lead)
    }

    /// Leads that are part of a lineage chain stay for the audit trail
    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let lead = locked(&mut tx, id).await?;
        if lead.is_converted {
            return Err(ServiceError::Conflict("cannot delete converted lead".to_string()));
        }
        if lead.pre_lead_id.is_some() {
            return Err(ServiceError::Conflict(
                "cannot delete lead validated from a pre-lead".to_string(),
            ));
        }
        tx.delete_lead(id).await?;
        tx.commit().await?;
        info!(lead_id = %id, "lead deleted");
        Ok(())
    }

    /// Move a lead to pipeline stage `stage` (1..=6); the workflow label follows
    pub async fn set_stage(&self, id: Uuid, stage: i64) -> ServiceResult<Lead> {
        let status = u8::try_from(stage)
            .ok()
            .and_then(LeadStatus::from_stage)
            .ok_or_else(|| {
                ServiceError::invalid(
                    "pipeline_stage",
                    format!("Pipeline stage must be between {} and {}", MIN_STAGE, MAX_STAGE),
                )
            })?;
        self.transition(id, status).await
    }

    /// Set the workflow label directly. `lost` is reachable only via discard.
    pub async fn set_status(&self, id: Uuid, status: LeadStatus) -> ServiceResult<Lead> {
        if status == LeadStatus::Lost {
            return Err(ServiceError::invalid(
                "lead_status",
                "Use the discard operation to mark a lead as lost",
            ));
        }
        self.transition(id, status).await
    }

    async fn transition(&self, id: Uuid, to: LeadStatus) -> ServiceResult<Lead> {
        let mut tx = self.store.begin().await?;
        let mut lead = locked(&mut tx, id).await?;
        conversion::ensure_lead_editable(&lead)?;

        let from = lead.lead_status;
        if from == to {
            debug!(lead_id = %id, status = to.as_str(), "lead already in requested status");
            return Ok(lead);
        }
        lead.lead_status = to;
        lead.updated_at = Utc::now();
        tx.save_lead(&lead).await?;
        tx.commit().await?;

        info!(lead_id = %id, from = from.as_str(), to = to.as_str(), "lead stage changed");
        self.events
            .publish(LifecycleEvent::LeadStageChanged { lead_id: id, from, to })
            .await;
        Ok(lead)
    }

    /// Convert a lead into a customer. The lead row is locked first, so a
    /// concurrent conversion of the same lead waits and then sees it converted.
    pub async fn convert(
        &self,
        id: Uuid,
        input: ConvertLead,
        created_by: Option<Uuid>,
    ) -> ServiceResult<LeadConversion> {
        ServiceError::check(input.validate())?;
        let supplied_code = input
            .customer_code
            .as_deref()
            .map(customer_code::validate_supplied)
            .transpose()
            .map_err(|msg| ServiceError::invalid("customer_code", msg))?;

        let mut tx = self.store.begin().await?;
        let mut lead = locked(&mut tx, id).await?;
        conversion::ensure_lead_convertible(&lead)?;

        let now = Utc::now();
        let code = match supplied_code {
            Some(code) => {
                if tx.customer_code_exists(&code).await? {
                    return Err(ServiceError::Conflict(format!("Customer code {} already exists", code)));
                }
                code
            }
            None => {
                let month = customer_code::month_key(now);
                let existing = tx.lock_customer_codes(&month).await?;
                let sequence = customer_code::next_sequence(existing.iter().map(String::as_str), &month)
                    .ok_or_else(|| {
                        ServiceError::Conflict(format!("Customer code sequence for {} is exhausted", month))
                    })?;
                customer_code::format_code(&month, sequence)
            }
        };

        let customer = conversion::customer_from_lead(&lead, &input, code, created_by, now);
        tx.save_customer(&customer).await?;
        conversion::mark_lead_converted(&mut lead, customer.id, now);
        tx.save_lead(&lead).await?;
        let contacts_moved = tx.transfer_contacts(lead.id, customer.id).await?;
        tx.commit().await?;

        info!(
            lead_id = %id,
            customer_id = %customer.id,
            customer_code = %customer.customer_code,
            contacts_moved,
            "lead converted to customer"
        );
        self.events
            .publish(LifecycleEvent::LeadConverted {
                lead_id: id,
                customer_id: customer.id,
                customer_code: customer.customer_code.clone(),
                contacts_moved,
            })
            .await;
        Ok(LeadConversion {
            lead,
            customer,
            contacts_moved,
        })
    }

    pub async fn discard(&self, id: Uuid, input: Discard) -> ServiceResult<Lead> {
        let mut tx = self.store.begin().await?;
        let mut lead = locked(&mut tx, id).await?;
        conversion::discard_lead(&mut lead, input.reason, Utc::now())?;
        tx.save_lead(&lead).await?;
        tx.commit().await?;

        info!(lead_id = %id, "lead discarded");
        self.events.publish(LifecycleEvent::LeadDiscarded { lead_id: id }).await;
        Ok(lead)
    }
}
