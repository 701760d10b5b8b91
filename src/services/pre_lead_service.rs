use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::conversion::{self, Discard, ValidatePreLead};
use crate::domain::pre_lead::PUBLIC_FORM_SOURCE;
use crate::domain::{Lead, NewPreLead, PreLead, UpdatePreLead};
use crate::events::{EventSink, LifecycleEvent};
use crate::store::{CrmStore, CrmTx, Page, PageRequest, PreLeadFilter};

/// Result of validating a pre-lead: both sides of the new lineage link
#[derive(Debug, Clone, Serialize)]
pub struct PreLeadValidation {
    pub pre_lead: PreLead,
    pub lead: Lead,
}

#[derive(Clone)]
pub struct PreLeadService {
    store: Arc<dyn CrmStore>,
    events: Arc<dyn EventSink>,
}

async fn locked(tx: &mut Box<dyn CrmTx>, id: Uuid) -> ServiceResult<PreLead> {
    tx.lock_pre_lead(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Pre-lead", id))
}

impl PreLeadService {
    pub fn new(store: Arc<dyn CrmStore>, events: Arc<dyn EventSink>) -> Self {
        Self { store, events }
    }

    pub async fn list(&self, filter: &PreLeadFilter, page: PageRequest) -> ServiceResult<Page<PreLead>> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_pre_leads(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<PreLead> {
        let mut tx = self.store.begin().await?;
        tx.pre_lead(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("Pre-lead", id))
    }

    pub async fn create(&self, input: NewPreLead, created_by: Option<Uuid>) -> ServiceResult<PreLead> {
        ServiceError::check(input.validate())?;

        let pre_lead = input.into_pre_lead(created_by, Utc::now());
        let mut tx = self.store.begin().await?;
        tx.save_pre_lead(&pre_lead).await?;
        tx.commit().await?;

        info!(pre_lead_id = %pre_lead.id, source = %pre_lead.source, "pre-lead created");
        self.events
            .publish(LifecycleEvent::PreLeadCreated {
                pre_lead_id: pre_lead.id,
                source: pre_lead.source.clone(),
            })
            .await;
        Ok(pre_lead)
    }

    /// Unauthenticated intake. The source is fixed and assignment is left
    /// to the sales team.
    pub async fn submit_public_form(&self, mut input: NewPreLead) -> ServiceResult<PreLead> {
        let mut errors = input.validate();
        let has_email = input.profile.email.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        let has_phone = input.profile.phone.as_deref().map(|s| !s.trim().is_empty()).unwrap_or(false);
        if !has_email && !has_phone {
            errors.insert("email".to_string(), "Either email or phone is required".to_string());
        }
        ServiceError::check(errors)?;

        input.source = Some(PUBLIC_FORM_SOURCE.to_string());
        input.assigned_to = None;
        self.create(input, None).await
    }

    pub async fn update(&self, id: Uuid, input: UpdatePreLead) -> ServiceResult<PreLead> {
        let mut tx = self.store.begin().await?;
        let mut pre_lead = locked(&mut tx, id).await?;
        conversion::ensure_pre_lead_editable(&pre_lead)?;

        input.apply_to(&mut pre_lead);
        ServiceError::check(pre_lead.validate())?;

        pre_lead.updated_at = Utc::now();
        tx.save_pre_lead(&pre_lead).await?;
        tx.commit().await?;
        info!(pre_lead_id = %id, "pre-lead updated");
        Ok(pre_lead)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        let pre_lead = locked(&mut tx, id).await?;
        if pre_lead.is_converted {
            return Err(ServiceError::Conflict("cannot delete converted pre-lead".to_string()));
        }
        tx.delete_pre_lead(id).await?;
        tx.commit().await?;
        info!(pre_lead_id = %id, "pre-lead deleted");
        Ok(())
    }

    /// Turn an active pre-lead into a new lead. The pre-lead row stays locked
    /// until both records are written.
    pub async fn validate(
        &self,
        id: Uuid,
        input: ValidatePreLead,
        created_by: Option<Uuid>,
    ) -> ServiceResult<PreLeadValidation> {
        ServiceError::check(input.validate())?;

        let mut tx = self.store.begin().await?;
        let mut pre_lead = locked(&mut tx, id).await?;
        conversion::ensure_pre_lead_convertible(&pre_lead)?;

        let now = Utc::now();
        let lead = conversion::lead_from_pre_lead(&pre_lead, &input, created_by, now);
        tx.save_lead(&lead).await?;
        conversion::mark_pre_lead_validated(&mut pre_lead, lead.id, now);
        tx.save_pre_lead(&pre_lead).await?;
        tx.commit().await?;

        info!(pre_lead_id = %id, lead_id = %lead.id, priority = ?lead.priority, "pre-lead validated into lead");
        self.events
            .publish(LifecycleEvent::PreLeadValidated {
                pre_lead_id: id,
                lead_id: lead.id,
            })
            .await;
        self.events.publish(LifecycleEvent::LeadCreated { lead_id: lead.id }).await;
        Ok(PreLeadValidation { pre_lead, lead })
    }

    pub async fn discard(&self, id: Uuid, input: Discard) -> ServiceResult<PreLead> {
        let mut tx = self.store.begin().await?;
        let mut pre_lead = locked(&mut tx, id).await?;
        conversion::discard_pre_lead(&mut pre_lead, input.reason, Utc::now())?;
        tx.save_pre_lead(&pre_lead).await?;
        tx.commit().await?;

        info!(pre_lead_id = %id, "pre-lead discarded");
        self.events
            .publish(LifecycleEvent::PreLeadDiscarded { pre_lead_id: id })
            .await;
        Ok(pre_lead)
    }
}
