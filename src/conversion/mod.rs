//! The fixed pipeline transitions: pre-lead -> lead, lead -> customer and the
//! two discards. Everything here is pure; the services run these rules inside
//! a store transaction with the source row locked.

pub mod customer_code;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::customer::DEFAULT_HEALTH_SCORE;
use crate::domain::{
    check_amount, Customer, CustomerType, FieldErrors, Lead, LeadSource, LeadStatus, PreLead, PreLeadStatus, Priority,
    RecordStatus,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("{0} is already converted")]
    AlreadyConverted(&'static str),

    #[error("{0} is already discarded")]
    AlreadyDiscarded(&'static str),

    #[error("cannot validate discarded pre-lead")]
    DiscardedPreLead,

    #[error("cannot convert lost lead")]
    LostLead,

    #[error("cannot modify converted {0}")]
    Converted(&'static str),

    #[error("cannot modify discarded {0}")]
    Discarded(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ValidatePreLead {
    pub priority: Option<String>,
    pub expected_value: Option<Decimal>,
    pub notes: Option<String>,
}

impl ValidatePreLead {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_amount(&mut errors, "expected_value", self.expected_value);
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConvertLead {
    pub customer_code: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub credit_limit: Option<Decimal>,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
    pub notes: Option<String>,
}

impl ConvertLead {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_amount(&mut errors, "credit_limit", self.credit_limit);
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Discard {
    pub reason: Option<String>,
}

/// Preconditions for `validate`, in the order callers observe them
pub fn ensure_pre_lead_convertible(pre_lead: &PreLead) -> Result<(), ConversionError> {
    if pre_lead.is_converted {
        return Err(ConversionError::AlreadyConverted("pre-lead"));
    }
    if pre_lead.is_discarded() {
        return Err(ConversionError::DiscardedPreLead);
    }
    Ok(())
}

/// Generic edits are refused once a pre-lead left the active state
pub fn ensure_pre_lead_editable(pre_lead: &PreLead) -> Result<(), ConversionError> {
    if pre_lead.is_converted {
        return Err(ConversionError::Converted("pre-lead"));
    }
    if pre_lead.is_discarded() {
        return Err(ConversionError::Discarded("pre-lead"));
    }
    Ok(())
}

pub fn source_details_for(pre_lead: &PreLead) -> String {
    format!(
        "Validated from pre-lead {} (original source: {})",
        pre_lead.id, pre_lead.source
    )
}

/// Build the lead a validated pre-lead turns into. Identity, company and
/// location are copied; priority and expected value come from the caller;
/// the assignee is inherited.
pub fn lead_from_pre_lead(
    pre_lead: &PreLead,
    input: &ValidatePreLead,
    created_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Lead {
    Lead {
        id: Uuid::new_v4(),
        profile: pre_lead.profile.clone(),
        location: pre_lead.location.clone(),
        source: LeadSource::PreLead,
        source_details: Some(source_details_for(pre_lead)),
        priority: Priority::parse_or_default(input.priority.as_deref()),
        lead_status: LeadStatus::New,
        status: RecordStatus::Active,
        expected_value: input.expected_value,
        actual_value: None,
        expected_close_date: None,
        lost_reason: None,
        notes: input.notes.clone().or_else(|| pre_lead.notes.clone()),
        assigned_to: pre_lead.assigned_to,
        pre_lead_id: Some(pre_lead.id),
        is_converted: false,
        converted_customer_id: None,
        converted_at: None,
        created_by,
        created_at: now,
        updated_at: now,
    }
}

pub fn mark_pre_lead_validated(pre_lead: &mut PreLead, lead_id: Uuid, now: DateTime<Utc>) {
    pre_lead.status = PreLeadStatus::Validated;
    pre_lead.is_converted = true;
    pre_lead.converted_lead_id = Some(lead_id);
    pre_lead.converted_at = Some(now);
    pre_lead.updated_at = now;
}

pub fn ensure_lead_convertible(lead: &Lead) -> Result<(), ConversionError> {
    if lead.is_converted {
        return Err(ConversionError::AlreadyConverted("lead"));
    }
    if lead.is_lost() {
        return Err(ConversionError::LostLead);
    }
    Ok(())
}

pub fn ensure_lead_editable(lead: &Lead) -> Result<(), ConversionError> {
    if lead.is_converted {
        return Err(ConversionError::Converted("lead"));
    }
    if lead.status == RecordStatus::Discarded {
        return Err(ConversionError::Discarded("lead"));
    }
    Ok(())
}

/// Build the customer a lead converts into. The billing address falls back
/// to the lead's address; revenue is seeded from the lead's actual value.
pub fn customer_from_lead(
    lead: &Lead,
    input: &ConvertLead,
    customer_code: String,
    created_by: Option<Uuid>,
    now: DateTime<Utc>,
) -> Customer {
    Customer {
        id: Uuid::new_v4(),
        customer_code,
        customer_type: input.customer_type.unwrap_or_default(),
        profile: lead.profile.clone(),
        location: lead.location.clone(),
        billing_address: input
            .billing_address
            .clone()
            .or_else(|| lead.location.address.clone()),
        shipping_address: input.shipping_address.clone(),
        credit_limit: input.credit_limit.unwrap_or(Decimal::ZERO),
        total_revenue: lead.actual_value.unwrap_or(Decimal::ZERO),
        health_score: DEFAULT_HEALTH_SCORE,
        is_active: true,
        account_manager: lead.assigned_to,
        lead_id: Some(lead.id),
        notes: input.notes.clone().or_else(|| lead.notes.clone()),
        created_by,
        created_at: now,
        updated_at: now,
    }
}

pub fn mark_lead_converted(lead: &mut Lead, customer_id: Uuid, now: DateTime<Utc>) {
    lead.lead_status = LeadStatus::Won;
    lead.is_converted = true;
    lead.converted_customer_id = Some(customer_id);
    lead.converted_at = Some(now);
    lead.updated_at = now;
}

pub fn discard_pre_lead(pre_lead: &mut PreLead, reason: Option<String>, now: DateTime<Utc>) -> Result<(), ConversionError> {
    if pre_lead.is_converted {
        return Err(ConversionError::AlreadyConverted("pre-lead"));
    }
    if pre_lead.is_discarded() {
        return Err(ConversionError::AlreadyDiscarded("pre-lead"));
    }
    pre_lead.status = PreLeadStatus::Discarded;
    pre_lead.discard_reason = reason;
    pre_lead.updated_at = now;
    Ok(())
}

pub fn discard_lead(lead: &mut Lead, reason: Option<String>, now: DateTime<Utc>) -> Result<(), ConversionError> {
    if lead.is_converted {
        return Err(ConversionError::AlreadyConverted("lead"));
    }
    if lead.status == RecordStatus::Discarded {
        return Err(ConversionError::AlreadyDiscarded("lead"));
    }
    lead.status = RecordStatus::Discarded;
    lead.lead_status = LeadStatus::Lost;
    lead.lost_reason = reason;
    lead.updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Location, NewPreLead, Profile};

    fn pre_lead() -> PreLead {
        NewPreLead {
            profile: Profile {
                first_name: "Asha".to_string(),
                company_name: Some("Acme".to_string()),
                ..Default::default()
            },
            location: Location {
                address: Some("12 Harbour Rd".to_string()),
                city: Some("Pune".to_string()),
                ..Default::default()
            },
            source: Some("trade_show".to_string()),
            assigned_to: Some(Uuid::new_v4()),
            ..Default::default()
        }
        .into_pre_lead(None, Utc::now())
    }

    #[test]
    fn lead_copies_identity_and_links_lineage() {
        let pre_lead = pre_lead();
        let input = ValidatePreLead {
            priority: Some("high".to_string()),
            expected_value: Some(Decimal::from(100_000)),
            notes: None,
        };
        let lead = lead_from_pre_lead(&pre_lead, &input, None, Utc::now());

        assert_eq!(lead.profile, pre_lead.profile);
        assert_eq!(lead.location, pre_lead.location);
        assert_eq!(lead.source, LeadSource::PreLead);
        assert_eq!(lead.priority, Priority::High);
        assert_eq!(lead.expected_value, Some(Decimal::from(100_000)));
        assert_eq!(lead.assigned_to, pre_lead.assigned_to);
        assert_eq!(lead.pre_lead_id, Some(pre_lead.id));
        let details = lead.source_details.unwrap();
        assert!(details.contains(&pre_lead.id.to_string()));
        assert!(details.contains("trade_show"));
    }

    #[test]
    fn discarded_pre_lead_cannot_validate() {
        let mut pre_lead = pre_lead();
        discard_pre_lead(&mut pre_lead, Some("spam".to_string()), Utc::now()).unwrap();
        assert_eq!(ensure_pre_lead_convertible(&pre_lead), Err(ConversionError::DiscardedPreLead));
        assert_eq!(
            discard_pre_lead(&mut pre_lead, None, Utc::now()),
            Err(ConversionError::AlreadyDiscarded("pre-lead"))
        );
    }

    #[test]
    fn converted_check_wins_over_discard_check() {
        let mut pre_lead = pre_lead();
        mark_pre_lead_validated(&mut pre_lead, Uuid::new_v4(), Utc::now());
        pre_lead.status = PreLeadStatus::Discarded;
        assert_eq!(
            ensure_pre_lead_convertible(&pre_lead),
            Err(ConversionError::AlreadyConverted("pre-lead"))
        );
    }

    #[test]
    fn customer_inherits_from_lead() {
        let pre_lead = pre_lead();
        let mut lead = lead_from_pre_lead(&pre_lead, &ValidatePreLead::default(), None, Utc::now());
        lead.actual_value = Some(Decimal::from(2_500));
        let input = ConvertLead {
            customer_type: Some(CustomerType::Enterprise),
            shipping_address: Some("Dock 4".to_string()),
            ..Default::default()
        };
        let customer = customer_from_lead(&lead, &input, "CUS-202610-0001".to_string(), None, Utc::now());

        assert_eq!(customer.customer_type, CustomerType::Enterprise);
        assert_eq!(customer.billing_address.as_deref(), Some("12 Harbour Rd"));
        assert_eq!(customer.shipping_address.as_deref(), Some("Dock 4"));
        assert_eq!(customer.total_revenue, Decimal::from(2_500));
        assert_eq!(customer.credit_limit, Decimal::ZERO);
        assert_eq!(customer.account_manager, lead.assigned_to);
        assert_eq!(customer.lead_id, Some(lead.id));
        assert_eq!(customer.health_score, DEFAULT_HEALTH_SCORE);
    }

    #[test]
    fn billing_override_beats_lead_address() {
        let lead = lead_from_pre_lead(&pre_lead(), &ValidatePreLead::default(), None, Utc::now());
        let input = ConvertLead {
            billing_address: Some("PO Box 9".to_string()),
            ..Default::default()
        };
        let customer = customer_from_lead(&lead, &input, "X-1".to_string(), None, Utc::now());
        assert_eq!(customer.billing_address.as_deref(), Some("PO Box 9"));
    }

    #[test]
    fn lost_or_converted_leads_do_not_convert() {
        let mut lead = lead_from_pre_lead(&pre_lead(), &ValidatePreLead::default(), None, Utc::now());
        lead.lead_status = LeadStatus::Lost;
        assert_eq!(ensure_lead_convertible(&lead), Err(ConversionError::LostLead));

        let mut lead = lead_from_pre_lead(&pre_lead(), &ValidatePreLead::default(), None, Utc::now());
        mark_lead_converted(&mut lead, Uuid::new_v4(), Utc::now());
        assert_eq!(lead.lead_status, LeadStatus::Won);
        assert_eq!(ensure_lead_convertible(&lead), Err(ConversionError::AlreadyConverted("lead")));
        assert_eq!(
            discard_lead(&mut lead, None, Utc::now()),
            Err(ConversionError::AlreadyConverted("lead"))
        );
    }

    #[test]
    fn discarding_a_lead_marks_it_lost() {
        let mut lead = lead_from_pre_lead(&pre_lead(), &ValidatePreLead::default(), None, Utc::now());
        discard_lead(&mut lead, Some("budget".to_string()), Utc::now()).unwrap();
        assert_eq!(lead.status, RecordStatus::Discarded);
        assert_eq!(lead.lead_status, LeadStatus::Lost);
        assert_eq!(lead.lost_reason.as_deref(), Some("budget"));
        assert_eq!(ensure_lead_editable(&lead), Err(ConversionError::Discarded("lead")));
    }
}
