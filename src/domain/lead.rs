use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::{LeadSource, LeadStatus, Priority, RecordStatus};
use super::{check_amount, FieldErrors, Location, LocationPatch, Profile, ProfilePatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: Profile,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub location: Location,
    pub source: LeadSource,
    pub source_details: Option<String>,
    pub priority: Priority,
    pub lead_status: LeadStatus,
    pub status: RecordStatus,
    pub expected_value: Option<Decimal>,
    pub actual_value: Option<Decimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub lost_reason: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub pre_lead_id: Option<Uuid>,
    pub is_converted: bool,
    pub converted_customer_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn pipeline_stage(&self) -> Option<u8> {
        self.lead_status.stage()
    }

    /// Discarded leads and leads marked lost are both out of the funnel
    pub fn is_lost(&self) -> bool {
        self.status == RecordStatus::Discarded || self.lead_status == LeadStatus::Lost
    }

    /// Field checks for the record as it will be stored
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        self.profile.validate(&mut errors);
        self.location.validate(&mut errors);
        check_amount(&mut errors, "expected_value", self.expected_value);
        check_amount(&mut errors, "actual_value", self.actual_value);
        errors
    }
}

/// Wire form of a lead: the record plus its derived pipeline stage
#[derive(Debug, Clone, Serialize)]
pub struct LeadView {
    #[serde(flatten)]
    pub lead: Lead,
    pub pipeline_stage: Option<u8>,
}

impl From<Lead> for LeadView {
    fn from(lead: Lead) -> Self {
        let pipeline_stage = lead.pipeline_stage();
        Self { lead, pipeline_stage }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLead {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(flatten)]
    pub location: Location,
    pub source: Option<LeadSource>,
    pub source_details: Option<String>,
    pub priority: Option<String>,
    pub expected_value: Option<Decimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}

impl NewLead {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        self.profile.validate(&mut errors);
        self.location.validate(&mut errors);
        check_amount(&mut errors, "expected_value", self.expected_value);
        if self.source == Some(LeadSource::PreLead) {
            errors.insert(
                "source".to_string(),
                "Leads are sourced from pre-leads only through validation".to_string(),
            );
        }
        errors
    }

    pub fn into_lead(self, created_by: Option<Uuid>, now: DateTime<Utc>) -> Lead {
        Lead {
            id: Uuid::new_v4(),
            profile: self.profile,
            location: self.location,
            source: self.source.unwrap_or_default(),
            source_details: self.source_details,
            priority: Priority::parse_or_default(self.priority.as_deref()),
            lead_status: LeadStatus::New,
            status: RecordStatus::Active,
            expected_value: self.expected_value,
            actual_value: None,
            expected_close_date: self.expected_close_date,
            lost_reason: None,
            notes: self.notes,
            assigned_to: self.assigned_to,
            pre_lead_id: None,
            is_converted: false,
            converted_customer_id: None,
            converted_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Generic edit. Workflow fields (`lead_status`, `status`, lineage) have their
/// own operations and are not accepted here.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateLead {
    #[serde(flatten)]
    pub profile: ProfilePatch,
    #[serde(flatten)]
    pub location: LocationPatch,
    pub source_details: Option<String>,
    pub priority: Option<Priority>,
    pub expected_value: Option<Decimal>,
    pub actual_value: Option<Decimal>,
    pub expected_close_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}

impl UpdateLead {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_amount(&mut errors, "expected_value", self.expected_value);
        check_amount(&mut errors, "actual_value", self.actual_value);
        if let Some(first_name) = &self.profile.first_name {
            if first_name.trim().is_empty() {
                errors.insert("first_name".to_string(), "This field is required".to_string());
            }
        }
        errors
    }

    pub fn apply_to(self, lead: &mut Lead) {
        self.profile.apply_to(&mut lead.profile);
        self.location.apply_to(&mut lead.location);
        if let Some(v) = self.source_details {
            lead.source_details = Some(v);
        }
        if let Some(v) = self.priority {
            lead.priority = v;
        }
        if let Some(v) = self.expected_value {
            lead.expected_value = Some(v);
        }
        if let Some(v) = self.actual_value {
            lead.actual_value = Some(v);
        }
        if let Some(v) = self.expected_close_date {
            lead.expected_close_date = Some(v);
        }
        if let Some(v) = self.notes {
            lead.notes = Some(v);
        }
        if let Some(v) = self.assigned_to {
            lead.assigned_to = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> Lead {
        NewLead {
            profile: Profile {
                first_name: "Ravi".to_string(),
                ..Default::default()
            },
            priority: Some("nonsense".to_string()),
            ..Default::default()
        }
        .into_lead(None, Utc::now())
    }

    #[test]
    fn new_lead_starts_at_stage_one() {
        let lead = lead();
        assert_eq!(lead.lead_status, LeadStatus::New);
        assert_eq!(lead.pipeline_stage(), Some(1));
        assert_eq!(lead.priority, Priority::Medium);
        assert_eq!(lead.source, LeadSource::Other);
    }

    #[test]
    fn view_serializes_pipeline_stage_with_flat_fields() {
        let mut lead = lead();
        lead.lead_status = LeadStatus::Negotiation;
        let value = serde_json::to_value(LeadView::from(lead)).unwrap();
        assert_eq!(value["pipeline_stage"], 5);
        assert_eq!(value["lead_status"], "negotiation");
        assert_eq!(value["first_name"], "Ravi");
    }

    #[test]
    fn edited_lead_is_checked_as_a_whole() {
        let mut lead = lead();
        UpdateLead {
            profile: ProfilePatch {
                email: Some("not an email".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
        .apply_to(&mut lead);
        lead.actual_value = Some(Decimal::new(1_005, 3));
        let errors = lead.validate();
        assert!(errors.contains_key("email"));
        assert!(errors.contains_key("actual_value"));
    }

    #[test]
    fn manual_pre_lead_source_is_rejected() {
        let input = NewLead {
            profile: Profile {
                first_name: "Ravi".to_string(),
                ..Default::default()
            },
            source: Some(LeadSource::PreLead),
            ..Default::default()
        };
        assert!(input.validate().contains_key("source"));
    }
}
