use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::PreLeadStatus;
use super::{check_len, FieldErrors, Location, LocationPatch, Profile, ProfilePatch, NAME_LEN};

/// Source label stored on pre-leads submitted through the public form
pub const PUBLIC_FORM_SOURCE: &str = "public_form";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PreLead {
    pub id: Uuid,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: Profile,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub location: Location,
    pub source: String,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub status: PreLeadStatus,
    pub discard_reason: Option<String>,
    pub is_converted: bool,
    pub converted_lead_id: Option<Uuid>,
    pub converted_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PreLead {
    pub fn is_discarded(&self) -> bool {
        self.status == PreLeadStatus::Discarded
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        self.profile.validate(&mut errors);
        self.location.validate(&mut errors);
        check_len(&mut errors, "source", Some(self.source.as_str()), NAME_LEN);
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPreLead {
    #[serde(flatten)]
    pub profile: Profile,
    #[serde(flatten)]
    pub location: Location,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}

impl NewPreLead {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        self.profile.validate(&mut errors);
        self.location.validate(&mut errors);
        check_len(&mut errors, "source", self.source.as_deref(), NAME_LEN);
        errors
    }

    pub fn into_pre_lead(self, created_by: Option<Uuid>, now: DateTime<Utc>) -> PreLead {
        PreLead {
            id: Uuid::new_v4(),
            profile: self.profile,
            location: self.location,
            source: self
                .source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "manual".to_string()),
            notes: self.notes,
            assigned_to: self.assigned_to,
            status: PreLeadStatus::Active,
            discard_reason: None,
            is_converted: false,
            converted_lead_id: None,
            converted_at: None,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePreLead {
    #[serde(flatten)]
    pub profile: ProfilePatch,
    #[serde(flatten)]
    pub location: LocationPatch,
    pub source: Option<String>,
    pub notes: Option<String>,
    pub assigned_to: Option<Uuid>,
}

impl UpdatePreLead {
    pub fn apply_to(self, pre_lead: &mut PreLead) {
        self.profile.apply_to(&mut pre_lead.profile);
        self.location.apply_to(&mut pre_lead.location);
        if let Some(v) = self.source {
            pre_lead.source = v;
        }
        if let Some(v) = self.notes {
            pre_lead.notes = Some(v);
        }
        if let Some(v) = self.assigned_to {
            pre_lead.assigned_to = Some(v);
        }
    }
}
