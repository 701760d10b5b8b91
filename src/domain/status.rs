use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a pre-lead. Conversion is tracked separately by
/// `is_converted`; `Validated` is set alongside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "pre_lead_status", rename_all = "snake_case")]
pub enum PreLeadStatus {
    Active,
    Discarded,
    Validated,
}

/// Active/discarded flag on leads, independent of the workflow label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "record_status", rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Discarded,
}

/// Sales workflow label. The pipeline stage is derived from it, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Contacted,
    Qualified,
    ProposalSent,
    Negotiation,
    Won,
    Lost,
}

pub const MIN_STAGE: u8 = 1;
pub const MAX_STAGE: u8 = 6;

impl LeadStatus {
    /// Fixed stage table: 1 new, 2 contacted, 3 qualified, 4 proposal_sent,
    /// 5 negotiation, 6 won. Anything else has no status.
    pub fn from_stage(stage: u8) -> Option<Self> {
        match stage {
            1 => Some(LeadStatus::New),
            2 => Some(LeadStatus::Contacted),
            3 => Some(LeadStatus::Qualified),
            4 => Some(LeadStatus::ProposalSent),
            5 => Some(LeadStatus::Negotiation),
            6 => Some(LeadStatus::Won),
            _ => None,
        }
    }

    /// `Lost` sits outside the funnel.
    pub fn stage(&self) -> Option<u8> {
        match self {
            LeadStatus::New => Some(1),
            LeadStatus::Contacted => Some(2),
            LeadStatus::Qualified => Some(3),
            LeadStatus::ProposalSent => Some(4),
            LeadStatus::Negotiation => Some(5),
            LeadStatus::Won => Some(6),
            LeadStatus::Lost => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::ProposalSent => "proposal_sent",
            LeadStatus::Negotiation => "negotiation",
            LeadStatus::Won => "won",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_priority", rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Lenient parse for caller supplied labels; anything unrecognised is `Medium`.
    pub fn parse_or_default(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Priority::Low,
            Some("medium") => Priority::Medium,
            Some("high") => Priority::High,
            Some("critical") => Priority::Critical,
            _ => Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_source", rename_all = "snake_case")]
pub enum LeadSource {
    Website,
    Referral,
    ColdCall,
    Email,
    SocialMedia,
    Event,
    PreLead,
    #[default]
    Other,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::Website => "website",
            LeadSource::Referral => "referral",
            LeadSource::ColdCall => "cold_call",
            LeadSource::Email => "email",
            LeadSource::SocialMedia => "social_media",
            LeadSource::Event => "event",
            LeadSource::PreLead => "pre_lead",
            LeadSource::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "customer_type", rename_all = "snake_case")]
pub enum CustomerType {
    Individual,
    #[default]
    Business,
    Enterprise,
    Government,
}
