use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::status::CustomerType;
use super::{check_amount, FieldErrors, Location, LocationPatch, Profile, ProfilePatch};

pub const DEFAULT_HEALTH_SCORE: i32 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub id: Uuid,
    pub customer_code: String,
    pub customer_type: CustomerType,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub profile: Profile,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub location: Location,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
    pub credit_limit: Decimal,
    pub total_revenue: Decimal,
    pub health_score: i32,
    pub is_active: bool,
    pub account_manager: Option<Uuid>,
    pub lead_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Field checks for the record as it will be stored
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        self.profile.validate(&mut errors);
        self.location.validate(&mut errors);
        check_amount(&mut errors, "credit_limit", Some(self.credit_limit));
        check_amount(&mut errors, "total_revenue", Some(self.total_revenue));
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCustomer {
    #[serde(flatten)]
    pub profile: ProfilePatch,
    #[serde(flatten)]
    pub location: LocationPatch,
    pub customer_type: Option<CustomerType>,
    pub billing_address: Option<String>,
    pub shipping_address: Option<String>,
    pub credit_limit: Option<Decimal>,
    pub total_revenue: Option<Decimal>,
    pub health_score: Option<i32>,
    pub is_active: Option<bool>,
    pub account_manager: Option<Uuid>,
    pub notes: Option<String>,
}

impl UpdateCustomer {
    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        if let Some(score) = self.health_score {
            if !(0..=100).contains(&score) {
                errors.insert("health_score".to_string(), "Must be between 0 and 100".to_string());
            }
        }
        check_amount(&mut errors, "credit_limit", self.credit_limit);
        check_amount(&mut errors, "total_revenue", self.total_revenue);
        errors
    }

    pub fn apply_to(self, customer: &mut Customer) {
        self.profile.apply_to(&mut customer.profile);
        self.location.apply_to(&mut customer.location);
        if let Some(v) = self.customer_type {
            customer.customer_type = v;
        }
        if let Some(v) = self.billing_address {
            customer.billing_address = Some(v);
        }
        if let Some(v) = self.shipping_address {
            customer.shipping_address = Some(v);
        }
        if let Some(v) = self.credit_limit {
            customer.credit_limit = v;
        }
        if let Some(v) = self.total_revenue {
            customer.total_revenue = v;
        }
        if let Some(v) = self.health_score {
            customer.health_score = v;
        }
        if let Some(v) = self.is_active {
            customer.is_active = v;
        }
        if let Some(v) = self.account_manager {
            customer.account_manager = Some(v);
        }
        if let Some(v) = self.notes {
            customer.notes = Some(v);
        }
    }
}
