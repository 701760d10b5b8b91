//! Pipeline records and the field groups they share.

pub mod contact;
pub mod customer;
pub mod lead;
pub mod pre_lead;
pub mod status;
pub mod user;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;

pub use contact::{Contact, ContactOwner, NewContact, UpdateContact};
pub use customer::{Customer, UpdateCustomer};
pub use lead::{Lead, LeadView, NewLead, UpdateLead};
pub use pre_lead::{NewPreLead, PreLead, UpdatePreLead};
pub use status::{CustomerType, LeadSource, LeadStatus, PreLeadStatus, Priority, RecordStatus};
pub use user::User;

/// Per-field validation messages, keyed by field name
pub type FieldErrors = HashMap<String, String>;

/// Column widths in `migrations/0001_init.sql`
pub const NAME_LEN: usize = 100;
pub const TEXT_LEN: usize = 255;
pub const PHONE_LEN: usize = 50;
pub const POSTAL_CODE_LEN: usize = 20;

/// Money columns are `NUMERIC(14, 2)`
pub const MONEY_SCALE: u32 = 2;
pub const MONEY_LIMIT: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0);

/// Record a message when `value` is longer than `max` characters
pub(crate) fn check_len(errors: &mut FieldErrors, field: &str, value: Option<&str>, max: usize) {
    if value.map(|v| v.chars().count() > max).unwrap_or(false) {
        errors.insert(field.to_string(), format!("Must be at most {} characters", max));
    }
}

/// Non-negative, at most two decimal places and within the column's range
pub(crate) fn check_amount(errors: &mut FieldErrors, field: &str, value: Option<Decimal>) {
    let Some(value) = value else { return };
    let message = if value.is_sign_negative() {
        "Must not be negative".to_string()
    } else if value.normalize().scale() > MONEY_SCALE {
        format!("At most {} decimal places are allowed", MONEY_SCALE)
    } else if value >= MONEY_LIMIT {
        format!("Must be less than {}", MONEY_LIMIT)
    } else {
        return;
    };
    errors.insert(field.to_string(), message);
}

/// Identity and company fields carried from pre-lead to lead to customer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
}

impl Profile {
    pub fn display_name(&self) -> String {
        match &self.last_name {
            Some(last) if !last.is_empty() => format!("{} {}", self.first_name, last),
            _ => self.first_name.clone(),
        }
    }

    pub fn validate(&self, errors: &mut FieldErrors) {
        if self.first_name.trim().is_empty() {
            errors.insert("first_name".to_string(), "This field is required".to_string());
        }
        if let Some(email) = &self.email {
            if !looks_like_email(email) {
                errors.insert("email".to_string(), format!("Invalid email address: {}", email));
            }
        }
        check_len(errors, "first_name", Some(self.first_name.as_str()), NAME_LEN);
        check_len(errors, "last_name", self.last_name.as_deref(), NAME_LEN);
        check_len(errors, "email", self.email.as_deref(), TEXT_LEN);
        check_len(errors, "phone", self.phone.as_deref(), PHONE_LEN);
        check_len(errors, "company_name", self.company_name.as_deref(), TEXT_LEN);
        check_len(errors, "job_title", self.job_title.as_deref(), TEXT_LEN);
        check_len(errors, "website", self.website.as_deref(), TEXT_LEN);
        check_len(errors, "industry", self.industry.as_deref(), NAME_LEN);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Location {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl Location {
    pub fn validate(&self, errors: &mut FieldErrors) {
        check_len(errors, "city", self.city.as_deref(), NAME_LEN);
        check_len(errors, "state", self.state.as_deref(), NAME_LEN);
        check_len(errors, "country", self.country.as_deref(), NAME_LEN);
        check_len(errors, "postal_code", self.postal_code.as_deref(), POSTAL_CODE_LEN);
    }
}

/// Optional overrides for a `Profile`, applied field by field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
    pub job_title: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
}

impl ProfilePatch {
    pub fn apply_to(self, profile: &mut Profile) {
        if let Some(v) = self.first_name {
            profile.first_name = v;
        }
        if let Some(v) = self.last_name {
            profile.last_name = Some(v);
        }
        if let Some(v) = self.email {
            profile.email = Some(v);
        }
        if let Some(v) = self.phone {
            profile.phone = Some(v);
        }
        if let Some(v) = self.company_name {
            profile.company_name = Some(v);
        }
        if let Some(v) = self.job_title {
            profile.job_title = Some(v);
        }
        if let Some(v) = self.website {
            profile.website = Some(v);
        }
        if let Some(v) = self.industry {
            profile.industry = Some(v);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationPatch {
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub postal_code: Option<String>,
}

impl LocationPatch {
    pub fn apply_to(self, location: &mut Location) {
        if let Some(v) = self.address {
            location.address = Some(v);
        }
        if let Some(v) = self.city {
            location.city = Some(v);
        }
        if let Some(v) = self.state {
            location.state = Some(v);
        }
        if let Some(v) = self.country {
            location.country = Some(v);
        }
        if let Some(v) = self.postal_code {
            location.postal_code = Some(v);
        }
    }
}

pub(crate) fn looks_like_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_requires_first_name_and_sane_email() {
        let profile = Profile {
            first_name: "  ".to_string(),
            email: Some("not-an-email".to_string()),
            ..Default::default()
        };
        let mut errors = FieldErrors::new();
        profile.validate(&mut errors);
        assert!(errors.contains_key("first_name"));
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn lengths_follow_the_column_widths() {
        let profile = Profile {
            first_name: "x".repeat(NAME_LEN + 1),
            phone: Some("1".repeat(PHONE_LEN)),
            ..Default::default()
        };
        let location = Location {
            postal_code: Some("9".repeat(POSTAL_CODE_LEN + 1)),
            ..Default::default()
        };
        let mut errors = FieldErrors::new();
        profile.validate(&mut errors);
        location.validate(&mut errors);
        assert!(errors.contains_key("first_name"));
        assert!(errors.contains_key("postal_code"));
        assert!(!errors.contains_key("phone"));
    }

    #[test]
    fn amounts_fit_two_decimal_places() {
        let mut errors = FieldErrors::new();
        check_amount(&mut errors, "ok", Some(Decimal::new(1999, 2)));
        check_amount(&mut errors, "trailing_zeros", Some(Decimal::new(150_000, 4)));
        check_amount(&mut errors, "largest", Some(Decimal::new(99_999_999_999_999, 2)));
        assert!(errors.is_empty(), "{:?}", errors);

        check_amount(&mut errors, "negative", Some(Decimal::new(-1, 0)));
        check_amount(&mut errors, "fraction", Some(Decimal::new(12_345, 3)));
        check_amount(&mut errors, "too_large", Some(MONEY_LIMIT));
        assert_eq!(errors.len(), 3);
        assert_eq!(MONEY_LIMIT, Decimal::from(1_000_000_000_000_i64));
    }

    #[test]
    fn patch_only_touches_supplied_fields() {
        let mut profile = Profile {
            first_name: "Asha".to_string(),
            company_name: Some("Acme".to_string()),
            ..Default::default()
        };
        ProfilePatch {
            job_title: Some("CTO".to_string()),
            ..Default::default()
        }
        .apply_to(&mut profile);
        assert_eq!(profile.first_name, "Asha");
        assert_eq!(profile.company_name.as_deref(), Some("Acme"));
        assert_eq!(profile.job_title.as_deref(), Some("CTO"));
    }

    #[test]
    fn display_name_joins_last_name() {
        let profile = Profile {
            first_name: "Asha".to_string(),
            last_name: Some("Rao".to_string()),
            ..Default::default()
        };
        assert_eq!(profile.display_name(), "Asha Rao");
    }
}
