use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{check_len, looks_like_email, FieldErrors, NAME_LEN, PHONE_LEN, TEXT_LEN};

fn check_person(
    errors: &mut FieldErrors,
    first_name: &str,
    last_name: Option<&str>,
    email: Option<&str>,
    phone: Option<&str>,
    job_title: Option<&str>,
) {
    if first_name.trim().is_empty() {
        errors.insert("first_name".to_string(), "This field is required".to_string());
    }
    if let Some(email) = email {
        if !looks_like_email(email) {
            errors.insert("email".to_string(), format!("Invalid email address: {}", email));
        }
    }
    check_len(errors, "first_name", Some(first_name), NAME_LEN);
    check_len(errors, "last_name", last_name, NAME_LEN);
    check_len(errors, "email", email, TEXT_LEN);
    check_len(errors, "phone", phone, PHONE_LEN);
    check_len(errors, "job_title", job_title, TEXT_LEN);
}

/// A contact belongs to exactly one lead or one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ContactOwner {
    Lead(Uuid),
    Customer(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Contact {
    pub id: Uuid,
    pub lead_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub is_primary: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    pub fn owner(&self) -> Option<ContactOwner> {
        match (self.lead_id, self.customer_id) {
            (None, Some(customer_id)) => Some(ContactOwner::Customer(customer_id)),
            (Some(lead_id), None) => Some(ContactOwner::Lead(lead_id)),
            _ => None,
        }
    }

    pub fn validate(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        check_person(
            &mut errors,
            &self.first_name,
            self.last_name.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
            self.job_title.as_deref(),
        );
        errors
    }

    pub fn set_owner(&mut self, owner: ContactOwner) {
        match owner {
            ContactOwner::Lead(id) => {
                self.lead_id = Some(id);
                self.customer_id = None;
            }
            ContactOwner::Customer(id) => {
                self.lead_id = None;
                self.customer_id = Some(id);
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewContact {
    pub lead_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    pub notes: Option<String>,
}

impl NewContact {
    /// Field errors, or the single owner the contact will belong to
    pub fn validate(&self) -> Result<ContactOwner, FieldErrors> {
        let mut errors = FieldErrors::new();
        check_person(
            &mut errors,
            &self.first_name,
            self.last_name.as_deref(),
            self.email.as_deref(),
            self.phone.as_deref(),
            self.job_title.as_deref(),
        );
        let owner = match (self.lead_id, self.customer_id) {
            (Some(lead_id), None) => Some(ContactOwner::Lead(lead_id)),
            (None, Some(customer_id)) => Some(ContactOwner::Customer(customer_id)),
            _ => {
                errors.insert(
                    "owner".to_string(),
                    "Exactly one of lead_id or customer_id is required".to_string(),
                );
                None
            }
        };
        match owner {
            Some(owner) if errors.is_empty() => Ok(owner),
            _ => Err(errors),
        }
    }

    pub fn into_contact(self, owner: ContactOwner, now: DateTime<Utc>) -> Contact {
        let mut contact = Contact {
            id: Uuid::new_v4(),
            lead_id: None,
            customer_id: None,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            job_title: self.job_title,
            is_primary: self.is_primary,
            notes: self.notes,
            created_at: now,
            updated_at: now,
        };
        contact.set_owner(owner);
        contact
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateContact {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub job_title: Option<String>,
    pub is_primary: Option<bool>,
    pub notes: Option<String>,
}

impl UpdateContact {
    pub fn apply_to(self, contact: &mut Contact) {
        if let Some(v) = self.first_name {
            contact.first_name = v;
        }
        if let Some(v) = self.last_name {
            contact.last_name = Some(v);
        }
        if let Some(v) = self.email {
            contact.email = Some(v);
        }
        if let Some(v) = self.phone {
            contact.phone = Some(v);
        }
        if let Some(v) = self.job_title {
            contact.job_title = Some(v);
        }
        if let Some(v) = self.is_primary {
            contact.is_primary = v;
        }
        if let Some(v) = self.notes {
            contact.notes = Some(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_contact_needs_exactly_one_owner() {
        let both = NewContact {
            lead_id: Some(Uuid::new_v4()),
            customer_id: Some(Uuid::new_v4()),
            first_name: "Mei".to_string(),
            ..Default::default()
        };
        assert!(both.validate().unwrap_err().contains_key("owner"));

        let neither = NewContact {
            first_name: "Mei".to_string(),
            ..Default::default()
        };
        assert!(neither.validate().is_err());

        let lead_id = Uuid::new_v4();
        let one = NewContact {
            lead_id: Some(lead_id),
            first_name: "Mei".to_string(),
            ..Default::default()
        };
        assert_eq!(one.validate().unwrap(), ContactOwner::Lead(lead_id));
    }

    #[test]
    fn long_contact_fields_are_rejected() {
        let input = NewContact {
            lead_id: Some(Uuid::new_v4()),
            first_name: "Mei".to_string(),
            phone: Some("5".repeat(PHONE_LEN + 1)),
            ..Default::default()
        };
        let errors = input.validate().unwrap_err();
        assert!(errors.contains_key("phone"));
    }

    #[test]
    fn set_owner_clears_the_other_side() {
        let lead_id = Uuid::new_v4();
        let customer_id = Uuid::new_v4();
        let mut contact = NewContact {
            lead_id: Some(lead_id),
            first_name: "Mei".to_string(),
            ..Default::default()
        }
        .into_contact(ContactOwner::Lead(lead_id), Utc::now());

        contact.set_owner(ContactOwner::Customer(customer_id));
        assert_eq!(contact.lead_id, None);
        assert_eq!(contact.owner(), Some(ContactOwner::Customer(customer_id)));
    }
}
