//! Business operations over the store seam.
//!
//! Each mutating call runs in one store transaction and publishes its
//! lifecycle event only after the commit succeeded.

pub mod contact_service;
pub mod customer_service;
pub mod lead_service;
pub mod pre_lead_service;

use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::conversion::ConversionError;
use crate::domain::FieldErrors;
use crate::events::EventSink;
use crate::store::{CrmStore, StoreError};

pub use contact_service::ContactService;
pub use customer_service::CustomerService;
pub use lead_service::{LeadConversion, LeadService};
pub use pre_lead_service::{PreLeadService, PreLeadValidation};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    Validation { message: String, field_errors: FieldErrors },

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn not_found(entity: &str, id: Uuid) -> Self {
        ServiceError::NotFound(format!("{} {} not found", entity, id))
    }

    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = FieldErrors::new();
        field_errors.insert(field.to_string(), message.clone());
        ServiceError::Validation { message, field_errors }
    }

    pub fn validation(field_errors: FieldErrors) -> Self {
        ServiceError::Validation {
            message: "Validation failed".to_string(),
            field_errors,
        }
    }

    /// `Ok` when `errors` is empty
    pub fn check(errors: FieldErrors) -> Result<(), ServiceError> {
        if errors.is_empty() {
            return Ok(());
        }
        Err(ServiceError::validation(errors))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation(constraint) => {
                ServiceError::Conflict(format!("Duplicate value violates {}", constraint))
            }
            StoreError::ForeignKeyViolation(constraint) => {
                ServiceError::Conflict(format!("Referenced record missing or still in use ({})", constraint))
            }
            other => ServiceError::Store(other),
        }
    }
}

impl From<ConversionError> for ServiceError {
    fn from(err: ConversionError) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// All services over one store and one event sink
#[derive(Clone)]
pub struct Services {
    pub pre_leads: PreLeadService,
    pub leads: LeadService,
    pub customers: CustomerService,
    pub contacts: ContactService,
}

impl Services {
    pub fn new(store: Arc<dyn CrmStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            pre_leads: PreLeadService::new(store.clone(), events.clone()),
            leads: LeadService::new(store.clone(), events.clone()),
            customers: CustomerService::new(store.clone(), events),
            contacts: ContactService::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_becomes_conflict() {
        let err: ServiceError = StoreError::UniqueViolation("customers_customer_code_key".to_string()).into();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg.contains("customer_code")));
    }

    #[test]
    fn conversion_rules_surface_as_conflict() {
        let err: ServiceError = ConversionError::LostLead.into();
        assert!(matches!(err, ServiceError::Conflict(msg) if msg == "cannot convert lost lead"));
    }

    #[test]
    fn empty_field_errors_pass() {
        assert!(ServiceError::check(FieldErrors::new()).is_ok());
        let mut errors = FieldErrors::new();
        errors.insert("email".to_string(), "bad".to_string());
        assert!(matches!(
            ServiceError::check(errors),
            Err(ServiceError::Validation { field_errors, .. }) if field_errors.contains_key("email")
        ));
    }
}
