use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{ServiceError, ServiceResult};
use crate::conversion;
use crate::domain::{Contact, ContactOwner, NewContact, UpdateContact};
use crate::store::{ContactFilter, CrmStore, CrmTx, Page, PageRequest};

#[derive(Clone)]
pub struct ContactService {
    store: Arc<dyn CrmStore>,
}

async fn fetch(tx: &mut Box<dyn CrmTx>, id: Uuid) -> ServiceResult<Contact> {
    tx.contact(id)
        .await?
        .ok_or_else(|| ServiceError::not_found("Contact", id))
}

/// The owner must exist; a converted lead hands its contacts to the customer
/// and takes no new ones. The lead row stays locked until the contact is
/// written, so a conversion in flight finishes first.
async fn ensure_owner(tx: &mut Box<dyn CrmTx>, owner: ContactOwner) -> ServiceResult<()> {
    match owner {
        ContactOwner::Lead(id) => {
            let lead = tx
                .lock_lead(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Lead", id))?;
            if lead.is_converted {
                return Err(conversion::ConversionError::Converted("lead").into());
            }
        }
        ContactOwner::Customer(id) => {
            tx.customer(id)
                .await?
                .ok_or_else(|| ServiceError::not_found("Customer", id))?;
        }
    }
    Ok(())
}

fn owner_of(contact: &Contact) -> ServiceResult<ContactOwner> {
    contact
        .owner()
        .ok_or_else(|| ServiceError::Conflict(format!("Contact {} has no single owner", contact.id)))
}

impl ContactService {
    pub fn new(store: Arc<dyn CrmStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self, filter: &ContactFilter, page: PageRequest) -> ServiceResult<Page<Contact>> {
        let mut tx = self.store.begin().await?;
        let (items, total) = tx.list_contacts(filter, page).await?;
        Ok(Page::new(items, total, page))
    }

    pub async fn get(&self, id: Uuid) -> ServiceResult<Contact> {
        let mut tx = self.store.begin().await?;
        fetch(&mut tx, id).await
    }

    pub async fn create(&self, input: NewContact) -> ServiceResult<Contact> {
        let owner = input.validate().map_err(ServiceError::validation)?;

        let mut tx = self.store.begin().await?;
        ensure_owner(&mut tx, owner).await?;
        let contact = input.into_contact(owner, Utc::now());
        if contact.is_primary {
            tx.clear_primary(owner, None).await?;
        }
        tx.save_contact(&contact).await?;
        tx.commit().await?;

        info!(contact_id = %contact.id, owner = ?owner, primary = contact.is_primary, "contact created");
        Ok(contact)
    }

    pub async fn update(&self, id: Uuid, input: UpdateContact) -> ServiceResult<Contact> {
        let mut tx = self.store.begin().await?;
        let mut contact = fetch(&mut tx, id).await?;
        let was_primary = contact.is_primary;
        input.apply_to(&mut contact);
        ServiceError::check(contact.validate())?;
        if contact.is_primary && !was_primary {
            tx.clear_primary(owner_of(&contact)?, Some(id)).await?;
        }
        contact.updated_at = Utc::now();
        tx.save_contact(&contact).await?;
        tx.commit().await?;

        info!(contact_id = %id, "contact updated");
        Ok(contact)
    }

    pub async fn delete(&self, id: Uuid) -> ServiceResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_contact(id).await? {
            return Err(ServiceError::not_found("Contact", id));
        }
        tx.commit().await?;
        info!(contact_id = %id, "contact deleted");
        Ok(())
    }

    /// Make `id` the owner's only primary contact
    pub async fn set_primary(&self, id: Uuid) -> ServiceResult<Contact> {
        let mut tx = self.store.begin().await?;
        let mut contact = fetch(&mut tx, id).await?;
        let owner = owner_of(&contact)?;

        let cleared = tx.clear_primary(owner, Some(id)).await?;
        if !contact.is_primary {
            contact.is_primary = true;
            contact.updated_at = Utc::now();
            tx.save_contact(&contact).await?;
        }
        tx.commit().await?;

        info!(contact_id = %id, owner = ?owner, cleared, "primary contact set");
        Ok(contact)
    }
}
