//! In-process store for tests and local demos.
//!
//! A transaction holds the store mutex for its whole lifetime and works on a
//! copy of the state; `commit` swaps the copy in. Transactions are therefore
//! fully serialized and a dropped transaction leaves no trace.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{
    ContactFilter, CrmStore, CrmTx, CustomerFilter, LeadFilter, PageRequest, PreLeadFilter, StoreError,
};
use crate::conversion::customer_code;
use crate::domain::{Contact, ContactOwner, Customer, Lead, PreLead, Profile, User};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    pre_leads: HashMap<Uuid, PreLead>,
    leads: HashMap<Uuid, Lead>,
    customers: HashMap<Uuid, Customer>,
    contacts: HashMap<Uuid, Contact>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn CrmTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTx { guard, working }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

fn fk(constraint: &str) -> StoreError {
    StoreError::ForeignKeyViolation(constraint.to_string())
}

fn matches_search(profile: &Profile, search: &Option<String>) -> bool {
    let needle = match search.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_lowercase(),
        _ => return true,
    };
    [
        Some(&profile.first_name),
        profile.last_name.as_ref(),
        profile.email.as_ref(),
        profile.company_name.as_ref(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(&needle))
}

fn eq_if<T: PartialEq>(wanted: &Option<T>, actual: &T) -> bool {
    wanted.as_ref().map(|w| w == actual).unwrap_or(true)
}

/// Newest first, then paginate
fn paginate<T: Clone>(
    mut rows: Vec<&T>,
    created: impl Fn(&T) -> (chrono::DateTime<chrono::Utc>, Uuid),
    page: PageRequest,
) -> (Vec<T>, i64) {
    rows.sort_by(|a, b| created(b).cmp(&created(a)));
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .cloned()
        .collect();
    (items, total)
}

#[async_trait]
impl CrmTx for MemoryTx {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.working.users.get(&id).cloned())
    }

    async fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        let duplicate = self
            .working
            .users
            .values()
            .any(|u| u.id != user.id && u.email.eq_ignore_ascii_case(&user.email));
        if duplicate {
            return Err(StoreError::UniqueViolation("users_email_key".to_string()));
        }
        self.working.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError> {
        Ok(self.working.pre_leads.get(&id).cloned())
    }

    async fn lock_pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError> {
        self.pre_lead(id).await
    }

    async fn list_pre_leads(
        &mut self,
        filter: &PreLeadFilter,
        page: PageRequest,
    ) -> Result<(Vec<PreLead>, i64), StoreError> {
        let rows = self
            .working
            .pre_leads
            .values()
            .filter(|p| eq_if(&filter.status, &p.status))
            .filter(|p| eq_if(&filter.source, &p.source))
            .filter(|p| filter.assigned_to.is_none() || filter.assigned_to == p.assigned_to)
            .filter(|p| eq_if(&filter.is_converted, &p.is_converted))
            .filter(|p| matches_search(&p.profile, &filter.search))
            .collect();
        Ok(paginate(rows, |p: &PreLead| (p.created_at, p.id), page))
    }

    async fn save_pre_lead(&mut self, pre_lead: &PreLead) -> Result<(), StoreError> {
        if let Some(lead_id) = pre_lead.converted_lead_id {
            if !self.working.leads.contains_key(&lead_id) {
                return Err(fk("pre_leads_converted_lead_id_fkey"));
            }
        }
        self.working.pre_leads.insert(pre_lead.id, pre_lead.clone());
        Ok(())
    }

    async fn delete_pre_lead(&mut self, id: Uuid) -> Result<bool, StoreError> {
        if self.working.leads.values().any(|l| l.pre_lead_id == Some(id)) {
            return Err(fk("leads_pre_lead_id_fkey"));
        }
        Ok(self.working.pre_leads.remove(&id).is_some())
    }

    async fn lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        Ok(self.working.leads.get(&id).cloned())
    }

    async fn lock_lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.lead(id).await
    }

    async fn list_leads(&mut self, filter: &LeadFilter, page: PageRequest) -> Result<(Vec<Lead>, i64), StoreError> {
        let rows = self
            .working
            .leads
            .values()
            .filter(|l| eq_if(&filter.status, &l.status))
            .filter(|l| eq_if(&filter.lead_status, &l.lead_status))
            .filter(|l| eq_if(&filter.priority, &l.priority))
            .filter(|l| eq_if(&filter.source, &l.source))
            .filter(|l| filter.assigned_to.is_none() || filter.assigned_to == l.assigned_to)
            .filter(|l| eq_if(&filter.is_converted, &l.is_converted))
            .filter(|l| matches_search(&l.profile, &filter.search))
            .collect();
        Ok(paginate(rows, |l: &Lead| (l.created_at, l.id), page))
    }

    async fn save_lead(&mut self, lead: &Lead) -> Result<(), StoreError> {
        if let Some(pre_lead_id) = lead.pre_lead_id {
            if !self.working.pre_leads.contains_key(&pre_lead_id) {
                return Err(fk("leads_pre_lead_id_fkey"));
            }
        }
        if let Some(customer_id) = lead.converted_customer_id {
            if !self.working.customers.contains_key(&customer_id) {
                return Err(fk("leads_converted_customer_id_fkey"));
            }
        }
        self.working.leads.insert(lead.id, lead.clone());
        Ok(())
    }

    async fn delete_lead(&mut self, id: Uuid) -> Result<bool, StoreError> {
        if self.working.pre_leads.values().any(|p| p.converted_lead_id == Some(id)) {
            return Err(fk("pre_leads_converted_lead_id_fkey"));
        }
        if self.working.customers.values().any(|c| c.lead_id == Some(id)) {
            return Err(fk("customers_lead_id_fkey"));
        }
        self.working.contacts.retain(|_, c| c.lead_id != Some(id));
        Ok(self.working.leads.remove(&id).is_some())
    }

    async fn customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.working.customers.get(&id).cloned())
    }

    async fn lock_customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        self.customer(id).await
    }

    async fn list_customers(
        &mut self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<(Vec<Customer>, i64), StoreError> {
        let rows = self
            .working
            .customers
            .values()
            .filter(|c| eq_if(&filter.customer_type, &c.customer_type))
            .filter(|c| filter.account_manager.is_none() || filter.account_manager == c.account_manager)
            .filter(|c| eq_if(&filter.is_active, &c.is_active))
            .filter(|c| {
                matches_search(&c.profile, &filter.search)
                    || filter
                        .search
                        .as_deref()
                        .map(|s| c.customer_code.to_lowercase().contains(&s.trim().to_lowercase()))
                        .unwrap_or(false)
            })
            .collect();
        Ok(paginate(rows, |c: &Customer| (c.created_at, c.id), page))
    }

    async fn save_customer(&mut self, customer: &Customer) -> Result<(), StoreError> {
        let duplicate = self
            .working
            .customers
            .values()
            .any(|c| c.id != customer.id && c.customer_code == customer.customer_code);
        if duplicate {
            return Err(StoreError::UniqueViolation("customers_customer_code_key".to_string()));
        }
        if let Some(lead_id) = customer.lead_id {
            if !self.working.leads.contains_key(&lead_id) {
                return Err(fk("customers_lead_id_fkey"));
            }
        }
        self.working.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn customer_code_exists(&mut self, code: &str) -> Result<bool, StoreError> {
        Ok(self.working.customers.values().any(|c| c.customer_code == code))
    }

    async fn lock_customer_codes(&mut self, month: &str) -> Result<Vec<String>, StoreError> {
        // The store mutex already serializes this transaction
        let prefix = customer_code::month_prefix(month);
        Ok(self
            .working
            .customers
            .values()
            .filter(|c| c.customer_code.starts_with(&prefix))
            .map(|c| c.customer_code.clone())
            .collect())
    }

    async fn contact(&mut self, id: Uuid) -> Result<Option<Contact>, StoreError> {
        Ok(self.working.contacts.get(&id).cloned())
    }

    async fn list_contacts(
        &mut self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, i64), StoreError> {
        let rows = self
            .working
            .contacts
            .values()
            .filter(|c| filter.lead_id.is_none() || filter.lead_id == c.lead_id)
            .filter(|c| filter.customer_id.is_none() || filter.customer_id == c.customer_id)
            .collect();
        Ok(paginate(rows, |c: &Contact| (c.created_at, c.id), page))
    }

    async fn save_contact(&mut self, contact: &Contact) -> Result<(), StoreError> {
        match contact.owner() {
            Some(ContactOwner::Lead(id)) if !self.working.leads.contains_key(&id) => {
                return Err(fk("contacts_lead_id_fkey"))
            }
            Some(ContactOwner::Customer(id)) if !self.working.customers.contains_key(&id) => {
                return Err(fk("contacts_customer_id_fkey"))
            }
            None => return Err(StoreError::ForeignKeyViolation("contacts_single_owner".to_string())),
            _ => {}
        }
        if contact.is_primary {
            let owner = contact.owner();
            let clash = self
                .working
                .contacts
                .values()
                .any(|c| c.id != contact.id && c.is_primary && c.owner() == owner);
            if clash {
                return Err(StoreError::UniqueViolation("contacts_one_primary".to_string()));
            }
        }
        self.working.contacts.insert(contact.id, contact.clone());
        Ok(())
    }

    async fn delete_contact(&mut self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.working.contacts.remove(&id).is_some())
    }

    async fn clear_primary(&mut self, owner: ContactOwner, except: Option<Uuid>) -> Result<u64, StoreError> {
        let mut cleared = 0;
        for contact in self.working.contacts.values_mut() {
            if contact.is_primary && contact.owner() == Some(owner) && Some(contact.id) != except {
                contact.is_primary = false;
                contact.updated_at = chrono::Utc::now();
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn transfer_contacts(&mut self, lead_id: Uuid, customer_id: Uuid) -> Result<u64, StoreError> {
        if !self.working.customers.contains_key(&customer_id) {
            return Err(fk("contacts_customer_id_fkey"));
        }
        let mut moved = 0;
        for contact in self.working.contacts.values_mut() {
            if contact.lead_id == Some(lead_id) {
                contact.set_owner(ContactOwner::Customer(customer_id));
                contact.updated_at = chrono::Utc::now();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewPreLead;
    use chrono::Utc;

    fn pre_lead(name: &str) -> PreLead {
        NewPreLead {
            profile: Profile {
                first_name: name.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
        .into_pre_lead(None, Utc::now())
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = MemoryStore::new();
        let record = pre_lead("Asha");

        let mut tx = store.begin().await.unwrap();
        tx.save_pre_lead(&record).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.pre_lead(record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = MemoryStore::new();
        let record = pre_lead("Asha");

        let mut tx = store.begin().await.unwrap();
        tx.save_pre_lead(&record).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.pre_lead(record.id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.save_pre_lead(&pre_lead("Asha")).await.unwrap();
        tx.save_pre_lead(&pre_lead("Bruno")).await.unwrap();

        let filter = PreLeadFilter {
            search: Some("ASH".to_string()),
            ..Default::default()
        };
        let (rows, total) = tx
            .list_pre_leads(&filter, PageRequest::new(None, None, 20, 100))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].profile.first_name, "Asha");
    }
}
