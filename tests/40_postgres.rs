//! Pipeline against a real PostgreSQL database. Runs only when DATABASE_URL is set.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use common::{lead_contact, new_lead, new_pre_lead, PgPipeline};
use crm_api::conversion::{self, customer_code, ConvertLead, ValidatePreLead};
use crm_api::domain::{LeadSource, LeadStatus, PreLeadStatus};
use crm_api::services::ServiceError;
use crm_api::store::{ContactFilter, CrmStore, LeadFilter, PageRequest};

fn first_page() -> PageRequest {
    PageRequest::new(None, Some(100), 20, 100)
}

/// Company name unique to one test run, so shared databases don't interfere
fn company(label: &str) -> String {
    format!("{} {}", label, Uuid::new_v4().simple())
}

#[tokio::test]
async fn validate_convert_and_transfer_contacts() -> Result<()> {
    let Some(p) = PgPipeline::connect().await? else { return Ok(()) };
    let company = company("Acme");

    let pre_lead = p.services.pre_leads.create(new_pre_lead("Asha", &company), None).await?;
    let validated = p
        .services
        .pre_leads
        .validate(
            pre_lead.id,
            ValidatePreLead {
                priority: Some("high".to_string()),
                expected_value: Some(Decimal::new(12_345_678, 2)),
                notes: None,
            },
            None,
        )
        .await?;

    // Read back through the flattened row mapping and the enum columns
    let lead = p.services.leads.get(validated.lead.id).await?;
    assert_eq!(lead.source, LeadSource::PreLead);
    assert_eq!(lead.pre_lead_id, Some(pre_lead.id));
    assert_eq!(lead.profile.company_name.as_deref(), Some(company.as_str()));
    assert_eq!(lead.expected_value, Some(Decimal::new(12_345_678, 2)));
    let pre_lead = p.services.pre_leads.get(pre_lead.id).await?;
    assert_eq!(pre_lead.status, PreLeadStatus::Validated);
    assert_eq!(pre_lead.converted_lead_id, Some(lead.id));

    let primary = p.services.contacts.create(lead_contact(&lead, "Asha", true)).await?;
    let other = p.services.contacts.create(lead_contact(&lead, "Ben", false)).await?;
    p.services.leads.set_stage(lead.id, 6).await?;

    let converted = p.services.leads.convert(lead.id, ConvertLead::default(), None).await?;
    assert_eq!(converted.contacts_moved, 2);
    assert!(customer_code::is_generated(&converted.customer.customer_code));

    let lead = p.services.leads.get(lead.id).await?;
    assert!(lead.is_converted);
    assert_eq!(lead.lead_status, LeadStatus::Won);
    assert_eq!(lead.converted_customer_id, Some(converted.customer.id));
    let customer = p.services.customers.get(converted.customer.id).await?;
    assert_eq!(customer.lead_id, Some(lead.id));
    assert_eq!(customer.customer_code, converted.customer.customer_code);

    for id in [primary.id, other.id] {
        let contact = p.services.contacts.get(id).await?;
        assert_eq!(contact.customer_id, Some(customer.id));
        assert_eq!(contact.lead_id, None);
    }
    let moved = p
        .services
        .contacts
        .list(
            &ContactFilter {
                customer_id: Some(customer.id),
                ..Default::default()
            },
            first_page(),
        )
        .await?;
    assert_eq!(moved.pagination.total, 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_conversions_of_one_lead_serialize() -> Result<()> {
    let Some(p) = PgPipeline::connect().await? else { return Ok(()) };
    let lead = p.services.leads.create(new_lead("Asha", &company("Race")), None).await?;

    let leads = p.services.leads.clone();
    let first = tokio::spawn({
        let leads = leads.clone();
        async move { leads.convert(lead.id, ConvertLead::default(), None).await }
    });
    let second = tokio::spawn(async move { leads.convert(lead.id, ConvertLead::default(), None).await });
    let (first, second) = (first.await?, second.await?);

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(loser, Err(ServiceError::Conflict(_))), "got {:?}", loser);
    Ok(())
}

#[tokio::test]
async fn concurrent_generated_codes_are_distinct() -> Result<()> {
    let Some(p) = PgPipeline::connect().await? else { return Ok(()) };
    let month = customer_code::month_key(Utc::now());
    let company = company("Batch");

    let mut handles = Vec::new();
    for name in ["Asha", "Ben", "Chen", "Dana"] {
        let lead = p.services.leads.create(new_lead(name, &company), None).await?;
        let leads = p.services.leads.clone();
        handles.push(tokio::spawn(async move {
            leads.convert(lead.id, ConvertLead::default(), None).await
        }));
    }

    let mut codes = HashSet::new();
    for handle in handles {
        let converted = handle.await??;
        assert!(converted.customer.customer_code.starts_with(&customer_code::month_prefix(&month)));
        codes.insert(converted.customer.customer_code);
    }
    assert_eq!(codes.len(), 4, "{:?}", codes);
    Ok(())
}

#[tokio::test]
async fn contact_insert_waits_for_a_conversion_in_flight() -> Result<()> {
    let Some(p) = PgPipeline::connect().await? else { return Ok(()) };
    let lead = p.services.leads.create(new_lead("Asha", &company("Late")), None).await?;

    let mut tx = p.store.begin().await?;
    let mut locked = tx.lock_lead(lead.id).await?.expect("lead exists");

    let contacts = p.services.contacts.clone();
    let input = lead_contact(&lead, "Late", false);
    let pending = tokio::spawn(async move { contacts.create(input).await });
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!pending.is_finished(), "contact insert must wait on the lead row");

    let now = Utc::now();
    let code = format!("PG-{}", Uuid::new_v4().simple());
    let customer = conversion::customer_from_lead(&locked, &ConvertLead::default(), code, None, now);
    tx.save_customer(&customer).await?;
    conversion::mark_lead_converted(&mut locked, customer.id, now);
    tx.save_lead(&locked).await?;
    tx.transfer_contacts(lead.id, customer.id).await?;
    tx.commit().await?;

    let result = pending.await?;
    assert!(matches!(result, Err(ServiceError::Conflict(_))), "got {:?}", result);
    let attached = p
        .services
        .contacts
        .list(
            &ContactFilter {
                lead_id: Some(lead.id),
                ..Default::default()
            },
            first_page(),
        )
        .await?;
    assert_eq!(attached.pagination.total, 0);
    Ok(())
}

#[tokio::test]
async fn search_treats_wildcards_literally() -> Result<()> {
    let Some(p) = PgPipeline::connect().await? else { return Ok(()) };
    let tag = Uuid::new_v4().simple().to_string();

    let percent = p
        .services
        .leads
        .create(new_lead("Pia", &format!("{} 100% Co", tag)), None)
        .await?;
    p.services
        .leads
        .create(new_lead("Rob", &format!("{} 1000 Co", tag)), None)
        .await?;

    let filter = LeadFilter {
        search: Some(format!("{} 100%", tag)),
        ..Default::default()
    };
    let found = p.services.leads.list(&filter, first_page()).await?;
    assert_eq!(found.pagination.total, 1);
    assert_eq!(found.items[0].id, percent.id);
    Ok(())
}
