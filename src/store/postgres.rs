use async_trait::async_trait;
use once_cell::sync::Lazy;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{
    ContactFilter, CrmStore, CrmTx, CustomerFilter, LeadFilter, PageRequest, PreLeadFilter, StoreError,
};
use crate::config::DatabaseConfig;
use crate::conversion::customer_code;
use crate::domain::{Contact, ContactOwner, Customer, Lead, Location, PreLead, Profile, User};

const PROFILE_COLUMNS: &[&str] = &[
    "first_name",
    "last_name",
    "email",
    "phone",
    "company_name",
    "job_title",
    "website",
    "industry",
];

const LOCATION_COLUMNS: &[&str] = &["address", "city", "state", "country", "postal_code"];

/// `INSERT .. ON CONFLICT (id) DO UPDATE` over `columns`, leaving `id` and
/// `created_at` untouched on update
fn upsert_sql(table: &str, columns: &[&str]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|c| !matches!(**c, "id" | "created_at"))
        .map(|c| format!("{} = EXCLUDED.{}", c, c))
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT (id) DO UPDATE SET {}",
        table,
        columns.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    )
}

fn record_columns(head: &[&'static str], tail: &[&'static str]) -> Vec<&'static str> {
    head.iter()
        .chain(PROFILE_COLUMNS)
        .chain(LOCATION_COLUMNS)
        .chain(tail)
        .copied()
        .collect()
}

static UPSERT_PRE_LEAD: Lazy<String> = Lazy::new(|| {
    let columns = record_columns(
        &["id"],
        &[
            "source",
            "notes",
            "assigned_to",
            "status",
            "discard_reason",
            "is_converted",
            "converted_lead_id",
            "converted_at",
            "created_by",
            "created_at",
            "updated_at",
        ],
    );
    upsert_sql("pre_leads", &columns)
});

static UPSERT_LEAD: Lazy<String> = Lazy::new(|| {
    let columns = record_columns(
        &["id"],
        &[
            "source",
            "source_details",
            "priority",
            "lead_status",
            "status",
            "expected_value",
            "actual_value",
            "expected_close_date",
            "lost_reason",
            "notes",
            "assigned_to",
            "pre_lead_id",
            "is_converted",
            "converted_customer_id",
            "converted_at",
            "created_by",
            "created_at",
            "updated_at",
        ],
    );
    upsert_sql("leads", &columns)
});

static UPSERT_CUSTOMER: Lazy<String> = Lazy::new(|| {
    let columns = record_columns(
        &["id", "customer_code", "customer_type"],
        &[
            "billing_address",
            "shipping_address",
            "credit_limit",
            "total_revenue",
            "health_score",
            "is_active",
            "account_manager",
            "lead_id",
            "notes",
            "created_by",
            "created_at",
            "updated_at",
        ],
    );
    upsert_sql("customers", &columns)
});

static UPSERT_CONTACT: Lazy<String> = Lazy::new(|| {
    upsert_sql(
        "contacts",
        &[
            "id",
            "lead_id",
            "customer_id",
            "first_name",
            "last_name",
            "email",
            "phone",
            "job_title",
            "is_primary",
            "notes",
            "created_at",
            "updated_at",
        ],
    )
});

static UPSERT_USER: Lazy<String> = Lazy::new(|| {
    upsert_sql(
        "users",
        &["id", "email", "full_name", "role", "is_active", "created_at"],
    )
});

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

fn bind_profile<'q>(q: PgQuery<'q>, p: &'q Profile) -> PgQuery<'q> {
    q.bind(&p.first_name)
        .bind(&p.last_name)
        .bind(&p.email)
        .bind(&p.phone)
        .bind(&p.company_name)
        .bind(&p.job_title)
        .bind(&p.website)
        .bind(&p.industry)
}

fn bind_location<'q>(q: PgQuery<'q>, l: &'q Location) -> PgQuery<'q> {
    q.bind(&l.address)
        .bind(&l.city)
        .bind(&l.state)
        .bind(&l.country)
        .bind(&l.postal_code)
}

/// Substring pattern for `ILIKE ... ESCAPE '\'`; the term matches literally
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

fn push_search(qb: &mut QueryBuilder<'_, Postgres>, search: &Option<String>, extra: &[&str]) {
    let term = match search.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => like_pattern(s),
        _ => return,
    };
    qb.push(" AND (");
    let columns = ["first_name", "last_name", "email", "company_name"];
    for (i, column) in columns.iter().chain(extra).enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column)
            .push(" ILIKE ")
            .push_bind(term.clone())
            .push(" ESCAPE '\\'");
    }
    qb.push(")");
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(page.limit())
        .push(" OFFSET ")
        .push_bind(page.offset());
}

fn pre_lead_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &PreLeadFilter) {
    if let Some(v) = f.status {
        qb.push(" AND status = ").push_bind(v);
    }
    if let Some(v) = &f.source {
        qb.push(" AND source = ").push_bind(v.clone());
    }
    if let Some(v) = f.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(v);
    }
    if let Some(v) = f.is_converted {
        qb.push(" AND is_converted = ").push_bind(v);
    }
    push_search(qb, &f.search, &[]);
}

fn lead_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &LeadFilter) {
    if let Some(v) = f.status {
        qb.push(" AND status = ").push_bind(v);
    }
    if let Some(v) = f.lead_status {
        qb.push(" AND lead_status = ").push_bind(v);
    }
    if let Some(v) = f.priority {
        qb.push(" AND priority = ").push_bind(v);
    }
    if let Some(v) = f.source {
        qb.push(" AND source = ").push_bind(v);
    }
    if let Some(v) = f.assigned_to {
        qb.push(" AND assigned_to = ").push_bind(v);
    }
    if let Some(v) = f.is_converted {
        qb.push(" AND is_converted = ").push_bind(v);
    }
    push_search(qb, &f.search, &[]);
}

fn customer_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &CustomerFilter) {
    if let Some(v) = f.customer_type {
        qb.push(" AND customer_type = ").push_bind(v);
    }
    if let Some(v) = f.account_manager {
        qb.push(" AND account_manager = ").push_bind(v);
    }
    if let Some(v) = f.is_active {
        qb.push(" AND is_active = ").push_bind(v);
    }
    push_search(qb, &f.search, &["customer_code"]);
}

fn contact_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &ContactFilter) {
    if let Some(v) = f.lead_id {
        qb.push(" AND lead_id = ").push_bind(v);
    }
    if let Some(v) = f.customer_id {
        qb.push(" AND customer_id = ").push_bind(v);
    }
}

/// PostgreSQL implementation of the store seam
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build a lazy pool; the first query opens the first connection
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy(&config.url)?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl CrmStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn CrmTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn fetch_by_id<T>(&mut self, sql: &str, id: Uuid) -> Result<Option<T>, StoreError>
    where
        T: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        let row = sqlx::query_as::<_, T>(sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn delete_by_id(&mut self, table: &str, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {} WHERE id = $1", table);
        let result = sqlx::query(&sql).bind(id).execute(&mut *self.tx).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count(&mut self, mut qb: QueryBuilder<'_, Postgres>) -> Result<i64, StoreError> {
        let total = qb.build_query_scalar::<i64>().fetch_one(&mut *self.tx).await?;
        Ok(total)
    }
}

#[async_trait]
impl CrmTx for PgTx {
    async fn user(&mut self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.fetch_by_id("SELECT * FROM users WHERE id = $1", id).await
    }

    async fn save_user(&mut self, user: &User) -> Result<(), StoreError> {
        sqlx::query(&UPSERT_USER)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(user.role)
            .bind(user.is_active)
            .bind(user.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError> {
        self.fetch_by_id("SELECT * FROM pre_leads WHERE id = $1", id).await
    }

    async fn lock_pre_lead(&mut self, id: Uuid) -> Result<Option<PreLead>, StoreError> {
        self.fetch_by_id("SELECT * FROM pre_leads WHERE id = $1 FOR UPDATE", id)
            .await
    }

    async fn list_pre_leads(
        &mut self,
        filter: &PreLeadFilter,
        page: PageRequest,
    ) -> Result<(Vec<PreLead>, i64), StoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM pre_leads WHERE TRUE");
        pre_lead_filter(&mut count, filter);
        let total = self.count(count).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM pre_leads WHERE TRUE");
        pre_lead_filter(&mut qb, filter);
        push_page(&mut qb, page);
        let rows = qb.build_query_as::<PreLead>().fetch_all(&mut *self.tx).await?;
        Ok((rows, total))
    }

    async fn save_pre_lead(&mut self, p: &PreLead) -> Result<(), StoreError> {
        let q = sqlx::query(&UPSERT_PRE_LEAD).bind(p.id);
        let q = bind_location(bind_profile(q, &p.profile), &p.location);
        q.bind(&p.source)
            .bind(&p.notes)
            .bind(p.assigned_to)
            .bind(p.status)
            .bind(&p.discard_reason)
            .bind(p.is_converted)
            .bind(p.converted_lead_id)
            .bind(p.converted_at)
            .bind(p.created_by)
            .bind(p.created_at)
            .bind(p.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_pre_lead(&mut self, id: Uuid) -> Result<bool, StoreError> {
        self.delete_by_id("pre_leads", id).await
    }

    async fn lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.fetch_by_id("SELECT * FROM leads WHERE id = $1", id).await
    }

    async fn lock_lead(&mut self, id: Uuid) -> Result<Option<Lead>, StoreError> {
        self.fetch_by_id("SELECT * FROM leads WHERE id = $1 FOR UPDATE", id)
            .await
    }

    async fn list_leads(&mut self, filter: &LeadFilter, page: PageRequest) -> Result<(Vec<Lead>, i64), StoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM leads WHERE TRUE");
        lead_filter(&mut count, filter);
        let total = self.count(count).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM leads WHERE TRUE");
        lead_filter(&mut qb, filter);
        push_page(&mut qb, page);
        let rows = qb.build_query_as::<Lead>().fetch_all(&mut *self.tx).await?;
        Ok((rows, total))
    }

    async fn save_lead(&mut self, l: &Lead) -> Result<(), StoreError> {
        let q = sqlx::query(&UPSERT_LEAD).bind(l.id);
        let q = bind_location(bind_profile(q, &l.profile), &l.location);
        q.bind(l.source)
            .bind(&l.source_details)
            .bind(l.priority)
            .bind(l.lead_status)
            .bind(l.status)
            .bind(l.expected_value)
            .bind(l.actual_value)
            .bind(l.expected_close_date)
            .bind(&l.lost_reason)
            .bind(&l.notes)
            .bind(l.assigned_to)
            .bind(l.pre_lead_id)
            .bind(l.is_converted)
            .bind(l.converted_customer_id)
            .bind(l.converted_at)
            .bind(l.created_by)
            .bind(l.created_at)
            .bind(l.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_lead(&mut self, id: Uuid) -> Result<bool, StoreError> {
        self.delete_by_id("leads", id).await
    }

    async fn customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        self.fetch_by_id("SELECT * FROM customers WHERE id = $1", id).await
    }

    async fn lock_customer(&mut self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        self.fetch_by_id("SELECT * FROM customers WHERE id = $1 FOR UPDATE", id)
            .await
    }

    async fn list_customers(
        &mut self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> Result<(Vec<Customer>, i64), StoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM customers WHERE TRUE");
        customer_filter(&mut count, filter);
        let total = self.count(count).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM customers WHERE TRUE");
        customer_filter(&mut qb, filter);
        push_page(&mut qb, page);
        let rows = qb.build_query_as::<Customer>().fetch_all(&mut *self.tx).await?;
        Ok((rows, total))
    }

    async fn save_customer(&mut self, c: &Customer) -> Result<(), StoreError> {
        let q = sqlx::query(&UPSERT_CUSTOMER)
            .bind(c.id)
            .bind(&c.customer_code)
            .bind(c.customer_type);
        let q = bind_location(bind_profile(q, &c.profile), &c.location);
        q.bind(&c.billing_address)
            .bind(&c.shipping_address)
            .bind(c.credit_limit)
            .bind(c.total_revenue)
            .bind(c.health_score)
            .bind(c.is_active)
            .bind(c.account_manager)
            .bind(c.lead_id)
            .bind(&c.notes)
            .bind(c.created_by)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn customer_code_exists(&mut self, code: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM customers WHERE customer_code = $1)")
            .bind(code)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn lock_customer_codes(&mut self, month: &str) -> Result<Vec<String>, StoreError> {
        // Transaction scoped; released on commit or rollback
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1)::bigint)")
            .bind(format!("customer_code:{}", month))
            .execute(&mut *self.tx)
            .await?;

        let codes = sqlx::query_scalar::<_, String>("SELECT customer_code FROM customers WHERE customer_code LIKE $1")
            .bind(format!("{}%", customer_code::month_prefix(month)))
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(codes)
    }

    async fn contact(&mut self, id: Uuid) -> Result<Option<Contact>, StoreError> {
        self.fetch_by_id("SELECT * FROM contacts WHERE id = $1", id).await
    }

    async fn list_contacts(
        &mut self,
        filter: &ContactFilter,
        page: PageRequest,
    ) -> Result<(Vec<Contact>, i64), StoreError> {
        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM contacts WHERE TRUE");
        contact_filter(&mut count, filter);
        let total = self.count(count).await?;

        let mut qb = QueryBuilder::new("SELECT * FROM contacts WHERE TRUE");
        contact_filter(&mut qb, filter);
        push_page(&mut qb, page);
        let rows = qb.build_query_as::<Contact>().fetch_all(&mut *self.tx).await?;
        Ok((rows, total))
    }

    async fn save_contact(&mut self, c: &Contact) -> Result<(), StoreError> {
        sqlx::query(&UPSERT_CONTACT)
            .bind(c.id)
            .bind(c.lead_id)
            .bind(c.customer_id)
            .bind(&c.first_name)
            .bind(&c.last_name)
            .bind(&c.email)
            .bind(&c.phone)
            .bind(&c.job_title)
            .bind(c.is_primary)
            .bind(&c.notes)
            .bind(c.created_at)
            .bind(c.updated_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_contact(&mut self, id: Uuid) -> Result<bool, StoreError> {
        self.delete_by_id("contacts", id).await
    }

    async fn clear_primary(&mut self, owner: ContactOwner, except: Option<Uuid>) -> Result<u64, StoreError> {
        let (column, owner_id) = match owner {
            ContactOwner::Lead(id) => ("lead_id", id),
            ContactOwner::Customer(id) => ("customer_id", id),
        };
        let sql = format!(
            "UPDATE contacts SET is_primary = FALSE, updated_at = NOW() \
             WHERE {} = $1 AND is_primary AND ($2::uuid IS NULL OR id <> $2)",
            column
        );
        let result = sqlx::query(&sql)
            .bind(owner_id)
            .bind(except)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn transfer_contacts(&mut self, lead_id: Uuid, customer_id: Uuid) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE contacts SET customer_id = $2, lead_id = NULL, updated_at = NOW() WHERE lead_id = $1",
        )
        .bind(lead_id)
        .bind(customer_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_identity_columns_out_of_update() {
        let sql = upsert_sql("users", &["id", "email", "created_at"]);
        assert_eq!(
            sql,
            "INSERT INTO users (id, email, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email"
        );
    }

    #[test]
    fn search_wildcards_match_literally() {
        assert_eq!(like_pattern("acme"), "%acme%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn record_upserts_bind_every_field() {
        // one placeholder per struct field, profile and location flattened
        assert!(UPSERT_PRE_LEAD.contains("$25)"));
        assert!(UPSERT_LEAD.contains("$32)"));
        assert!(UPSERT_CUSTOMER.contains("$28)"));
        assert!(UPSERT_CONTACT.contains("$12)"));
    }
}
