use axum::extract::{Extension, Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Deleted;
use crate::conversion::{ConvertLead, Discard};
use crate::domain::{Customer, LeadSource, LeadStatus, LeadView, NewLead, Priority, RecordStatus, UpdateLead};
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser, OptionalJson};
use crate::permissions::{Action, Module};
use crate::server::AppState;
use crate::store::{LeadFilter, Page};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<RecordStatus>,
    pub lead_status: Option<LeadStatus>,
    pub priority: Option<Priority>,
    pub source: Option<LeadSource>,
    pub assigned_to: Option<Uuid>,
    pub is_converted: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StageBody {
    pub pipeline_stage: i64,
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub lead_status: LeadStatus,
}

#[derive(Debug, Serialize)]
pub struct ConvertedLead {
    pub customer_id: Uuid,
    pub customer_code: String,
    pub contacts_moved: u64,
    pub lead: LeadView,
    pub customer: Customer,
}

/// GET /api/leads - Paginated, filtered list
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<LeadView>> {
    user.require(&state, Module::Leads, Action::View)?;

    let page = state.page(query.page, query.page_size);
    let filter = LeadFilter {
        status: query.status,
        lead_status: query.lead_status,
        priority: query.priority,
        source: query.source,
        assigned_to: query.assigned_to,
        is_converted: query.is_converted,
        search: query.search,
    };
    let leads = state.services.leads.list(&filter, page).await?;
    Ok(ApiResponse::success(leads.map(LeadView::from)))
}

/// GET /api/leads/:id - Includes the derived `pipeline_stage`
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::View)?;
    Ok(ApiResponse::success(state.services.leads.get(id).await?.into()))
}

/// POST /api/leads
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<NewLead>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::Create)?;
    let lead = state.services.leads.create(input, Some(user.id())).await?;
    Ok(ApiResponse::created(lead.into()))
}

/// PUT /api/leads/:id - Refused once converted or discarded
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<UpdateLead>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::Update)?;
    Ok(ApiResponse::success(state.services.leads.update(id, input).await?.into()))
}

/// DELETE /api/leads/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    user.require(&state, Module::Leads, Action::Delete)?;
    state.services.leads.delete(id).await?;
    Ok(ApiResponse::success(Deleted::new(id)))
}

/// PUT /api/leads/:id/stage - Body: `{ "pipeline_stage": 1..=6 }`
pub async fn set_stage(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<StageBody>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::Update)?;
    let lead = state.services.leads.set_stage(id, body.pipeline_stage).await?;
    Ok(ApiResponse::success(lead.into()))
}

/// PUT /api/leads/:id/status - Body: `{ "lead_status": "qualified" }`
pub async fn set_status(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::Update)?;
    let lead = state.services.leads.set_status(id, body.lead_status).await?;
    Ok(ApiResponse::success(lead.into()))
}

/// POST /api/leads/:id/convert - Create the customer and move the contacts
///
/// Body (all optional): `customer_code`, `customer_type`, `credit_limit`,
/// `billing_address`, `shipping_address`, `notes`
pub async fn convert(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    OptionalJson(input): OptionalJson<ConvertLead>,
) -> ApiResult<ConvertedLead> {
    user.require(&state, Module::Leads, Action::Convert)?;

    let result = state.services.leads.convert(id, input, Some(user.id())).await?;
    Ok(ApiResponse::created(ConvertedLead {
        customer_id: result.customer.id,
        customer_code: result.customer.customer_code.clone(),
        contacts_moved: result.contacts_moved,
        lead: result.lead.into(),
        customer: result.customer,
    }))
}

/// POST /api/leads/:id/discard - Body: `{ "reason": "..." }`
pub async fn discard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    OptionalJson(input): OptionalJson<Discard>,
) -> ApiResult<LeadView> {
    user.require(&state, Module::Leads, Action::Discard)?;
    Ok(ApiResponse::success(state.services.leads.discard(id, input).await?.into()))
}
