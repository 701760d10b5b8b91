use axum::extract::{Extension, Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Deleted;
use crate::conversion::{Discard, ValidatePreLead};
use crate::domain::{LeadView, NewPreLead, PreLead, PreLeadStatus, UpdatePreLead};
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser, OptionalJson};
use crate::permissions::{Action, Module};
use crate::server::AppState;
use crate::store::{Page, PreLeadFilter};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<PreLeadStatus>,
    pub source: Option<String>,
    pub assigned_to: Option<Uuid>,
    pub is_converted: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidatedPreLead {
    pub lead_id: Uuid,
    pub pre_lead: PreLead,
    pub lead: LeadView,
}

/// GET /api/pre-leads - Paginated, filtered list
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<PreLead>> {
    user.require(&state, Module::PreLeads, Action::View)?;

    let page = state.page(query.page, query.page_size);
    let filter = PreLeadFilter {
        status: query.status,
        source: query.source,
        assigned_to: query.assigned_to,
        is_converted: query.is_converted,
        search: query.search,
    };
    Ok(ApiResponse::success(state.services.pre_leads.list(&filter, page).await?))
}

/// GET /api/pre-leads/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<PreLead> {
    user.require(&state, Module::PreLeads, Action::View)?;
    Ok(ApiResponse::success(state.services.pre_leads.get(id).await?))
}

/// POST /api/pre-leads
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<NewPreLead>,
) -> ApiResult<PreLead> {
    user.require(&state, Module::PreLeads, Action::Create)?;
    let pre_lead = state.services.pre_leads.create(input, Some(user.id())).await?;
    Ok(ApiResponse::created(pre_lead))
}

/// PUT /api/pre-leads/:id - Refused once converted or discarded
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<UpdatePreLead>,
) -> ApiResult<PreLead> {
    user.require(&state, Module::PreLeads, Action::Update)?;
    Ok(ApiResponse::success(state.services.pre_leads.update(id, input).await?))
}

/// DELETE /api/pre-leads/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    user.require(&state, Module::PreLeads, Action::Delete)?;
    state.services.pre_leads.delete(id).await?;
    Ok(ApiResponse::success(Deleted::new(id)))
}

/// POST /api/pre-leads/:id/validate - Create a lead from the pre-lead
///
/// Body (all optional): `{ "priority": "high", "expected_value": 100000, "notes": "..." }`
pub async fn validate(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    OptionalJson(input): OptionalJson<ValidatePreLead>,
) -> ApiResult<ValidatedPreLead> {
    user.require(&state, Module::PreLeads, Action::Validate)?;

    let result = state.services.pre_leads.validate(id, input, Some(user.id())).await?;
    Ok(ApiResponse::created(ValidatedPreLead {
        lead_id: result.lead.id,
        pre_lead: result.pre_lead,
        lead: result.lead.into(),
    }))
}

/// POST /api/pre-leads/:id/discard - Body: `{ "reason": "..." }`
pub async fn discard(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    OptionalJson(input): OptionalJson<Discard>,
) -> ApiResult<PreLead> {
    user.require(&state, Module::PreLeads, Action::Discard)?;

    Ok(ApiResponse::success(state.services.pre_leads.discard(id, input).await?))
}
