use axum::extract::State;

use crate::domain::{NewPreLead, PreLead};
use crate::middleware::{ApiJson, ApiResponse, ApiResult};
use crate::server::AppState;

/// POST /public/forms/pre-leads - Anonymous pre-lead submission
///
/// Requires `first_name` and at least one of `email` / `phone`. The stored
/// source is always `public_form`.
pub async fn submit_pre_lead(
    State(state): State<AppState>,
    ApiJson(input): ApiJson<NewPreLead>,
) -> ApiResult<PreLead> {
    let pre_lead = state.services.pre_leads.submit_public_form(input).await?;
    Ok(ApiResponse::created(pre_lead))
}
