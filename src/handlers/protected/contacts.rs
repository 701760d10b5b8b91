use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use super::Deleted;
use crate::domain::{Contact, NewContact, UpdateContact};
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::permissions::{Action, Module};
use crate::server::AppState;
use crate::store::{ContactFilter, Page};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub lead_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
}

/// GET /api/contacts - Filter by `lead_id` or `customer_id`
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<Contact>> {
    user.require(&state, Module::Contacts, Action::View)?;

    let page = state.page(query.page, query.page_size);
    let filter = ContactFilter {
        lead_id: query.lead_id,
        customer_id: query.customer_id,
    };
    Ok(ApiResponse::success(state.services.contacts.list(&filter, page).await?))
}

/// GET /api/contacts/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Contact> {
    user.require(&state, Module::Contacts, Action::View)?;
    Ok(ApiResponse::success(state.services.contacts.get(id).await?))
}

/// POST /api/contacts - Exactly one of `lead_id` / `customer_id`
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    ApiJson(input): ApiJson<NewContact>,
) -> ApiResult<Contact> {
    user.require(&state, Module::Contacts, Action::Create)?;
    Ok(ApiResponse::created(state.services.contacts.create(input).await?))
}

/// PUT /api/contacts/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<UpdateContact>,
) -> ApiResult<Contact> {
    user.require(&state, Module::Contacts, Action::Update)?;
    Ok(ApiResponse::success(state.services.contacts.update(id, input).await?))
}

/// DELETE /api/contacts/:id
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    user.require(&state, Module::Contacts, Action::Delete)?;
    state.services.contacts.delete(id).await?;
    Ok(ApiResponse::success(Deleted::new(id)))
}

/// POST /api/contacts/:id/primary - Make this the owner's primary contact
pub async fn set_primary(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Contact> {
    user.require(&state, Module::Contacts, Action::Update)?;
    Ok(ApiResponse::success(state.services.contacts.set_primary(id).await?))
}
