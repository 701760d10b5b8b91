use axum::extract::{Extension, Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{Customer, CustomerType, UpdateCustomer};
use crate::middleware::{ApiJson, ApiResponse, ApiResult, CurrentUser};
use crate::permissions::{Action, Module};
use crate::server::AppState;
use crate::store::{CustomerFilter, Page};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub customer_type: Option<CustomerType>,
    pub account_manager: Option<Uuid>,
    pub is_active: Option<bool>,
    pub search: Option<String>,
}

/// GET /api/customers - Paginated, filtered list
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Page<Customer>> {
    user.require(&state, Module::Customers, Action::View)?;

    let page = state.page(query.page, query.page_size);
    let filter = CustomerFilter {
        customer_type: query.customer_type,
        account_manager: query.account_manager,
        is_active: query.is_active,
        search: query.search,
    };
    Ok(ApiResponse::success(state.services.customers.list(&filter, page).await?))
}

/// GET /api/customers/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Customer> {
    user.require(&state, Module::Customers, Action::View)?;
    Ok(ApiResponse::success(state.services.customers.get(id).await?))
}

/// PUT /api/customers/:id
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    ApiJson(input): ApiJson<UpdateCustomer>,
) -> ApiResult<Customer> {
    user.require(&state, Module::Customers, Action::Update)?;
    Ok(ApiResponse::success(state.services.customers.update(id, input).await?))
}

/// DELETE /api/customers/:id - Deactivates; the row and its lineage stay
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<Customer> {
    user.require(&state, Module::Customers, Action::Delete)?;
    Ok(ApiResponse::success(state.services.customers.deactivate(id).await?))
}
