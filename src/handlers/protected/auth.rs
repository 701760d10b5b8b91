use axum::extract::{Extension, State};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::domain::User;
use crate::middleware::{ApiResponse, ApiResult, CurrentUser};
use crate::permissions::{Action, Module};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub user: User,
    pub permissions: BTreeMap<Module, BTreeSet<Action>>,
}

/// GET /api/auth/whoami - Current user and what their role may do
pub async fn whoami(State(state): State<AppState>, Extension(current): Extension<CurrentUser>) -> ApiResult<WhoAmI> {
    let permissions = state.permissions.allowed_actions(current.role());
    Ok(ApiResponse::success(WhoAmI {
        user: current.0,
        permissions,
    }))
}
