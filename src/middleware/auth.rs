use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::auth::verify_jwt;
use crate::domain::User;
use crate::error::ApiError;
use crate::permissions::{Action, Module, PermissionDenied, Role};
use crate::server::AppState;

/// Authenticated user loaded from the store for this request
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn role(&self) -> Role {
        self.0.role
    }

    /// Check the router's permission matrix for this user's stored role
    pub fn require(&self, state: &AppState, module: Module, action: Action) -> Result<(), PermissionDenied> {
        state.permissions.require(self.0.role, module, action)
    }
}

/// JWT authentication middleware: validates the bearer token, then resolves
/// it to an active user
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&state, &headers).await {
        Ok(user) => {
            request.extensions_mut().insert(CurrentUser(user));
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = extract_jwt_from_headers(headers).map_err(|msg| {
        tracing::warn!("rejected request: {}", msg);
        ApiError::unauthorized(msg)
    })?;

    let claims = verify_jwt(&token, &state.config.security.jwt_secret).map_err(|e| {
        tracing::warn!("rejected token: {}", e);
        ApiError::unauthorized(e.to_string())
    })?;

    let mut tx = state.store.begin().await?;
    let user = tx
        .user(claims.sub)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Unknown user"))?;

    if !user.is_active {
        tracing::warn!(user_id = %user.id, "inactive user rejected");
        return Err(ApiError::forbidden("User account is inactive"));
    }
    Ok(user)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_is_required() {
        let mut headers = HeaderMap::new();
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(extract_jwt_from_headers(&headers).unwrap(), "abc.def");
    }
}
