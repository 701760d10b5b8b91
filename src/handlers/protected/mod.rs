// handlers/protected/mod.rs - Protected handlers (JWT authentication required)
//
// Route prefix: /api. The auth middleware puts a `CurrentUser` in the request
// extensions; every handler checks the permission matrix before calling into
// the services.
pub mod auth;
pub mod contacts;
pub mod customers;
pub mod leads;
pub mod pre_leads;

use serde::Serialize;
use uuid::Uuid;

/// Body returned by DELETE endpoints
#[derive(Debug, Serialize)]
pub struct Deleted {
    pub id: Uuid,
    pub deleted: bool,
}

impl Deleted {
    pub fn new(id: Uuid) -> Self {
        Self { id, deleted: true }
    }
}
