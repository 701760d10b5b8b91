// handlers/mod.rs - two security tiers
//
// Public (no auth): service info, health, the inbound pre-lead form
// Protected (JWT auth): everything under /api, permission-checked per action
pub mod protected;
pub mod public;
