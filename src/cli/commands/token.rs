use clap::Args;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims};
use crate::cli::{utils::output_block, OutputFormat};
use crate::config::config;
use crate::permissions::Role;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "Id of an existing user")]
    pub user_id: Uuid,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub role: Role,
    #[arg(long, help = "Lifetime in hours (defaults to the configured expiry)")]
    pub hours: Option<u64>,
}

/// Sign with the configured secret. The server still resolves the role from
/// the stored user, so the role claim is informational.
pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config().security;
    let hours = args.hours.unwrap_or(security.jwt_expiry_hours);
    let claims = Claims::new(args.user_id, args.email, args.role, hours);
    let token = generate_jwt(&claims, &security.jwt_secret)?;

    output_block(output_format, "token", &token)
}
