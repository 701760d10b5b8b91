use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::{utils::output_success, OutputFormat};
use crate::config::config;
use crate::domain::User;
use crate::permissions::Role;
use crate::store::{CrmStore, PgStore, StoreError};

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an active user")]
    Add {
        #[arg(long, help = "Email address (unique)")]
        email: String,
        #[arg(long, help = "Full name")]
        name: String,
        #[arg(long, help = "admin, sales_manager, sales_executive, marketing or viewer")]
        role: Role,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Add { email, name, role } => {
            let store = PgStore::connect(&config().database).context("configuring database pool")?;
            let user = User::new(email.trim().to_lowercase(), name, role);

            let mut tx = store.begin().await?;
            match tx.save_user(&user).await {
                Err(StoreError::UniqueViolation(_)) => {
                    anyhow::bail!("a user with email '{}' already exists", user.email)
                }
                other => other?,
            }
            tx.commit().await?;

            output_success(
                output_format,
                &format!("User '{}' created", user.email),
                Some(json!({
                    "id": user.id,
                    "email": user.email,
                    "role": user.role.as_str(),
                })),
            )
        }
    }
}
