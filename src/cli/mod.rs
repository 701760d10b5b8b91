pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "crm")]
#[command(about = "CRM admin CLI - migrations, users, tokens and permission policy")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Apply pending database migrations")]
    Migrate,

    #[command(about = "User management")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Mint a bearer token for an existing user")]
    Token(commands::token::TokenArgs),

    #[command(about = "Inspect the permission matrix")]
    Permissions {
        #[command(subcommand)]
        cmd: commands::permissions::PermissionCommands,
    },

    #[command(about = "Check a running server's /health endpoint")]
    Ping {
        #[arg(long, env = "CRM_API_URL", default_value = "http://localhost:3000", help = "Server base URL")]
        url: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Migrate => commands::database::migrate(output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Token(args) => commands::token::handle(args, output_format),
        Commands::Permissions { cmd } => commands::permissions::handle(cmd, output_format),
        Commands::Ping { url } => commands::server::ping(&url, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_permission_check() {
        let cli = Cli::try_parse_from(["crm", "--json", "permissions", "check", "marketing", "leads", "convert"])
            .unwrap();
        assert!(cli.json);
        assert!(matches!(
            cli.command,
            Commands::Permissions {
                cmd: commands::permissions::PermissionCommands::Check { .. }
            }
        ));
    }
}
