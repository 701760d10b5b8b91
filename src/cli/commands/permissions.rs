use std::path::PathBuf;

use clap::Subcommand;
use serde_json::{json, Map, Value};

use crate::cli::{
    utils::{output_block, output_success},
    OutputFormat,
};
use crate::config::config;
use crate::permissions::{PermissionMatrix, Role};

#[derive(Subcommand)]
pub enum PermissionCommands {
    #[command(about = "Print the effective policy, or one role's grants")]
    Show {
        #[arg(long)]
        role: Option<Role>,
        #[arg(long, help = "Policy file (defaults to CRM_PERMISSIONS_FILE, then built-in)")]
        file: Option<PathBuf>,
    },

    #[command(about = "Answer whether a role may perform an action on a module")]
    Check {
        role: String,
        module: String,
        action: String,
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

fn load(file: Option<PathBuf>) -> anyhow::Result<PermissionMatrix> {
    let path = file.or_else(|| config().permissions_file.clone());
    Ok(PermissionMatrix::load(path.as_deref())?)
}

pub fn handle(cmd: PermissionCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        PermissionCommands::Show { role: None, file } => {
            let matrix = load(file)?;
            output_block(output_format, "policy", &matrix.to_yaml()?)
        }
        PermissionCommands::Show { role: Some(role), file } => {
            let matrix = load(file)?;
            let grants: Map<String, Value> = matrix
                .allowed_actions(role)
                .into_iter()
                .map(|(module, actions)| {
                    let actions: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
                    (module.as_str().to_string(), json!(actions))
                })
                .collect();
            output_success(output_format, &format!("Grants for {}", role), Some(Value::Object(grants)))
        }
        PermissionCommands::Check { role, module, action, file } => {
            let matrix = load(file)?;
            let allowed = matrix.check_named(&role, &module, &action);
            let verdict = if allowed { "allowed" } else { "denied" };
            output_success(
                output_format,
                &format!("{} {} {}: {}", role, action, module, verdict),
                Some(json!({ "allowed": allowed })),
            )
        }
    }
}
