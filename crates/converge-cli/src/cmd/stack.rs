use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use converge_core::cloud::{self, StackSpec};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Subcommand)]
pub enum StackSubcommand {
    /// Deploy (create or update) the CloudFormation stack
    Deploy {
        /// Stack name
        #[arg(long, default_value = "jenkins")]
        name: String,

        /// Path to the CloudFormation template
        #[arg(long)]
        template: PathBuf,

        /// Template parameter override, KEY=VALUE (repeatable)
        #[arg(long = "param")]
        params: Vec<String>,

        /// Poll the stack to a terminal state after deploy
        #[arg(long)]
        wait: bool,
    },

    /// Show the stack's current status
    Status {
        #[arg(long, default_value = "jenkins")]
        name: String,
    },

    /// Poll the stack until it reaches a terminal state
    Wait {
        #[arg(long, default_value = "jenkins")]
        name: String,

        #[arg(long, default_value = "1800")]
        timeout_seconds: u64,
    },

    /// Delete the stack
    Delete {
        #[arg(long, default_value = "jenkins")]
        name: String,
    },

    /// Fetch the generated admin credential from the parameter store
    AdminPassword {
        /// SSM parameter name
        #[arg(long, default_value = "/jenkins/admin-password")]
        parameter: String,
    },
}

const POLL_INTERVAL: Duration = Duration::from_secs(15);

pub fn run(subcmd: StackSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        StackSubcommand::Deploy {
            name,
            template,
            params,
            wait,
        } => {
            let parameters = params
                .iter()
                .map(|p| {
                    p.split_once('=')
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .ok_or_else(|| anyhow::anyhow!("invalid --param '{p}': expected KEY=VALUE"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            cloud::deploy_stack(&StackSpec {
                name: name.clone(),
                template,
                parameters,
            })
            .context("stack deploy failed")?;

            if wait {
                let status =
                    cloud::wait_for_stack(&name, Duration::from_secs(1800), POLL_INTERVAL)?;
                println!("stack {name}: {status}");
            } else {
                println!("stack {name}: deploy started (use 'stack wait' to poll)");
            }
            Ok(())
        }

        StackSubcommand::Status { name } => {
            let status = cloud::stack_status(&name)?;
            if json {
                print_json(&serde_json::json!({ "stack": name, "status": status.as_str() }))
            } else {
                println!("stack {name}: {status}");
                Ok(())
            }
        }

        StackSubcommand::Wait {
            name,
            timeout_seconds,
        } => {
            let status =
                cloud::wait_for_stack(&name, Duration::from_secs(timeout_seconds), POLL_INTERVAL)?;
            println!("stack {name}: {status}");
            Ok(())
        }

        StackSubcommand::Delete { name } => {
            cloud::delete_stack(&name).context("stack delete failed")?;
            println!("stack {name}: delete started");
            Ok(())
        }

        StackSubcommand::AdminPassword { parameter } => {
            let value = cloud::get_parameter(&parameter)
                .context("could not read the admin credential parameter")?;
            println!("{value}");
            Ok(())
        }
    }
}
