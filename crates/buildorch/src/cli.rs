use anyhow::Result;
use buildorch_core::workflow::BuildStatus;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{build, plan};

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Container image build orchestrator"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a build described by a build-plan file.
    Build {
        /// Path to a TOML or JSON build-plan file.
        plan: PathBuf,

        /// Override a dotted configuration path, e.g. `image=myapp:2.0` or
        /// `pre-build.dockerfile_lint.strict=true`. May be repeated.
        #[arg(long = "set", value_parser = parse_key_val)]
        set: Vec<(String, String)>,

        /// Run inside a container started from this builder image, with
        /// the host's container-engine socket bind mounted.
        #[arg(long, conflicts_with = "privileged")]
        in_container: Option<String>,

        /// Run inside a privileged container started from this builder
        /// image, with a nested container engine.
        #[arg(long)]
        privileged: Option<String>,

        /// Commit and push the builder container as this image reference
        /// after a successful `--in-container`/`--privileged` build.
        #[arg(long)]
        push_buildroot_to: Option<String>,
    },

    /// Validate and pretty-print a build-plan file without running it.
    Plan {
        /// Path to a TOML or JSON build-plan file.
        plan: PathBuf,
    },
}

impl Cli {
    /// Dispatch to the chosen subcommand, returning the process exit code.
    pub async fn dispatch(self) -> Result<i32> {
        match self.command {
            Command::Build {
                plan,
                set,
                in_container,
                privileged,
                push_buildroot_to,
            } => {
                let args = build::BuildArgs {
                    plan_path: plan,
                    set,
                    in_container,
                    privileged,
                    push_buildroot_to,
                };
                let result = build::run(args).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(match result.status {
                    BuildStatus::Success => 0,
                    BuildStatus::Failed => 1,
                })
            }
            Command::Plan { plan } => {
                plan::run(&plan)?;
                Ok(0)
            }
        }
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("invalid --set '{}', expected key=value", s))
}
