use clap::Args;
use serde::Serialize;

use super::open_resolver;
use crate::Cli;
use crate::output::Output;

#[derive(Args)]
pub struct MergeCommand {
    /// Identity to fold in and delete
    pub source: String,
    /// Identity that survives
    pub target: String,
}

impl MergeCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let resolver = open_resolver(cli)?;
        let result = resolver.merge(&self.source, &self.target).await?;
        Output::from_cli(cli).write(&result)
    }
}

#[derive(Args)]
pub struct GcCommand {
    /// Candidate identity ids
    #[arg(required = true)]
    pub ids: Vec<String>,
}

#[derive(Serialize)]
struct GcReport {
    deleted: Vec<String>,
}

impl GcCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let resolver = open_resolver(cli)?;
        let deleted = resolver.garbage_collect(&self.ids).await?;
        Output::from_cli(cli).write(&GcReport { deleted })
    }
}

#[derive(Args)]
pub struct ForgetPhotoCommand {
    pub photo_id: String,
}

impl ForgetPhotoCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let resolver = open_resolver(cli)?;
        let result = resolver.forget_photo(&self.photo_id).await?;
        Output::from_cli(cli).write(&result)
    }
}
