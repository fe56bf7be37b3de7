use clap::Args;
use photoid_faceid::{Identity, IdentityFilter};
use serde::Serialize;

use super::open_resolver;
use crate::Cli;
use crate::output::Output;

#[derive(Args)]
pub struct ListCommand {
    /// Only identities seen in at least N photos
    #[arg(long, default_value_t = 0)]
    pub min_photos: u32,

    /// Only identities that have a thumbnail
    #[arg(long)]
    pub with_thumbnail: bool,

    /// Maximum number of identities
    #[arg(long)]
    pub limit: Option<usize>,
}

/// Listing row; samples are left out.
#[derive(Serialize)]
struct Summary<'a> {
    id: &'a str,
    photo_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumbnail: Option<&'a str>,
    last_seen: String,
}

impl<'a> From<&'a Identity> for Summary<'a> {
    fn from(i: &'a Identity) -> Self {
        Self {
            id: &i.id,
            photo_count: i.photo_count,
            thumbnail: i.thumbnail_ref.as_deref(),
            last_seen: i.last_seen.to_rfc3339(),
        }
    }
}

impl ListCommand {
    fn filter(&self) -> IdentityFilter {
        IdentityFilter {
            min_photos: self.min_photos,
            with_thumbnail: self.with_thumbnail.then_some(true),
            limit: self.limit,
        }
    }

    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let resolver = open_resolver(cli)?;
        let identities = resolver.list_identities(&self.filter())?;
        let rows: Vec<Summary<'_>> = identities.iter().map(Summary::from).collect();
        Output::from_cli(cli).write(&rows)
    }
}

#[derive(Args)]
pub struct ShowCommand {
    pub id: String,
}

impl ShowCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let resolver = open_resolver(cli)?;
        let identity = resolver.get_identity(&self.id)?;
        Output::from_cli(cli).write(&identity)
    }
}
