//! `genq spaces` - list accessible Genie spaces

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Table};
use genq_client::{ConversationClient, GenieClient};

use crate::{print_error, print_success};

#[derive(Args)]
pub struct SpacesArgs {}

pub async fn run(_args: SpacesArgs) -> Result<()> {
    let client = GenieClient::from_env().context("workspace configuration")?;

    let spaces = client
        .list_spaces()
        .await
        .context("failed to list Genie spaces")?;

    if spaces.is_empty() {
        print_error("No Genie spaces found in this workspace");
        return Ok(());
    }

    print_success(&format!("Found {} Genie space(s)", spaces.len()));

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Space ID", "Title", "Description"]);
    for space in &spaces {
        table.add_row(vec![
            space.space_id.as_str(),
            space.title.as_str(),
            space.description.as_deref().unwrap_or("-"),
        ]);
    }
    println!("{table}");

    println!(
        "\nTo pin a space, set:\n  export GENIE_SPACE_ID='{}'",
        spaces[0].space_id
    );

    Ok(())
}
