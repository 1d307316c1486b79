use std::time::Duration;

use shepherd::db;
use shepherd::github::GitHubClient;
use shepherd::gitops::GitCli;
use shepherd::mirror::LocalMirror;

use crate::MirrorAction;
use crate::commands::require_org;
use crate::config::Config;

pub(crate) async fn handle_mirror(
    action: MirrorAction,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;
    let mirror_root = config.mirror_root().ok_or("Failed to determine mirror root")?;
    let mirror = LocalMirror::new(mirror_root, db.clone());

    match action {
        MirrorAction::Refresh => {
            let org = require_org(config)?;
            let client = GitHubClient::new(config.github_token().as_deref())?;
            mirror.refresh(&client, &org).await?;
            println!("Mirror bookkeeping refreshed.");
        }
        MirrorAction::Fetch => {
            let ops =
                GitCli::new().with_timeout(Duration::from_secs(config.update.git_timeout_secs));
            let fetched = mirror.fetch_dirty(&ops).await?;
            println!("Fetched {fetched} mirror(s).");
        }
        MirrorAction::List => {
            for entry in mirror.entries().await? {
                println!(
                    "{}{}",
                    entry.url,
                    if entry.dirty { " (needs update)" } else { "" }
                );
            }
        }
    }

    Ok(())
}
