use std::time::Duration;

use shepherd::db;
use shepherd::github::{GitHubClient, GitHubUpstream};
use shepherd::gitops::GitCli;
use shepherd::mirror::LocalMirror;
use shepherd::reconcile::{PassContext, SuperProject};

use crate::commands::require_org;
use crate::config::Config;

pub(crate) async fn handle_update(
    branches: Vec<String>,
    all: bool,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let selected = config.selected_superprojects(&branches);
    if selected.is_empty() {
        return Err("No matching superprojects configured. Add a [[superprojects]] entry.".into());
    }

    let org = require_org(config)?;
    let db = db::connect(database_url).await?;
    let client = GitHubClient::new(config.github_token().as_deref())?;
    let ops = GitCli::new().with_timeout(Duration::from_secs(config.update.git_timeout_secs));
    let mirror_root = config.mirror_root().ok_or("Failed to determine mirror root")?;
    let mirror = LocalMirror::new(mirror_root, db.clone());
    let upstream = GitHubUpstream::new(&client, &db, &org);

    let ctx = PassContext {
        ops: &ops,
        refs: &upstream,
        source: &upstream,
        db: &db,
        mirror: &mirror,
    };

    let mut failed = 0usize;
    for sp_config in selected {
        let superproject = SuperProject::new(
            &sp_config.module,
            &sp_config.branch,
            &sp_config.submodule_branch,
            &sp_config.path,
        )
        .with_push(sp_config.push.unwrap_or(config.update.push))
        .with_committer(&config.update.commit_name, &config.update.commit_email);

        let superproject = match &sp_config.remote_url {
            Some(url) => superproject.with_url(url),
            None => superproject,
        };

        match superproject.update_from_events(&ctx, all).await {
            Ok(report) => {
                tracing::info!(
                    module = %superproject.module_branch_name(),
                    full_resync = report.full_resync,
                    commits = report.commits,
                    pushed = report.pushed,
                    ignored_submodules = report.ignored_submodules,
                    "pass complete"
                );
            }
            Err(e) => {
                failed += 1;
                tracing::error!(
                    module = %superproject.module_branch_name(),
                    error = %e,
                    "pass failed"
                );
            }
        }
    }

    if failed > 0 {
        return Err(format!("{failed} superproject pass(es) failed").into());
    }

    Ok(())
}
