use shepherd::db;
use shepherd::events::EventLog;
use shepherd::github::{GitHubClient, GitHubUpstream};

use crate::EventsAction;
use crate::commands::require_org;
use crate::config::Config;

pub(crate) async fn handle_events(
    action: EventsAction,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let db = db::connect(database_url).await?;
    let log = EventLog::new(db.clone());

    match action {
        EventsAction::Download => {
            let org = require_org(config)?;
            let client = GitHubClient::new(config.github_token().as_deref())?;
            let upstream = GitHubUpstream::new(&client, &db, &org);

            let outcome = log.download(&upstream).await?;
            println!(
                "Stored {} event(s), dropped {}.",
                outcome.stored, outcome.dropped
            );
            if outcome.gap {
                println!("The feed did not connect to the stored log; a gap was recorded.");
            }

            let state = log.state().await?;
            println!(
                "Log now covers ({}, {}].",
                state.start_id, state.last_id
            );
        }
        EventsAction::List => {
            for event in log.all_events().await? {
                println!(
                    "{}\t{:?}\t{}\t{}\t{}{}",
                    event.source_id,
                    event.kind,
                    event.repo,
                    event.branch.as_deref().unwrap_or("-"),
                    event.created_at,
                    if event.sequence_start {
                        "\t(sequence start)"
                    } else {
                        ""
                    }
                );
            }
        }
    }

    Ok(())
}
