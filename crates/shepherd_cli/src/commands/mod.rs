pub(crate) mod events;
pub(crate) mod migrate;
pub(crate) mod mirror;
pub(crate) mod update;

use crate::config::Config;

/// The tracked organization is required by every command that talks to the
/// upstream feed.
pub(crate) fn require_org(config: &Config) -> Result<String, Box<dyn std::error::Error>> {
    config.github_org().ok_or_else(|| {
        "No organization configured. Set github.org in the config file or SHEPHERD_GITHUB_ORG."
            .into()
    })
}
