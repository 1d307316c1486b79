//! Configuration file support for shepherd.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `SHEPHERD_`, e.g., `SHEPHERD_DATABASE_URL`)
//! 3. Config file (~/.config/shepherd/config.toml or ./shepherd.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/shepherd/shepherd.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [database]
//! url = "sqlite://~/.local/state/shepherd/shepherd.db"  # optional, this is the default
//!
//! [github]
//! token = "ghp_..."     # or use SHEPHERD_GITHUB_TOKEN env var
//! org = "boostorg"      # organization whose activity feed is polled
//!
//! [mirror]
//! root = "/var/lib/shepherd/mirror"
//!
//! [update]
//! push = true
//! commit_name = "Automated Commit"
//! commit_email = "shepherd@example.com"
//! git_timeout_secs = 240
//!
//! [[superprojects]]
//! module = "boostorg/boost"
//! branch = "develop"
//! submodule_branch = "develop"
//! path = "/var/lib/shepherd/super-develop"
//! # remote_url = "git@github.com:boostorg/boost.git"  # optional override
//! # push = false                                      # optional override
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// GitHub configuration.
    pub github: GitHubConfig,
    /// Local mirror configuration.
    pub mirror: MirrorConfig,
    /// Default update options.
    pub update: UpdateConfig,
    /// Tracked superproject/branch pairs.
    pub superprojects: Vec<SuperProjectConfig>,
}

/// Database configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL.
    /// Defaults to `sqlite://~/.local/state/shepherd/shepherd.db` if not
    /// specified.
    pub url: Option<String>,
}

/// GitHub configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// API token. Can also be set via SHEPHERD_GITHUB_TOKEN.
    pub token: Option<String>,
    /// Organization whose activity feed and repositories are tracked.
    pub org: Option<String>,
}

/// Local mirror configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// On-disk root for bare mirrors. Defaults to `mirror` under the state
    /// directory.
    pub root: Option<PathBuf>,
}

/// Default update options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Whether reconciliation commits are pushed.
    pub push: bool,
    /// Committer identity for generated commits.
    pub commit_name: String,
    pub commit_email: String,
    /// Wall-clock budget per git command, in seconds.
    pub git_timeout_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            push: false,
            commit_name: "Automated Commit".to_string(),
            commit_email: "shepherd@localhost".to_string(),
            git_timeout_secs: 240,
        }
    }
}

/// One tracked superproject/branch pair.
#[derive(Debug, Clone, Deserialize)]
pub struct SuperProjectConfig {
    /// Repository identifier, e.g. `boostorg/boost`.
    pub module: String,
    /// Superproject branch commits go to.
    pub branch: String,
    /// Submodule branch whose pushes are tracked.
    pub submodule_branch: String,
    /// Local working tree.
    pub path: PathBuf,
    /// Clone/push URL override.
    #[serde(default)]
    pub remote_url: Option<String>,
    /// Per-superproject push override.
    #[serde(default)]
    pub push: Option<bool>,
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/shepherd/config.toml)
    /// 3. Local config file (./shepherd.toml)
    /// 4. Environment variables with SHEPHERD_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "shepherd") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        // Local config file (higher priority than XDG)
        let local_config = PathBuf::from("shepherd.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./shepherd.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // SHEPHERD_ prefixed environment variables,
        // e.g., SHEPHERD_DATABASE_URL -> database.url
        builder = builder.add_source(
            Environment::with_prefix("SHEPHERD")
                .separator("_")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory
    /// path.
    pub fn database_url(&self) -> Option<String> {
        self.database.url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("shepherd.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the GitHub token.
    pub fn github_token(&self) -> Option<String> {
        self.github.token.clone()
    }

    /// Get the tracked organization.
    pub fn github_org(&self) -> Option<String> {
        self.github.org.clone()
    }

    /// Get the mirror root, falling back to `mirror` under the state
    /// directory.
    pub fn mirror_root(&self) -> Option<PathBuf> {
        self.mirror
            .root
            .clone()
            .or_else(|| Self::default_state_dir().map(|dir| dir.join("mirror")))
    }

    /// Superprojects selected by branch name; an empty selection means all.
    pub fn selected_superprojects(&self, branches: &[String]) -> Vec<&SuperProjectConfig> {
        self.superprojects
            .iter()
            .filter(|sp| branches.is_empty() || branches.contains(&sp.branch))
            .collect()
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/shepherd` or
    /// `~/.local/state/shepherd`. On macOS/Windows, falls back to the data
    /// directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "shepherd").map(|dirs| {
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.url.is_none());
        assert!(config.github.token.is_none());
        assert!(config.github.org.is_none());
        assert!(!config.update.push);
        assert_eq!(config.update.git_timeout_secs, 240);
        assert!(config.superprojects.is_empty());
    }

    #[test]
    fn test_full_config_parsing() {
        let toml_content = r#"
            [database]
            url = "sqlite:///tmp/test.db"

            [github]
            token = "ghp_test123"
            org = "boostorg"

            [mirror]
            root = "/var/lib/shepherd/mirror"

            [update]
            push = true
            commit_name = "Robot"
            commit_email = "robot@example.com"

            [[superprojects]]
            module = "boostorg/boost"
            branch = "develop"
            submodule_branch = "develop"
            path = "/var/lib/shepherd/super-develop"

            [[superprojects]]
            module = "boostorg/boost"
            branch = "master"
            submodule_branch = "master"
            path = "/var/lib/shepherd/super-master"
            push = false
        "#;

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(
            config.database.url,
            Some("sqlite:///tmp/test.db".to_string())
        );
        assert_eq!(config.github.org, Some("boostorg".to_string()));
        assert!(config.update.push);
        assert_eq!(config.update.commit_name, "Robot");
        assert_eq!(config.superprojects.len(), 2);
        assert_eq!(config.superprojects[1].push, Some(false));
        assert_eq!(
            config.superprojects[0].path,
            PathBuf::from("/var/lib/shepherd/super-develop")
        );
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let config = Config::default();
        let db_url = config.database_url();

        assert!(db_url.is_some());
        let url = db_url.unwrap();
        assert!(url.starts_with("sqlite://"));
        assert!(url.contains("shepherd.db"));
        assert!(url.ends_with("?mode=rwc"));
    }

    #[test]
    fn test_database_url_respects_configured_value() {
        let toml_content = r#"
            [database]
            url = "postgres://localhost/shepherd"
        "#;

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap();

        let config: Config = settings.try_deserialize().unwrap();
        assert_eq!(
            config.database_url(),
            Some("postgres://localhost/shepherd".to_string())
        );
    }

    #[test]
    fn test_selected_superprojects() {
        let toml_content = r#"
            [[superprojects]]
            module = "boostorg/boost"
            branch = "develop"
            submodule_branch = "develop"
            path = "/tmp/develop"

            [[superprojects]]
            module = "boostorg/boost"
            branch = "master"
            submodule_branch = "master"
            path = "/tmp/master"
        "#;

        let settings = ConfigBuilder::builder()
            .add_source(config::File::from_str(toml_content, FileFormat::Toml))
            .build()
            .unwrap();
        let config: Config = settings.try_deserialize().unwrap();

        assert_eq!(config.selected_superprojects(&[]).len(), 2);
        let selected = config.selected_superprojects(&["master".to_string()]);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].branch, "master");
    }

    #[test]
    fn test_mirror_root_default() {
        let config = Config::default();
        let root = config.mirror_root().expect("mirror root");
        assert!(root.ends_with("mirror"));
    }
}
