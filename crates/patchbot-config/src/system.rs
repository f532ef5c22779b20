//! System configuration parsing.

use crate::template::DEFAULT_PROVENANCE_TEMPLATE;
use crate::{ConfigError, ConfigResult};
use kdl::{KdlDocument, KdlNode};
use patchbot_core::SubmissionKey;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// System-wide configuration.
///
/// Built once at startup and shared read-only by the scheduler, the patch
/// pipeline and the publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchbotConfig {
    pub scheduler: SchedulerConfig,
    pub http: HttpConfig,
    pub commitfest: CommitfestConfig,
    pub git: GitConfig,
    pub paths: PathsConfig,
    /// PostgreSQL connection string; the CLI's `DATABASE_URL` wins over it.
    pub database_url: Option<String>,
    /// Message template of the provenance commit.
    pub provenance_template: String,
}

impl Default for PatchbotConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            http: HttpConfig::default(),
            commitfest: CommitfestConfig::default(),
            git: GitConfig::default(),
            paths: PathsConfig::default(),
            database_url: None,
            provenance_template: DEFAULT_PROVENANCE_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of pushed branches still being built downstream.
    pub concurrency: u32,
    /// Hours in which every tracked submission should be rebuilt once.
    pub cycle_hours: f64,
    /// Claims older than this are considered abandoned.
    pub claim_timeout: Duration,
    /// Delay between ticks in `run` mode.
    pub tick_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            cycle_hours: 48.0,
            claim_timeout: Duration::from_secs(60 * 60),
            tick_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Sleep before every request, to stay polite to the remote sites.
    pub pace: Duration,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("patchbot/{}", env!("CARGO_PKG_VERSION")),
            pace: Duration::from_secs(1),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitfestConfig {
    /// Base URL of the patch-tracking app.
    pub url: String,
    /// Base URL of the mailing list archive.
    pub archive_url: String,
}

impl Default for CommitfestConfig {
    fn default() -> Self {
        Self {
            url: "https://commitfest.postgresql.org".to_string(),
            archive_url: "https://www.postgresql.org".to_string(),
        }
    }
}

impl CommitfestConfig {
    /// Page of one submission in the tracking app.
    pub fn submission_url(&self, key: &SubmissionKey) -> String {
        format!(
            "{}/{}/{}/",
            self.url.trim_end_matches('/'),
            key.commitfest_id,
            key.submission_id
        )
    }

    /// Archive page of one message.
    pub fn message_url(&self, message_id: &str) -> String {
        format!(
            "{}/message-id/{}",
            self.archive_url.trim_end_matches('/'),
            urlencoding::encode(message_id)
        )
    }

    /// Flattened archive view of the thread containing `message_id`.
    pub fn thread_url(&self, message_id: &str) -> String {
        format!(
            "{}/message-id/flat/{}",
            self.archive_url.trim_end_matches('/'),
            urlencoding::encode(message_id)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Local checkout of the upstream repository, mutated in place.
    pub repo: PathBuf,
    /// Upstream branch every submission branch is rebuilt from.
    pub baseline_branch: String,
    /// Pull the baseline branch before every attempt.
    pub pull: bool,
    /// Remote to force-push to; `None` disables pushing.
    pub remote: Option<String>,
    /// Value of `GIT_SSH_COMMAND` when pushing.
    pub ssh_command: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            repo: PathBuf::from("upstream"),
            baseline_branch: "master".to_string(),
            pull: true,
            remote: None,
            ssh_command: "ssh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the per-submission working directories.
    pub patches: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            patches: PathBuf::from("patches"),
        }
    }
}

/// Read and parse a configuration file.
pub fn load_config(path: &Path) -> ConfigResult<PatchbotConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse system configuration from KDL text.
///
/// Every setting is optional; anything not given keeps its default.
pub fn parse_config(kdl: &str) -> ConfigResult<PatchbotConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = PatchbotConfig::default();

    for node in doc.nodes() {
        match node.name().value() {
            "scheduler" => parse_scheduler(node, &mut config.scheduler)?,
            "http" => parse_http(node, &mut config.http)?,
            "commitfest" => parse_commitfest(node, &mut config.commitfest)?,
            "git" => parse_git(node, &mut config.git)?,
            "paths" => {
                for child in child_nodes(node) {
                    if child.name().value() == "patches" {
                        config.paths.patches = PathBuf::from(required_string(child, "paths.patches")?);
                    }
                }
            }
            "database" => {
                for child in child_nodes(node) {
                    if child.name().value() == "url" {
                        config.database_url = Some(required_string(child, "database.url")?);
                    }
                }
            }
            "provenance" => {
                for child in child_nodes(node) {
                    if child.name().value() == "template" {
                        config.provenance_template =
                            required_string(child, "provenance.template")?;
                    }
                }
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_scheduler(node: &KdlNode, scheduler: &mut SchedulerConfig) -> ConfigResult<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "concurrency" => {
                let value = required_integer(child, "scheduler.concurrency")?;
                let concurrency = u32::try_from(value)
                    .map_err(|_| invalid("scheduler.concurrency", "out of range"))?;
                if concurrency == 0 {
                    return Err(invalid("scheduler.concurrency", "must be at least 1"));
                }
                scheduler.concurrency = concurrency;
            }
            "cycle-hours" => {
                let hours = required_number(child, "scheduler.cycle-hours")?;
                if !(hours > 0.0) {
                    return Err(invalid("scheduler.cycle-hours", "must be positive"));
                }
                scheduler.cycle_hours = hours;
            }
            "claim-timeout-minutes" => {
                let minutes = required_seconds(child, "scheduler.claim-timeout-minutes")?;
                let secs = minutes
                    .checked_mul(60)
                    .ok_or_else(|| invalid("scheduler.claim-timeout-minutes", "out of range"))?;
                scheduler.claim_timeout = Duration::from_secs(secs);
            }
            "tick-interval-secs" => {
                let secs = required_seconds(child, "scheduler.tick-interval-secs")?;
                scheduler.tick_interval = Duration::from_secs(secs);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_http(node: &KdlNode, http: &mut HttpConfig) -> ConfigResult<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "user-agent" => http.user_agent = required_string(child, "http.user-agent")?,
            "pace-ms" => {
                http.pace = Duration::from_millis(required_seconds(child, "http.pace-ms")?);
            }
            "timeout-secs" => {
                http.timeout = Duration::from_secs(required_seconds(child, "http.timeout-secs")?);
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_commitfest(node: &KdlNode, commitfest: &mut CommitfestConfig) -> ConfigResult<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "url" => commitfest.url = required_string(child, "commitfest.url")?,
            "archive-url" => {
                commitfest.archive_url = required_string(child, "commitfest.archive-url")?
            }
            _ => {}
        }
    }
    Ok(())
}

fn parse_git(node: &KdlNode, git: &mut GitConfig) -> ConfigResult<()> {
    for child in child_nodes(node) {
        match child.name().value() {
            "repo" => git.repo = PathBuf::from(required_string(child, "git.repo")?),
            "baseline-branch" => {
                git.baseline_branch = required_string(child, "git.baseline-branch")?
            }
            "pull" => {
                git.pull = get_first_arg(child)
                    .and_then(|v| v.as_bool())
                    .ok_or_else(|| invalid("git.pull", "expected #true or #false"))?;
            }
            "remote" => git.remote = Some(required_string(child, "git.remote")?),
            "ssh-command" => git.ssh_command = required_string(child, "git.ssh-command")?,
            _ => {}
        }
    }
    Ok(())
}

// Helper functions for extracting values from KDL nodes

fn child_nodes(node: &KdlNode) -> &[KdlNode] {
    node.children().map(|c| c.nodes()).unwrap_or_default()
}

fn get_first_arg(node: &KdlNode) -> Option<&kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .map(|e| e.value())
}

fn required_string(node: &KdlNode, field: &str) -> ConfigResult<String> {
    match get_first_arg(node) {
        Some(value) => value
            .as_string()
            .map(|s| s.to_string())
            .ok_or_else(|| invalid(field, "expected a string")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn required_integer(node: &KdlNode, field: &str) -> ConfigResult<i128> {
    match get_first_arg(node) {
        Some(value) => value
            .as_integer()
            .ok_or_else(|| invalid(field, "expected an integer")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn required_seconds(node: &KdlNode, field: &str) -> ConfigResult<u64> {
    let value = required_integer(node, field)?;
    u64::try_from(value).map_err(|_| invalid(field, "must not be negative"))
}

fn required_number(node: &KdlNode, field: &str) -> ConfigResult<f64> {
    match get_first_arg(node) {
        Some(value) => value
            .as_float()
            .or_else(|| value.as_integer().map(|i| i as f64))
            .ok_or_else(|| invalid(field, "expected a number")),
        None => Err(ConfigError::MissingField(field.to_string())),
    }
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.scheduler.concurrency, 1);
        assert_eq!(config.scheduler.cycle_hours, 48.0);
        assert_eq!(config.git.baseline_branch, "master");
        assert!(config.git.remote.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            scheduler {
                concurrency 3
                cycle-hours 24.0
                claim-timeout-minutes 30
                tick-interval-secs 15
            }
            http {
                user-agent "test agent"
                pace-ms 250
                timeout-secs 5
            }
            commitfest {
                url "https://cf.example.org"
                archive-url "https://lists.example.org"
            }
            git {
                repo "/srv/upstream"
                baseline-branch "main"
                pull #false
                remote "github"
                ssh-command "ssh -i key"
            }
            paths {
                patches "/srv/patches"
            }
            database {
                url "postgres://localhost/patchbot"
            }
        "#;

        let config = parse_config(kdl).unwrap();
        assert_eq!(config.scheduler.concurrency, 3);
        assert_eq!(config.scheduler.cycle_hours, 24.0);
        assert_eq!(config.scheduler.claim_timeout, Duration::from_secs(1800));
        assert_eq!(config.scheduler.tick_interval, Duration::from_secs(15));
        assert_eq!(config.http.user_agent, "test agent");
        assert_eq!(config.http.pace, Duration::from_millis(250));
        assert_eq!(config.http.timeout, Duration::from_secs(5));
        assert_eq!(config.commitfest.url, "https://cf.example.org");
        assert_eq!(config.git.repo, PathBuf::from("/srv/upstream"));
        assert_eq!(config.git.baseline_branch, "main");
        assert!(!config.git.pull);
        assert_eq!(config.git.remote.as_deref(), Some("github"));
        assert_eq!(config.git.ssh_command, "ssh -i key");
        assert_eq!(config.paths.patches, PathBuf::from("/srv/patches"));
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/patchbot")
        );
    }

    #[test]
    fn test_integer_cycle_hours_accepted() {
        let config = parse_config("scheduler { cycle-hours 12; }").unwrap();
        assert_eq!(config.scheduler.cycle_hours, 12.0);
    }

    #[test]
    fn test_reject_non_positive_cycle() {
        let result = parse_config("scheduler { cycle-hours 0.0; }");
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_reject_wrong_type() {
        let result = parse_config(r#"scheduler { concurrency "two"; }"#);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_reject_zero_concurrency() {
        let result = parse_config("scheduler { concurrency 0; }");
        match result.unwrap_err() {
            ConfigError::InvalidValue { field, .. } => assert_eq!(field, "scheduler.concurrency"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reject_claim_timeout_overflow() {
        let result = parse_config("scheduler { claim-timeout-minutes 1000000000000000000; }");
        match result.unwrap_err() {
            ConfigError::InvalidValue { field, .. } => {
                assert_eq!(field, "scheduler.claim-timeout-minutes")
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let config = parse_config("scheduler { claim-timeout-minutes 90; }").unwrap();
        assert_eq!(config.scheduler.claim_timeout, Duration::from_secs(90 * 60));
    }

    #[test]
    fn test_missing_value() {
        let result = parse_config("git { remote; }");
        assert!(matches!(result.unwrap_err(), ConfigError::MissingField(_)));
    }

    #[test]
    fn test_urls() {
        let config = CommitfestConfig::default();
        let key = SubmissionKey::new(38, 3633);
        assert_eq!(
            config.submission_url(&key),
            "https://commitfest.postgresql.org/38/3633/"
        );
        assert_eq!(
            config.message_url("abc@mail.gmail.com"),
            "https://www.postgresql.org/message-id/abc%40mail.gmail.com"
        );
    }
}
