//! Provenance commit message templating.
//!
//! Supports variables like:
//! - `${commitfest.id}` - Commitfest id
//! - `${submission.id}` - Submission id
//! - `${submission.title}` - Submission title
//! - `${submission.url}` - Submission page in the tracking app
//! - `${message.id}` - Message the patches were taken from
//! - `${message.url}` - Archive page of that message
//! - `${authors}` - Author list
//! - `${base.commit}` - Upstream commit the branch is built on
//! - `${base.branch}` - Upstream branch name

use regex::Regex;
use std::sync::LazyLock;

/// Default provenance commit message.
pub const DEFAULT_PROVENANCE_TEMPLATE: &str = "\
[CF ${commitfest.id}/${submission.id}] ${submission.title}

This branch was automatically generated by patchbot.
It is based on patches submitted to the mailing lists and
registered in the Commitfest application.

This branch will be overwritten each time a new patch version is posted to
the email thread, and also periodically to check for bitrot caused by changes
on the ${base.branch} branch.

Commitfest entry: ${submission.url}
Patch(es): ${message.url}
Author(s): ${authors}
Base-Commit: ${base.commit}
";

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

/// Values available to the provenance template.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceContext {
    pub commitfest_id: String,
    pub submission_id: String,
    pub submission_title: String,
    pub submission_url: String,
    pub message_id: String,
    pub message_url: String,
    pub authors: String,
    pub base_commit: String,
    pub base_branch: String,
}

impl ProvenanceContext {
    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<&str> {
        let parts: Vec<&str> = var_name.split('.').collect();

        let value = match parts.as_slice() {
            ["commitfest", "id"] => &self.commitfest_id,
            ["submission", "id"] => &self.submission_id,
            ["submission", "title"] => &self.submission_title,
            ["submission", "url"] => &self.submission_url,
            ["message", "id"] => &self.message_id,
            ["message", "url"] => &self.message_url,
            ["authors"] => &self.authors,
            ["base", "commit"] => &self.base_commit,
            ["base", "branch"] => &self.base_branch,
            _ => return None,
        };
        Some(value.as_str())
    }

    /// Substitute every known `${...}` variable; unknown ones are kept verbatim.
    pub fn render(&self, template: &str) -> String {
        VAR_REGEX
            .replace_all(template, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }
}
