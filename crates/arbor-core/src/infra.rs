//! Infra vs. user-content path classification
//!
//! Infra files are tooling/bookkeeping artifacts the merge flow may stage,
//! discard, and restore on the user's behalf. Classification is by explicit
//! path rules only; anything unmatched is user content and therefore blocks
//! a merge (fail closed).

/// Directory prefixes that are always infra
const INFRA_PREFIXES: &[&str] = &[".beads/", ".claude/", "agents/"];

/// Exact repo-root-relative paths that are always infra
const INFRA_FILES: &[&str] = &[
    ".arbor/config.toml",
    ".arbor/implementation-log.md",
    "CLAUDE.md",
];

/// Path-prefix rules for infra classification
#[derive(Debug, Clone, Default)]
pub struct InfraRules {
    /// Additional prefixes from project config
    extra_prefixes: Vec<String>,
}

impl InfraRules {
    pub fn new(extra_prefixes: &[String]) -> Self {
        Self {
            extra_prefixes: extra_prefixes.to_vec(),
        }
    }

    /// Classify one repo-root-relative path
    pub fn is_infra(&self, path: &str) -> bool {
        // plan documents under .arbor/ are user content; only the named
        // bookkeeping files there are infra
        if path.starts_with(".arbor/") {
            return INFRA_FILES.contains(&path);
        }
        if INFRA_FILES.contains(&path) {
            return true;
        }
        if INFRA_PREFIXES.iter().any(|p| path.starts_with(p)) {
            return true;
        }
        self.extra_prefixes.iter().any(|p| {
            if p.ends_with('/') {
                path.starts_with(p.as_str())
            } else {
                path == p
            }
        })
    }

    /// Split paths into (infra, user) lists, preserving order
    pub fn partition(&self, paths: &[String]) -> (Vec<String>, Vec<String>) {
        let mut infra = Vec::new();
        let mut user = Vec::new();
        for path in paths {
            if self.is_infra(path) {
                infra.push(path.clone());
            } else {
                user.push(path.clone());
            }
        }
        (infra, user)
    }
}
