//! Minimal plan-outline reader
//!
//! Extracts just enough from a plan document to drive session creation: the
//! slug, a title, and the ordered step headings with their anchors. Full
//! document validation is a separate concern and not done here.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::ArborError;

/// A step heading within a plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Anchor without the leading '#', e.g. "step-0"
    pub anchor: String,
    pub title: String,
}

/// The outline of a plan document
#[derive(Debug, Clone)]
pub struct PlanOutline {
    /// Short name derived from the filename
    pub slug: String,
    /// First heading in the document, or the slug when none exists
    pub title: String,
    /// Ordered execution steps
    pub steps: Vec<PlanStep>,
}

// "#### Step 0: Scaffolding {#step-0}" and similar step headings
static STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{3,4}\s+Step\s+\d+:\s*(?P<title>.+?)\s*\{#(?P<anchor>[a-z0-9][a-z0-9-]*)\}\s*$")
        .unwrap()
});

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#{1,2}\s+(?P<title>[^{\n]+)").unwrap());

/// Derive the plan slug from its path
///
/// Strips a "plan-" prefix from the file stem:
/// - .arbor/plan-auth.md -> auth
/// - .arbor/my-feature.md -> my-feature
pub fn derive_plan_slug(plan_path: &Path) -> String {
    let stem = plan_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown");
    stem.strip_prefix("plan-").unwrap_or(stem).to_string()
}

/// Read a plan document's outline from disk
pub fn read_outline(repo_root: &Path, plan_path: &Path) -> Result<PlanOutline, ArborError> {
    let full_path = if plan_path.is_absolute() {
        plan_path.to_path_buf()
    } else {
        repo_root.join(plan_path)
    };
    if !full_path.exists() {
        return Err(ArborError::FileNotFound(full_path.display().to_string()));
    }
    let content = std::fs::read_to_string(&full_path)?;
    Ok(parse_outline(plan_path, &content))
}

/// Parse an outline from document content
pub fn parse_outline(plan_path: &Path, content: &str) -> PlanOutline {
    let slug = derive_plan_slug(plan_path);

    let title = TITLE_RE
        .captures(content)
        .map(|c| c["title"].trim().to_string())
        .unwrap_or_else(|| slug.clone());

    let steps = STEP_RE
        .captures_iter(content)
        .map(|c| PlanStep {
            anchor: c["anchor"].to_string(),
            title: c["title"].trim().to_string(),
        })
        .collect();

    PlanOutline { slug, title, steps }
}
