use crate::error::{Result, StewardError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const STEWARD_DIR: &str = ".steward";
pub const SPECS_DIR: &str = ".steward/specs";
pub const COMPLETED_SUBDIR: &str = "completed";
pub const ABANDONED_SUBDIR: &str = "abandoned";
pub const TASKS_SUBDIR: &str = "tasks";
pub const LOGS_SUBDIR: &str = "logs";

pub const CONFIG_FILE: &str = ".steward/config.yaml";
pub const SPEC_FILE: &str = "spec.md";

/// Which bucket of the on-disk store a spec record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Active,
    Completed,
    Abandoned,
}

impl Partition {
    pub fn dir(&self, root: &Path) -> PathBuf {
        let base = root.join(SPECS_DIR);
        match self {
            Partition::Active => base,
            Partition::Completed => base.join(COMPLETED_SUBDIR),
            Partition::Abandoned => base.join(ABANDONED_SUBDIR),
        }
    }

    pub fn all() -> [Partition; 3] {
        [Partition::Active, Partition::Completed, Partition::Abandoned]
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn steward_dir(root: &Path) -> PathBuf {
    root.join(STEWARD_DIR)
}

pub fn specs_dir(root: &Path) -> PathBuf {
    root.join(SPECS_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn spec_dir(root: &Path, partition: Partition, slug: &str) -> PathBuf {
    partition.dir(root).join(slug)
}

pub fn spec_file(root: &Path, partition: Partition, slug: &str) -> PathBuf {
    spec_dir(root, partition, slug).join(SPEC_FILE)
}

pub fn tasks_dir(root: &Path, partition: Partition, slug: &str) -> PathBuf {
    spec_dir(root, partition, slug).join(TASKS_SUBDIR)
}

pub fn logs_dir(root: &Path, partition: Partition, slug: &str) -> PathBuf {
    spec_dir(root, partition, slug).join(LOGS_SUBDIR)
}

// ---------------------------------------------------------------------------
// Slugs
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();
static NON_SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_]*$").unwrap())
}

fn non_slug_re() -> &'static Regex {
    NON_SLUG_RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").unwrap())
}

/// Derive a slug from a free-form title: lowercase, runs of non-alphanumerics
/// collapse to a single underscore, leading and trailing separators trimmed.
pub fn slugify(title: &str) -> String {
    let lowered = title.to_lowercase();
    let replaced = non_slug_re().replace_all(&lowered, "_");
    replaced.trim_matches('_').to_string()
}

pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(StewardError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Add User Auth"), "add_user_auth");
        assert_eq!(slugify("fix: flaky CI!!"), "fix_flaky_ci");
        assert_eq!(slugify("  spaced   out  "), "spaced_out");
        assert_eq!(slugify("already_a_slug"), "already_a_slug");
    }

    #[test]
    fn slugify_is_idempotent() {
        for title in ["Add User Auth", "v2.0 Release", "a--b__c"] {
            let once = slugify(title);
            assert_eq!(slugify(&once), once);
        }
    }

    #[test]
    fn valid_slugs() {
        for slug in ["auth_login", "a", "my_spec_123", "x1"] {
            validate_slug(slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in ["", "_leading", "has spaces", "UPPER", "a-b"] {
            assert!(validate_slug(slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn partition_dirs() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            spec_file(root, Partition::Active, "auth"),
            PathBuf::from("/tmp/proj/.steward/specs/auth/spec.md")
        );
        assert_eq!(
            spec_file(root, Partition::Completed, "auth"),
            PathBuf::from("/tmp/proj/.steward/specs/completed/auth/spec.md")
        );
        assert_eq!(
            tasks_dir(root, Partition::Abandoned, "auth"),
            PathBuf::from("/tmp/proj/.steward/specs/abandoned/auth/tasks")
        );
    }
}
