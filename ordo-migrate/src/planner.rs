//! Reconciliation of discovered migrations against the ledger.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::{MigrateResult, MigrationError};
use crate::ledger::LedgerEntry;
use crate::source::MigrationArtifact;

/// Ordered set of migrations a run would apply.
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    /// Pending migrations in application order.
    pub pending: Vec<MigrationArtifact>,
    /// Target the plan was bounded by, if any.
    pub target: Option<String>,
}

impl MigrationPlan {
    /// Nothing left to apply.
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    /// Filenames of the pending migrations.
    pub fn filenames(&self) -> Vec<&str> {
        self.pending.iter().map(|a| a.filename.as_str()).collect()
    }

    /// Get a summary of the plan.
    pub fn summary(&self) -> String {
        match (self.pending.len(), &self.target) {
            (0, _) => "No pending migrations".to_string(),
            (n, Some(target)) => format!("{} pending migration(s) up to '{}'", n, target),
            (n, None) => format!("{} pending migration(s)", n),
        }
    }
}

/// Whether `filename` satisfies a target bound.
pub fn matches_target(filename: &str, target: &str) -> bool {
    filename == target || filename.contains(target)
}

/// Compute the ordered pending set.
///
/// Artifacts already in the ledger must still match their recorded checksum;
/// any mismatch aborts with `ChecksumMismatch` and no plan. With a target,
/// accumulation stops right after the first pending artifact matching it.
/// A target that matches nothing leaves the plan unbounded.
pub fn plan(
    artifacts: &[MigrationArtifact],
    entries: &BTreeMap<String, LedgerEntry>,
    target: Option<&str>,
) -> MigrateResult<Vec<MigrationArtifact>> {
    let mut pending = Vec::new();

    for artifact in artifacts {
        if let Some(entry) = entries.get(&artifact.filename) {
            if entry.checksum != artifact.checksum {
                return Err(MigrationError::ChecksumMismatch {
                    filename: artifact.filename.clone(),
                    expected: entry.checksum.clone(),
                    actual: artifact.checksum.clone(),
                });
            }
            continue;
        }

        pending.push(artifact.clone());

        if target.is_some_and(|t| matches_target(&artifact.filename, t)) {
            break;
        }
    }

    Ok(pending)
}

/// Applied/pending status of one migration.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactStatus {
    /// Migration filename.
    pub filename: String,
    /// Checksum of the file on disk.
    pub checksum: String,
    /// Ledger entry, when applied.
    pub applied: Option<LedgerEntry>,
}

impl ArtifactStatus {
    /// Whether the migration has been applied.
    pub fn is_applied(&self) -> bool {
        self.applied.is_some()
    }
}

/// Pair every artifact with its ledger entry, in artifact order.
pub fn classify(
    artifacts: &[MigrationArtifact],
    entries: &BTreeMap<String, LedgerEntry>,
) -> Vec<ArtifactStatus> {
    artifacts
        .iter()
        .map(|a| ArtifactStatus {
            filename: a.filename.clone(),
            checksum: a.checksum.clone(),
            applied: entries.get(&a.filename).cloned(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn artifact(name: &str, body: &str) -> MigrationArtifact {
        MigrationArtifact::new(name, format!("/m/{}", name), body.as_bytes())
    }

    fn applied(a: &MigrationArtifact, batch: u32) -> (String, LedgerEntry) {
        (
            a.filename.clone(),
            LedgerEntry::new(&a.filename, &a.checksum, batch, None),
        )
    }

    fn names(pending: &[MigrationArtifact]) -> Vec<&str> {
        pending.iter().map(|a| a.filename.as_str()).collect()
    }

    fn abc() -> Vec<MigrationArtifact> {
        vec![
            artifact("a.sql", "A"),
            artifact("b.sql", "B"),
            artifact("c.sql", "C"),
        ]
    }

    #[test]
    fn test_all_pending_without_target() {
        let pending = plan(&abc(), &BTreeMap::new(), None).unwrap();
        assert_eq!(names(&pending), vec!["a.sql", "b.sql", "c.sql"]);
    }

    #[test]
    fn test_target_is_inclusive() {
        let pending = plan(&abc(), &BTreeMap::new(), Some("b")).unwrap();
        assert_eq!(names(&pending), vec!["a.sql", "b.sql"]);
    }

    #[test]
    fn test_exact_target() {
        let pending = plan(&abc(), &BTreeMap::new(), Some("a.sql")).unwrap();
        assert_eq!(names(&pending), vec!["a.sql"]);
    }

    #[test]
    fn test_unreachable_target_includes_everything() {
        let pending = plan(&abc(), &BTreeMap::new(), Some("zzz")).unwrap();
        assert_eq!(names(&pending), vec!["a.sql", "b.sql", "c.sql"]);
    }

    #[test]
    fn test_applied_are_skipped() {
        let artifacts = abc();
        let entries: BTreeMap<_, _> = [applied(&artifacts[0], 1)].into_iter().collect();

        let pending = plan(&artifacts, &entries, None).unwrap();

        assert_eq!(names(&pending), vec!["b.sql", "c.sql"]);
    }

    #[test]
    fn test_target_on_applied_artifact_does_not_bound() {
        let artifacts = abc();
        let entries: BTreeMap<_, _> = [applied(&artifacts[0], 1)].into_iter().collect();

        let pending = plan(&artifacts, &entries, Some("a")).unwrap();

        assert_eq!(names(&pending), vec!["b.sql", "c.sql"]);
    }

    #[test]
    fn test_checksum_mismatch_aborts_without_plan() {
        let artifacts = abc();
        let mut entries: BTreeMap<_, _> = [applied(&artifacts[1], 1)].into_iter().collect();
        entries.get_mut("b.sql").unwrap().checksum = "stale".to_string();

        let err = plan(&artifacts, &entries, None).unwrap_err();

        match err {
            MigrationError::ChecksumMismatch {
                filename,
                expected,
                actual,
            } => {
                assert_eq!(filename, "b.sql");
                assert_eq!(expected, "stale");
                assert_eq!(actual, artifacts[1].checksum);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_planning_is_idempotent() {
        let artifacts = abc();
        let entries: BTreeMap<_, _> = [applied(&artifacts[0], 1)].into_iter().collect();

        let first = plan(&artifacts, &entries, Some("c")).unwrap();
        let second = plan(&artifacts, &entries, Some("c")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_classify_mixed_ledger() {
        let artifacts = abc();
        let entries: BTreeMap<_, _> = [applied(&artifacts[0], 1), applied(&artifacts[2], 2)]
            .into_iter()
            .collect();

        let statuses = classify(&artifacts, &entries);

        let summary: Vec<_> = statuses
            .iter()
            .map(|s| (s.filename.as_str(), s.applied.as_ref().map(|e| e.batch)))
            .collect();
        assert_eq!(
            summary,
            vec![("a.sql", Some(1)), ("b.sql", None), ("c.sql", Some(2))]
        );
        assert_eq!(
            statuses[0].applied.as_ref().unwrap().checksum,
            artifacts[0].checksum
        );
    }

    #[test]
    fn test_plan_summary() {
        let plan = MigrationPlan {
            pending: abc(),
            target: Some("c".to_string()),
        };
        assert!(plan.summary().contains("3 pending"));
        assert!(plan.summary().contains("'c'"));
        assert!(MigrationPlan::default().is_up_to_date());
    }
}
