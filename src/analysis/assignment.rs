use crate::error::{EngineError, EngineResult};
use crate::models::analysis::ProjectAnalysis;
use crate::models::issue::Issue;
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// Issues live during one analysis.
#[derive(Debug, Clone)]
pub struct AnalysisIssues<'a> {
    pub analysis: ProjectAnalysis,
    pub issues: Vec<&'a Issue>,
}

/// Analysis → live issues, grouped by project and ordered by date within each project.
#[derive(Debug, Clone, Default)]
pub struct AssignmentTable<'a> {
    pub entries: Vec<AnalysisIssues<'a>>,
    /// Issues whose live window intersects no analysis of their project.
    pub unassigned: Vec<&'a Issue>,
}

impl<'a> AssignmentTable<'a> {
    pub fn issues_for(&self, analysis: &ProjectAnalysis) -> Option<&[&'a Issue]> {
        self.entries
            .iter()
            .find(|entry| &entry.analysis == analysis)
            .map(|entry| entry.issues.as_slice())
    }

    pub fn project_entries<'t>(&'t self, project: &'t str) -> impl Iterator<Item = &'t AnalysisIssues<'a>> + 't {
        self.entries
            .iter()
            .filter(move |entry| entry.analysis.project == project)
    }

    /// Total (issue, analysis) pairs.
    pub fn assignment_count(&self) -> usize {
        self.entries.iter().map(|entry| entry.issues.len()).sum()
    }
}

/// Assign every issue to each analysis of its project during which it was live:
/// `creation_date <= analysis.date <= close_date` (open issues never end).
///
/// Analyses may arrive in any order and any project mix. Two analyses of the
/// same project on the same date, or an issue created and closed on the same
/// date, are malformed input and abort the batch.
pub fn assign<'a>(issues: &'a [Issue], analyses: &[ProjectAnalysis]) -> EngineResult<AssignmentTable<'a>> {
    let mut by_project: BTreeMap<&str, Vec<&ProjectAnalysis>> = BTreeMap::new();
    for analysis in analyses {
        by_project.entry(analysis.project.as_str()).or_default().push(analysis);
    }

    let mut entries = Vec::with_capacity(analyses.len());
    let mut ranges: HashMap<&str, Range<usize>> = HashMap::new();
    for (project, mut project_analyses) in by_project {
        project_analyses.sort_by_key(|analysis| analysis.date);
        for pair in project_analyses.windows(2) {
            if pair[0].date == pair[1].date {
                return Err(EngineError::malformed(
                    project,
                    &pair[1].version,
                    format!("shares analysis date {} with version {}", pair[1].date, pair[0].version),
                ));
            }
        }

        let start = entries.len();
        entries.extend(project_analyses.into_iter().map(|analysis| AnalysisIssues {
            analysis: analysis.clone(),
            issues: Vec::new(),
        }));
        ranges.insert(project, start..entries.len());
    }

    let mut unassigned = Vec::new();
    for issue in issues {
        issue.validate()?;

        let Some(range) = ranges.get(issue.project.as_str()).cloned() else {
            log::warn!(
                "Issue {} of project {} has no analyses to be assigned to",
                issue.key,
                issue.project
            );
            unassigned.push(issue);
            continue;
        };

        // Analyses are date-sorted: skip those before creation, stop after close.
        let project_slice = &mut entries[range];
        let first = project_slice.partition_point(|entry| entry.analysis.date < issue.creation_date);
        let mut assigned = false;
        for entry in &mut project_slice[first..] {
            if !issue.is_live_at(entry.analysis.date) {
                break;
            }
            entry.issues.push(issue);
            assigned = true;
        }

        if !assigned {
            log::warn!(
                "Issue {} of project {} (created {}, closed {}) is live at no analysis; excluded from the report",
                issue.key,
                issue.project,
                issue.creation_date,
                issue
                    .close_date
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "never".to_string()),
            );
            unassigned.push(issue);
        }
    }

    if !unassigned.is_empty() {
        log::warn!("{} issue(s) could not be assigned to any analysis", unassigned.len());
    }

    let table = AssignmentTable { entries, unassigned };
    log::debug!(
        "Assigned {} issues to {} analyses ({} pairs)",
        issues.len(),
        table.entries.len(),
        table.assignment_count()
    );
    Ok(table)
}
