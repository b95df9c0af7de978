use crate::error::{EngineError, EngineResult};
use crate::models::analysis::ProjectAnalysis;
use crate::models::issue::Issue;

/// Number of versions an issue survived before being fixed: the distance
/// between the analysis at its creation date and the one at its close date.
/// Unresolved issues have a lifetime of 0.
///
/// `project_analyses` must be the issue's project analyses sorted by date.
pub fn issue_lifetime(issue: &Issue, project_analyses: &[ProjectAnalysis]) -> EngineResult<usize> {
    if issue.resolution.is_none() {
        return Ok(0);
    }

    let created = project_analyses
        .iter()
        .position(|analysis| analysis.date == issue.creation_date);
    let closed = issue.close_date.and_then(|close| {
        project_analyses
            .iter()
            .position(|analysis| analysis.date == close)
    });

    match (created, closed) {
        (Some(created), Some(closed)) if created < closed => Ok(closed - created),
        _ => Err(EngineError::malformed(
            &issue.project,
            &issue.key,
            "resolved issue does not open and close on analysis dates in order",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn analyses() -> Vec<ProjectAnalysis> {
        vec![
            ProjectAnalysis::new("P", "1.0", day(2020, 1, 1)),
            ProjectAnalysis::new("P", "1.1", day(2020, 3, 1)),
            ProjectAnalysis::new("P", "2.0", day(2020, 6, 1)),
        ]
    }

    #[test]
    fn counts_versions_until_fix() {
        let issue = Issue::open("I", "P", "src/A.java", day(2020, 1, 1)).fixed_on(day(2020, 6, 1));
        assert_eq!(issue_lifetime(&issue, &analyses()), Ok(2));
    }

    #[test]
    fn unresolved_issue_has_zero_lifetime() {
        let issue = Issue::open("I", "P", "src/A.java", day(2020, 1, 1));
        assert_eq!(issue_lifetime(&issue, &analyses()), Ok(0));
    }

    #[test]
    fn close_date_off_the_analysis_grid_is_malformed() {
        let issue = Issue::open("I", "P", "src/A.java", day(2020, 1, 1)).fixed_on(day(2020, 2, 1));
        assert!(issue_lifetime(&issue, &analyses()).is_err());
    }
}
