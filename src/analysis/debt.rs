use crate::analysis::assignment::AssignmentTable;
use crate::error::{EngineError, EngineResult};
use crate::models::aggregate::DebtAggregate;
use crate::models::analysis::ProjectAnalysis;

/// Split the debt of each analysis into new / existing / fixed buckets.
///
/// An issue counts as new at the analysis of its creation date, as fixed at
/// the analysis of its close date, and as existing everywhere in between.
/// Unknown debt adds nothing but is counted per analysis.
pub fn aggregate_debt(table: &AssignmentTable<'_>) -> EngineResult<Vec<(ProjectAnalysis, DebtAggregate)>> {
    let mut out = Vec::with_capacity(table.entries.len());

    for entry in &table.entries {
        let date = entry.analysis.date;
        let mut aggregate = DebtAggregate::default();

        for issue in &entry.issues {
            let is_new = issue.is_new_at(date);
            let is_fixed = issue.is_fixed_at(date);
            if is_new && is_fixed {
                return Err(EngineError::malformed(
                    &issue.project,
                    &issue.key,
                    format!("both created and fixed at analysis {}", entry.analysis.version),
                ));
            }

            if issue.debt.is_unknown() {
                aggregate.unknown_debt_count += 1;
            }
            let minutes = issue.debt.minutes();
            if is_new {
                aggregate.new_debt += minutes;
            } else if is_fixed {
                aggregate.fixed_debt += minutes;
            } else {
                aggregate.existing_debt += minutes;
            }
        }

        if aggregate.unknown_debt_count > 0 {
            log::info!(
                "{} {}: {} live issue(s) with unknown debt counted as zero",
                entry.analysis.project,
                entry.analysis.version,
                aggregate.unknown_debt_count
            );
        }
        out.push((entry.analysis.clone(), aggregate));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::assignment::assign;
    use crate::models::issue::Issue;
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn analyses() -> Vec<ProjectAnalysis> {
        vec![
            ProjectAnalysis::new("P", "1.0", day(2020, 1, 1)),
            ProjectAnalysis::new("P", "2.0", day(2020, 6, 1)),
        ]
    }

    #[test]
    fn issue_spanning_both_versions_is_new_then_fixed() {
        let issues = vec![Issue::open("I", "P", "src/A.java", day(2020, 1, 1))
            .with_debt(60)
            .fixed_on(day(2020, 6, 1))];
        let table = assign(&issues, &analyses()).unwrap();
        let debt = aggregate_debt(&table).unwrap();

        assert_eq!(debt[0].1, DebtAggregate { new_debt: 60, ..Default::default() });
        assert_eq!(debt[1].1, DebtAggregate { fixed_debt: 60, ..Default::default() });
    }

    #[test]
    fn old_open_issue_is_existing_debt_everywhere() {
        let issues = vec![Issue::open("J", "P", "src/B.java", day(2019, 1, 1)).with_debt(10)];
        let table = assign(&issues, &analyses()).unwrap();
        let debt = aggregate_debt(&table).unwrap();

        for (_, aggregate) in debt {
            assert_eq!(aggregate, DebtAggregate { existing_debt: 10, ..Default::default() });
        }
    }

    #[test]
    fn late_issue_contributes_nothing() {
        let issues = vec![Issue::open("K", "P", "src/C.java", day(2020, 7, 1)).with_debt(99)];
        let table = assign(&issues, &analyses()).unwrap();
        let debt = aggregate_debt(&table).unwrap();
        assert!(debt.iter().all(|(_, a)| a.total() == 0));
    }

    #[test]
    fn unknown_debt_is_counted_but_not_summed() {
        let issues = vec![
            Issue::open("U", "P", "src/D.java", day(2020, 1, 1)),
            Issue::open("V", "P", "src/D.java", day(2020, 1, 1)).with_debt(7),
        ];
        let table = assign(&issues, &analyses()).unwrap();
        let debt = aggregate_debt(&table).unwrap();

        assert_eq!(debt[0].1.new_debt, 7);
        assert_eq!(debt[0].1.unknown_debt_count, 1);
        assert_eq!(debt[1].1.existing_debt, 7);
        assert_eq!(debt[1].1.unknown_debt_count, 1);
    }
}
