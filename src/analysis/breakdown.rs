use crate::models::aggregate::ComponentDebt;
use crate::models::issue::Issue;
use crate::models::ledger::DebtLedger;
use chrono::NaiveDate;
use std::hash::Hash;

/// Sum `value_fn` per key. An issue mapped to several keys contributes an even
/// share (`value / keys`) to each one; an issue with no keys contributes nothing.
pub fn aggregate_by_key<'a, I, K, FK, FV>(issues: I, key_fn: FK, value_fn: FV) -> DebtLedger<K>
where
    I: IntoIterator<Item = &'a Issue>,
    K: Eq + Hash + Clone,
    FK: Fn(&Issue) -> Vec<K>,
    FV: Fn(&Issue) -> f64,
{
    let mut ledger = DebtLedger::new();
    for issue in issues {
        let keys = key_fn(issue);
        if keys.is_empty() {
            continue;
        }
        let share = value_fn(issue) / keys.len() as f64;
        for key in keys {
            ledger.add(key, share);
        }
    }
    ledger
}

/// Live issues of an analysis minus those fixed at it.
pub fn outstanding<'a>(issues: &'a [&'a Issue], date: NaiveDate) -> impl Iterator<Item = &'a Issue> + 'a {
    issues
        .iter()
        .copied()
        .filter(move |issue| !issue.is_fixed_at(date))
}

fn debt_of(issue: &Issue) -> f64 {
    issue.debt.minutes() as f64
}

/// Debt per tag. Empty tags are dropped before the split, so an issue's
/// share per tag is `debt / n` with `n` its count of non-empty tags.
pub fn tag_debt<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> DebtLedger<String> {
    aggregate_by_key(
        issues,
        |issue| {
            issue
                .tags
                .iter()
                .filter(|tag| !tag.is_empty())
                .cloned()
                .collect()
        },
        debt_of,
    )
}

pub fn rule_debt<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> DebtLedger<String> {
    aggregate_by_key(issues, |issue| vec![issue.rule.clone()], debt_of)
}

pub fn package_debt<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> DebtLedger<String> {
    aggregate_by_key(issues, |issue| vec![package_of(&issue.component).to_string()], debt_of)
}

/// Directory of a source file relative to its `src/` root, e.g.
/// `src/freemind/main/Tools.java` → `freemind/main`. Files directly under
/// the root belong to the empty (default) package.
pub fn package_of(component: &str) -> &str {
    let relative = if let Some(rest) = component.strip_prefix("src/") {
        rest
    } else if let Some(idx) = component.find("/src/") {
        &component[idx + 5..]
    } else {
        component
    };

    match relative.rfind('/') {
        Some(idx) => &relative[..idx],
        None => "",
    }
}

/// Per-file debt with severity and type breakdowns, ranked descending by total.
/// Ties keep the order in which files were first seen.
pub fn component_debt<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Vec<(String, ComponentDebt)> {
    let mut components: Vec<(String, ComponentDebt)> = Vec::new();
    let mut index = std::collections::HashMap::new();

    for issue in issues {
        let slot = *index.entry(issue.component.clone()).or_insert_with(|| {
            components.push((issue.component.clone(), ComponentDebt::default()));
            components.len() - 1
        });
        components[slot]
            .1
            .add(issue.severity, issue.issue_type, issue.debt.minutes());
    }

    components.sort_by(|a, b| b.1.total.cmp(&a.1.total));
    components
}

/// Order keys by their value summed over several ledgers (descending, stable).
pub fn rank_keys_across<'a, K>(ledgers: impl IntoIterator<Item = &'a DebtLedger<K>>) -> Vec<K>
where
    K: Eq + Hash + Clone + 'a,
{
    let mut totals = DebtLedger::new();
    for ledger in ledgers {
        totals.merge(ledger);
    }
    totals.ranked().into_iter().map(|(key, _)| key).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::issue::{IssueType, Severity};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn issue(key: &str, component: &str, debt: u64) -> Issue {
        Issue::open(key, "P", component, day(2020, 1, 1)).with_debt(debt)
    }

    #[test]
    fn multi_tag_debt_is_split_evenly() {
        let issues = vec![issue("a", "src/A.java", 90).with_tags(["a", "b", "c"])];
        let ledger = tag_debt(&issues);
        assert_eq!(ledger.get(&"a".to_string()), 30.0);
        assert_eq!(ledger.get(&"b".to_string()), 30.0);
        assert_eq!(ledger.get(&"c".to_string()), 30.0);
    }

    #[test]
    fn fractional_tag_shares_are_kept() {
        let issues = vec![
            issue("a", "src/A.java", 10).with_tags(["security", "api-design", "cwe"]),
            issue("b", "src/A.java", 5).with_tags(["security"]),
        ];
        let ledger = tag_debt(&issues);
        assert!((ledger.get(&"security".to_string()) - (10.0 / 3.0 + 5.0)).abs() < 1e-9);
        assert!((ledger.total() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn untagged_issues_do_not_reach_tag_ledger() {
        let issues = vec![issue("a", "src/A.java", 10)];
        assert!(tag_debt(&issues).is_empty());
    }

    #[test]
    fn empty_tags_do_not_dilute_the_split() {
        let issues = vec![issue("a", "src/A.java", 90).with_tags(["a", "", "b"])];
        let ledger = tag_debt(&issues);
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.get(&"a".to_string()), 45.0);
        assert_eq!(ledger.get(&"b".to_string()), 45.0);
        assert!(!ledger.contains(&String::new()));
    }

    #[test]
    fn rule_debt_sums_per_rule() {
        let issues = vec![
            issue("a", "src/A.java", 10).with_rule("squid:S1192"),
            issue("b", "src/B.java", 5).with_rule("squid:S1192"),
            issue("c", "src/B.java", 1).with_rule("squid:S106"),
        ];
        let ledger = rule_debt(&issues);
        assert_eq!(ledger.get(&"squid:S1192".to_string()), 15.0);
        assert_eq!(ledger.get(&"squid:S106".to_string()), 1.0);
    }

    #[test]
    fn package_is_directory_below_src() {
        assert_eq!(package_of("src/freemind/main/Tools.java"), "freemind/main");
        assert_eq!(package_of("modules/core/src/org/gjt/sp/jedit/View.java"), "org/gjt/sp/jedit");
        assert_eq!(package_of("src/Main.java"), "");
        assert_eq!(package_of("lib/util/Io.java"), "lib/util");
    }

    #[test]
    fn package_debt_groups_files() {
        let issues = vec![
            issue("a", "src/app/A.java", 10),
            issue("b", "src/app/B.java", 5),
            issue("c", "src/app/io/C.java", 1),
        ];
        let ledger = package_debt(&issues);
        assert_eq!(ledger.get(&"app".to_string()), 15.0);
        assert_eq!(ledger.get(&"app/io".to_string()), 1.0);
    }

    #[test]
    fn outstanding_skips_issues_fixed_at_the_analysis() {
        let fixed = issue("f", "src/A.java", 10).fixed_on(day(2020, 6, 1));
        let open = issue("o", "src/A.java", 3);
        let live = vec![&fixed, &open];

        let keys: Vec<&str> = outstanding(&live, day(2020, 6, 1)).map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["o"]);
    }

    #[test]
    fn components_are_ranked_with_breakdowns() {
        let issues = vec![
            issue("a", "src/A.java", 10).with_severity(Severity::Blocker).with_type(IssueType::Bug),
            issue("b", "src/B.java", 30),
            issue("c", "src/A.java", 5).with_severity(Severity::Info),
            Issue::open("d", "P", "src/A.java", day(2020, 1, 1)),
        ];
        let ranked = component_debt(&issues);

        assert_eq!(ranked[0].0, "src/B.java");
        assert_eq!(ranked[1].0, "src/A.java");
        let a = ranked[1].1;
        assert_eq!(a.total, 15);
        assert_eq!(a.by_severity.blocker, 10);
        assert_eq!(a.by_severity.info, 5);
        assert_eq!(a.by_type.bug, 10);
        assert_eq!(a.by_type.code_smell, 5);
        assert!(ranked.iter().all(|(_, debt)| debt.is_consistent()));
    }

    #[test]
    fn keys_ranked_over_all_versions() {
        let mut v1 = DebtLedger::new();
        v1.add("x".to_string(), 1.0);
        v1.add("y".to_string(), 5.0);
        let mut v2 = DebtLedger::new();
        v2.add("x".to_string(), 10.0);
        v2.add("z".to_string(), 2.0);

        assert_eq!(rank_keys_across([&v1, &v2]), vec!["x", "y", "z"]);
    }
}
