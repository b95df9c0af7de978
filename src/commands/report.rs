use crate::analysis::assignment::{assign, AnalysisIssues, AssignmentTable};
use crate::analysis::breakdown::{
    component_debt, outstanding, package_debt, package_of, rank_keys_across, rule_debt, tag_debt,
};
use crate::analysis::debt::aggregate_debt;
use crate::analysis::lifetime::issue_lifetime;
use crate::analysis::quintiles::{partition_into_quintiles, rank_descending};
use crate::analysis::stats::pearson;
use crate::commands::settings::EffectiveSettings;
use crate::commands::sonar::{history_value, measure_value, IssueQuery, MeasuresHistory, SonarClient};
use crate::error::EngineResult;
use crate::models::aggregate::{SeverityBreakdown, TypeBreakdown};
use crate::models::analysis::ProjectAnalysis;
use crate::models::issue::Issue;
use crate::models::report::*;
use chrono::NaiveDate;
use std::collections::HashMap;

/// File LOC per analysis date, as measured on the single-version server.
/// Keyed by date since a version label can repeat across analyses.
pub type VersionLoc = HashMap<NaiveDate, HashMap<String, u64>>;

/// Size and debt of one file of one application version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeasure {
    /// Full component key, e.g. `FreeMind.0.9.0:src/freemind/main/Tools.java`.
    pub key: String,
    /// `None` when the server had no `sqale_index` for the file.
    pub debt: Option<u64>,
    pub loc: u64,
}

/// Everything fetched from the history server for the issue-based reports.
#[derive(Debug, Clone, Default)]
pub struct ProjectRecords {
    pub projects: Vec<String>,
    pub analyses: Vec<ProjectAnalysis>,
    pub issues: Vec<Issue>,
}

pub fn build_version_debt_history(
    records: &ProjectRecords,
    histories: &HashMap<String, MeasuresHistory>,
    measures: &[String],
) -> EngineResult<Vec<ProjectDebtHistory>> {
    let table = assign(&records.issues, &records.analyses)?;
    let debts = aggregate_debt(&table)?;

    let out = records
        .projects
        .iter()
        .map(|project| {
            let history = histories.get(project);
            let project_analyses: Vec<ProjectAnalysis> =
                table.project_entries(project).map(|entry| entry.analysis.clone()).collect();
            let rows = debts
                .iter()
                .filter(|(analysis, _)| &analysis.project == project)
                .map(|(analysis, debt)| VersionDebtRow {
                    analysis: analysis.clone(),
                    debt: *debt,
                    mean_fix_lifetime: table
                        .issues_for(analysis)
                        .and_then(|issues| mean_fix_lifetime(issues, analysis, &project_analyses)),
                    measures: measures
                        .iter()
                        .map(|metric| {
                            let value = history.and_then(|h| history_value(h, metric, analysis.date));
                            (metric.clone(), value)
                        })
                        .collect(),
                })
                .collect();
            ProjectDebtHistory {
                project: project.clone(),
                rows,
            }
        })
        .collect();

    Ok(out)
}

fn mean_fix_lifetime(issues: &[&Issue], analysis: &ProjectAnalysis, project_analyses: &[ProjectAnalysis]) -> Option<f64> {
    let lifetimes: Vec<usize> = issues
        .iter()
        .filter(|issue| issue.is_fixed_at(analysis.date))
        .filter_map(|issue| match issue_lifetime(issue, project_analyses) {
            Ok(lifetime) => Some(lifetime),
            Err(e) => {
                log::warn!("Skipping lifetime: {e}");
                None
            }
        })
        .collect();

    if lifetimes.is_empty() {
        return None;
    }
    Some(lifetimes.iter().sum::<usize>() as f64 / lifetimes.len() as f64)
}

/// Debt characterization of one analysis. Issues fixed at the analysis are
/// left out: they no longer weigh on that version.
pub fn characterize_version(entry: &AnalysisIssues<'_>, loc: &HashMap<String, u64>) -> VersionCharacterization {
    let date = entry.analysis.date;
    let remaining: Vec<&Issue> = outstanding(&entry.issues, date).collect();

    let components: Vec<ComponentRow> = component_debt(remaining.iter().copied())
        .into_iter()
        .map(|(component, debt)| ComponentRow {
            loc: loc.get(&component).copied(),
            component,
            debt,
        })
        .collect();

    let file_quintile_debt = partition_into_quintiles(&components).sums(|row| row.debt.total as f64);

    let (debts, sizes): (Vec<f64>, Vec<f64>) = components
        .iter()
        .filter_map(|row| row.loc.map(|loc| (row.debt.total as f64, loc as f64)))
        .unzip();
    let debt_loc_correlation = pearson(&debts, &sizes);

    let mut severity_totals = SeverityBreakdown::default();
    let mut type_totals = TypeBreakdown::default();
    for row in &components {
        severity_totals.merge(&row.debt.by_severity);
        type_totals.merge(&row.debt.by_type);
    }

    let tag_debt = tag_debt(remaining.iter().copied());
    let rule_debt = rule_debt(remaining.iter().copied());
    let package_debt = package_debt(remaining.iter().copied());

    // Do few rules generate most of the debt?
    let ranked_rules = rank_descending(
        rule_debt
            .iter()
            .filter(|(_, debt)| *debt > 0.0)
            .map(|(rule, debt)| (rule.clone(), debt))
            .collect(),
    );
    let rule_quintile_debt = partition_into_quintiles(&ranked_rules).sums(|(_, debt)| *debt);

    VersionCharacterization {
        analysis: entry.analysis.clone(),
        components,
        file_quintile_debt,
        debt_loc_correlation,
        severity_totals,
        type_totals,
        tag_debt,
        rule_debt,
        package_debt,
        rule_quintile_debt,
    }
}

pub fn characterize_project(project: &str, table: &AssignmentTable<'_>, loc: &VersionLoc) -> ProjectCharacterization {
    let empty = HashMap::new();
    let versions: Vec<VersionCharacterization> = table
        .project_entries(project)
        .map(|entry| {
            log::debug!("Analyzing - {} {}", project, entry.analysis.version);
            characterize_version(entry, loc.get(&entry.analysis.date).unwrap_or(&empty))
        })
        .collect();

    let tag_order = rank_keys_across(versions.iter().map(|v| &v.tag_debt));
    let rule_order = rank_keys_across(versions.iter().map(|v| &v.rule_debt));

    ProjectCharacterization {
        project: project.to_string(),
        versions,
        tag_order,
        rule_order,
    }
}

/// Package debt and size per application version. Files without a known
/// debt are skipped.
pub fn build_package_history(application: &str, versions: &[(String, Vec<FileMeasure>)]) -> PackageHistory {
    let mut totals: Vec<(String, u64)> = Vec::new();
    let mut out_versions = Vec::with_capacity(versions.len());

    for (version, files) in versions {
        let mut packages: Vec<(String, PackageMeasure)> = Vec::new();
        for file in files {
            let Some(debt) = file.debt else {
                continue;
            };
            let path = file.key.split_once(':').map_or(file.key.as_str(), |(_, path)| path);
            let package = package_of(path);

            let slot = match packages.iter().position(|(name, _)| name == package) {
                Some(slot) => slot,
                None => {
                    packages.push((package.to_string(), PackageMeasure::default()));
                    packages.len() - 1
                }
            };
            packages[slot].1.debt += debt;
            packages[slot].1.loc += file.loc;
        }

        for (package, measure) in &packages {
            match totals.iter_mut().find(|(name, _)| name == package) {
                Some((_, total)) => *total += measure.debt,
                None => totals.push((package.clone(), measure.debt)),
            }
        }

        packages.sort_by(|a, b| b.1.debt.cmp(&a.1.debt));
        out_versions.push(VersionPackages {
            version: version.clone(),
            packages,
        });
    }

    totals.sort_by(|a, b| b.1.cmp(&a.1));
    PackageHistory {
        application: application.to_string(),
        versions: out_versions,
        package_order: totals.into_iter().map(|(name, _)| name).collect(),
    }
}

pub fn history_client(settings: &EffectiveSettings) -> Result<SonarClient, String> {
    SonarClient::new(&settings.history, settings.page_size, settings.timeout_secs)
        .map(|client| client.with_result_cap(settings.result_cap))
        .map_err(|e| format!("Client error: {e}"))
}

pub fn single_client(settings: &EffectiveSettings) -> Result<SonarClient, String> {
    SonarClient::new(&settings.single, settings.page_size, settings.timeout_secs)
        .map(|client| client.with_result_cap(settings.result_cap))
        .map_err(|e| format!("Client error: {e}"))
}

/// Projects, analyses and issues of every project on the history server.
/// Issues are requested one type at a time to stay below the result cap.
pub async fn fetch_project_records(client: &SonarClient, settings: &EffectiveSettings) -> Result<ProjectRecords, String> {
    log::info!("Reading projects from {}", client.base_url());
    let projects = client
        .projects_search()
        .await
        .map_err(|e| format!("Project search failed: {e}"))?;

    let mut records = ProjectRecords {
        projects: projects.clone(),
        ..Default::default()
    };

    for project in &projects {
        let analyses = client
            .project_analyses(project)
            .await
            .map_err(|e| format!("Analyses of {project} failed: {e}"))?;

        for issue_type in &settings.issue_types {
            let query = IssueQuery {
                languages: settings.languages.clone(),
                resolutions: Vec::new(),
                types: vec![issue_type.clone()],
            };
            let issues = client
                .issues_search(project, &analyses, &query)
                .await
                .map_err(|e| format!("Issue search for {project} failed: {e}"))?;
            records.issues.extend(issues);
        }
        records.analyses.extend(analyses);
    }

    log::info!("Total issues returned - {}", records.issues.len());
    Ok(records)
}

pub async fn run_version_debt_history(
    client: &SonarClient,
    settings: &EffectiveSettings,
) -> Result<Vec<ProjectDebtHistory>, String> {
    let available = client
        .metrics_search()
        .await
        .map_err(|e| format!("Metric search failed: {e}"))?;
    let measures = known_measures(&settings.project_measures, &available);
    let records = fetch_project_records(client, settings).await?;

    let mut histories = HashMap::new();
    if !measures.is_empty() {
        for project in &records.projects {
            let history = client
                .measures_search_history(project, &measures)
                .await
                .map_err(|e| format!("Measure history of {project} failed: {e}"))?;
            histories.insert(project.clone(), history);
        }
    }

    build_version_debt_history(&records, &histories, &measures).map_err(|e| e.to_string())
}

/// Configured project measures the server knows; the history endpoint
/// rejects the whole request on a single unknown metric key.
fn known_measures(configured: &[String], available: &[String]) -> Vec<String> {
    configured
        .iter()
        .filter(|metric| {
            let known = available.contains(metric);
            if !known {
                log::warn!("Metric {metric} is unknown to the history server; skipped");
            }
            known
        })
        .cloned()
        .collect()
}

pub async fn run_characterization(
    history: &SonarClient,
    single: &SonarClient,
    settings: &EffectiveSettings,
) -> Result<Vec<ProjectCharacterization>, String> {
    let records = fetch_project_records(history, settings).await?;
    let table = assign(&records.issues, &records.analyses).map_err(|e| e.to_string())?;

    let mut out = Vec::with_capacity(records.projects.len());
    for project in &records.projects {
        log::info!("Aggregate technical debt at file level in each software version for project - {project}");

        let mut loc = VersionLoc::new();
        for entry in table.project_entries(project) {
            let version = &entry.analysis.version;
            let mut files = HashMap::new();
            let remaining: Vec<&Issue> = outstanding(&entry.issues, entry.analysis.date).collect();
            for (component, _) in component_debt(remaining) {
                let key = format!("{project}.{version}:{component}");
                match single.measures_component(&key, &["ncloc".to_string()]).await {
                    Ok(measures) => {
                        if let Some(ncloc) = measure_value(&measures, "ncloc") {
                            files.insert(component, ncloc);
                        }
                    }
                    // Files renamed or moved later are unknown to older versions.
                    Err(e) => log::debug!("No LOC for {key}: {e}"),
                }
            }
            loc.insert(entry.analysis.date, files);
        }

        out.push(characterize_project(project, &table, &loc));
    }

    Ok(out)
}

pub async fn run_package_history(client: &SonarClient, settings: &EffectiveSettings) -> Result<Vec<PackageHistory>, String> {
    let metric_keys = vec!["sqale_index".to_string(), "ncloc".to_string()];
    let mut out = Vec::with_capacity(settings.projects.len());

    for (application, versions) in &settings.projects {
        log::info!("Application: {application}");
        let mut measured = Vec::with_capacity(versions.len());

        for version in versions {
            let files = client
                .component_files(&format!("{application}.{version}"))
                .await
                .map_err(|e| format!("File listing of {application} {version} failed: {e}"))?;
            log::info!("{version} - {} files", files.len());

            let mut file_measures = Vec::with_capacity(files.len());
            for key in files {
                let (debt, loc) = match client.measures_component(&key, &metric_keys).await {
                    Ok(measures) => (
                        measure_value(&measures, "sqale_index"),
                        measure_value(&measures, "ncloc").unwrap_or(0),
                    ),
                    Err(e) => {
                        log::debug!("No measures for {key}: {e}");
                        (None, 0)
                    }
                };
                file_measures.push(FileMeasure { key, debt, loc });
            }
            measured.push((version.clone(), file_measures));
        }

        out.push(build_package_history(application, &measured));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sonar::{HistoryPoint, MetricHistory};
    use crate::models::issue::{IssueType, Severity};
    use chrono::NaiveDate;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn records() -> ProjectRecords {
        ProjectRecords {
            projects: vec!["P".to_string()],
            analyses: vec![
                ProjectAnalysis::new("P", "2.0", day(2020, 6, 1)),
                ProjectAnalysis::new("P", "1.0", day(2020, 1, 1)),
            ],
            issues: vec![
                Issue::open("I", "P", "src/app/A.java", day(2020, 1, 1))
                    .with_debt(60)
                    .with_rule("r1")
                    .with_tags(["design", "cert"])
                    .fixed_on(day(2020, 6, 1)),
                Issue::open("J", "P", "src/app/B.java", day(2019, 1, 1))
                    .with_debt(10)
                    .with_rule("r2")
                    .with_severity(Severity::Blocker)
                    .with_type(IssueType::Bug),
                Issue::open("K", "P", "src/app/C.java", day(2020, 7, 1)).with_debt(5),
            ],
        }
    }

    #[test]
    fn version_history_rows_follow_analysis_dates() {
        let mut histories = HashMap::new();
        histories.insert(
            "P".to_string(),
            MeasuresHistory {
                measures: vec![MetricHistory {
                    metric: "ncloc".to_string(),
                    history: vec![HistoryPoint {
                        date: "2020-06-01T08:00:00+0000".to_string(),
                        value: Some("4200".to_string()),
                    }],
                }],
            },
        );

        let history = build_version_debt_history(&records(), &histories, &["ncloc".to_string()]).unwrap();
        let rows = &history[0].rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].analysis.version, "1.0");
        assert_eq!(rows[0].debt.new_debt, 60);
        assert_eq!(rows[0].debt.existing_debt, 10);
        assert_eq!(rows[1].debt.fixed_debt, 60);
        assert_eq!(rows[1].debt.existing_debt, 10);
        assert_eq!(rows[0].mean_fix_lifetime, None);
        assert_eq!(rows[1].mean_fix_lifetime, Some(1.0));
        assert_eq!(rows[0].measures[0], ("ncloc".to_string(), None));
        assert_eq!(rows[1].measures[0], ("ncloc".to_string(), Some("4200".to_string())));
    }

    #[test]
    fn characterization_leaves_out_fixed_issues() {
        let records = records();
        let table = assign(&records.issues, &records.analyses).unwrap();
        let mut loc = VersionLoc::new();
        loc.insert(
            day(2020, 1, 1),
            HashMap::from([("src/app/A.java".to_string(), 300), ("src/app/B.java".to_string(), 100)]),
        );

        let project = characterize_project("P", &table, &loc);
        assert_eq!(project.versions.len(), 2);

        let first = &project.versions[0];
        assert_eq!(first.components.len(), 2);
        assert_eq!(first.components[0].component, "src/app/A.java");
        assert_eq!(first.components[0].loc, Some(300));
        assert_eq!(first.severity_totals.blocker, 10);
        assert_eq!(first.type_totals.bug, 10);
        assert_eq!(first.type_totals.code_smell, 60);
        assert_eq!(first.tag_debt.get(&"design".to_string()), 30.0);
        assert_eq!(first.package_debt.get(&"app".to_string()), 70.0);
        assert_eq!(first.file_quintile_debt, [0.0, 0.0, 0.0, 0.0, 70.0]);
        assert!((first.debt_loc_correlation.unwrap() - 1.0).abs() < 1e-9);

        // Issue I is fixed at 2.0 and no longer weighs on it.
        let second = &project.versions[1];
        assert_eq!(second.components.len(), 1);
        assert_eq!(second.components[0].loc, None);
        assert!(second.tag_debt.is_empty());
        assert_eq!(second.debt_loc_correlation, None);

        assert_eq!(project.rule_order, vec!["r1", "r2"]);
        assert_eq!(project.tag_order, vec!["design", "cert"]);
    }

    #[test]
    fn unknown_measures_are_dropped_in_configured_order() {
        let configured = vec!["sqale_index".to_string(), "bogus".to_string(), "ncloc".to_string()];
        let available = vec!["ncloc".to_string(), "sqale_index".to_string()];
        assert_eq!(known_measures(&configured, &available), vec!["sqale_index", "ncloc"]);
        assert!(known_measures(&configured, &[]).is_empty());
    }

    #[test]
    fn package_history_orders_packages_by_total_debt() {
        let versions = vec![
            (
                "0.1".to_string(),
                vec![
                    FileMeasure { key: "App.0.1:src/core/A.java".to_string(), debt: Some(10), loc: 100 },
                    FileMeasure { key: "App.0.1:src/ui/B.java".to_string(), debt: Some(30), loc: 50 },
                    FileMeasure { key: "App.0.1:src/ui/Gone.java".to_string(), debt: None, loc: 0 },
                ],
            ),
            (
                "0.2".to_string(),
                vec![
                    FileMeasure { key: "App.0.2:src/core/A.java".to_string(), debt: Some(40), loc: 120 },
                    FileMeasure { key: "App.0.2:src/core/C.java".to_string(), debt: Some(5), loc: 20 },
                ],
            ),
        ];

        let history = build_package_history("App", &versions);
        assert_eq!(history.package_order, vec!["core", "ui"]);
        assert_eq!(history.versions[0].packages[0].0, "ui");
        assert_eq!(history.versions[1].get("core"), Some(&PackageMeasure { debt: 45, loc: 140 }));
        assert_eq!(history.versions[1].get("ui"), None);
    }
}
