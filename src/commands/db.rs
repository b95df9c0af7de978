use crate::models::aggregate::{SeverityBreakdown, TypeBreakdown};
use crate::models::analysis::ProjectAnalysis;
use crate::models::ledger::DebtLedger;
use crate::models::report::{
    PackageHistory, ProjectCharacterization, ProjectDebtHistory, ReportRun, VersionDebtRecord,
};
use chrono::NaiveDate;
use rusqlite::{params, Connection, Result, Transaction};
use std::path::Path;

const DB_SCHEMA_VERSION: i64 = 1;

pub const RUN_DEBT_HISTORY: &str = "debt_history";
pub const RUN_CHARACTERIZATION: &str = "characterization";
pub const RUN_PACKAGE_HISTORY: &str = "package_history";

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > DB_SCHEMA_VERSION {
        log::warn!("Export file schema v{version} is newer than v{DB_SCHEMA_VERSION}");
    }

    Ok(())
}

/// Rows of one analysis are keyed by its date: version labels such as
/// `1.0-SNAPSHOT` can repeat across analyses of a project.
fn apply_migration_1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS report_runs (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK(kind IN ('debt_history', 'characterization', 'package_history')),
            created_at INTEGER NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS version_debt (
            run_id TEXT NOT NULL REFERENCES report_runs(id) ON DELETE CASCADE,
            project TEXT NOT NULL,
            version TEXT NOT NULL,
            analysis_date TEXT NOT NULL,
            new_debt INTEGER NOT NULL DEFAULT 0,
            existing_debt INTEGER NOT NULL DEFAULT 0,
            fixed_debt INTEGER NOT NULL DEFAULT 0,
            unknown_debt_count INTEGER NOT NULL DEFAULT 0,
            mean_fix_lifetime REAL,
            measures_json TEXT NOT NULL DEFAULT '[]',
            PRIMARY KEY (run_id, project, analysis_date)
        );

        CREATE TABLE IF NOT EXISTS component_debt (
            run_id TEXT NOT NULL REFERENCES report_runs(id) ON DELETE CASCADE,
            project TEXT NOT NULL,
            version TEXT NOT NULL,
            analysis_date TEXT NOT NULL,
            rank INTEGER NOT NULL,
            component TEXT NOT NULL,
            loc INTEGER,
            total INTEGER NOT NULL,
            blocker INTEGER NOT NULL DEFAULT 0,
            critical INTEGER NOT NULL DEFAULT 0,
            major INTEGER NOT NULL DEFAULT 0,
            minor INTEGER NOT NULL DEFAULT 0,
            info INTEGER NOT NULL DEFAULT 0,
            bug INTEGER NOT NULL DEFAULT 0,
            vulnerability INTEGER NOT NULL DEFAULT 0,
            code_smell INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (run_id, project, analysis_date, component)
        );

        CREATE TABLE IF NOT EXISTS version_summary (
            run_id TEXT NOT NULL REFERENCES report_runs(id) ON DELETE CASCADE,
            project TEXT NOT NULL,
            version TEXT NOT NULL,
            analysis_date TEXT NOT NULL,
            file_quintiles_json TEXT NOT NULL DEFAULT '[]',
            rule_quintiles_json TEXT NOT NULL DEFAULT '[]',
            debt_loc_correlation REAL,
            severity_json TEXT NOT NULL DEFAULT '{}',
            type_json TEXT NOT NULL DEFAULT '{}',
            PRIMARY KEY (run_id, project, analysis_date)
        );

        CREATE TABLE IF NOT EXISTS key_debt (
            run_id TEXT NOT NULL REFERENCES report_runs(id) ON DELETE CASCADE,
            project TEXT NOT NULL,
            version TEXT NOT NULL,
            analysis_date TEXT NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('tag', 'rule', 'package')),
            key TEXT NOT NULL,
            overall_rank INTEGER NOT NULL,
            debt REAL NOT NULL,
            PRIMARY KEY (run_id, project, analysis_date, kind, key)
        );

        CREATE TABLE IF NOT EXISTS package_history (
            run_id TEXT NOT NULL REFERENCES report_runs(id) ON DELETE CASCADE,
            application TEXT NOT NULL,
            version TEXT NOT NULL,
            package TEXT NOT NULL,
            overall_rank INTEGER NOT NULL,
            debt INTEGER NOT NULL,
            loc INTEGER NOT NULL,
            -- Zero-LOC packages are blank in the overall view.
            in_overall INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (run_id, application, version, package)
        );

        CREATE INDEX IF NOT EXISTS idx_report_runs_created_at ON report_runs(created_at);
        CREATE INDEX IF NOT EXISTS idx_component_debt_rank ON component_debt(run_id, project, analysis_date, rank);
        CREATE INDEX IF NOT EXISTS idx_key_debt_kind ON key_debt(run_id, kind, overall_rank);
        ",
    )
}

pub fn get_db_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    initialize_schema(&conn)?;
    Ok(conn)
}

fn start_run(tx: &Transaction<'_>, kind: &str) -> Result<String> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = chrono::Utc::now().timestamp();
    tx.execute(
        "INSERT INTO report_runs (id, kind, created_at) VALUES (?1, ?2, ?3)",
        params![id, kind, now],
    )?;
    Ok(id)
}

fn finish_run(tx: &Transaction<'_>, run_id: &str, row_count: usize) -> Result<()> {
    tx.execute(
        "UPDATE report_runs SET row_count = ?1 WHERE id = ?2",
        params![row_count as i64, run_id],
    )?;
    Ok(())
}

/// Stores a version debt history export and returns its run id.
pub fn write_version_debt(conn: &mut Connection, histories: &[ProjectDebtHistory]) -> Result<String> {
    let tx = conn.transaction()?;
    let run_id = start_run(&tx, RUN_DEBT_HISTORY)?;
    let mut rows = 0usize;

    for history in histories {
        for row in &history.rows {
            let measures_json = serde_json::to_string(&row.measures).unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                "
                INSERT INTO version_debt (
                    run_id,
                    project,
                    version,
                    analysis_date,
                    new_debt,
                    existing_debt,
                    fixed_debt,
                    unknown_debt_count,
                    measures_json,
                    mean_fix_lifetime
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ",
                params![
                    run_id,
                    history.project,
                    row.analysis.version,
                    row.analysis.date.to_string(),
                    row.debt.new_debt as i64,
                    row.debt.existing_debt as i64,
                    row.debt.fixed_debt as i64,
                    row.debt.unknown_debt_count as i64,
                    measures_json,
                    row.mean_fix_lifetime,
                ],
            )?;
            rows += 1;
        }
    }

    finish_run(&tx, &run_id, rows)?;
    tx.commit()?;
    Ok(run_id)
}

pub fn write_characterization(conn: &mut Connection, projects: &[ProjectCharacterization]) -> Result<String> {
    let tx = conn.transaction()?;
    let run_id = start_run(&tx, RUN_CHARACTERIZATION)?;
    let mut rows = 0usize;

    for project in projects {
        let package_order = crate::analysis::breakdown::rank_keys_across(
            project.versions.iter().map(|version| &version.package_debt),
        );

        for version in &project.versions {
            let label = &version.analysis.version;
            let analysis_date = version.analysis.date.to_string();

            for (rank, row) in version.components.iter().enumerate() {
                tx.execute(
                    "
                    INSERT INTO component_debt (
                        run_id, project, version, analysis_date, rank, component, loc, total,
                        blocker, critical, major, minor, info,
                        bug, vulnerability, code_smell
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                    ",
                    params![
                        run_id,
                        project.project,
                        label,
                        analysis_date,
                        rank as i64 + 1,
                        row.component,
                        row.loc.map(|loc| loc as i64),
                        row.debt.total as i64,
                        row.debt.by_severity.blocker as i64,
                        row.debt.by_severity.critical as i64,
                        row.debt.by_severity.major as i64,
                        row.debt.by_severity.minor as i64,
                        row.debt.by_severity.info as i64,
                        row.debt.by_type.bug as i64,
                        row.debt.by_type.vulnerability as i64,
                        row.debt.by_type.code_smell as i64,
                    ],
                )?;
                rows += 1;
            }

            write_version_summary(&tx, &run_id, &project.project, version)?;
            rows += 1;

            let keys = [
                ("tag", &project.tag_order, &version.tag_debt),
                ("rule", &project.rule_order, &version.rule_debt),
                ("package", &package_order, &version.package_debt),
            ];
            for (kind, order, ledger) in keys {
                rows += write_key_debt(&tx, &run_id, &project.project, &version.analysis, kind, order, ledger)?;
            }
        }
    }

    finish_run(&tx, &run_id, rows)?;
    tx.commit()?;
    Ok(run_id)
}

fn write_version_summary(
    tx: &Transaction<'_>,
    run_id: &str,
    project: &str,
    version: &crate::models::report::VersionCharacterization,
) -> Result<()> {
    let to_json = |value: serde_json::Result<String>, empty: &str| value.unwrap_or_else(|_| empty.to_string());

    tx.execute(
        "
        INSERT INTO version_summary (
            run_id,
            project,
            version,
            analysis_date,
            file_quintiles_json,
            rule_quintiles_json,
            debt_loc_correlation,
            severity_json,
            type_json
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
        params![
            run_id,
            project,
            version.analysis.version,
            version.analysis.date.to_string(),
            to_json(serde_json::to_string(&version.file_quintile_debt), "[]"),
            to_json(serde_json::to_string(&version.rule_quintile_debt), "[]"),
            version.debt_loc_correlation,
            to_json(serde_json::to_string(&version.severity_totals), "{}"),
            to_json(serde_json::to_string(&version.type_totals), "{}"),
        ],
    )?;
    Ok(())
}

/// One row per key present in `ledger`, ranked by the cross-version `order`.
fn write_key_debt(
    tx: &Transaction<'_>,
    run_id: &str,
    project: &str,
    analysis: &ProjectAnalysis,
    kind: &str,
    order: &[String],
    ledger: &DebtLedger<String>,
) -> Result<usize> {
    let mut rows = 0usize;
    for (rank, key) in order.iter().enumerate() {
        if !ledger.contains(key) {
            continue;
        }
        tx.execute(
            "INSERT INTO key_debt (run_id, project, version, analysis_date, kind, key, overall_rank, debt) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run_id,
                project,
                analysis.version,
                analysis.date.to_string(),
                kind,
                key,
                rank as i64 + 1,
                ledger.get(key)
            ],
        )?;
        rows += 1;
    }
    Ok(rows)
}

pub fn write_package_history(conn: &mut Connection, histories: &[PackageHistory]) -> Result<String> {
    let tx = conn.transaction()?;
    let run_id = start_run(&tx, RUN_PACKAGE_HISTORY)?;
    let mut rows = 0usize;

    for history in histories {
        for version in &history.versions {
            for (rank, package) in history.package_order.iter().enumerate() {
                let Some(measure) = version.get(package) else {
                    continue;
                };
                let in_overall = version.overall(package).is_some();
                tx.execute(
                    "
                    INSERT INTO package_history (
                        run_id, application, version, package, overall_rank, debt, loc, in_overall
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    ",
                    params![
                        run_id,
                        history.application,
                        version.version,
                        package,
                        rank as i64 + 1,
                        measure.debt as i64,
                        measure.loc as i64,
                        in_overall,
                    ],
                )?;
                rows += 1;
            }
        }
    }

    finish_run(&tx, &run_id, rows)?;
    tx.commit()?;
    Ok(run_id)
}

pub fn load_version_debt(conn: &Connection, run_id: &str) -> Result<Vec<VersionDebtRecord>> {
    let mut stmt = conn.prepare(
        "SELECT project, version, analysis_date, new_debt, existing_debt, fixed_debt, unknown_debt_count, mean_fix_lifetime, measures_json
         FROM version_debt WHERE run_id = ?1 ORDER BY project ASC, analysis_date ASC",
    )?;

    let records = stmt
        .query_map(params![run_id], |row| {
            let measures_json: String = row.get(8)?;
            Ok(VersionDebtRecord {
                project: row.get(0)?,
                version: row.get(1)?,
                analysis_date: row.get(2)?,
                new_debt: row.get::<_, i64>(3)? as u64,
                existing_debt: row.get::<_, i64>(4)? as u64,
                fixed_debt: row.get::<_, i64>(5)? as u64,
                unknown_debt_count: row.get::<_, i64>(6)? as usize,
                mean_fix_lifetime: row.get(7)?,
                measures: serde_json::from_str(&measures_json).unwrap_or_default(),
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(records)
}

pub fn list_runs(conn: &Connection) -> Result<Vec<ReportRun>> {
    let mut stmt = conn.prepare("SELECT id, kind, created_at, row_count FROM report_runs ORDER BY created_at DESC, rowid DESC")?;

    let runs = stmt
        .query_map([], |row| {
            Ok(ReportRun {
                id: row.get(0)?,
                kind: row.get(1)?,
                created_at: row.get(2)?,
                row_count: row.get::<_, i64>(3)? as usize,
            })
        })?
        .collect::<Result<Vec<_>>>()?;

    Ok(runs)
}

/// Severity and type totals of a stored characterization analysis.
pub fn load_version_totals(
    conn: &Connection,
    run_id: &str,
    project: &str,
    analysis_date: NaiveDate,
) -> Result<Option<(SeverityBreakdown, TypeBreakdown)>> {
    use rusqlite::OptionalExtension;

    let raw: Option<(String, String)> = conn
        .query_row(
            "SELECT severity_json, type_json FROM version_summary WHERE run_id = ?1 AND project = ?2 AND analysis_date = ?3",
            params![run_id, project, analysis_date.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(raw.map(|(severity, types)| {
        (
            serde_json::from_str(&severity).unwrap_or_default(),
            serde_json::from_str(&types).unwrap_or_default(),
        )
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::aggregate::DebtAggregate;
    use crate::models::analysis::ProjectAnalysis;
    use crate::models::report::{PackageMeasure, VersionDebtRow, VersionPackages};
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().expect("in-memory db");
        initialize_schema(&conn).expect("schema init");
        conn
    }

    #[test]
    fn schema_initializes_with_expected_version() {
        let conn = memory_db();
        let version: i64 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("schema version");
        assert_eq!(version, DB_SCHEMA_VERSION);

        initialize_schema(&conn).expect("second init is a no-op");
    }

    #[test]
    fn version_debt_round_trip() {
        let mut conn = memory_db();
        let history = ProjectDebtHistory {
            project: "jEdit".to_string(),
            rows: vec![VersionDebtRow {
                analysis: ProjectAnalysis::new("jEdit", "4.0", day(2002, 4, 20)),
                debt: DebtAggregate {
                    new_debt: 120,
                    existing_debt: 30,
                    fixed_debt: 0,
                    unknown_debt_count: 2,
                },
                mean_fix_lifetime: None,
                measures: vec![("ncloc".to_string(), Some("81000".to_string()))],
            }],
        };

        let run_id = write_version_debt(&mut conn, &[history]).expect("write");
        let records = load_version_debt(&conn, &run_id).expect("load");

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].analysis_date, "2002-04-20");
        assert_eq!(records[0].new_debt, 120);
        assert_eq!(records[0].unknown_debt_count, 2);
        assert_eq!(records[0].measures[0].1.as_deref(), Some("81000"));

        let runs = list_runs(&conn).expect("runs");
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].kind, RUN_DEBT_HISTORY);
        assert_eq!(runs[0].row_count, 1);
    }

    #[test]
    fn repeated_version_label_exports_one_row_set_per_analysis() {
        use crate::analysis::assign;
        use crate::commands::report::{characterize_project, VersionLoc};
        use crate::models::issue::Issue;

        let mut conn = memory_db();
        let analyses = vec![
            ProjectAnalysis::new("P", "1.0-SNAPSHOT", day(2020, 1, 1)),
            ProjectAnalysis::new("P", "1.0-SNAPSHOT", day(2020, 6, 1)),
        ];
        let issues = vec![Issue::open("I", "P", "src/app/A.java", day(2019, 1, 1))
            .with_debt(30)
            .with_rule("r1")
            .with_tags(["cert"])];
        let table = assign(&issues, &analyses).expect("assign");
        let mut loc = VersionLoc::new();
        loc.insert(day(2020, 6, 1), HashMap::from([("src/app/A.java".to_string(), 120)]));
        let project = characterize_project("P", &table, &loc);
        assert_eq!(project.versions[0].components[0].loc, None);
        assert_eq!(project.versions[1].components[0].loc, Some(120));

        let run_id = write_characterization(&mut conn, &[project]).expect("write characterization");

        let count = |table: &str| -> i64 {
            conn.query_row(
                &format!("SELECT COUNT(*) FROM {table} WHERE run_id = ?1"),
                params![run_id],
                |row| row.get(0),
            )
            .expect("count")
        };
        assert_eq!(count("component_debt"), 2);
        assert_eq!(count("version_summary"), 2);
        assert_eq!(count("key_debt"), 6);

        let totals = load_version_totals(&conn, &run_id, "P", day(2020, 6, 1)).expect("totals");
        assert_eq!(totals.map(|(severity, _)| severity.major), Some(30));
    }

    #[test]
    fn zero_loc_packages_are_left_out_of_overall_view() {
        let mut conn = memory_db();
        let history = PackageHistory {
            application: "FreeMind".to_string(),
            versions: vec![VersionPackages {
                version: "0.0.3".to_string(),
                packages: vec![
                    ("freemind/main".to_string(), PackageMeasure { debt: 50, loc: 400 }),
                    ("freemind/empty".to_string(), PackageMeasure { debt: 0, loc: 0 }),
                ],
            }],
            package_order: vec!["freemind/main".to_string(), "freemind/empty".to_string()],
        };

        let run_id = write_package_history(&mut conn, &[history]).expect("write");
        let blank: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM package_history WHERE run_id = ?1 AND in_overall = 0",
                params![run_id],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(blank, 1);
    }
}
