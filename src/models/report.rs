use crate::models::aggregate::{ComponentDebt, DebtAggregate, SeverityBreakdown, TypeBreakdown};
use crate::models::analysis::ProjectAnalysis;
use crate::models::ledger::DebtLedger;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDebtRow {
    pub analysis: ProjectAnalysis,
    pub debt: DebtAggregate,
    /// Mean number of versions survived by the issues fixed at this analysis.
    pub mean_fix_lifetime: Option<f64>,
    /// Project measure (metric key, value at the analysis date).
    pub measures: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDebtHistory {
    pub project: String,
    pub rows: Vec<VersionDebtRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRow {
    pub component: String,
    pub debt: ComponentDebt,
    /// `None` when the single-version server no longer knows the file.
    pub loc: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionCharacterization {
    pub analysis: ProjectAnalysis,
    /// Ranked descending by debt.
    pub components: Vec<ComponentRow>,
    pub file_quintile_debt: [f64; 5],
    pub debt_loc_correlation: Option<f64>,
    pub severity_totals: SeverityBreakdown,
    pub type_totals: TypeBreakdown,
    pub tag_debt: DebtLedger<String>,
    pub rule_debt: DebtLedger<String>,
    pub package_debt: DebtLedger<String>,
    pub rule_quintile_debt: [f64; 5],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectCharacterization {
    pub project: String,
    pub versions: Vec<VersionCharacterization>,
    /// Tags ordered by debt summed over every version.
    pub tag_order: Vec<String>,
    pub rule_order: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMeasure {
    pub debt: u64,
    pub loc: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionPackages {
    pub version: String,
    /// Ranked descending by debt.
    pub packages: Vec<(String, PackageMeasure)>,
}

impl VersionPackages {
    pub fn get(&self, package: &str) -> Option<&PackageMeasure> {
        self.packages
            .iter()
            .find(|(name, _)| name == package)
            .map(|(_, measure)| measure)
    }

    /// Cell of the overall view: packages without code in this version are blank.
    pub fn overall(&self, package: &str) -> Option<PackageMeasure> {
        self.get(package).copied().filter(|measure| measure.loc > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageHistory {
    pub application: String,
    pub versions: Vec<VersionPackages>,
    /// Packages ordered by debt summed over every version.
    pub package_order: Vec<String>,
}

/// One export stored in the SQLite file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRun {
    pub id: String,
    pub kind: String,
    pub created_at: i64,
    pub row_count: usize,
}

/// Flattened `version_debt` row as read back from the export file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDebtRecord {
    pub project: String,
    pub version: String,
    pub analysis_date: String,
    pub new_debt: u64,
    pub existing_debt: u64,
    pub fixed_debt: u64,
    pub unknown_debt_count: usize,
    pub mean_fix_lifetime: Option<f64>,
    pub measures: Vec<(String, Option<String>)>,
}
