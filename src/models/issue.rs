use crate::error::{EngineError, EngineResult};
use crate::models::analysis::parse_sonar_date;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minutes in one remediation day (SonarQube counts 8-hour days).
pub const MINUTES_PER_DAY: u64 = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Minor,
    Major,
    Critical,
    Blocker,
}

impl Severity {
    /// Display order used by reports: most severe first.
    pub const DESCENDING: [Severity; 5] = [
        Severity::Blocker,
        Severity::Critical,
        Severity::Major,
        Severity::Minor,
        Severity::Info,
    ];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "INFO" => Some(Severity::Info),
            "MINOR" => Some(Severity::Minor),
            "MAJOR" => Some(Severity::Major),
            "CRITICAL" => Some(Severity::Critical),
            "BLOCKER" => Some(Severity::Blocker),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Minor => "MINOR",
            Severity::Major => "MAJOR",
            Severity::Critical => "CRITICAL",
            Severity::Blocker => "BLOCKER",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    CodeSmell,
    Bug,
    Vulnerability,
}

impl IssueType {
    pub const ALL: [IssueType; 3] = [IssueType::Bug, IssueType::Vulnerability, IssueType::CodeSmell];

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CODE_SMELL" => Some(IssueType::CodeSmell),
            "BUG" => Some(IssueType::Bug),
            "VULNERABILITY" => Some(IssueType::Vulnerability),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueType::CodeSmell => "CODE_SMELL",
            IssueType::Bug => "BUG",
            IssueType::Vulnerability => "VULNERABILITY",
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Resolution {
    Fixed,
}

/// Remediation effort of an issue. The server reports `n/a` when unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Debt {
    Minutes(u64),
    Unknown,
}

impl Debt {
    /// Unknown debt counts as zero in every sum.
    pub fn minutes(self) -> u64 {
        match self {
            Debt::Minutes(m) => m,
            Debt::Unknown => 0,
        }
    }

    pub fn is_unknown(self) -> bool {
        matches!(self, Debt::Unknown)
    }
}

/// Convert a SonarQube duration (`35min`, `1h25min`, `1d1h10min`, `n/a`) to minutes.
pub fn parse_duration_minutes(value: &str) -> Option<Debt> {
    let value = value.trim();
    if value == "n/a" {
        return Some(Debt::Unknown);
    }
    if value.is_empty() {
        return None;
    }

    let mut total = 0u64;
    let mut rest = value;
    for (suffix, factor) in [("d", MINUTES_PER_DAY), ("h", 60), ("min", 1)] {
        if let Some(idx) = rest.find(suffix) {
            let amount: u64 = rest[..idx].parse().ok()?;
            total = total.checked_add(amount.checked_mul(factor)?)?;
            rest = &rest[idx + suffix.len()..];
        }
    }

    // A trailing bare number is minutes.
    if !rest.is_empty() {
        total = total.checked_add(rest.parse::<u64>().ok()?)?;
    }

    Some(Debt::Minutes(total))
}

/// Issue record as returned by `/api/issues/search`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIssue {
    pub key: Option<String>,
    pub rule: Option<String>,
    pub component: Option<String>,
    pub severity: Option<String>,
    #[serde(rename = "type")]
    pub issue_type: Option<String>,
    pub status: Option<String>,
    pub resolution: Option<String>,
    pub creation_date: Option<String>,
    pub update_date: Option<String>,
    pub close_date: Option<String>,
    pub debt: Option<String>,
    pub effort: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A defect, smell or vulnerability finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub key: String,
    pub project: String,
    /// File path inside the project, e.g. `src/freemind/main/Tools.java`.
    pub component: String,
    pub rule: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub tags: Vec<String>,
    pub debt: Debt,
    pub status: Status,
    pub resolution: Option<Resolution>,
    pub creation_date: NaiveDate,
    pub update_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    pub message: String,
}

impl Issue {
    /// Open issue with neutral defaults; use the `with_*` methods to fill in the rest.
    pub fn open(
        key: impl Into<String>,
        project: impl Into<String>,
        component: impl Into<String>,
        creation_date: NaiveDate,
    ) -> Self {
        Self {
            key: key.into(),
            project: project.into(),
            component: component.into(),
            rule: String::new(),
            severity: Severity::Major,
            issue_type: IssueType::CodeSmell,
            tags: Vec::new(),
            debt: Debt::Unknown,
            status: Status::Open,
            resolution: None,
            creation_date,
            update_date: None,
            close_date: None,
            message: String::new(),
        }
    }

    pub fn with_debt(mut self, minutes: u64) -> Self {
        self.debt = Debt::Minutes(minutes);
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = rule.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_type(mut self, issue_type: IssueType) -> Self {
        self.issue_type = issue_type;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Mark the issue closed and fixed on `date`.
    pub fn fixed_on(mut self, date: NaiveDate) -> Self {
        self.close_date = Some(date);
        self.status = Status::Closed;
        self.resolution = Some(Resolution::Fixed);
        self
    }

    pub fn from_api(raw: &RawIssue) -> EngineResult<Self> {
        let key = raw.key.clone().unwrap_or_default();
        let full_component = raw.component.as_deref().unwrap_or_default();
        let Some((project, component)) = full_component.split_once(':') else {
            return Err(EngineError::malformed(
                "<unknown>",
                &key,
                format!("component '{full_component}' is not of the form project:path"),
            ));
        };
        let bad = |reason: String| EngineError::malformed(project, &key, reason);

        if key.is_empty() {
            return Err(bad("missing key".to_string()));
        }
        let rule = raw.rule.clone().ok_or_else(|| bad("missing rule".to_string()))?;

        let status = match raw.status.as_deref() {
            Some("OPEN") => Status::Open,
            Some("CLOSED") => Status::Closed,
            other => return Err(bad(format!("unsupported status {other:?}"))),
        };
        let resolution = match raw.resolution.as_deref() {
            None => None,
            Some("FIXED") => Some(Resolution::Fixed),
            Some(other) => return Err(bad(format!("unsupported resolution {other}"))),
        };

        let severity_str = raw.severity.as_deref().unwrap_or_default();
        let severity = Severity::parse(severity_str)
            .ok_or_else(|| bad(format!("invalid severity '{severity_str}'")))?;
        let type_str = raw.issue_type.as_deref().unwrap_or_default();
        let issue_type = IssueType::parse(type_str)
            .ok_or_else(|| bad(format!("invalid type '{type_str}'")))?;

        let creation_date = raw
            .creation_date
            .as_deref()
            .and_then(parse_sonar_date)
            .ok_or_else(|| bad("missing or invalid creationDate".to_string()))?;
        let optional_date = |field: &str, value: &Option<String>| -> EngineResult<Option<NaiveDate>> {
            match value.as_deref() {
                None => Ok(None),
                Some(s) => parse_sonar_date(s)
                    .map(Some)
                    .ok_or_else(|| bad(format!("invalid {field} '{s}'"))),
            }
        };
        let update_date = optional_date("updateDate", &raw.update_date)?;
        let close_date = optional_date("closeDate", &raw.close_date)?;

        if let (Some(effort), Some(debt)) = (&raw.effort, &raw.debt) {
            if effort != debt {
                return Err(bad(format!("effort {effort} differs from debt {debt}")));
            }
        }
        let debt = match raw.debt.as_deref() {
            None => Debt::Unknown,
            Some(d) => parse_duration_minutes(d).ok_or_else(|| bad(format!("invalid debt '{d}'")))?,
        };

        let issue = Self {
            key: key.clone(),
            project: project.to_string(),
            component: component.to_string(),
            rule,
            severity,
            issue_type,
            tags: raw.tags.clone(),
            debt,
            status,
            resolution,
            creation_date,
            update_date,
            close_date,
            message: raw.message.clone().unwrap_or_default(),
        };
        issue.validate()?;
        Ok(issue)
    }

    /// A closed issue must close strictly after its creation date.
    pub fn validate(&self) -> EngineResult<()> {
        match self.close_date {
            Some(closed) if closed == self.creation_date => Err(EngineError::malformed(
                &self.project,
                &self.key,
                format!("created and closed on the same date {}", self.creation_date),
            )),
            Some(closed) if closed < self.creation_date => Err(EngineError::malformed(
                &self.project,
                &self.key,
                format!("closed on {closed} before its creation on {}", self.creation_date),
            )),
            _ => Ok(()),
        }
    }

    /// `creation_date <= date <= close_date`, an open issue never ends.
    pub fn is_live_at(&self, date: NaiveDate) -> bool {
        self.creation_date <= date && self.close_date.map_or(true, |closed| date <= closed)
    }

    pub fn is_new_at(&self, date: NaiveDate) -> bool {
        self.creation_date == date
    }

    pub fn is_fixed_at(&self, date: NaiveDate) -> bool {
        self.close_date == Some(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn raw_issue() -> RawIssue {
        RawIssue {
            key: Some("AW1".to_string()),
            rule: Some("squid:S1192".to_string()),
            component: Some("FreeMind:src/freemind/main/Tools.java".to_string()),
            severity: Some("CRITICAL".to_string()),
            issue_type: Some("CODE_SMELL".to_string()),
            status: Some("CLOSED".to_string()),
            resolution: Some("FIXED".to_string()),
            creation_date: Some("2001-03-01T00:00:00+0200".to_string()),
            update_date: None,
            close_date: Some("2004-07-01T00:00:00+0300".to_string()),
            debt: Some("1h25min".to_string()),
            effort: Some("1h25min".to_string()),
            tags: vec!["design".to_string()],
            message: Some("Define a constant".to_string()),
        }
    }

    #[test]
    fn converts_sonar_durations_to_minutes() {
        assert_eq!(parse_duration_minutes("35min"), Some(Debt::Minutes(35)));
        assert_eq!(parse_duration_minutes("1h25min"), Some(Debt::Minutes(85)));
        assert_eq!(parse_duration_minutes("4h30min"), Some(Debt::Minutes(270)));
        assert_eq!(parse_duration_minutes("1d1h10min"), Some(Debt::Minutes(550)));
        assert_eq!(parse_duration_minutes("2h"), Some(Debt::Minutes(120)));
        assert_eq!(parse_duration_minutes("n/a"), Some(Debt::Unknown));
        assert_eq!(parse_duration_minutes("soon"), None);
        assert_eq!(parse_duration_minutes(""), None);
    }

    #[test]
    fn oversized_duration_is_rejected_instead_of_wrapping() {
        assert_eq!(parse_duration_minutes(&format!("{}d", u64::MAX / 2)), None);
        assert_eq!(parse_duration_minutes(&format!("{}min1", u64::MAX)), None);

        let raw = RawIssue {
            debt: Some("99999999999999999999d".to_string()),
            effort: Some("99999999999999999999d".to_string()),
            ..raw_issue()
        };
        assert!(Issue::from_api(&raw).is_err());
    }

    #[test]
    fn parses_api_issue_and_splits_component_key() {
        let issue = Issue::from_api(&raw_issue()).expect("valid issue");
        assert_eq!(issue.project, "FreeMind");
        assert_eq!(issue.component, "src/freemind/main/Tools.java");
        assert_eq!(issue.debt, Debt::Minutes(85));
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.resolution, Some(Resolution::Fixed));
        assert_eq!(issue.close_date, Some(day(2004, 7, 1)));
    }

    #[test]
    fn missing_debt_is_unknown_not_zero() {
        let raw = RawIssue {
            debt: None,
            effort: None,
            ..raw_issue()
        };
        let issue = Issue::from_api(&raw).expect("valid issue");
        assert!(issue.debt.is_unknown());
        assert_eq!(issue.debt.minutes(), 0);
    }

    #[test]
    fn rejects_issue_created_and_closed_on_same_date() {
        let raw = RawIssue {
            close_date: Some("2001-03-01T12:00:00+0200".to_string()),
            ..raw_issue()
        };
        let err = Issue::from_api(&raw).unwrap_err();
        let EngineError::MalformedRecord { project, record, .. } = err;
        assert_eq!(project, "FreeMind");
        assert_eq!(record, "AW1");
    }

    #[test]
    fn rejects_issue_closed_before_creation() {
        let raw = RawIssue {
            close_date: Some("2000-12-31T00:00:00+0200".to_string()),
            ..raw_issue()
        };
        let err = Issue::from_api(&raw).unwrap_err();
        let EngineError::MalformedRecord { record, reason, .. } = err;
        assert_eq!(record, "AW1");
        assert!(reason.contains("before its creation"));
    }

    #[test]
    fn rejects_unsupported_status_and_resolution() {
        let reopened = RawIssue {
            status: Some("REOPENED".to_string()),
            ..raw_issue()
        };
        assert!(Issue::from_api(&reopened).is_err());

        let wontfix = RawIssue {
            resolution: Some("WONTFIX".to_string()),
            ..raw_issue()
        };
        assert!(Issue::from_api(&wontfix).is_err());
    }

    #[test]
    fn rejects_effort_that_disagrees_with_debt() {
        let raw = RawIssue {
            effort: Some("5min".to_string()),
            ..raw_issue()
        };
        assert!(Issue::from_api(&raw).is_err());
    }

    #[test]
    fn open_issue_is_live_forever() {
        let issue = Issue::open("k", "p", "src/A.java", day(2020, 1, 1));
        assert!(!issue.is_live_at(day(2019, 12, 31)));
        assert!(issue.is_live_at(day(2020, 1, 1)));
        assert!(issue.is_live_at(day(2999, 1, 1)));

        let fixed = issue.fixed_on(day(2020, 6, 1));
        assert!(fixed.is_live_at(day(2020, 6, 1)));
        assert!(!fixed.is_live_at(day(2020, 6, 2)));
    }

    #[test]
    fn severity_orders_from_info_to_blocker() {
        assert!(Severity::Info < Severity::Minor);
        assert!(Severity::Critical < Severity::Blocker);
        assert_eq!(Severity::DESCENDING[0], Severity::Blocker);
        assert_eq!(Severity::parse("MAJOR"), Some(Severity::Major));
        assert_eq!(IssueType::parse("BUG").map(|t| t.to_string()), Some("BUG".to_string()));
    }
}
