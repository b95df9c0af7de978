use crate::error::{EngineError, EngineResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Analysis record as returned by `/api/project_analyses/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAnalysis {
    #[serde(default)]
    pub key: Option<String>,
    pub date: Option<String>,
    pub project_version: Option<String>,
}

/// A snapshot of one project's quality scan, tied to a version label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectAnalysis {
    pub project: String,
    pub version: String,
    pub date: NaiveDate,
}

impl ProjectAnalysis {
    pub fn new(project: impl Into<String>, version: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            project: project.into(),
            version: version.into(),
            date,
        }
    }

    pub fn from_api(project: &str, raw: &RawAnalysis) -> EngineResult<Self> {
        let record = raw.key.clone().unwrap_or_else(|| "<analysis>".to_string());
        let version = raw
            .project_version
            .clone()
            .ok_or_else(|| EngineError::malformed(project, &record, "missing projectVersion"))?;
        let date_str = raw
            .date
            .as_deref()
            .ok_or_else(|| EngineError::malformed(project, &version, "missing date"))?;
        let date = parse_sonar_date(date_str)
            .ok_or_else(|| EngineError::malformed(project, &version, format!("invalid date {date_str}")))?;

        Ok(Self::new(project, version, date))
    }
}

/// SonarQube timestamps look like `2013-10-16T00:00:00+0300`; only the day is kept.
pub fn parse_sonar_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10)?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_the_day_of_sonar_timestamps() {
        let date = parse_sonar_date("2013-10-16T23:59:00+0300").expect("date");
        assert_eq!(date, NaiveDate::from_ymd_opt(2013, 10, 16).unwrap());
        assert!(parse_sonar_date("2013-10").is_none());
        assert!(parse_sonar_date("not-a-date-at-all").is_none());
    }

    #[test]
    fn rejects_analysis_without_version() {
        let raw = RawAnalysis {
            key: Some("AXk1".to_string()),
            date: Some("2020-01-01T10:00:00+0000".to_string()),
            project_version: None,
        };

        let err = ProjectAnalysis::from_api("jEdit", &raw).unwrap_err();
        assert_eq!(
            err,
            EngineError::malformed("jEdit", "AXk1", "missing projectVersion")
        );
    }
}
