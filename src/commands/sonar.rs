use crate::commands::settings::{ServerSettings, SONAR_RESULT_CAP};
use crate::error::EngineError;
use crate::models::analysis::{ProjectAnalysis, RawAnalysis};
use crate::models::issue::{Issue, RawIssue};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SonarError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: HTTP {status} - {body}")]
    Status { status: u16, body: String },

    #[error("API error: {0}")]
    Api(String),

    #[error(transparent)]
    Record(#[from] EngineError),
}

/// Issue filters sent with every `/api/issues/search` call.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    pub languages: Vec<String>,
    pub resolutions: Vec<String>,
    pub types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectsPage {
    components: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
struct KeyEntry {
    key: String,
}

#[derive(Debug, Deserialize)]
struct MetricsPage {
    metrics: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize)]
struct AnalysesPage {
    analyses: Vec<RawAnalysis>,
}

#[derive(Debug, Deserialize)]
struct IssuesPage {
    total: u64,
    issues: Vec<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct Paging {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ComponentTreePage {
    paging: Paging,
    components: Vec<KeyEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryPoint {
    pub date: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricHistory {
    pub metric: String,
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeasuresHistory {
    pub measures: Vec<MetricHistory>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Measure {
    pub metric: String,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComponentMeasures {
    measures: Vec<Measure>,
}

#[derive(Debug, Deserialize)]
struct MeasuresComponentResponse {
    component: Option<ComponentMeasures>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    msg: String,
}

/// Client for one SonarQube server. Constructed explicitly and passed to the
/// report builders; holds no global state.
pub struct SonarClient {
    client: Client,
    server: ServerSettings,
    page_size: u32,
    result_cap: u64,
}

impl SonarClient {
    pub fn new(server: &ServerSettings, page_size: u32, timeout_secs: u64) -> Result<Self, SonarError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            server: server.clone(),
            page_size: page_size.max(1),
            result_cap: SONAR_RESULT_CAP,
        })
    }

    pub fn with_result_cap(mut self, result_cap: u64) -> Self {
        self.result_cap = result_cap;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.server.url
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, String)]) -> Result<T, SonarError> {
        let url = format!("{}{}", self.server.url.trim_end_matches('/'), path);
        log::debug!("API: {url}?{params:?}");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.server.user, Some(&self.server.password))
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SonarError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    /// Project keys. Only the first 500 projects are returned.
    pub async fn projects_search(&self) -> Result<Vec<String>, SonarError> {
        let page: ProjectsPage = self
            .get("/api/projects/search", &[("ps", MAX_LIST_SIZE.to_string())])
            .await?;
        Ok(unique_keys(page.components))
    }

    pub async fn metrics_search(&self) -> Result<Vec<String>, SonarError> {
        let page: MetricsPage = self
            .get("/api/metrics/search", &[("ps", MAX_LIST_SIZE.to_string())])
            .await?;
        let metrics = unique_keys(page.metrics);
        log::debug!("Metrics retrieved - {metrics:?}");
        Ok(metrics)
    }

    /// Analyses of a project sorted by ascending date.
    pub async fn project_analyses(&self, project: &str) -> Result<Vec<ProjectAnalysis>, SonarError> {
        let page: AnalysesPage = self
            .get("/api/project_analyses/search", &[("project", project.to_string())])
            .await?;

        let mut analyses = page
            .analyses
            .iter()
            .map(|raw| ProjectAnalysis::from_api(project, raw))
            .collect::<Result<Vec<_>, _>>()?;
        analyses.sort_by_key(|analysis| analysis.date);
        Ok(analyses)
    }

    pub async fn measures_search_history(
        &self,
        component: &str,
        metrics: &[String],
    ) -> Result<MeasuresHistory, SonarError> {
        self.get(
            "/api/measures/search_history",
            &[
                ("component", component.to_string()),
                ("metrics", metrics.join(",")),
            ],
        )
        .await
    }

    /// Every issue of a project. The server returns at most `result_cap`
    /// results per filter, so the query is partitioned by creation date: one
    /// paginated query per analysis date.
    pub async fn issues_search(
        &self,
        project: &str,
        analyses: &[ProjectAnalysis],
        query: &IssueQuery,
    ) -> Result<Vec<Issue>, SonarError> {
        let mut result = Vec::new();

        for analysis in analyses {
            let mut page_number = 0u64;
            loop {
                page_number += 1;
                let page: IssuesPage = self
                    .get(
                        "/api/issues/search",
                        &[
                            ("componentKeys", project.to_string()),
                            ("createdAt", analysis.date.to_string()),
                            ("ps", self.page_size.to_string()),
                            ("p", page_number.to_string()),
                            ("languages", query.languages.join(",")),
                            ("resolutions", query.resolutions.join(",")),
                            ("types", query.types.join(",")),
                        ],
                    )
                    .await?;

                if page_number == 1 && page.total > self.result_cap {
                    log::warn!(
                        "{project} {}: {} issues created on {} exceed the {}-result cap; only the first {} are reachable",
                        analysis.version,
                        page.total,
                        analysis.date,
                        self.result_cap,
                        self.result_cap
                    );
                }

                for raw in &page.issues {
                    result.push(Issue::from_api(raw)?);
                }

                let fetched = page_number * self.page_size as u64;
                if page.issues.is_empty() || fetched >= page.total.min(self.result_cap) {
                    break;
                }
            }
        }

        log::info!("{project}: {} issues retrieved", result.len());
        Ok(result)
    }

    /// Measures of a single component; a server `errors` payload (e.g. a file
    /// renamed in later versions) becomes `SonarError::Api`.
    pub async fn measures_component(&self, component: &str, metric_keys: &[String]) -> Result<Vec<Measure>, SonarError> {
        let response: MeasuresComponentResponse = self
            .get(
                "/api/measures/component",
                &[
                    ("component", component.to_string()),
                    ("metricKeys", metric_keys.join(",")),
                ],
            )
            .await?;

        if let Some(error) = response.errors.first() {
            return Err(SonarError::Api(error.msg.clone()));
        }
        response
            .component
            .map(|component| component.measures)
            .ok_or_else(|| SonarError::Api(format!("no measures for {component}")))
    }

    /// File keys (`project:path`) under a component, across all pages.
    pub async fn component_files(&self, component: &str) -> Result<Vec<String>, SonarError> {
        let mut files = Vec::new();
        let mut page_number = 0u64;

        loop {
            page_number += 1;
            let page: ComponentTreePage = self
                .get(
                    "/api/components/tree",
                    &[
                        ("component", component.to_string()),
                        ("ps", self.page_size.to_string()),
                        ("p", page_number.to_string()),
                        ("qualifiers", "FIL".to_string()),
                    ],
                )
                .await?;

            let empty = page.components.is_empty();
            files.extend(page.components.into_iter().map(|entry| entry.key));
            if empty || page_number * self.page_size as u64 >= page.paging.total {
                break;
            }
        }

        Ok(files)
    }
}

const MAX_LIST_SIZE: u32 = 500;

fn unique_keys(entries: Vec<KeyEntry>) -> Vec<String> {
    let mut keys: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        if !keys.contains(&entry.key) {
            keys.push(entry.key);
        }
    }
    keys
}

/// Numeric value of a measure, `None` when absent or not a number.
pub fn measure_value(measures: &[Measure], metric: &str) -> Option<u64> {
    measures
        .iter()
        .find(|m| m.metric == metric)
        .and_then(|m| m.value.as_deref())
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.round() as u64)
}

/// Value of a metric at the given day from a measure history.
pub fn history_value(history: &MeasuresHistory, metric: &str, date: chrono::NaiveDate) -> Option<String> {
    history
        .measures
        .iter()
        .find(|m| m.metric == metric)?
        .history
        .iter()
        .find(|point| crate::models::analysis::parse_sonar_date(&point.date) == Some(date))
        .and_then(|point| point.value.clone())
}
