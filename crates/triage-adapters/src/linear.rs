//! Deployed issues from the Linear GraphQL API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use triage_core::config::ALL_PROJECTS;
use triage_core::{DataFetchPort, FetchedItem, PortResult, Source, TimeWindow};

use crate::config::{credential, LinearConfig};
use crate::error::{AdapterError, Result};

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<IssuesData>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct IssuesData {
    issues: Connection<Issue>,
}

#[derive(Debug, Deserialize)]
struct Connection<T> {
    nodes: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Issue {
    id: String,
    #[serde(default)]
    identifier: Option<String>,
    title: String,
    #[serde(default)]
    description: Option<String>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    labels: Option<Connection<Label>>,
    #[serde(default)]
    project: Option<Project>,
}

#[derive(Debug, Deserialize)]
struct Label {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Project {
    name: String,
}

/// Feature-history source: issues moved to the deployed workflow state.
///
/// Targets are project names; a target of `"*"` searches every project.
pub struct LinearFetcher {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    deployed_state: String,
    page_size: u32,
}

impl LinearFetcher {
    /// Build a fetcher, reading the API key from `config.token_env`.
    pub fn new(config: &LinearConfig) -> Result<Self> {
        let api_key = credential(&config.token_env)?;
        Self::with_key(config, api_key)
    }

    pub fn with_key(config: &LinearConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.into(),
            deployed_state: config.deployed_state.clone(),
            page_size: config.page_size,
        })
    }

    async fn deployed_issues(&self, body: &Value) -> Result<Vec<Issue>> {
        let response = self
            .http
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                service: "linear",
                status,
                body,
            });
        }
        let payload: GraphqlResponse = response.json().await?;
        into_issues(payload)
    }
}

/// Request body for deployed issues updated since `since`. `projects` of
/// `None` leaves the project filter out entirely.
pub(crate) fn issues_query(
    deployed_state: &str,
    since: DateTime<Utc>,
    projects: Option<&[String]>,
    first: u32,
) -> Value {
    let (params, project_filter) = match projects {
        Some(_) => (", $projects: [String!]", ", project: { name: { in: $projects } }"),
        None => ("", ""),
    };
    let query = format!(
        "query DeployedIssues($state: String!, $since: DateTimeOrDuration!{params}) {{
  issues(
    filter: {{ state: {{ name: {{ eq: $state }} }}, updatedAt: {{ gte: $since }}{project_filter} }}
    first: {first}
  ) {{
    nodes {{
      id
      identifier
      title
      description
      updatedAt
      url
      labels {{ nodes {{ name }} }}
      project {{ name }}
    }}
  }}
}}"
    );

    let mut variables = json!({
        "state": deployed_state,
        "since": since.to_rfc3339(),
    });
    if let Some(projects) = projects {
        variables["projects"] = json!(projects);
    }
    json!({ "query": query, "variables": variables })
}

fn into_issues(payload: GraphqlResponse) -> Result<Vec<Issue>> {
    if let Some(errors) = payload.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
        return Err(AdapterError::Graphql(messages.join("; ")));
    }
    payload
        .data
        .map(|d| d.issues.nodes)
        .ok_or_else(|| AdapterError::decode("linear response", "neither data nor errors"))
}

pub(crate) fn to_item(issue: Issue) -> FetchedItem {
    let labels: Vec<String> = issue
        .labels
        .map(|l| l.nodes.into_iter().map(|n| n.name).collect())
        .unwrap_or_default();
    let mut summary = issue.description.unwrap_or_default().trim().to_string();
    if let Some(project) = issue.project {
        summary = format!("[{}] {summary}", project.name);
    }
    if !labels.is_empty() {
        summary.push_str(&format!(" (labels: {})", labels.join(", ")));
    }

    let id = issue.identifier.unwrap_or(issue.id);
    let mut item =
        FetchedItem::new(Source::FeatureHistory, id, issue.title, issue.updated_at).with_summary(summary);
    item.url = issue.url;
    item
}

#[async_trait]
impl DataFetchPort for LinearFetcher {
    async fn fetch(
        &self,
        targets: &[String],
        window_days: u32,
        as_of: DateTime<Utc>,
    ) -> PortResult<Vec<FetchedItem>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        let window = TimeWindow::ending_at(as_of, window_days);
        let projects = if targets.iter().any(|t| t == ALL_PROJECTS) {
            None
        } else {
            Some(targets)
        };
        let body = issues_query(&self.deployed_state, window.since, projects, self.page_size);

        let issues = self.deployed_issues(&body).await?;
        let items: Vec<FetchedItem> = issues
            .into_iter()
            .map(to_item)
            .filter(|item| window.contains(item.timestamp))
            .collect();
        debug!(deployed = items.len(), window_days, "fetched deployed issues");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn since() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 23, 9, 0, 0).unwrap()
    }

    #[test]
    fn project_filter_is_optional() {
        let projects = vec!["ENG".to_string(), "INFRA".to_string()];
        let filtered = issues_query("Deployed to Prod", since(), Some(projects.as_slice()), 100);
        let query = filtered["query"].as_str().unwrap();
        assert!(query.contains("project: { name: { in: $projects } }"));
        assert!(query.contains("first: 100"));
        assert_eq!(filtered["variables"]["projects"], json!(["ENG", "INFRA"]));
        assert_eq!(filtered["variables"]["state"], "Deployed to Prod");

        let all = issues_query("Deployed to Prod", since(), None, 50);
        assert!(!all["query"].as_str().unwrap().contains("$projects"));
        assert!(all["variables"].get("projects").is_none());
    }

    #[test]
    fn graphql_errors_fail_the_fetch() {
        let payload: GraphqlResponse = serde_json::from_value(json!({
            "data": null,
            "errors": [{"message": "Argument Validation Error"}, {"message": "bad filter"}]
        }))
        .unwrap();
        let err = into_issues(payload).unwrap_err();
        assert_eq!(
            err.to_string(),
            "GraphQL errors: Argument Validation Error; bad filter"
        );
    }

    #[test]
    fn issue_becomes_feature_item() {
        let payload: GraphqlResponse = serde_json::from_value(json!({
            "data": {"issues": {"nodes": [{
                "id": "9f1c",
                "identifier": "ENG-7",
                "title": "New pricing page",
                "description": "Ships the redesigned pricing page ",
                "updatedAt": "2026-01-24T09:00:00.000Z",
                "url": "https://linear.app/acme/issue/ENG-7",
                "labels": {"nodes": [{"name": "frontend"}, {"name": "launch"}]},
                "project": {"name": "ENG"}
            }]}}
        }))
        .unwrap();
        let mut issues = into_issues(payload).unwrap();
        let item = to_item(issues.remove(0));
        assert_eq!(item.id, "ENG-7");
        assert_eq!(item.source, Source::FeatureHistory);
        assert_eq!(
            item.summary.as_deref(),
            Some("[ENG] Ships the redesigned pricing page (labels: frontend, launch)")
        );
        assert_eq!(item.timestamp, Utc.with_ymd_and_hms(2026, 1, 24, 9, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn no_targets_makes_no_requests() {
        let config = LinearConfig {
            api_url: "http://127.0.0.1:9/graphql".to_string(),
            ..LinearConfig::default()
        };
        let fetcher = LinearFetcher::with_key(&config, "key").unwrap();
        assert!(fetcher.fetch(&[], 7, Utc::now()).await.unwrap().is_empty());
    }
}
