//! # GitHub REST client
//!
//! Thin async wrapper over the GitHub REST API for the operations the
//! labeler needs: issue labels, issue comments, check runs and the pull
//! request activity endpoints. Status codes that callers act on (403, 404,
//! 422) are surfaced as distinct [`GitHubError`] variants.

use crate::error::GitHubError;
use crate::types::{
    CheckConclusion, CheckOutput, CheckRun, Commit, IssueComment, Label, PullRequest, Review,
    ReviewComment, TimelineEvent,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Default public GitHub API endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

const PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// GitHub API client scoped to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    owner: String,
    repo: String,
}

impl GitHubClient {
    /// Create a client for `owner/repo`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: &str, owner: &str, repo: &str) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-labeler/1.0"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: GITHUB_API_URL.to_string(),
            token: token.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Create a client from an `owner/repo` string.
    ///
    /// # Errors
    /// Returns an error if `repository` is malformed or the HTTP client
    /// cannot be built.
    pub fn from_repository(token: &str, repository: &str) -> Result<Self, GitHubError> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| GitHubError::InvalidRepository(repository.to_string()))?;
        Self::new(token, owner, repo)
    }

    /// Point the client at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}{path}", self.base_url, self.owner, self.repo)
    }

    fn graphql_url(&self) -> String {
        match self.base_url.strip_suffix("/api/v3") {
            Some(host) => format!("{host}/api/graphql"),
            None => format!("{}/graphql", self.base_url),
        }
    }

    // ------------------------------------------------------------------
    // Labels
    // ------------------------------------------------------------------

    /// Get all label names on an issue or pull request.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(issue = %issue))]
    pub async fn get_labels(&self, issue: u64) -> Result<Vec<String>, GitHubError> {
        let labels: Vec<Label> = self
            .get_paginated(&format!("/issues/{issue}/labels"))
            .await?;
        let names: Vec<String> = labels.into_iter().map(|l| l.name).collect();
        debug!("Retrieved {} labels for #{}", names.len(), issue);
        Ok(names)
    }

    /// Add labels to an issue or pull request.
    ///
    /// # Errors
    /// Returns [`GitHubError::PermissionDenied`] on 403 and
    /// [`GitHubError::Unprocessable`] on 422.
    #[instrument(skip(self), fields(issue = %issue, labels = ?labels))]
    pub async fn add_labels(&self, issue: u64, labels: &[String]) -> Result<(), GitHubError> {
        if labels.is_empty() {
            return Ok(());
        }

        let body = serde_json::json!({ "labels": labels });
        self.send(
            Method::POST,
            &self.repo_url(&format!("/issues/{issue}/labels")),
            Some(&body),
        )
        .await?;

        info!("Added {} labels to #{}", labels.len(), issue);
        Ok(())
    }

    /// Remove a label from an issue or pull request. A label that is not
    /// present is treated as already removed.
    ///
    /// # Errors
    /// Returns an error for any failure other than 404.
    #[instrument(skip(self), fields(issue = %issue, label = %label))]
    pub async fn remove_label(&self, issue: u64, label: &str) -> Result<(), GitHubError> {
        let url = self.repo_url(&format!(
            "/issues/{issue}/labels/{}",
            urlencoding::encode(label)
        ));

        match self.send(Method::DELETE, &url, None).await {
            Ok(_) => {
                debug!("Removed label '{}' from #{}", label, issue);
                Ok(())
            }
            Err(GitHubError::NotFound { .. }) => {
                debug!("Label '{}' not found on #{} (already removed)", label, issue);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Comments
    // ------------------------------------------------------------------

    /// List conversation comments on an issue or pull request.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_comments(&self, issue: u64) -> Result<Vec<IssueComment>, GitHubError> {
        self.get_paginated(&format!("/issues/{issue}/comments")).await
    }

    /// Post a comment.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self, body), fields(issue = %issue))]
    pub async fn create_comment(
        &self,
        issue: u64,
        body: &str,
    ) -> Result<IssueComment, GitHubError> {
        let payload = serde_json::json!({ "body": body });
        let response = self
            .send(
                Method::POST,
                &self.repo_url(&format!("/issues/{issue}/comments")),
                Some(&payload),
            )
            .await?;
        let comment: IssueComment = response.json().await?;
        debug!(comment_id = comment.id, "Posted comment on #{}", issue);
        Ok(comment)
    }

    /// Delete a comment by id.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn delete_comment(&self, comment_id: u64) -> Result<(), GitHubError> {
        self.send(
            Method::DELETE,
            &self.repo_url(&format!("/issues/comments/{comment_id}")),
            None,
        )
        .await?;
        debug!(comment_id, "Deleted comment");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Check runs
    // ------------------------------------------------------------------

    /// Create an in-progress check run on `head_sha`.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(name = %name, head_sha = %head_sha))]
    pub async fn create_check_run(
        &self,
        name: &str,
        head_sha: &str,
    ) -> Result<CheckRun, GitHubError> {
        let payload = serde_json::json!({
            "name": name,
            "head_sha": head_sha,
            "status": "in_progress",
        });
        let response = self
            .send(Method::POST, &self.repo_url("/check-runs"), Some(&payload))
            .await?;
        Ok(response.json().await?)
    }

    /// Mark a check run completed.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self, output), fields(check_run_id = %check_run_id))]
    pub async fn complete_check_run(
        &self,
        check_run_id: u64,
        conclusion: CheckConclusion,
        output: &CheckOutput,
    ) -> Result<CheckRun, GitHubError> {
        let payload = serde_json::json!({
            "status": "completed",
            "conclusion": conclusion,
            "output": output,
        });
        let response = self
            .send(
                Method::PATCH,
                &self.repo_url(&format!("/check-runs/{check_run_id}")),
                Some(&payload),
            )
            .await?;
        Ok(response.json().await?)
    }

    // ------------------------------------------------------------------
    // Pull requests and activity sources
    // ------------------------------------------------------------------

    /// Fetch a single pull request.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn get_pull(&self, number: u64) -> Result<PullRequest, GitHubError> {
        let response = self
            .send(Method::GET, &self.repo_url(&format!("/pulls/{number}")), None)
            .await?;
        Ok(response.json().await?)
    }

    /// List open pull requests.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_open_pulls(&self) -> Result<Vec<PullRequest>, GitHubError> {
        self.get_paginated("/pulls?state=open").await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_commits(&self, number: u64) -> Result<Vec<Commit>, GitHubError> {
        self.get_paginated(&format!("/pulls/{number}/commits")).await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_review_comments(
        &self,
        number: u64,
    ) -> Result<Vec<ReviewComment>, GitHubError> {
        self.get_paginated(&format!("/pulls/{number}/comments")).await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_reviews(&self, number: u64) -> Result<Vec<Review>, GitHubError> {
        self.get_paginated(&format!("/pulls/{number}/reviews")).await
    }

    /// # Errors
    /// Returns an error if the request fails.
    pub async fn list_timeline(&self, issue: u64) -> Result<Vec<TimelineEvent>, GitHubError> {
        self.get_paginated(&format!("/issues/{issue}/timeline")).await
    }

    /// Submit an approving review.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    #[instrument(skip(self, body), fields(pr = %number))]
    pub async fn approve_pull(&self, number: u64, body: &str) -> Result<(), GitHubError> {
        let payload = serde_json::json!({ "event": "APPROVE", "body": body });
        self.send(
            Method::POST,
            &self.repo_url(&format!("/pulls/{number}/reviews")),
            Some(&payload),
        )
        .await?;
        info!("Approved PR #{}", number);
        Ok(())
    }

    /// Enable auto-merge on a pull request by its GraphQL node id.
    ///
    /// # Errors
    /// Returns [`GitHubError::GraphQl`] if the mutation reports errors.
    #[instrument(skip(self), fields(node_id = %node_id, merge_method = %merge_method))]
    pub async fn enable_auto_merge(
        &self,
        node_id: &str,
        merge_method: &str,
    ) -> Result<(), GitHubError> {
        let query = "mutation($id: ID!, $method: PullRequestMergeMethod!) { \
                     enablePullRequestAutoMerge(input: {pullRequestId: $id, mergeMethod: $method}) \
                     { pullRequest { number } } }";
        let payload = serde_json::json!({
            "query": query,
            "variables": { "id": node_id, "method": merge_method },
        });

        let response = self
            .send(Method::POST, &self.graphql_url(), Some(&payload))
            .await?;
        let result: GraphQlResponse = response.json().await?;

        if let Some(first) = result.errors.first() {
            return Err(GitHubError::GraphQl(first.message.clone()));
        }
        info!("Enabled auto-merge");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Transport
    // ------------------------------------------------------------------

    /// Fetch every page of a list endpoint, stopping at the first short page.
    async fn get_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GitHubError> {
        let separator = if path.contains('?') { '&' } else { '?' };
        let mut items = Vec::new();
        let mut page = 1_u32;

        loop {
            let url = self.repo_url(&format!("{path}{separator}per_page={PER_PAGE}&page={page}"));
            let response = self.send(Method::GET, &url, None).await?;
            let batch: Vec<T> = response.json().await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                debug!(path, pages = page, items = items.len(), "Fetched all pages");
                return Ok(items);
            }
            page += 1;
        }
    }

    /// Send an authenticated request and map error statuses.
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Response, GitHubError> {
        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token));

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        Err(Self::error_from(response).await)
    }

    async fn error_from(response: Response) -> GitHubError {
        let status = response.status().as_u16();
        let rate_limited = response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|h| h.to_str().ok())
            .is_some_and(|v| v == "0");
        let reset_in = Self::get_rate_limit_reset(&response);

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|e| e.message)
            .unwrap_or(text);

        match status {
            401 => GitHubError::AuthenticationFailed(message),
            403 | 429 if rate_limited || status == 429 => GitHubError::RateLimitExceeded {
                reset_in: reset_in.unwrap_or(Duration::from_secs(60)),
            },
            403 => GitHubError::PermissionDenied { message },
            404 => GitHubError::NotFound { message },
            422 => GitHubError::Unprocessable { message },
            _ => GitHubError::Api { status, message },
        }
    }

    /// Extract rate limit reset time from response
    fn get_rate_limit_reset(response: &Response) -> Option<Duration> {
        response
            .headers()
            .get("x-ratelimit-reset")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<i64>().ok())
            .map(|reset_timestamp| {
                let now = chrono::Utc::now().timestamp();
                #[allow(clippy::cast_sign_loss)]
                let seconds_until_reset = (reset_timestamp - now).max(0) as u64;
                Duration::from_secs(seconds_until_reset)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> GitHubClient {
        GitHubClient::new("test-token", "acme", "widgets")
            .unwrap()
            .with_base_url(&server.uri())
    }

    #[test]
    fn test_from_repository() {
        let client = GitHubClient::from_repository("t", "acme/widgets").unwrap();
        assert_eq!(
            client.repo_url("/pulls"),
            "https://api.github.com/repos/acme/widgets/pulls"
        );
        assert!(GitHubClient::from_repository("t", "acme").is_err());
        assert!(GitHubClient::from_repository("t", "acme/widgets/extra").is_err());
    }

    #[test]
    fn test_graphql_url() {
        let public = GitHubClient::new("t", "a", "b").unwrap();
        assert_eq!(public.graphql_url(), "https://api.github.com/graphql");

        let enterprise = public.with_base_url("https://ghe.example.com/api/v3");
        assert_eq!(enterprise.graphql_url(), "https://ghe.example.com/api/graphql");
    }

    #[tokio::test]
    async fn test_get_labels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/7/labels"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "name": "triage" },
                { "name": "release 2.1" }
            ])))
            .mount(&server)
            .await;

        let labels = client(&server).await.get_labels(7).await.unwrap();
        assert_eq!(labels, vec!["triage", "release 2.1"]);
    }

    #[tokio::test]
    async fn test_add_labels_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/1/labels"))
            .and(body_json(serde_json::json!({ "labels": ["triage"] })))
            .respond_with(
                ResponseTemplate::new(403).set_body_json(
                    serde_json::json!({ "message": "Resource not accessible by integration" }),
                ),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/2/labels"))
            .respond_with(
                ResponseTemplate::new(422)
                    .set_body_json(serde_json::json!({ "message": "Validation Failed" })),
            )
            .mount(&server)
            .await;

        let client = client(&server).await;
        let err = client.add_labels(1, &["triage".to_string()]).await.unwrap_err();
        assert!(matches!(
            err,
            GitHubError::PermissionDenied { ref message } if message.contains("not accessible")
        ));

        let err = client.add_labels(2, &["triage".to_string()]).await.unwrap_err();
        assert_eq!(err.status(), Some(422));
    }

    #[tokio::test]
    async fn test_rate_limited_403_is_not_permission_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/acme/widgets/issues/1/labels"))
            .respond_with(
                ResponseTemplate::new(403)
                    .insert_header("x-ratelimit-remaining", "0")
                    .set_body_json(serde_json::json!({ "message": "API rate limit exceeded" })),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .add_labels(1, &["triage".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::RateLimitExceeded { .. }));
    }

    #[tokio::test]
    async fn test_remove_label_encodes_name_and_ignores_404() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repos/acme/widgets/issues/3/labels/ready%20for%20review"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_json(serde_json::json!({ "message": "Label does not exist" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .await
            .remove_label(3, "ready for review")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pagination_follows_full_pages() {
        let server = MockServer::start().await;
        let full_page: Vec<serde_json::Value> = (0..100)
            .map(|i| serde_json::json!({ "event": "commented", "created_at": null, "id": i }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/5/timeline"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/issues/5/timeline"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "event": "labeled", "created_at": "2024-03-01T10:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let events = client(&server).await.list_timeline(5).await.unwrap();
        assert_eq!(events.len(), 101);
        assert!(events[100].is_label_change());
    }

    #[tokio::test]
    async fn test_pagination_is_not_capped() {
        let server = MockServer::start().await;
        for page in 1..=12 {
            let full_page: Vec<serde_json::Value> = (0..100)
                .map(|i| {
                    serde_json::json!({
                        "number": page * 1000 + i,
                        "created_at": "2024-03-01T10:00:00Z",
                        "updated_at": "2024-03-01T10:00:00Z",
                        "head": { "sha": "abc", "ref": "feature" }
                    })
                })
                .collect();
            Mock::given(method("GET"))
                .and(path("/repos/acme/widgets/pulls"))
                .and(query_param("state", "open"))
                .and(query_param("page", page.to_string()))
                .respond_with(ResponseTemplate::new(200).set_body_json(full_page))
                .mount(&server)
                .await;
        }
        Mock::given(method("GET"))
            .and(path("/repos/acme/widgets/pulls"))
            .and(query_param("page", "13"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let pulls = client(&server).await.list_open_pulls().await.unwrap();
        assert_eq!(pulls.len(), 1200);
        assert_eq!(pulls[1199].number, 12099);
    }

    #[tokio::test]
    async fn test_enable_auto_merge_reports_graphql_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "Auto merge is not allowed for this repository" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .enable_auto_merge("PR_kwDO", "SQUASH")
            .await
            .unwrap_err();
        assert!(matches!(err, GitHubError::GraphQl(ref m) if m.contains("not allowed")));
    }
}
