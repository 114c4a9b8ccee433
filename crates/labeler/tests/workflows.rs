//! End-to-end label workflows against a mocked GitHub API.

use chrono::{DateTime, Duration, TimeZone, Utc};
use config::LabelerConfig;
use labeler::{
    ActivityAggregator, Artifacts, Decision, EventKind, EventRecord, HandlerError, Labeler,
    PrFields,
};
use notify::Notifier;
use scm::GitHubClient;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const REPO: &str = "/repos/acme/widgets";

const SERDE_PATCH_COMMIT: &str = concat!(
    "Bump serde from 1.0.196 to 1.0.197\n\n",
    "---\n",
    "updated-dependencies:\n",
    "- dependency-name: serde\n",
    "  dependency-type: direct:production\n",
    "  update-type: version-update:semver-patch\n",
    "...\n",
);

fn client(server: &MockServer) -> GitHubClient {
    GitHubClient::new("test-token", "acme", "widgets")
        .unwrap()
        .with_base_url(&server.uri())
}

fn config() -> LabelerConfig {
    LabelerConfig {
        repository: "acme/widgets".to_string(),
        accepted_releases: vec!["2.1".to_string(), "2.0".to_string()],
        accepted_backports: vec!["1.9".to_string()],
        ..LabelerConfig::default()
    }
}

fn labeler(server: &MockServer, notifier: Notifier) -> Labeler {
    Labeler::new(client(server), config(), notifier, false)
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
}

fn pr_record(number: u64, action: &str, label: Option<&str>, body: &str) -> EventRecord {
    EventRecord {
        event_type: EventKind::PullRequestTarget,
        issue_number: Some(number),
        repository: "acme/widgets".to_string(),
        action: Some(action.to_string()),
        label: label.map(str::to_string),
        pr: Some(PrFields {
            draft: false,
            body: Some(body.to_string()),
            head_sha: "abc123".to_string(),
            author: Some("octocat".to_string()),
            created_at: at(1, 9),
        }),
        captured_at: Utc::now(),
    }
}

fn pull_json(
    number: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    labels: &[&str],
) -> Value {
    json!({
        "number": number,
        "node_id": format!("PR_node{number}"),
        "draft": false,
        "state": "open",
        "created_at": created_at,
        "updated_at": updated_at,
        "labels": labels.iter().map(|l| json!({ "name": l })).collect::<Vec<_>>(),
        "user": { "login": "octocat" },
        "head": { "sha": "abc123", "ref": "feature" }
    })
}

async fn mount_labels(server: &MockServer, issue: u64, labels: &[&str]) {
    let body: Vec<Value> = labels.iter().map(|l| json!({ "name": l })).collect();
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/issues/{issue}/labels")))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn expect_adds(server: &MockServer, issue: u64, times: u64) {
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/{issue}/labels")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_list(server: &MockServer, endpoint: String, status: u16, body: Value) {
    Mock::given(method("GET"))
        .and(path(endpoint))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .mount(server)
        .await;
}

/// Mount every activity source for `number` with no secondary activity.
async fn mount_quiet_activity(
    server: &MockServer,
    number: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) {
    mount_list(
        server,
        format!("{REPO}/pulls/{number}"),
        200,
        pull_json(number, created_at, updated_at, &[]),
    )
    .await;
    for endpoint in [
        format!("{REPO}/pulls/{number}/commits"),
        format!("{REPO}/issues/{number}/comments"),
        format!("{REPO}/pulls/{number}/comments"),
        format!("{REPO}/pulls/{number}/reviews"),
        format!("{REPO}/issues/{number}/timeline"),
    ] {
        mount_list(server, endpoint, 200, json!([])).await;
    }
}

#[tokio::test]
async fn invalid_release_posts_one_comment_and_adds_no_label() {
    let server = MockServer::start().await;
    mount_labels(&server, 7, &[]).await;
    expect_adds(&server, 7, 0).await;

    Mock::given(method("POST"))
        .and(path(format!("{REPO}/check-runs")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 11, "name": "PR description labels", "status": "in_progress"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(format!("{REPO}/check-runs/11")))
        .and(body_partial_json(json!({ "conclusion": "failure" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 11,
            "name": "PR description labels",
            "status": "completed",
            "conclusion": "failure"
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_list(&server, format!("{REPO}/issues/7/comments"), 200, json!([])).await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/7/comments")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": 99,
            "body": "<!-- labeler:release -->",
            "created_at": "2024-03-01T10:00:00Z",
            "updated_at": "2024-03-01T10:00:00Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = Notifier::for_github(client(&server), "PR description labels");
    let labeler = labeler(&server, notifier);
    let artifacts = Artifacts::capture(pr_record(7, "opened", None, "```yaml\nrelease: 9.9\n```"));

    let outcome = labeler.apply_description(&artifacts).await.unwrap();

    assert_eq!(outcome.validation.failures.len(), 1);
    assert!(outcome.validation.failures[0].message.contains("`2.1`"));
    assert!(outcome.report.added.is_empty());
}

#[tokio::test]
async fn uppercase_boolean_with_comment_adds_feature_branch() {
    let server = MockServer::start().await;
    mount_labels(&server, 8, &[]).await;
    expect_adds(&server, 8, 2).await;

    let labeler = labeler(&server, Notifier::disabled());
    let body = "Description\n\n```yaml\nneeds_feature_branch: TRUE  # comment\n```\n";
    let artifacts = Artifacts::capture(pr_record(8, "edited", None, body));

    let outcome = labeler.apply_description(&artifacts).await.unwrap();

    assert!(outcome.validation.is_valid());
    assert_eq!(outcome.validation.config.needs_feature_branch, Some(true));
    assert_eq!(outcome.report.added, vec!["feature-branch", "triage"]);
}

#[tokio::test]
async fn release_in_description_replaces_triage_with_ready_for_review() {
    let server = MockServer::start().await;
    mount_labels(&server, 9, &["triage"]).await;
    expect_adds(&server, 9, 2).await;
    Mock::given(method("DELETE"))
        .and(path(format!("{REPO}/issues/9/labels/triage")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let labeler = labeler(&server, Notifier::disabled());
    let artifacts =
        Artifacts::capture(pr_record(9, "opened", None, "```yml\nrelease: \"2.1\"\n```"));

    let outcome = labeler.apply_description(&artifacts).await.unwrap();

    assert_eq!(outcome.report.added, vec!["release 2.1", "ready for review"]);
    assert_eq!(outcome.report.removed, vec!["triage"]);
}

#[tokio::test]
async fn backport_only_pull_request_is_left_alone() {
    let server = MockServer::start().await;
    mount_labels(&server, 10, &["backport 1.9"]).await;
    expect_adds(&server, 10, 0).await;

    let labeler = labeler(&server, Notifier::disabled());
    let report = labeler
        .handle_event(pr_record(10, "opened", None, "No config here."))
        .await
        .unwrap();

    assert!(report.is_empty());
}

#[tokio::test]
async fn removing_triage_without_target_re_adds_it() {
    let server = MockServer::start().await;
    mount_labels(&server, 3, &["bug"]).await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/3/labels")))
        .and(body_partial_json(json!({ "labels": ["triage"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let record = EventRecord {
        event_type: EventKind::Issues,
        issue_number: Some(3),
        repository: "acme/widgets".to_string(),
        action: Some("unlabeled".to_string()),
        label: Some("triage".to_string()),
        pr: None,
        captured_at: Utc::now(),
    };

    let report = labeler(&server, Notifier::disabled())
        .handle_event(record)
        .await
        .unwrap();
    assert_eq!(report.added, vec!["triage"]);
}

#[tokio::test]
async fn aggregator_falls_back_to_creation_time() {
    let server = MockServer::start().await;
    let created = at(1, 9);
    mount_list(
        &server,
        format!("{REPO}/pulls/12"),
        200,
        pull_json(12, created, at(5, 0), &[]),
    )
    .await;
    for endpoint in [
        format!("{REPO}/pulls/12/commits"),
        format!("{REPO}/issues/12/comments"),
        format!("{REPO}/pulls/12/comments"),
        format!("{REPO}/pulls/12/reviews"),
        format!("{REPO}/issues/12/timeline"),
    ] {
        mount_list(&server, endpoint, 500, json!({ "message": "boom" })).await;
    }

    let client = client(&server);
    let pr: scm::PullRequest =
        serde_json::from_value(pull_json(12, created, at(5, 0), &[])).unwrap();
    let report = ActivityAggregator::new(&client).last_activity(&pr).await;

    assert_eq!(report.last_activity, created);
    assert!(report.used_creation_time());
}

#[tokio::test]
async fn aggregator_takes_newest_source() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        format!("{REPO}/pulls/13"),
        200,
        pull_json(13, at(1, 9), at(2, 0), &[]),
    )
    .await;
    mount_list(
        &server,
        format!("{REPO}/pulls/13/commits"),
        200,
        json!([{ "sha": "a", "commit": { "message": "m", "committer": { "date": at(3, 0) } } }]),
    )
    .await;
    mount_list(
        &server,
        format!("{REPO}/pulls/13/reviews"),
        200,
        json!([{ "id": 1, "state": "COMMENTED", "submitted_at": at(4, 6) }]),
    )
    .await;
    mount_list(
        &server,
        format!("{REPO}/issues/13/timeline"),
        200,
        json!([
            { "event": "labeled", "created_at": at(4, 1) },
            { "event": "commented", "created_at": at(6, 0) }
        ]),
    )
    .await;
    mount_list(
        &server,
        format!("{REPO}/issues/13/comments"),
        500,
        json!({ "message": "boom" }),
    )
    .await;
    mount_list(&server, format!("{REPO}/pulls/13/comments"), 200, json!([])).await;

    let client = client(&server);
    let pr: scm::PullRequest =
        serde_json::from_value(pull_json(13, at(1, 9), at(2, 0), &[])).unwrap();
    let report = ActivityAggregator::new(&client).last_activity(&pr).await;

    assert_eq!(report.last_activity, at(4, 6));
    assert!(!report.used_creation_time());
}

#[tokio::test]
async fn stale_sweep_marks_only_inactive_ready_pulls() {
    let server = MockServer::start().await;
    let now = at(10, 12);

    let mut draft = pull_json(1, at(1, 0), at(1, 0), &[]);
    draft["draft"] = json!(true);
    mount_list(
        &server,
        format!("{REPO}/pulls"),
        200,
        json!([
            draft,
            pull_json(2, at(1, 0), at(1, 0), &["stale"]),
            pull_json(3, at(1, 0), at(2, 0), &[]),
            pull_json(4, at(1, 0), at(10, 6), &[]),
        ]),
    )
    .await;
    mount_quiet_activity(&server, 3, at(1, 0), at(2, 0)).await;
    mount_quiet_activity(&server, 4, at(1, 0), at(10, 6)).await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/3/labels")))
        .and(body_partial_json(json!({ "labels": ["stale"] })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;
    expect_adds(&server, 4, 0).await;

    let report = labeler(&server, Notifier::disabled())
        .sweep_stale(now)
        .await
        .unwrap();

    assert_eq!(report.examined, 4);
    assert_eq!(report.skipped_draft, 1);
    assert_eq!(report.skipped_labeled, 1);
    assert_eq!(report.active, 1);
    assert_eq!(report.marked, vec![3]);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn stale_sweep_aborts_on_permission_error() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        format!("{REPO}/pulls"),
        200,
        json!([pull_json(5, at(1, 0), at(1, 0), &[])]),
    )
    .await;
    mount_quiet_activity(&server, 5, at(1, 0), at(1, 0)).await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/5/labels")))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "Resource not accessible by integration" })),
        )
        .mount(&server)
        .await;

    let err = labeler(&server, Notifier::disabled())
        .sweep_stale(at(10, 0))
        .await
        .unwrap_err();
    assert!(err.is_permission());
}

#[tokio::test]
async fn stale_sweep_records_failures_and_continues() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        format!("{REPO}/pulls"),
        200,
        json!([
            pull_json(6, at(1, 0), at(1, 0), &[]),
            pull_json(7, at(1, 0), at(1, 0), &[]),
        ]),
    )
    .await;
    mount_quiet_activity(&server, 6, at(1, 0), at(1, 0)).await;
    mount_quiet_activity(&server, 7, at(1, 0), at(1, 0)).await;

    // #6: the add is rejected and the label is still absent afterwards.
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/issues/6/labels")))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "Validation Failed" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_labels(&server, 6, &[]).await;
    expect_adds(&server, 7, 1).await;

    let report = labeler(&server, Notifier::disabled())
        .sweep_stale(at(10, 0))
        .await
        .unwrap();

    assert_eq!(report.marked, vec![7]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, 6);
    assert!(report.failed[0].1.contains("not defined"));
}

#[tokio::test]
async fn forbidden_label_read_is_reported_as_permission_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("{REPO}/issues/4/labels")))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(json!({ "message": "Resource not accessible by integration" })),
        )
        .mount(&server)
        .await;

    let record = EventRecord {
        event_type: EventKind::Issues,
        issue_number: Some(4),
        repository: "acme/widgets".to_string(),
        action: Some("opened".to_string()),
        label: None,
        pr: None,
        captured_at: Utc::now(),
    };

    let err = labeler(&server, Notifier::disabled())
        .handle_event(record)
        .await
        .unwrap_err();

    match err {
        HandlerError::Reconcile(e) => {
            assert!(e.is_permission());
            assert!(e.to_string().contains("issues: write"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn dependabot_patch_update_is_approved_and_queued() {
    let server = MockServer::start().await;
    let mut pull = pull_json(20, at(1, 0), at(1, 0), &[]);
    pull["user"] = json!({ "login": "dependabot[bot]" });
    mount_list(&server, format!("{REPO}/pulls/20"), 200, pull).await;
    mount_list(
        &server,
        format!("{REPO}/pulls/20/commits"),
        200,
        json!([{
            "sha": "d1",
            "commit": {
                "message": SERDE_PATCH_COMMIT
            }
        }]),
    )
    .await;
    Mock::given(method("POST"))
        .and(path(format!("{REPO}/pulls/20/reviews")))
        .and(body_partial_json(json!({ "event": "APPROVE" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "id": "PR_node20", "method": "SQUASH" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "enablePullRequestAutoMerge": { "pullRequest": { "number": 20 } } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let decision = labeler(&server, Notifier::disabled())
        .auto_merge(20)
        .await
        .unwrap();
    assert_eq!(decision, Decision::Merge);
}

#[tokio::test]
async fn non_dependabot_pull_is_skipped() {
    let server = MockServer::start().await;
    mount_list(
        &server,
        format!("{REPO}/pulls/21"),
        200,
        pull_json(21, at(1, 0), at(1, 0), &[]),
    )
    .await;

    let decision = labeler(&server, Notifier::disabled())
        .auto_merge(21)
        .await
        .unwrap();
    assert!(matches!(decision, Decision::Skip(_)));
}

#[test]
fn artifacts_expire_after_retention_window() {
    let dir = tempfile::tempdir().unwrap();
    let record = pr_record(30, "opened", None, "```yaml\nbackport: 1.9\n```");
    let captured = record.captured_at;
    Artifacts::capture(record).save(dir.path()).unwrap();

    let retention = config().artifact_retention_days;
    assert!(Artifacts::load(dir.path(), retention, captured + Duration::hours(12)).is_ok());
    assert!(Artifacts::load(dir.path(), retention, captured + Duration::days(2)).is_err());
}
