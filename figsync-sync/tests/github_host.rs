//! `GitHubHost` request shapes and status mapping against a mock API.

use std::time::Duration;

use mockito::{Matcher, Server};

use figsync_sync::host::{ChangeRequestRef, NewChangeRequest, TreeChange};
use figsync_sync::{GitHubHost, HostError, VcsHost};

fn host(url: &str) -> GitHubHost {
    GitHubHost::new(url, "acme", "web", "ghp_test", Duration::from_secs(5)).expect("host")
}

fn pull(number: u64, head: &str) -> String {
    format!(
        r#"{{"number":{number},"html_url":"https://github.test/acme/web/pull/{number}","title":"t","head":{{"ref":"{head}"}},"base":{{"ref":"main"}}}}"#
    )
}

#[tokio::test]
async fn branch_head_sends_auth_and_reads_sha() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/repos/acme/web/git/ref/heads/main")
        .match_header("authorization", "Bearer ghp_test")
        .match_header("x-github-api-version", "2022-11-28")
        .match_header("accept", "application/vnd.github+json")
        .with_status(200)
        .with_body(r#"{"ref":"refs/heads/main","object":{"sha":"abc123","type":"commit"}}"#)
        .create_async()
        .await;

    let head = host(&server.url()).branch_head("main").await.unwrap();
    assert_eq!(head.as_deref(), Some("abc123"));
    mock.assert_async().await;
}

#[tokio::test]
async fn missing_branch_is_none() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/web/git/ref/heads/gone")
        .with_status(404)
        .with_body(r#"{"message":"Not Found"}"#)
        .create_async()
        .await;
    assert_eq!(host(&server.url()).branch_head("gone").await.unwrap(), None);
}

#[tokio::test]
async fn read_tree_is_recursive_and_keeps_blobs_only() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/web/git/trees/T1")
        .match_query(Matcher::UrlEncoded("recursive".into(), "1".into()))
        .with_status(200)
        .with_body(
            r#"{"sha":"T1","truncated":false,"tree":[
                {"path":"src","mode":"040000","type":"tree","sha":"T2"},
                {"path":"src/a.ts","mode":"100644","type":"blob","sha":"B1"}
            ]}"#,
        )
        .create_async()
        .await;

    let entries = host(&server.url()).read_tree("T1").await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, "src/a.ts");
    assert_eq!(entries[0].sha, "B1");
}

#[tokio::test]
async fn tree_deletions_are_sent_as_null_sha() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/acme/web/git/trees")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""base_tree":"BASE""#.into()),
            Matcher::Regex(r#""path":"gone.ts""#.into()),
            Matcher::Regex(r#""sha":null"#.into()),
            Matcher::Regex(r#""sha":"B9""#.into()),
        ]))
        .with_status(201)
        .with_body(r#"{"sha":"T9"}"#)
        .create_async()
        .await;

    let tree = host(&server.url())
        .create_tree(
            "BASE",
            &[
                TreeChange { path: "new.ts".into(), sha: Some("B9".into()) },
                TreeChange { path: "gone.ts".into(), sha: None },
            ],
        )
        .await
        .unwrap();
    assert_eq!(tree, "T9");
    mock.assert_async().await;
}

#[tokio::test]
async fn commit_has_exactly_one_parent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/repos/acme/web/git/commits")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "message": "sync",
            "tree": "T9",
            "parents": ["P1"]
        })))
        .with_status(201)
        .with_body(r#"{"sha":"C1"}"#)
        .create_async()
        .await;
    let commit = host(&server.url())
        .create_commit("sync", "T9", "P1")
        .await
        .unwrap();
    assert_eq!(commit, "C1");
    mock.assert_async().await;
}

#[tokio::test]
async fn existing_ref_is_a_conflict() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/web/git/refs")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "ref": "refs/heads/figsync/doc/1"
        })))
        .with_status(422)
        .with_body(r#"{"message":"Reference already exists"}"#)
        .create_async()
        .await;
    let err = host(&server.url())
        .create_branch("figsync/doc/1", "C1")
        .await
        .unwrap_err();
    assert!(matches!(err, HostError::Conflict { .. }), "{err}");
}

#[tokio::test]
async fn forbidden_is_permission_denied_unless_rate_limited() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/web/git/blobs")
        .match_body(Matcher::PartialJson(serde_json::json!({"content": "denied"})))
        .with_status(403)
        .with_body(r#"{"message":"Resource not accessible by integration"}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/repos/acme/web/git/blobs")
        .match_body(Matcher::PartialJson(serde_json::json!({"content": "limited"})))
        .with_status(403)
        .with_header("x-ratelimit-remaining", "0")
        .with_body(r#"{"message":"API rate limit exceeded"}"#)
        .create_async()
        .await;

    let gh = host(&server.url());
    let denied = gh.create_blob("denied").await.unwrap_err();
    assert!(matches!(denied, HostError::PermissionDenied { .. }), "{denied}");
    let limited = gh.create_blob("limited").await.unwrap_err();
    assert!(matches!(limited, HostError::Unavailable { .. }), "{limited}");
}

#[tokio::test]
async fn server_errors_are_unavailable() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/repos/acme/web")
        .with_status(502)
        .create_async()
        .await;
    let err = host(&server.url()).default_branch().await.unwrap_err();
    assert!(matches!(err, HostError::Unavailable { .. }), "{err}");
}

#[tokio::test]
async fn find_open_picks_newest_in_namespace() {
    let mut server = Server::new_async().await;
    let body = format!(
        "[{},{},{}]",
        pull(3, "figsync/doc/a"),
        pull(7, "figsync/doc/b"),
        pull(9, "feature/unrelated")
    );
    server
        .mock("GET", "/repos/acme/web/pulls")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("state".into(), "open".into()),
            Matcher::UrlEncoded("base".into(), "main".into()),
        ]))
        .with_status(200)
        .with_body(body)
        .create_async()
        .await;

    let found = host(&server.url())
        .find_open_change_request("figsync/doc/", "main")
        .await
        .unwrap()
        .expect("request");
    assert_eq!(found.number, 7);
    assert_eq!(found.head, "figsync/doc/b");
}

#[tokio::test]
async fn update_supersedes_and_closes_the_old_request() {
    let mut server = Server::new_async().await;
    let open = server
        .mock("POST", "/repos/acme/web/pulls")
        .match_body(Matcher::AllOf(vec![
            Matcher::PartialJson(serde_json::json!({"head": "figsync/doc/2", "base": "main"})),
            Matcher::Regex("Supersedes #3".into()),
        ]))
        .with_status(201)
        .with_body(pull(4, "figsync/doc/2"))
        .expect(1)
        .create_async()
        .await;
    let close = server
        .mock("PATCH", "/repos/acme/web/pulls/3")
        .match_body(Matcher::PartialJson(serde_json::json!({"state": "closed"})))
        .with_status(200)
        .with_body(pull(3, "figsync/doc/1"))
        .expect(1)
        .create_async()
        .await;
    let delete_old = server
        .mock("DELETE", "/repos/acme/web/git/refs/heads/figsync/doc/1")
        .with_status(204)
        .expect(1)
        .create_async()
        .await;

    let existing = ChangeRequestRef {
        number: 3,
        url: "https://github.test/acme/web/pull/3".into(),
        head: "figsync/doc/1".into(),
        base: "main".into(),
        title: "old".into(),
    };
    let request = NewChangeRequest {
        head: "figsync/doc/2".into(),
        base: "main".into(),
        title: "Sync design".into(),
        body: "body".into(),
    };
    let updated = host(&server.url())
        .update_change_request(&existing, &request)
        .await
        .unwrap();
    assert_eq!(updated.number, 4);
    open.assert_async().await;
    close.assert_async().await;
    delete_old.assert_async().await;
}

#[tokio::test]
async fn superseded_branch_is_kept_when_close_fails() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/web/pulls")
        .with_status(201)
        .with_body(pull(6, "figsync/doc/2"))
        .create_async()
        .await;
    server
        .mock("PATCH", "/repos/acme/web/pulls/5")
        .with_status(403)
        .with_body(r#"{"message":"Resource not accessible by integration"}"#)
        .create_async()
        .await;
    let delete_old = server
        .mock("DELETE", Matcher::Regex("^/repos/acme/web/git/refs/".into()))
        .expect(0)
        .create_async()
        .await;

    let existing = ChangeRequestRef {
        number: 5,
        url: "https://github.test/acme/web/pull/5".into(),
        head: "figsync/doc/1".into(),
        base: "main".into(),
        title: "old".into(),
    };
    let request = NewChangeRequest {
        head: "figsync/doc/2".into(),
        base: "main".into(),
        title: "Sync design".into(),
        body: "body".into(),
    };
    let updated = host(&server.url())
        .update_change_request(&existing, &request)
        .await
        .expect("replacement opened even though close failed");
    assert_eq!(updated.number, 6);
    delete_old.assert_async().await;
}

#[tokio::test]
async fn duplicate_pull_request_is_a_conflict() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/web/pulls")
        .with_status(422)
        .with_body(
            r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","code":"custom","message":"A pull request already exists for acme:figsync/doc/x."}],"documentation_url":"https://docs.github.com/rest/pulls/pulls#create-a-pull-request"}"#,
        )
        .create_async()
        .await;

    let request = NewChangeRequest {
        head: "figsync/doc/x".into(),
        base: "main".into(),
        title: "Sync design".into(),
        body: "body".into(),
    };
    let err = host(&server.url())
        .open_change_request(&request)
        .await
        .unwrap_err();
    match err {
        HostError::Conflict { what } => assert!(what.contains("already exists"), "{what}"),
        other => panic!("expected a conflict, got {other}"),
    }
}

#[tokio::test]
async fn other_validation_failures_stay_rejected() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/repos/acme/web/pulls")
        .with_status(422)
        .with_body(
            r#"{"message":"Validation Failed","errors":[{"resource":"PullRequest","field":"base","code":"invalid"}]}"#,
        )
        .create_async()
        .await;

    let request = NewChangeRequest {
        head: "figsync/doc/x".into(),
        base: "nope".into(),
        title: "Sync design".into(),
        body: "body".into(),
    };
    let err = host(&server.url())
        .open_change_request(&request)
        .await
        .unwrap_err();
    assert!(
        matches!(err, HostError::Rejected { status: 422, .. }),
        "{err}"
    );
}
