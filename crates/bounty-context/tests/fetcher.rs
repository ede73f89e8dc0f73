use base64::Engine;
use bounty_context::{ContextSource, GitHubFetcher};
use bounty_core::{BountyError, GitHubConfig, GitHubContext};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> GitHubConfig {
    GitHubConfig {
        api_base: server.uri(),
        token: Some("test-token".into()),
        base_delay_ms: 1,
        ..GitHubConfig::default()
    }
}

fn file_body(content: &str) -> serde_json::Value {
    let encoded = base64::engine::general_purpose::STANDARD.encode(content);
    // GitHub wraps base64 content at 60 columns.
    let wrapped = encoded
        .as_bytes()
        .chunks(60)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect::<Vec<_>>()
        .join("\n");
    json!({ "type": "file", "encoding": "base64", "content": wrapped })
}

fn commit(sha: &str, message: &str) -> serde_json::Value {
    json!({
        "sha": sha,
        "commit": {
            "message": message,
            "author": { "name": "Octo Cat", "date": "2024-03-01T10:00:00Z" }
        }
    })
}

#[tokio::test]
async fn fetches_pull_request_context() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": "Implement X",
            "body": null,
            "state": "open",
            "user": { "login": "octocat" },
            "created_at": "2024-03-01T09:00:00Z",
            "updated_at": "2024-03-02T09:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls/7/files"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "filename": "src/x.rs", "status": "added", "additions": 40, "deletions": 0, "patch": "+fn x() {}" },
            { "filename": "logo.png", "status": "added", "additions": 0, "deletions": 0 }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls/7/commits"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([commit("abc123", "Add X")])),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/README.md"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("# Project X\n")))
        .mount(&server)
        .await;

    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let context = fetcher.fetch("https://github.com/o/r/pull/7").await.unwrap();

    let GitHubContext::Pr(pr) = context else {
        panic!("expected a pull request context");
    };
    assert_eq!(pr.pr_number, 7);
    assert_eq!(pr.title, "Implement X");
    assert_eq!(pr.description, "");
    assert_eq!(pr.author, "octocat");
    assert_eq!(pr.files.len(), 2);
    assert_eq!(pr.files[0].patch, "+fn x() {}");
    assert_eq!(pr.files[1].patch, "");
    assert_eq!(pr.commits[0].message, "Add X");
    assert_eq!(pr.commits[0].author, "Octo Cat");
    assert_eq!(pr.key_files.len(), 1);
    assert_eq!(pr.key_files[0].filename, "README.md");
    assert_eq!(pr.key_files[0].content, "# Project X\n");
}

#[tokio::test]
async fn fetches_repository_context() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "r",
            "description": "A repo",
            "language": null,
            "stargazers_count": 42,
            "forks_count": 3,
            "created_at": "2023-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .and(query_param("per_page", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            commit("c2", "Second"),
            commit("c1", "First")
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/package.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(file_body("{\"name\":\"r\"}")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/contents/Dockerfile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let context = fetcher.fetch("https://github.com/o/r").await.unwrap();

    let GitHubContext::Repo(repo) = context else {
        panic!("expected a repository context");
    };
    assert_eq!(repo.name, "r");
    assert_eq!(repo.language, "");
    assert_eq!(repo.stars, 42);
    assert_eq!(repo.forks, 3);
    assert_eq!(repo.recent_commits.len(), 2);
    assert_eq!(repo.recent_commits[0].sha, "c2");
    assert_eq!(repo.key_files.len(), 1);
    assert_eq!(repo.key_files[0].filename, "package.json");
}

#[tokio::test]
async fn missing_pull_request_is_not_found_after_budget() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r/pulls/99"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let err = fetcher
        .fetch("https://github.com/o/r/pull/99")
        .await
        .unwrap_err();

    assert!(matches!(err, BountyError::NotFound(_)));
    assert_eq!(err.to_string(), "PR not found or is private: o/r#99");
}

#[tokio::test]
async fn transient_failure_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "r",
            "description": null,
            "language": "Rust",
            "stargazers_count": 0,
            "forks_count": 0,
            "created_at": "2023-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let context = fetcher.fetch("https://github.com/o/r").await.unwrap();
    assert_eq!(context.kind(), "repo");
}

#[tokio::test]
async fn exhausted_quota_waits_for_reset_then_succeeds() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 2;

    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str())
                .set_body_json(json!({ "message": "API rate limit exceeded" })),
        )
        .up_to_n_times(1)
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "r",
            "description": "limited",
            "language": "Rust",
            "stargazers_count": 1,
            "forks_count": 0,
            "created_at": "2023-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        })))
        .with_priority(2)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/repos/o/r/commits"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    // base_delay_ms is 1, so only the reset header can account for the pause.
    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let started = std::time::Instant::now();
    let context = fetcher.fetch("https://github.com/o/r").await.unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_millis(900));
    match context {
        GitHubContext::Repo(repo) => assert_eq!(repo.description, "limited"),
        other => panic!("expected repo context, got {}", other.kind()),
    }
}

#[tokio::test]
async fn exhausted_quota_on_last_attempt_is_rate_limited() {
    let server = MockServer::start().await;
    let reset = chrono::Utc::now().timestamp() + 3600;

    Mock::given(method("GET"))
        .and(path("/repos/o/r"))
        .respond_with(
            ResponseTemplate::new(403)
                .insert_header("x-ratelimit-remaining", "0")
                .insert_header("x-ratelimit-reset", reset.to_string().as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = GitHubConfig {
        max_attempts: 1,
        ..config_for(&server)
    };
    let err = GitHubFetcher::new(&config)
        .unwrap()
        .fetch("https://github.com/o/r")
        .await
        .unwrap_err();

    assert!(matches!(err, BountyError::RateLimited { .. }));
    assert_eq!(err.rate_limit_reset().map(|t| t.timestamp()), Some(reset));
}

#[tokio::test]
async fn invalid_url_makes_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = GitHubFetcher::new(&config_for(&server)).unwrap();
    let err = fetcher
        .fetch("https://example.com/not-github")
        .await
        .unwrap_err();
    assert!(matches!(err, BountyError::InvalidReference(_)));
}
