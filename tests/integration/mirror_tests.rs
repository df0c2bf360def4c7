//! Integration tests for the mirroring engine
//!
//! These tests use wiremock to create mock HTTP servers and run whole jobs
//! end-to-end into a temporary output root.

use std::path::Path;
use std::time::{Duration, Instant};

use sumi_mirror::config::{Config, JobConfig, StructureMode, UserAgentConfig};
use sumi_mirror::crawler::Job;
use sumi_mirror::output::Event;
use sumi_mirror::storage::{open_storage, CacheStore, JobStatus};
use sumi_mirror::{JobSummary, SkipReason};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a fast test configuration for a single seed
fn create_test_config(seed: String, output_root: &Path) -> Config {
    Config {
        job: JobConfig {
            seeds: vec![seed],
            output_root: output_root.to_path_buf(),
            timeout: 5,
            retries: 2,
            retry_backoff: 10,
            rate_limit: 0,
            concurrency: 4,
            ..JobConfig::default()
        },
        user_agent: UserAgentConfig {
            preset: None,
            literal: Some("TestBot/1.0".to_string()),
        },
        ..Config::default()
    }
}

/// Directory a preserved mirror of the mock server lands in
fn host_dir(server: &MockServer) -> String {
    let url = url::Url::parse(&server.uri()).expect("Failed to parse base URL");
    format!(
        "{}_{}",
        url.host_str().expect("Failed to extract host"),
        url.port().expect("Mock server has a port")
    )
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><head></head><body>{}</body></html>", body),
        "text/html",
    )
}

fn css(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/css")
}

fn png(bytes: &[u8]) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(bytes.to_vec(), "image/png")
}

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

async fn mount_expect(server: &MockServer, route: &str, response: ResponseTemplate, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .expect(times)
        .mount(server)
        .await;
}

async fn run(config: Config, fresh: bool) -> JobSummary {
    Job::new(config, fresh)
        .expect("Failed to create job")
        .run()
        .await
        .expect("Job failed")
}

#[tokio::test]
async fn test_depth_zero_fetches_only_seed() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_expect(&server, "/", html(r#"<a href="/page1">Page 1</a>"#), 1).await;
    mount_expect(&server, "/page1", html("Content 1"), 0).await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.max_depth = 0;

    let summary = run(config, false).await;

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 0);
    assert!(summary.rejected >= 1, "page1 should be rejected for depth");
    assert!(out.path().join(host_dir(&server)).join("index.html").exists());
}

#[tokio::test]
async fn test_full_mirror_rewrites_local_references() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        ResponseTemplate::new(200).set_body_raw(
            r#"<html><head><link rel="stylesheet" href="/style.css"></head><body>
                <a href="/page1">Page 1</a>
                <img src="/img/logo.png">
                <a href="https://elsewhere.example/x">External</a>
                </body></html>"#,
            "text/html",
        ),
    )
    .await;
    mount(&server, "/page1", html(r#"<a href="/">Home</a>"#)).await;
    mount(&server, "/style.css", css("body{background:url(/img/bg.png)}")).await;
    mount(&server, "/img/logo.png", png(b"\x89PNG logo")).await;
    mount(&server, "/img/bg.png", png(b"\x89PNG background")).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let summary = run(config, false).await;

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.succeeded, 5);
    assert_eq!(summary.failed, 0);

    let site = out.path().join(host_dir(&server));
    let index = std::fs::read_to_string(site.join("index.html")).unwrap();
    assert!(index.contains(r#"href="style.css""#), "{}", index);
    assert!(index.contains(r#"href="page1/index.html""#), "{}", index);
    assert!(index.contains(r#"src="img/logo.png""#), "{}", index);
    assert!(index.contains("https://elsewhere.example/x"), "{}", index);

    let page1 = std::fs::read_to_string(site.join("page1").join("index.html")).unwrap();
    assert!(page1.contains(r#"href="../index.html""#), "{}", page1);

    let sheet = std::fs::read_to_string(site.join("style.css")).unwrap();
    assert_eq!(sheet, "body{background:url(img/bg.png)}");

    let logo = std::fs::read(site.join("img").join("logo.png")).unwrap();
    assert_eq!(logo, b"\x89PNG logo".to_vec());
}

#[tokio::test]
async fn test_robots_txt_respect() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/robots.txt",
        ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /admin"),
    )
    .await;
    mount(
        &server,
        "/",
        html(r#"<a href="/allowed">Allowed</a><a href="/admin">Admin</a>"#),
    )
    .await;
    mount_expect(&server, "/allowed", html("Allowed content"), 1).await;
    // Wiremock verifies expect(0) when the mock server drops
    mount_expect(&server, "/admin", html("Admin content"), 0).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skips.len(), 1);
    assert!(summary.skips[0].url.ends_with("/admin"));
    assert_eq!(summary.skips[0].reason, SkipReason::RobotsDenied.as_code());
}

#[tokio::test]
async fn test_robots_txt_ignored_when_disabled() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /"))
        .expect(0)
        .mount(&server)
        .await;
    mount(&server, "/", html(r#"<a href="/admin">Admin</a>"#)).await;
    mount_expect(&server, "/admin", html("Admin content"), 1).await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.respect_robots = false;
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.skipped, 0);
}

#[tokio::test]
async fn test_shared_resource_fetched_once() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        html(r#"<a href="/a">A</a><a href="/b">B</a><a href="/a#top">A again</a>"#),
    )
    .await;
    mount(&server, "/a", html(r#"<link rel="stylesheet" href="/shared.css">"#)).await;
    mount(&server, "/b", html(r#"<link rel="stylesheet" href="/shared.css">"#)).await;
    mount_expect(&server, "/shared.css", css("p{color:red}"), 1).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 4);
    assert!(summary.rejected >= 2, "duplicates should be rejected");
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_expect(
        &server,
        "/",
        html(r#"<a href="/page1">Page 1</a><img src="/logo.png">"#),
        1,
    )
    .await;
    mount_expect(&server, "/page1", html("Content 1"), 1).await;
    mount_expect(&server, "/logo.png", png(b"\x89PNG"), 1).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());

    let first = run(config.clone(), false).await;
    assert_eq!(first.succeeded, 3);
    assert_eq!(first.from_cache, 0);
    assert!(first.bytes_transferred > 0);

    let second = run(config, false).await;
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.succeeded, 3);
    assert_eq!(second.from_cache, 3);
    assert_eq!(second.bytes_transferred, 0);
    assert_ne!(first.job_id, second.job_id);

    let index =
        std::fs::read_to_string(out.path().join(host_dir(&server)).join("index.html")).unwrap();
    assert!(index.contains(r#"href="page1/index.html""#), "{}", index);
}

#[tokio::test]
async fn test_missing_file_is_fetched_again() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_expect(&server, "/", html(r#"<img src="/logo.png">"#), 1).await;
    mount_expect(&server, "/logo.png", png(b"\x89PNG"), 2).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    run(config.clone(), false).await;

    let logo = out.path().join(host_dir(&server)).join("logo.png");
    std::fs::remove_file(&logo).unwrap();

    let second = run(config, false).await;
    assert_eq!(second.succeeded, 2);
    assert_eq!(second.from_cache, 1);
    assert!(logo.exists());
}

#[tokio::test]
async fn test_fresh_run_ignores_cache() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount_expect(&server, "/", html("only page"), 2).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    run(config.clone(), false).await;
    let second = run(config, true).await;

    assert_eq!(second.succeeded, 1);
    assert_eq!(second.from_cache, 0);
}

#[tokio::test]
async fn test_flatten_disambiguates_name_collisions() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        html(r#"<img src="/a/logo.png"><img src="/b/logo.png">"#),
    )
    .await;
    mount(&server, "/a/logo.png", png(b"first logo")).await;
    mount(&server, "/b/logo.png", png(b"second logo")).await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.structure = StructureMode::Flatten;
    let summary = run(config, false).await;
    assert_eq!(summary.succeeded, 3);

    let names: Vec<String> = std::fs::read_dir(out.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("logo"))
        .collect();
    assert_eq!(names.len(), 2, "{:?}", names);
    assert!(names.contains(&"logo.png".to_string()));
    assert!(names.iter().any(|n| n.starts_with("logo-") && n.ends_with(".png")));

    let mut contents: Vec<Vec<u8>> = names
        .iter()
        .map(|n| std::fs::read(out.path().join(n)).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec![b"first logo".to_vec(), b"second logo".to_vec()]);
}

#[tokio::test]
async fn test_rate_limit_spaces_requests() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/p1">1</a><a href="/p2">2</a>"#)).await;
    mount(&server, "/p1", html("one")).await;
    mount(&server, "/p2", html("two")).await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.rate_limit = 500;

    let start = Instant::now();
    let summary = run(config, false).await;
    let elapsed = start.elapsed();

    assert_eq!(summary.succeeded, 3);
    assert!(
        elapsed >= Duration::from_millis(950),
        "three requests at 500ms spacing took only {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_not_found_not_retried_server_error_retried() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        html(r#"<a href="/missing">gone</a><a href="/flaky">flaky</a>"#),
    )
    .await;
    mount_expect(&server, "/missing", ResponseTemplate::new(404), 1).await;
    // retries = 2, so one attempt plus two retries
    mount_expect(&server, "/flaky", ResponseTemplate::new(500), 3).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 2);

    let mut reasons: Vec<&str> = summary.failures.iter().map(|f| f.reason.as_str()).collect();
    reasons.sort();
    assert_eq!(reasons, vec!["http-404", "http-500"]);

    let storage = open_storage(&out.path().join(".sumi-mirror").join("cache.db")).unwrap();
    let flaky = storage
        .lookup(&format!("{}/flaky", server.uri()))
        .unwrap()
        .expect("flaky page recorded");
    assert_eq!(flaky.attempt_count, 3);
}

/// Number of requests the server has seen for `route`
async fn requests_to(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .expect("Request recording enabled")
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_rerun_settles_permanent_failure_from_cache() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/missing">gone</a>"#)).await;
    mount(&server, "/missing", ResponseTemplate::new(404)).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let first = run(config.clone(), false).await;
    assert_eq!(first.failed, 1);
    let seen = server.received_requests().await.unwrap().len();
    assert!(requests_to(&server, "/robots.txt").await >= 1);

    let second = run(config, false).await;
    assert_eq!(second.status, JobStatus::Completed);
    assert_eq!(second.succeeded, 1);
    assert_eq!(second.from_cache, 1);
    assert_eq!(second.failed, 1);
    assert_eq!(second.failures[0].reason, "http-404");
    assert_eq!(
        server.received_requests().await.unwrap().len(),
        seen,
        "second run should not reach the server"
    );
}

#[tokio::test]
async fn test_rerun_retries_transient_failure() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/flaky">flaky</a>"#)).await;
    mount(&server, "/flaky", ResponseTemplate::new(503)).await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.retries = 0;

    run(config.clone(), false).await;
    assert_eq!(requests_to(&server, "/flaky").await, 1);

    let second = run(config, false).await;
    assert_eq!(second.failed, 1);
    assert_eq!(requests_to(&server, "/flaky").await, 2);
    assert_eq!(requests_to(&server, "/").await, 1);
}

#[tokio::test]
async fn test_unknown_file_type_not_requested() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        html(r#"<a href="/archive.zip">download</a><a href="/about">about</a>"#),
    )
    .await;
    mount(&server, "/about", html("about us")).await;
    mount_expect(&server, "/archive.zip", ResponseTemplate::new(200), 0).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(summary.rejected >= 1);
}

#[tokio::test]
async fn test_oversized_resource_skipped() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/big">big</a>"#)).await;
    mount(
        &server,
        "/big",
        ResponseTemplate::new(200).set_body_raw("x".repeat(4096), "text/html"),
    )
    .await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.max_file_size = 1024;
    let summary = run(config, false).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skips[0].reason, SkipReason::TooLarge.as_code());
    assert!(!out
        .path()
        .join(host_dir(&server))
        .join("big")
        .join("index.html")
        .exists());
}

#[tokio::test]
async fn test_pause_holds_dispatch_until_resume() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/page1">Page 1</a>"#)).await;
    mount(&server, "/page1", html("Content 1")).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let job = Job::new(config, false).unwrap();
    let controller = job.controller();
    controller.pause().unwrap();

    let handle = tokio::spawn(job.run());
    tokio::time::sleep(Duration::from_millis(300)).await;

    let requests = server.received_requests().await.unwrap();
    assert!(requests.is_empty(), "paused job made {} requests", requests.len());

    controller.resume().unwrap();
    let summary = tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("job did not finish after resume")
        .unwrap()
        .unwrap();

    assert_eq!(summary.status, JobStatus::Completed);
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn test_stop_abandons_in_flight_fetch() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(
        &server,
        "/",
        html("slow").set_delay(Duration::from_secs(5)),
    )
    .await;

    let mut config = create_test_config(format!("{}/", server.uri()), out.path());
    config.job.timeout = 30;
    let job = Job::new(config, false).unwrap();
    let controller = job.controller();

    let handle = tokio::spawn(job.run());
    tokio::time::sleep(Duration::from_millis(300)).await;
    controller.stop();

    let summary = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("stop was not prompt")
        .unwrap()
        .unwrap();

    assert_eq!(summary.status, JobStatus::Stopped);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.skips[0].reason, SkipReason::Cancelled.as_code());

    let storage = open_storage(&out.path().join(".sumi-mirror").join("cache.db")).unwrap();
    let latest = storage.get_latest_job().unwrap().unwrap();
    assert_eq!(latest.status, JobStatus::Stopped);
}

#[tokio::test]
async fn test_events_follow_job_lifecycle() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();

    mount(&server, "/", html(r#"<a href="/page1">1</a><a href="/gone">2</a>"#)).await;
    mount(&server, "/page1", html("Content 1")).await;
    mount(&server, "/gone", ResponseTemplate::new(404)).await;

    let config = create_test_config(format!("{}/", server.uri()), out.path());
    let job = Job::new(config, false).unwrap();
    let mut events = job.events();

    let summary = job.run().await.unwrap();

    let mut received = Vec::new();
    while let Some(event) = events.recv().await {
        received.push(event);
    }
    assert_eq!(events.dropped(), 0);

    assert!(matches!(received.first(), Some(Event::JobStarted { seeds: 1, .. })));
    match received.last() {
        Some(Event::JobCompleted(final_summary)) => {
            assert_eq!(final_summary.job_id, summary.job_id);
            assert_eq!(final_summary.succeeded, 2);
        }
        other => panic!("expected job-completed last, got {:?}", other),
    }

    let started = received.iter().filter(|e| e.name() == "task-started").count();
    let succeeded = received.iter().filter(|e| e.name() == "task-succeeded").count();
    let failed: Vec<&Event> = received.iter().filter(|e| e.name() == "task-failed").collect();
    assert_eq!(started, 3);
    assert_eq!(succeeded, 2);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].url().unwrap().ends_with("/gone"));

    // Every task-started precedes the terminal event for the same URL
    for (i, event) in received.iter().enumerate() {
        if matches!(event, Event::TaskSucceeded { .. } | Event::TaskFailed { .. }) {
            let url = event.url();
            assert!(received[..i]
                .iter()
                .any(|e| e.name() == "task-started" && e.url() == url));
        }
    }
}
