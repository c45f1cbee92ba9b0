//! `GithubClient` tests.
//!
//! These tests exercise the behavior of `GithubClient` against a local HTTP
//! server standing in for api.github.com. Each test registers the routes it
//! needs on a [`TestBuilder`], then [`run_test`] hands it a client pointed
//! at that server.

use super::common::{HttpServerHandle, Method, Response, TestBuilder};
use mutebot::config::{CycleSettings, FilterConfig};
use mutebot::cycle::{self, CycleState, Mutation};
use mutebot::daemon::{self, DaemonOptions, DaemonStats};
use mutebot::github::GithubClient;
use secrecy::SecretString;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

fn client(server: &HttpServerHandle) -> GithubClient {
    let mut gh = GithubClient::new(SecretString::from("sekrit-token"), server.api_url()).unwrap();
    // Keeps a test from hanging for a minute if a retry goes wrong.
    gh.set_retry_fallback(Duration::from_millis(10));
    gh
}

/// The main entry point for a test.
fn run_test<F, Fut>(builder: TestBuilder, f: F) -> HttpServerHandle
where
    F: FnOnce(GithubClient) -> Fut,
    Fut: Future<Output = ()>,
{
    let server = builder.start();
    let gh = client(&server);
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(f(gh));
    server
}

fn notification(id: &str, api_url: &str, reason: &str, number: u64) -> serde_json::Value {
    json!({
        "id": id,
        "unread": true,
        "reason": reason,
        "subject": {
            "title": format!("PR {number}"),
            "url": format!("{api_url}/repos/octo/widgets/pulls/{number}"),
            "type": "PullRequest",
        },
        "repository": {
            "full_name": "octo/widgets",
            "owner": { "login": "octo" },
        },
    })
}

/// Serves `pages` in order for `page=1..`, then empty pages.
fn paged_inbox(builder: TestBuilder, pages: Vec<serde_json::Value>) -> TestBuilder {
    builder.api_handler(Method::GET, "notifications", move |req| {
        let page: usize = req.query_param("page").unwrap().parse().unwrap();
        assert_eq!(req.query_param("per_page"), Some("50"));
        let body = pages.get(page - 1).cloned().unwrap_or_else(|| json!([]));
        Response::new().json(body)
    })
}

#[test]
fn sends_standard_headers() {
    let builder = TestBuilder::default().api_handler(Method::GET, "user", |req| {
        assert_eq!(req.header("authorization"), Some("Bearer sekrit-token"));
        assert_eq!(req.header("accept"), Some("application/vnd.github+json"));
        assert_eq!(req.header("x-github-api-version"), Some("2022-11-28"));
        assert!(req.header("user-agent").is_some());
        Response::new().json(json!({ "login": "me", "id": 1 }))
    });
    let server = run_test(builder, |gh| async move {
        assert_eq!(gh.current_user().await.unwrap(), "me");
    });
    server.events.assert_eq(&[(Method::GET, "/user")]);
}

#[test]
fn list_unread_paginates_until_empty_page() {
    let addr = Arc::new(std::sync::Mutex::new(String::new()));
    let builder = {
        let addr = addr.clone();
        TestBuilder::default().api_handler(Method::GET, "notifications", move |req| {
            let api_url = addr.lock().unwrap().clone();
            match req.query_param("page") {
                Some("1") => Response::new()
                    .header("Last-Modified: Thu, 01 Oct 2026 10:00:00 GMT")
                    .header("X-Poll-Interval: 120")
                    .json(json!([
                        notification("1", &api_url, "review_requested", 1),
                        notification("2", &api_url, "mention", 2),
                    ])),
                Some("2") => Response::new()
                    .header("X-Poll-Interval: 999")
                    .json(json!([notification("3", &api_url, "author", 3)])),
                _ => Response::new().json(json!([])),
            }
        })
    };
    let server = builder.start();
    *addr.lock().unwrap() = server.api_url();
    let gh = client(&server);
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            let result = gh.list_unread(None).await.unwrap();
            let ids: Vec<_> = result.notifications.iter().map(|n| n.id.as_str()).collect();
            assert_eq!(ids, ["1", "2", "3"]);
            assert!(!result.not_modified);
            assert_eq!(
                result.last_modified.as_deref(),
                Some("Thu, 01 Oct 2026 10:00:00 GMT")
            );
            // Only the first page's hint counts.
            assert_eq!(result.poll_interval, Some(Duration::from_secs(120)));
        });
    server.events.assert_eq(&[
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
    ]);
}

#[test]
fn list_unread_conditional_request() {
    let builder = TestBuilder::default().api_handler(Method::GET, "notifications", |req| {
        assert_eq!(req.query_param("page"), Some("1"));
        assert_eq!(
            req.header("if-modified-since"),
            Some("Thu, 01 Oct 2026 10:00:00 GMT")
        );
        Response::new().code(304).header("X-Poll-Interval: 60")
    });
    let server = run_test(builder, |gh| async move {
        let result = gh
            .list_unread(Some("Thu, 01 Oct 2026 10:00:00 GMT"))
            .await
            .unwrap();
        assert!(result.not_modified);
        assert!(result.notifications.is_empty());
        assert_eq!(result.last_modified, None);
        assert_eq!(result.poll_interval, Some(Duration::from_secs(60)));
    });
    server
        .events
        .assert_eq(&[(Method::GET, "/notifications")]);
}

#[test]
fn list_unread_empty_inbox_is_not_not_modified() {
    let builder = paged_inbox(TestBuilder::default(), Vec::new());
    run_test(builder, |gh| async move {
        let result = gh.list_unread(None).await.unwrap();
        assert!(!result.not_modified);
        assert!(result.notifications.is_empty());
    });
}

#[test]
fn list_unread_fails_on_server_error() {
    let builder = TestBuilder::default().api_handler(Method::GET, "notifications", |_req| {
        Response::new().code(502).body(b"bad gateway")
    });
    run_test(builder, |gh| async move {
        let err = gh.list_unread(None).await.unwrap_err();
        assert!(format!("{err:#}").contains("502"), "{err:#}");
    });
}

#[test]
fn throttled_page_is_retried_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    let builder = {
        let hits = hits.clone();
        TestBuilder::default().api_handler(Method::GET, "notifications", move |req| {
            let page = req.query_param("page").unwrap().to_string();
            if page == "2" && hits.fetch_add(1, Ordering::SeqCst) == 0 {
                return Response::new().code(429).header("Retry-After: 1");
            }
            match page.as_str() {
                "1" | "2" => Response::new().json(json!([{
                    "id": page,
                    "reason": "mention",
                    "subject": { "title": "t", "url": null, "type": "Issue" },
                    "repository": { "full_name": "o/r", "owner": { "login": "o" } },
                }])),
                _ => Response::new().json(json!([])),
            }
        })
    };
    let server = run_test(builder, |gh| async move {
        let start = Instant::now();
        let result = gh.list_unread(None).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
        let ids: Vec<_> = result.notifications.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    });
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    server.events.assert_eq(&[
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
    ]);
}

#[test]
fn shutdown_interrupts_throttle_wait() {
    let builder = TestBuilder::default().api_handler(Method::GET, "notifications", |_req| {
        Response::new().code(429).header("Retry-After: 30")
    });
    let server = builder.start();
    let shutdown = CancellationToken::new();
    let mut gh = client(&server);
    gh.set_cancellation(shutdown.clone());
    let settings = CycleSettings {
        login: "me".to_string(),
        filter: FilterConfig::default(),
        apply: true,
    };

    let start = Instant::now();
    let stats = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(async {
            let daemon =
                daemon::run_daemon(&gh, &settings, DaemonOptions::default(), shutdown.clone());
            let stop = async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                shutdown.cancel();
            };
            let (stats, ()) = tokio::join!(daemon, stop);
            stats
        });

    assert!(start.elapsed() < Duration::from_secs(5), "{:?}", start.elapsed());
    assert_eq!(
        stats,
        DaemonStats {
            cycles: 1,
            failed_cycles: 1,
            mutation_errors: 0,
        }
    );
    server
        .events
        .assert_eq(&[(Method::GET, "/notifications")]);
}

#[test]
fn cancelled_client_fails_throttled_read() {
    let builder = TestBuilder::default().api_handler(
        Method::GET,
        "repos/{owner}/{repo}/pulls/{number}/requested_reviewers",
        |_req| Response::new().code(429).header("Retry-After: 30"),
    );
    let server = builder.start();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut gh = client(&server);
    gh.set_cancellation(shutdown);
    let url = format!("{}/repos/octo/widgets/pulls/4", gh.api_url());
    let err = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(gh.requested_reviewers(&url))
        .unwrap_err();
    assert!(format!("{err:#}").contains("shutting down"), "{err:#}");
    server.events.assert_eq(&[(
        Method::GET,
        "/repos/octo/widgets/pulls/4/requested_reviewers",
    )]);
}

#[test]
fn cancelled_client_still_retries_writes() {
    let hits = Arc::new(AtomicUsize::new(0));
    let builder = {
        let hits = hits.clone();
        TestBuilder::default().api_handler(
            Method::PUT,
            "notifications/threads/{id}/subscription",
            move |_req| {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    Response::new().code(429).header("Retry-After: 0")
                } else {
                    Response::new().json(json!({ "ignored": true }))
                }
            },
        )
    };
    let server = builder.start();
    let shutdown = CancellationToken::new();
    shutdown.cancel();
    let mut gh = client(&server);
    gh.set_cancellation(shutdown);
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(gh.ignore_thread("4"))
        .unwrap();
    server.events.assert_eq(&[
        (Method::PUT, "/notifications/threads/4/subscription"),
        (Method::PUT, "/notifications/threads/4/subscription"),
    ]);
}

#[test]
fn forbidden_without_retry_after_is_not_retried() {
    let builder = TestBuilder::default().api_handler(
        Method::GET,
        "repos/{owner}/{repo}/pulls/{number}/requested_reviewers",
        |_req| Response::new().code(403).body(b"{\"message\":\"Resource not accessible\"}"),
    );
    let server = run_test(builder, |gh| async move {
        let url = format!("{}/repos/octo/widgets/pulls/5", gh.api_url());
        let err = gh.requested_reviewers(&url).await.unwrap_err();
        assert!(format!("{err:#}").contains("403"), "{err:#}");
    });
    server.events.assert_eq(&[(
        Method::GET,
        "/repos/octo/widgets/pulls/5/requested_reviewers",
    )]);
}

#[test]
fn throttled_twice_gives_up() {
    let builder = TestBuilder::default().api_handler(
        Method::PATCH,
        "notifications/threads/{id}",
        |_req| Response::new().code(403).header("Retry-After: 0"),
    );
    let server = run_test(builder, |gh| async move {
        assert!(gh.mark_thread_read("9").await.is_err());
    });
    server.events.assert_eq(&[
        (Method::PATCH, "/notifications/threads/9"),
        (Method::PATCH, "/notifications/threads/9"),
    ]);
}

#[test]
fn requested_reviewers() {
    let builder = TestBuilder::default().api_handler(
        Method::GET,
        "repos/{owner}/{repo}/pulls/{number}/requested_reviewers",
        |req| {
            assert_eq!(req.components["owner"], "octo");
            assert_eq!(req.components["repo"], "widgets");
            assert_eq!(req.components["number"], "42");
            Response::new().json(json!({
                "users": [{ "login": "alice" }, { "login": "me" }],
                "teams": [{ "slug": "backend", "name": "Backend" }],
            }))
        },
    );
    run_test(builder, |gh| async move {
        let url = format!("{}/repos/octo/widgets/pulls/42", gh.api_url());
        let reviewers = gh.requested_reviewers(&url).await.unwrap();
        let users: Vec<_> = reviewers.users.iter().map(|u| u.login.as_str()).collect();
        assert_eq!(users, ["alice", "me"]);
        assert_eq!(reviewers.teams[0].slug, "backend");
    });
}

#[test]
fn requested_reviewers_rejects_non_pr_subjects() {
    let server = run_test(TestBuilder::default(), |gh| async move {
        let url = format!("{}/repos/octo/widgets/issues/42", gh.api_url());
        let err = gh.requested_reviewers(&url).await.unwrap_err();
        assert!(
            err.downcast_ref::<mutebot::github::SubjectParseError>()
                .is_some()
        );
    });
    server.events.assert_eq(&[]);
}

#[test]
fn mute_thread_requests() {
    let builder = TestBuilder::default()
        .api_handler(Method::PATCH, "notifications/threads/{id}", |req| {
            assert_eq!(req.method, Method::PATCH);
            assert_eq!(req.components["id"], "77");
            Response::new().code(205)
        })
        .api_handler(
            Method::PUT,
            "notifications/threads/{id}/subscription",
            |req| {
                assert_eq!(req.json(), json!({ "ignored": true }));
                Response::new().json(json!({ "subscribed": false, "ignored": true }))
            },
        );
    let server = run_test(builder, |gh| async move {
        gh.mark_thread_read("77").await.unwrap();
        gh.ignore_thread("77").await.unwrap();
    });
    server.events.assert_eq(&[
        (Method::PATCH, "/notifications/threads/77"),
        (Method::PUT, "/notifications/threads/77/subscription"),
    ]);
}

#[test]
fn full_cycle_against_the_api() {
    let addr = Arc::new(std::sync::Mutex::new(String::new()));
    let builder = {
        let addr = addr.clone();
        TestBuilder::default()
            .api_handler(Method::GET, "notifications", move |req| {
                let api_url = addr.lock().unwrap().clone();
                match req.query_param("page") {
                    Some("1") => Response::new().json(json!([
                        notification("a", &api_url, "review_requested", 1),
                        notification("b", &api_url, "review_requested", 2),
                        notification("b2", &api_url, "review_requested", 2),
                        notification("c", &api_url, "mention", 3),
                    ])),
                    _ => Response::new().json(json!([])),
                }
            })
            .api_handler(
                Method::GET,
                "repos/octo/widgets/pulls/{number}/requested_reviewers",
                |req| match req.components["number"].as_str() {
                    "1" => Response::new().json(json!({
                        "users": [{ "login": "alice" }, { "login": "Me" }],
                        "teams": [],
                    })),
                    _ => Response::new().json(json!({
                        "users": [{ "login": "alice" }],
                        "teams": [{ "slug": "backend" }],
                    })),
                },
            )
            .api_handler(Method::PATCH, "notifications/threads/{id}", |req| {
                if req.components["id"] == "b" {
                    Response::new().code(500)
                } else {
                    Response::new().code(205)
                }
            })
            .api_handler(
                Method::PUT,
                "notifications/threads/{id}/subscription",
                |_req| Response::new().json(json!({ "ignored": true })),
            )
    };
    let server = builder.start();
    *addr.lock().unwrap() = server.api_url();
    let gh = client(&server);
    let settings = CycleSettings {
        login: "me".to_string(),
        filter: FilterConfig::default(),
        apply: true,
    };
    let report = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(cycle::run_cycle(&gh, &CycleState::default(), &settings))
        .unwrap();

    let tally = report.tally();
    assert_eq!((tally.skip, tally.keep, tally.mute), (1, 1, 2));
    assert_eq!(report.mutation_errors, 1);
    assert!(matches!(report.outcomes[1].mutation, Mutation::Failed(_)));
    assert!(matches!(report.outcomes[2].mutation, Mutation::Applied));
    server.events.assert_eq(&[
        (Method::GET, "/notifications"),
        (Method::GET, "/notifications"),
        (Method::GET, "/repos/octo/widgets/pulls/1/requested_reviewers"),
        (Method::GET, "/repos/octo/widgets/pulls/2/requested_reviewers"),
        (Method::PATCH, "/notifications/threads/b"),
        (Method::PATCH, "/notifications/threads/b2"),
        (Method::PUT, "/notifications/threads/b2/subscription"),
    ]);
}
