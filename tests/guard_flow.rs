//! End-to-end behavior of the header policy and session gate over real sockets.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use axum::routing::{get, post};
use axum::Router;
use reqwest::StatusCode;
use request_guard::config::GuardConfig;
use request_guard::http::routes::app_router;
use request_guard::session::{Authenticated, Session, SessionAccess, USER_ID_KEY};

mod common;

const PROTECTIVE: [(&str, &str); 6] = [
    ("x-frame-options", "SAMEORIGIN"),
    ("x-xss-protection", "1; mode=block"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "content-security-policy",
        "default-src 'self'; \
         script-src 'self' 'unsafe-inline' 'unsafe-eval' https://cdnjs.cloudflare.com; \
         style-src 'self' 'unsafe-inline' https://cdnjs.cloudflare.com; \
         img-src 'self' data: https:; \
         font-src 'self' data: https://cdnjs.cloudflare.com; \
         connect-src 'self'; \
         frame-ancestors 'self'",
    ),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

const HSTS: &str = "max-age=31536000; includeSubDomains";

fn assert_protective_headers(headers: &reqwest::header::HeaderMap) {
    for (name, value) in PROTECTIVE {
        let all: Vec<_> = headers.get_all(name).iter().collect();
        assert_eq!(all.len(), 1, "{name} should be set exactly once");
        assert_eq!(all[0], value, "{name}");
    }
}

/// Protected handler that records whether its body ran.
fn probe_app(ran: Arc<AtomicBool>) -> Router {
    Router::new().route(
        "/account",
        get(move |user: Authenticated| {
            let ran = ran.clone();
            async move {
                ran.store(true, Ordering::SeqCst);
                format!("account of {}", user.user_id)
            }
        }),
    )
}

#[tokio::test]
async fn test_secure_authenticated_request_gets_hsts_and_no_redirect() {
    let mut config = GuardConfig::default();
    config.security.trust_forwarded_proto = true;
    let ran = Arc::new(AtomicBool::new(false));
    let server = common::start_guard(config, probe_app(ran.clone())).await;

    let res = common::client()
        .get(server.url("/account"))
        .header("x-forwarded-proto", "https")
        .header("cookie", server.login_cookie("42").await)
        .send()
        .await
        .expect("guard unreachable");

    assert_eq!(res.status(), StatusCode::OK);
    assert_protective_headers(res.headers());
    assert_eq!(res.headers()["strict-transport-security"], HSTS);
    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(res.text().await.unwrap(), "account of 42");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_plain_anonymous_request_is_redirected_before_handler() {
    let ran = Arc::new(AtomicBool::new(false));
    let server = common::start_guard(GuardConfig::default(), probe_app(ran.clone())).await;

    let res = common::client()
        .get(server.url("/account"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/login");
    assert_eq!(res.headers().get_all("location").iter().count(), 1);
    assert_protective_headers(res.headers());
    assert!(res.headers().get("strict-transport-security").is_none());
    assert!(res.headers().get("set-cookie").is_none());
    assert!(!ran.load(Ordering::SeqCst), "handler body must not run");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_disabled_policy_emits_no_protective_headers() {
    let mut config = GuardConfig::default();
    config.security.secure_headers_enabled = false;
    config.security.trust_forwarded_proto = true;
    let app = Router::new().route(
        "/",
        get(|| async { ([("x-powered-by", "legacy")], "ok") }),
    );
    let server = common::start_guard(config, app).await;

    let res = common::client()
        .get(server.url("/"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    for (name, _) in PROTECTIVE {
        assert!(res.headers().get(name).is_none(), "{name} should be absent");
    }
    assert!(res.headers().get("strict-transport-security").is_none());
    assert_eq!(res.headers()["x-powered-by"], "legacy");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_untrusted_forwarded_proto_does_not_enable_hsts() {
    let server = common::start_guard(GuardConfig::default(), app_router()).await;

    let res = common::client()
        .get(server.url("/health"))
        .header("x-forwarded-proto", "https")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_protective_headers(res.headers());
    assert!(res.headers().get("strict-transport-security").is_none());

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_absolute_https_target_over_plain_tcp_gets_no_hsts() {
    let server = common::start_guard(GuardConfig::default(), app_router()).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let request = format!(
        "GET https://{addr}/health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n",
        addr = server.addr
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let response = String::from_utf8_lossy(&raw).to_ascii_lowercase();

    assert!(response.starts_with("http/1.1 200"), "{response}");
    assert!(response.contains("x-frame-options: sameorigin"));
    assert!(!response.contains("strict-transport-security"));

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_login_then_logout_round_trip() {
    // Minimal application-side login: the guard only reads what this writes.
    let app = app_router().route(
        "/signin",
        post(|session: Session| async move {
            session.regenerate().await.unwrap();
            session.set(USER_ID_KEY, "alice".to_string()).await.unwrap();
            "welcome"
        }),
    );
    let server = common::start_guard(GuardConfig::default(), app).await;
    let client = common::client();

    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    let res = client.post(server.url("/signin")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = res.headers()["set-cookie"].to_str().unwrap().to_string();
    assert!(cookie.starts_with("guard_session="));
    assert!(cookie.contains("HttpOnly"));
    let issued = cookie.split(';').next().unwrap().to_string();

    let res = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client.get(server.url("/dashboard")).send().await.unwrap();
    assert_eq!(res.text().await.unwrap(), "Signed in as user alice");

    let res = client.post(server.url("/logout")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);
    assert_eq!(res.headers()["location"], "/login");

    let res = client.get(server.url("/dashboard")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    // The old identifier is gone from the store, not just from the jar.
    let res = common::client()
        .get(server.url("/dashboard"))
        .header("cookie", issued)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::SEE_OTHER);

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_empty_user_id_counts_as_authenticated() {
    let server = common::start_guard(GuardConfig::default(), app_router()).await;

    let res = common::client()
        .get(server.url("/dashboard"))
        .header("cookie", server.login_cookie("").await)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "Signed in as user ");

    server.shutdown.trigger();
}

#[tokio::test]
async fn test_concurrent_sessions_stay_independent() {
    let hits = Arc::new(AtomicU32::new(0));
    let counted = hits.clone();
    let app = Router::new().route(
        "/whoami",
        get(move |user: Authenticated| {
            let counted = counted.clone();
            async move {
                counted.fetch_add(1, Ordering::SeqCst);
                user.user_id
            }
        }),
    );
    let server = Arc::new(common::start_guard(GuardConfig::default(), app).await);

    let mut tasks = Vec::new();
    for i in 0..20 {
        let server = server.clone();
        tasks.push(tokio::spawn(async move {
            let user = format!("user-{i}");
            let res = common::client()
                .get(server.url("/whoami"))
                .header("cookie", server.login_cookie(&user).await)
                .send()
                .await
                .unwrap();
            assert_eq!(res.text().await.unwrap(), user);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 20);
    server.shutdown.trigger();
}

#[tokio::test]
async fn test_graceful_shutdown_stops_server() {
    let server = common::start_guard(GuardConfig::default(), app_router()).await;

    let res = common::client().get(server.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .expect("server did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_grace_bounds_slow_requests() {
    let mut config = GuardConfig::default();
    config.timeouts.shutdown_grace_secs = 1;
    let app = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            "late"
        }),
    );
    let server = common::start_guard(config, app).await;

    let url = server.url("/slow");
    let in_flight = tokio::spawn(async move { common::client().get(url).send().await });
    tokio::time::sleep(Duration::from_millis(200)).await;

    server.shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), server.task)
        .await
        .expect("server outlived its shutdown grace period")
        .unwrap();

    in_flight.abort();
}
