use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{any, method, path};
use wiremock::{Mock, ResponseTemplate};

use feed_mailer::poller::{CycleOutcome, CyclePhase};

use crate::helpers::{rss, TestApp, TestAppOptions};

fn blog_feed() -> String {
    rss(&[
        (
            "Fish &amp;amp; Chips",
            "https://blog.example.com/fish",
            "Tue, 02 Jan 2024 10:00:00 GMT",
        ),
        (
            "Hello world",
            "https://blog.example.com/hello",
            "Mon, 01 Jan 2024 10:00:00 GMT",
        ),
    ])
}

async fn serve_feed(test_app: &TestApp, feed_path: &str, status: u16, body: String) {
    Mock::given(method("GET"))
        .and(path(feed_path))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&test_app.feed_server)
        .await;
}

#[tokio::test]
async fn new_posts_are_mailed_to_every_subscriber() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/blog.xml"],
        subscribers: vec!["a@example.com", "b@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    match outcome {
        CycleOutcome::Mailed { posts, report } => {
            assert_eq!(posts, 2);
            assert_eq!(report.sent, 2);
            assert!(!report.has_failures());
        }
        other => panic!("Expected a mailout, got {:?}", other),
    }

    let emails = test_app.sent_emails().await;
    let mut recipients: Vec<&str> = emails.iter().map(|email| email.to.as_str()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
    for email in &emails {
        assert_eq!(email.subject, "There's a new post");
        // The doubly encoded ampersand is decoded before rendering
        assert!(email.text.contains("Fish & Chips"));
        assert!(email.text.contains("https://blog.example.com/hello"));
    }
    assert!(test_app.load_state().last_mailout > chrono::DateTime::<chrono::Utc>::default());
    assert_eq!(test_app.poller.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn a_failing_feed_does_not_stop_the_others() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/broken.xml", "/blog.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/broken.xml", 500, String::new()).await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Mailed { posts: 2, .. }));
}

#[tokio::test]
async fn a_feed_that_does_not_parse_is_skipped() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/garbage.xml", "/blog.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/garbage.xml", 200, "this is not a feed".to_string()).await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Mailed { posts: 2, .. }));
}

#[tokio::test]
async fn items_with_an_unparsable_date_are_not_mailed() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/blog.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    let feed = rss(&[
        ("Undated", "https://blog.example.com/undated", "not a date at all"),
        ("Dated", "https://blog.example.com/dated", "Mon, 01 Jan 2024 10:00:00 GMT"),
    ]);
    serve_feed(&test_app, "/blog.xml", 200, feed).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::Mailed { posts: 1, .. }));
    let emails = test_app.sent_emails().await;
    assert!(emails[0].text.contains("https://blog.example.com/dated"));
    assert!(!emails[0].text.contains("https://blog.example.com/undated"));
}

#[tokio::test]
async fn posts_are_only_mailed_once() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/blog.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    test_app.poller.run_cycle().await;
    let watermark = test_app.load_state().last_mailout;
    let second = test_app.poller.run_cycle().await;

    assert_eq!(second, CycleOutcome::NoNewPosts);
    assert_eq!(test_app.load_state().last_mailout, watermark);
}

#[tokio::test]
async fn nothing_is_sent_when_no_feed_has_new_posts() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/empty.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/empty.xml", 200, rss(&[])).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    assert_eq!(outcome, CycleOutcome::NoNewPosts);
    assert_eq!(test_app.load_state().last_mailout, chrono::DateTime::<chrono::Utc>::default());
}

#[tokio::test]
async fn a_cycle_is_skipped_while_another_is_running() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/slow.xml"],
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    Mock::given(path("/slow.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(blog_feed())
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&test_app.feed_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&test_app.email_server)
        .await;

    let poller = Arc::clone(&test_app.poller);
    let first = tokio::spawn(async move { poller.run_cycle().await });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(test_app.poller.phase(), CyclePhase::Fetching);
    assert_eq!(test_app.poller.run_cycle().await, CycleOutcome::AlreadyRunning);
    assert!(matches!(first.await.unwrap(), CycleOutcome::Mailed { .. }));
    assert_eq!(test_app.poller.phase(), CyclePhase::Idle);
}

#[tokio::test]
async fn without_an_api_key_mailouts_are_only_logged() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/blog.xml"],
        subscribers: vec!["a@example.com", "b@example.com"],
        dry_run: true,
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&test_app.email_server)
        .await;

    let outcome = test_app.poller.run_cycle().await;

    match outcome {
        CycleOutcome::Mailed { report, .. } => {
            assert_eq!(report.dry_run, 2);
            assert_eq!(report.sent, 0);
        }
        other => panic!("Expected a dry run mailout, got {:?}", other),
    }
}

#[tokio::test]
async fn the_unsubscribe_link_in_a_mailout_removes_the_subscriber() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        feed_paths: vec!["/blog.xml"],
        subscribers: vec!["a@example.com", "b@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    serve_feed(&test_app, "/blog.xml", 200, blog_feed()).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&test_app.email_server)
        .await;

    test_app.poller.run_cycle().await;
    let emails = test_app.sent_emails().await;
    let email = emails
        .iter()
        .find(|email| email.to == "a@example.com")
        .unwrap();
    let link = email.unsubscribe_link(test_app.port);

    let response = reqwest::get(link).await.unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(test_app.subscriber_emails(), vec!["b@example.com"]);
}
