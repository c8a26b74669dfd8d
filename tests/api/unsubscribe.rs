use crate::helpers::{TestApp, TestAppOptions};

#[tokio::test]
async fn unsubscribe_removes_the_subscriber() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        subscribers: vec!["a@example.com", "b@example.com"],
        ..TestAppOptions::default()
    })
    .await;

    let response = test_app.get_unsubscribe("a@example.com").await;

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(test_app.subscriber_emails(), vec!["b@example.com"]);
}

#[tokio::test]
async fn unsubscribing_an_unknown_email_still_shows_the_confirmation() {
    let test_app = TestApp::spawn_app_with(TestAppOptions {
        subscribers: vec!["a@example.com"],
        ..TestAppOptions::default()
    })
    .await;
    let before = test_app.load_state();

    let response = test_app.get_unsubscribe("nobody@example.com").await;

    assert_eq!(response.status().as_u16(), 200);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    let page = response.text().await.unwrap();
    assert!(page.contains("nobody@example.com"));
    assert_eq!(test_app.load_state(), before);
}

#[tokio::test]
async fn unsubscribe_page_escapes_the_email() {
    let test_app = TestApp::spawn_app().await;

    let response = test_app.get_unsubscribe("%3Cscript%3Ex%3C%2Fscript%3E").await;

    let page = response.text().await.unwrap();
    assert!(!page.contains("<script>"));
    assert!(page.contains("&lt;script&gt;"));
}
