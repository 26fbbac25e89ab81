use crate::e2e::helpers;

use helpers::fixtures::TestFixtures;
use helpers::TestContext;
use hyper::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::time::Duration;
use test_context::test_context;
use uuid::Uuid;

async fn event_types(ctx: &TestContext, job_id: Uuid) -> Vec<String> {
    let response = ctx
        .client
        .get(&format!("/api/podcasts/{}/events", job_id))
        .await
        .unwrap();
    response.assert_status(StatusCode::OK);

    response
        .body
        .as_ref()
        .and_then(Value::as_array)
        .map(|events| {
            events
                .iter()
                .filter_map(|e| e.get("event_type").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// The finished event is recorded just after the terminal status
async fn wait_for_finished_event(ctx: &TestContext, job_id: Uuid) -> Vec<String> {
    for _ in 0..100 {
        let types = event_types(ctx, job_id).await;
        if types.iter().any(|t| t == "finished") {
            return types;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("finished event never recorded for job {}", job_id);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_accept_a_valid_request(ctx: &TestContext) {
    let (job_id, body) = TestFixtures::podcast_request(1);

    let response = ctx.client.post("/api/podcasts", &body).await.unwrap();

    response.assert_status(StatusCode::ACCEPTED);
    let accepted = response.body.as_ref().unwrap();
    assert_eq!(accepted.get("success"), Some(&json!(true)));
    assert_eq!(response.field("message"), Some("Podcast generation started"));
    assert_eq!(response.field("job_id"), Some(job_id.to_string().as_str()));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_complete_the_pipeline_and_upload_audio(ctx: &TestContext) {
    let (job_id, body) = TestFixtures::podcast_request(2);
    let user_id = body["userId"].as_str().unwrap().to_string();

    ctx.client
        .post("/api/podcasts", &body)
        .await
        .unwrap()
        .assert_status(StatusCode::ACCEPTED);

    let job = ctx.wait_for_terminal(job_id).await;

    assert_eq!(job["status"], "completed");
    assert_eq!(
        job["audio_url"],
        format!("https://storage.test/podcasts/{}/{}.mp3", user_id, job_id)
    );
    assert_eq!(job["progress_percent"], json!(100.0));
    assert!(job["script"].as_str().unwrap().contains("Alex:"));
    assert!(job.get("completed_at").is_some());
    assert!(job.get("error").is_none());

    // intro + two stories + conclusion
    assert_eq!(ctx.completion.calls.load(Ordering::SeqCst), 4);

    let uploads = ctx.storage.uploads.lock().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, format!("{}/{}.mp3", user_id, job_id));
    let audio = String::from_utf8_lossy(&uploads[0].1).to_string();
    // host voice first, turns in script order
    assert!(audio.starts_with("[alloy:Part 0 starts here.]"), "audio was {}", audio);
    assert!(audio.contains("[nova:Tell me more about part 0.]"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_record_lifecycle_events(ctx: &TestContext) {
    let (job_id, body) = TestFixtures::podcast_request(1);
    ctx.client.post("/api/podcasts", &body).await.unwrap();
    ctx.wait_for_terminal(job_id).await;

    let types = wait_for_finished_event(ctx, job_id).await;

    assert_eq!(types.first().map(String::as_str), Some("status_changed"));
    assert_eq!(types.last().map(String::as_str), Some("finished"));
    assert!(types.iter().any(|t| t == "section_generated"));
    assert!(types.iter().any(|t| t == "batch_completed"));
    assert!(!types.iter().any(|t| t == "heartbeat"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_missing_job_id(ctx: &TestContext) {
    let (_, mut body) = TestFixtures::podcast_request(1);
    body.as_object_mut().unwrap().remove("jobId");

    let response = ctx.client.post("/api/podcasts", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("jobId is required");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_empty_articles(ctx: &TestContext) {
    let (_, mut body) = TestFixtures::podcast_request(0);
    body["articles"] = json!([]);

    let response = ctx.client.post("/api/podcasts", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("articles must contain at least one article");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_article_without_body(ctx: &TestContext) {
    let (_, mut body) = TestFixtures::podcast_request(1);
    body["articles"][0] = json!({ "id": "a", "title": "Empty" });

    let response = ctx.client.post("/api/podcasts", &body).await.unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("articles[0] needs content or summary");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_malformed_json(ctx: &TestContext) {
    let response = ctx
        .client
        .post_raw("/api/podcasts", "{\"jobId\": ")
        .await
        .unwrap();

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_a_duplicate_job(ctx: &TestContext) {
    ctx.tts.set_delay(Duration::from_secs(30));
    let (_, body) = TestFixtures::podcast_request(1);

    ctx.client
        .post("/api/podcasts", &body)
        .await
        .unwrap()
        .assert_status(StatusCode::ACCEPTED);

    let response = ctx.client.post("/api/podcasts", &body).await.unwrap();

    response
        .assert_status(StatusCode::CONFLICT)
        .assert_error_message("Podcast job already started");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_return_not_found_for_unknown_job(ctx: &TestContext) {
    let unknown = Uuid::new_v4();

    ctx.client
        .get(&format!("/api/podcasts/{}", unknown))
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND)
        .assert_error_message("Podcast job not found");

    ctx.client
        .get(&format!("/api/podcasts/{}/events", unknown))
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);

    ctx.client
        .post_empty(&format!("/api/podcasts/{}/cancel", unknown))
        .await
        .unwrap()
        .assert_status(StatusCode::NOT_FOUND);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_cancel_a_running_job(ctx: &TestContext) {
    ctx.tts.set_delay(Duration::from_secs(30));
    let (job_id, body) = TestFixtures::podcast_request(1);
    ctx.client.post("/api/podcasts", &body).await.unwrap();

    ctx.wait_for_job(job_id, |status| status == "generating_audio")
        .await;

    ctx.client
        .post_empty(&format!("/api/podcasts/{}/cancel", job_id))
        .await
        .unwrap()
        .assert_status(StatusCode::ACCEPTED);

    let job = ctx.wait_for_terminal(job_id).await;
    assert_eq!(job["status"], "failed");
    assert_eq!(job["error"], "job cancelled");
    assert!(ctx.storage.uploads.lock().is_empty());
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_when_script_generation_fails(ctx: &TestContext) {
    ctx.completion.fail.store(true, Ordering::SeqCst);
    let (job_id, body) = TestFixtures::podcast_request(1);
    ctx.client.post("/api/podcasts", &body).await.unwrap();

    let job = ctx.wait_for_terminal(job_id).await;

    assert_eq!(job["status"], "failed");
    assert!(job["error"].as_str().unwrap().contains("service unavailable"));
    assert!(job.get("script").is_none());
    assert_eq!(ctx.tts.calls.load(Ordering::SeqCst), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_fail_when_no_turn_is_synthesized(ctx: &TestContext) {
    ctx.tts.fail.store(true, Ordering::SeqCst);
    let (job_id, body) = TestFixtures::podcast_request(1);
    ctx.client.post("/api/podcasts", &body).await.unwrap();

    let job = ctx.wait_for_terminal(job_id).await;

    assert_eq!(job["status"], "failed");
    assert!(job["error"]
        .as_str()
        .unwrap()
        .contains("no audio synthesized"));
    // the script survives the audio failure
    assert!(job["script"].as_str().is_some());

    let types = wait_for_finished_event(ctx, job_id).await;
    assert!(types.iter().any(|t| t == "turn_failed"));
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_cancel_only_while_running(ctx: &TestContext) {
    let (job_id, body) = TestFixtures::podcast_request(1);
    ctx.client.post("/api/podcasts", &body).await.unwrap();
    ctx.wait_for_terminal(job_id).await;

    // the finished job is no longer cancellable; wait for the tracker to release it
    let path = format!("/api/podcasts/{}/cancel", job_id);
    for _ in 0..100 {
        let response = ctx.client.post_empty(&path).await.unwrap();
        if response.status == StatusCode::NOT_FOUND {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("finished job {} stayed cancellable", job_id);
}
