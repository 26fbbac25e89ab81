use serde_json::{json, Value};
use uuid::Uuid;

pub struct TestFixtures;

impl TestFixtures {
    pub fn article(id: &str, title: &str) -> Value {
        json!({
            "id": id,
            "title": title,
            "content": format!("<p>{} happened today. Experts weighed in.</p>", title),
        })
    }

    /// A valid request with a fresh job id and the given number of articles
    pub fn podcast_request(article_count: usize) -> (Uuid, Value) {
        let job_id = Uuid::new_v4();
        let articles: Vec<Value> = (0..article_count)
            .map(|i| Self::article(&format!("article-{}", i), &format!("Story {}", i)))
            .collect();

        let body = json!({
            "jobId": job_id,
            "userId": Uuid::new_v4(),
            "authToken": "test-token",
            "articles": articles,
        });
        (job_id, body)
    }
}
