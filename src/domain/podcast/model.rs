use super::error::PodcastServiceError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Article handed to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleInput {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ArticleInput {
    /// Non-empty content, falling back to the summary
    pub fn body(&self) -> Option<&str> {
        non_blank(self.content.as_deref()).or_else(|| non_blank(self.summary.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Article as received over HTTP; every field is checked before use
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Request for POST /api/podcasts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePodcastRequest {
    #[serde(default)]
    pub articles: Option<Vec<ArticleRequest>>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// A validated request, ready for the pipeline
#[derive(Debug, Clone)]
pub struct PodcastJob {
    pub job_id: Uuid,
    pub user_id: Uuid,
    pub articles: Vec<ArticleInput>,
}

impl CreatePodcastRequest {
    pub fn validate(self) -> Result<PodcastJob, PodcastServiceError> {
        let job_id = parse_id("jobId", self.job_id.as_deref())?;
        let user_id = parse_id("userId", self.user_id.as_deref())?;

        if non_blank(self.auth_token.as_deref()).is_none() {
            return Err(invalid("authToken is required"));
        }

        let articles = match self.articles {
            Some(articles) if !articles.is_empty() => articles,
            _ => return Err(invalid("articles must contain at least one article")),
        };

        let articles = articles
            .into_iter()
            .enumerate()
            .map(|(index, article)| validate_article(index, article))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PodcastJob {
            job_id,
            user_id,
            articles,
        })
    }
}

fn validate_article(index: usize, article: ArticleRequest) -> Result<ArticleInput, PodcastServiceError> {
    let id = match non_blank(article.id.as_deref()) {
        Some(id) => id.to_string(),
        None => return Err(invalid(format!("articles[{}].id is required", index))),
    };
    let title = match non_blank(article.title.as_deref()) {
        Some(title) => title.to_string(),
        None => return Err(invalid(format!("articles[{}].title is required", index))),
    };

    let input = ArticleInput {
        id,
        title,
        content: article.content,
        summary: article.summary,
    };
    if input.body().is_none() {
        return Err(invalid(format!(
            "articles[{}] needs content or summary",
            index
        )));
    }

    Ok(input)
}

fn parse_id(field: &str, value: Option<&str>) -> Result<Uuid, PodcastServiceError> {
    let value = non_blank(value).ok_or_else(|| invalid(format!("{} is required", field)))?;
    Uuid::parse_str(value.trim()).map_err(|_| invalid(format!("{} must be a UUID", field)))
}

fn invalid(message: impl Into<String>) -> PodcastServiceError {
    PodcastServiceError::Invalid(message.into())
}
