use crate::domain::podcast::ArticleInput;
use html2text::from_read;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Longest cleaned article text forwarded to the completion service
pub const MAX_ARTICLE_CHARS: usize = 6000;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s]+").expect("valid url pattern"));
static WHITESPACE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Role/prompt payload plus output ceiling sent to the completion service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn serialized_len(&self) -> usize {
        serde_json::to_string(&self.messages)
            .map(|s| s.len())
            .unwrap_or_else(|_| self.messages.iter().map(|m| m.content.len()).sum())
    }
}

/// One completion call of the script: introduction, one per article, conclusion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSection {
    Introduction,
    Article { index: usize, total: usize },
    Conclusion,
}

impl ScriptSection {
    /// Sections in script order for `article_count` articles
    pub fn plan(article_count: usize) -> Vec<ScriptSection> {
        let mut sections = Vec::with_capacity(article_count + 2);
        sections.push(ScriptSection::Introduction);
        sections.extend((0..article_count).map(|index| ScriptSection::Article {
            index,
            total: article_count,
        }));
        sections.push(ScriptSection::Conclusion);
        sections
    }

    pub fn label(&self) -> String {
        match self {
            ScriptSection::Introduction => "introduction".to_string(),
            ScriptSection::Article { index, total } => format!("article {}/{}", index + 1, total),
            ScriptSection::Conclusion => "conclusion".to_string(),
        }
    }
}

/// Display names the model must use as line prefixes
#[derive(Debug, Clone)]
pub struct Speakers {
    pub host: String,
    pub cohost: String,
}

pub struct PromptBuilder {
    speakers: Speakers,
    max_tokens: u32,
    temperature: f32,
}

impl PromptBuilder {
    pub fn new(speakers: Speakers, max_tokens: u32) -> Self {
        Self {
            speakers,
            max_tokens,
            temperature: 0.8,
        }
    }

    pub fn build(&self, section: ScriptSection, articles: &[ArticleInput]) -> CompletionRequest {
        let user = match section {
            ScriptSection::Introduction => self.introduction(articles),
            ScriptSection::Article { index, total } => match articles.get(index) {
                Some(article) => self.article(article, index, total),
                None => self.introduction(articles),
            },
            ScriptSection::Conclusion => self.conclusion(articles),
        };

        CompletionRequest {
            messages: vec![
                ChatMessage {
                    role: ChatRole::System,
                    content: self.system(),
                },
                ChatMessage {
                    role: ChatRole::User,
                    content: user,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn system(&self) -> String {
        let Speakers { host, cohost } = &self.speakers;
        format!(
            "You write scripts for a two-person news podcast hosted by {host} and {cohost}. \
             Write natural, conversational dialogue. Every line must start with \"{host}:\" or \
             \"{cohost}:\" followed by what that person says. Alternate speakers. Do not include \
             stage directions, sound effects, headings or markdown."
        )
    }

    fn introduction(&self, articles: &[ArticleInput]) -> String {
        format!(
            "Write the opening of today's episode. {} welcomes the listeners, {} joins in, \
             and together they preview the stories below in a few short exchanges.\n\n{}",
            self.speakers.host,
            self.speakers.cohost,
            title_list(articles)
        )
    }

    fn article(&self, article: &ArticleInput, index: usize, total: usize) -> String {
        let body = article.body().map(clean_article_text).unwrap_or_default();
        format!(
            "Write the segment discussing story {} of {}: \"{}\".\n\
             Cover the key points, give context and react to each other. Use 6 to 10 exchanges \
             and do not greet the listeners again.\n\nArticle:\n{}",
            index + 1,
            total,
            article.title.trim(),
            body
        )
    }

    fn conclusion(&self, articles: &[ArticleInput]) -> String {
        format!(
            "Write the closing of the episode. Briefly recap the stories below, thank the \
             listeners and sign off. Keep it to a few short exchanges.\n\n{}",
            title_list(articles)
        )
    }
}

fn title_list(articles: &[ArticleInput]) -> String {
    articles
        .iter()
        .enumerate()
        .map(|(i, a)| format!("{}. {}", i + 1, a.title.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip HTML and URLs, normalize whitespace and cap the length
pub fn clean_article_text(text: &str) -> String {
    let plain_text = from_read(text.as_bytes(), usize::MAX);
    let without_urls = URL_PATTERN.replace_all(&plain_text, "");
    let normalized = WHITESPACE_PATTERN.replace_all(&without_urls, " ");
    let trimmed = normalized.trim();

    match trimmed.char_indices().nth(MAX_ARTICLE_CHARS) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}
