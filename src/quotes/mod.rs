//! Quote archive client.
//!
//! The archive serves scraped quote markup as JSON records; bodies arrive as
//! HTML fragments and are flattened to plain text before anyone else sees
//! them. The [`QuoteSource`] trait is the seam the handlers depend on.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

/// One quote as the rest of the bot sees it: plain text, ready to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub id: String,
    pub text: String,
    pub rating: String,
}

impl Quote {
    /// Render for a chat message: body, then id and rating footer.
    pub fn to_chat_text(&self) -> String {
        format!("{}\n\n# {}\n+ {}\n", self.text, self.id, self.rating)
    }
}

/// Reader feedback on a quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
    /// "Seen it before"; the archive tracks reposts separately from rating.
    Old,
}

impl Vote {
    fn action(self) -> &'static str {
        match self {
            Vote::Up => "rulez",
            Vote::Down => "sux",
            Vote::Old => "bayan",
        }
    }
}

/// Where quotes come from. Implemented over HTTP by [`ArchiveClient`];
/// tests substitute a canned source.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// A page of random quotes.
    async fn random(&self) -> Result<Vec<Quote>>;

    /// Full-text search, all matches in archive order.
    async fn search(&self, query: &str) -> Result<Vec<Quote>>;

    async fn by_id(&self, id: &str) -> Result<Quote>;

    /// Send reader feedback. Best-effort; the archive returns no body.
    async fn vote(&self, id: &str, vote: Vote) -> Result<()>;
}

/// A quote record as the archive serves it.
#[derive(Debug, Deserialize)]
struct QuoteRecord {
    id: String,
    #[serde(default)]
    rating: String,
    html: String,
}

impl From<QuoteRecord> for Quote {
    fn from(record: QuoteRecord) -> Self {
        Quote {
            id: record.id,
            text: html_to_text(&record.html),
            rating: record.rating,
        }
    }
}

/// Flatten an HTML quote body to readable plain text.
fn html_to_text(html: &str) -> String {
    html2md::parse_html(html).trim().to_string()
}

/// HTTP client for the quote archive.
pub struct ArchiveClient {
    base: String,
    client: reqwest::Client,
}

impl ArchiveClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base: String = base_url.into();
        Self {
            base: base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Vec<Quote>> {
        let records: Vec<QuoteRecord> = request
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(records.into_iter().map(Quote::from).collect())
    }
}

#[async_trait]
impl QuoteSource for ArchiveClient {
    async fn random(&self) -> Result<Vec<Quote>> {
        self.fetch(self.client.get(format!("{}/random", self.base)))
            .await
    }

    async fn search(&self, query: &str) -> Result<Vec<Quote>> {
        self.fetch(
            self.client
                .get(format!("{}/search", self.base))
                .query(&[("text", query)]),
        )
        .await
    }

    async fn by_id(&self, id: &str) -> Result<Quote> {
        let quotes = self
            .fetch(self.client.get(format!("{}/quote/{id}", self.base)))
            .await?;
        quotes
            .into_iter()
            .next()
            .ok_or_else(|| Error::QuoteNotFound(id.to_string()))
    }

    async fn vote(&self, id: &str, vote: Vote) -> Result<()> {
        let action = vote.action();
        self.client
            .post(format!("{}/quote/{id}/{action}", self.base))
            .header(reqwest::header::REFERER, self.base.as_str())
            .form(&[("quote", id), ("act", action)])
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_body_flattens_to_plain_text() {
        let text = html_to_text("xxx: deployed on friday<br>yyy: and?<br>xxx: exactly");
        assert!(text.contains("deployed on friday"));
        assert!(text.contains("xxx: exactly"));
        assert!(!text.contains("<br>"));
        assert!(text.lines().count() >= 3, "line breaks survive: {text:?}");
    }

    #[test]
    fn record_maps_into_quote() {
        let record: QuoteRecord = serde_json::from_str(
            r#"{"id": "440245", "rating": "1337", "html": "one<br>two"}"#,
        )
        .unwrap();
        let quote = Quote::from(record);

        assert_eq!(quote.id, "440245");
        assert_eq!(quote.rating, "1337");
        assert!(quote.text.starts_with("one"));
    }

    #[test]
    fn chat_text_carries_id_and_rating_footer() {
        let quote = Quote {
            id: "7".to_string(),
            text: "short one".to_string(),
            rating: "42".to_string(),
        };
        let rendered = quote.to_chat_text();

        assert!(rendered.starts_with("short one\n\n"));
        assert!(rendered.contains("# 7\n"));
        assert!(rendered.contains("+ 42\n"));
    }
}
