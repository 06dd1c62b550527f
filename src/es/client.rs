use std::env;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};
use url::Url;

use super::query::{self, TranslationFilter};
use super::types::{
    EsHit, PhrasesPage, PitResponse, SearchResponse, SentenceSource, WordSource, WordsPage,
};

const DEFAULT_HOSTS: &str = "http://localhost:9200";
const DEFAULT_WORDS_INDEX: &str = "words-index";
const DEFAULT_SENTENCES_INDEX: &str = "sentences-index";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);
/// Keep-alive granted to a cursor on open and extended by every page request.
const CURSOR_KEEP_ALIVE: &str = "5m";
/// Cap for non-paged follow-up lookups (sentence coordinates, word positions).
const LOOKUP_SIZE: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum EsError {
    #[error("invalid backend host: {0}")]
    InvalidHost(#[from] url::ParseError),

    #[error("backend rate limited")]
    RateLimited,

    #[error("backend error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed backend response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Which of the two highlight indices a cursor ranges over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorIndex {
    Words,
    Sentences,
}

impl CursorIndex {
    pub fn label(self) -> &'static str {
        match self {
            CursorIndex::Words => "words",
            CursorIndex::Sentences => "sentences",
        }
    }
}

/// One page request against the word-granularity index.
#[derive(Debug)]
pub struct WordsPageRequest<'a> {
    pub meeting_id: &'a str,
    pub words: &'a [String],
    pub speaker: Option<&'a str>,
    pub lang: Option<&'a str>,
    pub loose: bool,
    pub size: usize,
    pub cursor_id: &'a str,
    pub search_after: Option<&'a [Value]>,
}

/// One page request against the sentence-granularity index.
#[derive(Debug)]
pub struct PhrasesPageRequest<'a> {
    pub meeting_id: &'a str,
    pub phrases: &'a [Vec<String>],
    pub speaker: Option<&'a str>,
    pub lang: Option<&'a str>,
    pub loose: bool,
    pub size: usize,
    pub cursor_id: &'a str,
    pub search_after: Option<&'a [Value]>,
}

/// Abstraction over the backend query/cursor service.
/// Implemented by [`EsClient`] for production; mock implementations drive the
/// engine tests.
pub trait SearchBackend {
    async fn open_cursor(&self, index: CursorIndex) -> Result<String, EsError>;

    async fn close_cursor(&self, cursor_id: &str) -> Result<(), EsError>;

    async fn words_page(&self, request: &WordsPageRequest<'_>) -> Result<WordsPage, EsError>;

    async fn phrases_page(&self, request: &PhrasesPageRequest<'_>)
    -> Result<PhrasesPage, EsError>;

    /// Sentences by id, for escalated whole-sentence highlights.
    async fn sentence_coordinates(
        &self,
        meeting_id: &str,
        sentence_ids: &[String],
    ) -> Result<Vec<EsHit<SentenceSource>>, EsError>;

    /// One sentence's words in a given translation, sorted by `wpos`,
    /// optionally narrowed to a set of positions.
    async fn words_at_positions(
        &self,
        meeting_id: &str,
        sentence_id: &str,
        translation: TranslationFilter<'_>,
        positions: Option<&[usize]>,
    ) -> Result<Vec<EsHit<WordSource>>, EsError>;
}

#[derive(Clone)]
pub struct EsClient {
    http: Client,
    base_url: String,
    words_index: String,
    sentences_index: String,
}

impl EsClient {
    /// Builds a client from `ELASTICSEARCH_HOSTS` (first host of a
    /// comma-separated list), `WORDS_INDEX_NAME` and `SENTENCES_INDEX_NAME`.
    pub fn from_env(http: Client) -> Result<Self, EsError> {
        let hosts = env::var("ELASTICSEARCH_HOSTS").unwrap_or_else(|_| DEFAULT_HOSTS.to_string());
        let first = hosts.split(',').next().unwrap_or(DEFAULT_HOSTS).trim();
        let base = Url::parse(first)?;
        Ok(Self {
            http,
            base_url: base.as_str().trim_end_matches('/').to_string(),
            words_index: env_or("WORDS_INDEX_NAME", DEFAULT_WORDS_INDEX),
            sentences_index: env_or("SENTENCES_INDEX_NAME", DEFAULT_SENTENCES_INDEX),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            words_index: DEFAULT_WORDS_INDEX.to_string(),
            sentences_index: DEFAULT_SENTENCES_INDEX.to_string(),
        }
    }

    fn index_name(&self, index: CursorIndex) -> &str {
        match index {
            CursorIndex::Words => &self.words_index,
            CursorIndex::Sentences => &self.sentences_index,
        }
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, EsError> {
        let mut last_err = None;
        for attempt in 0..MAX_RETRIES {
            match self.send_once(method.clone(), path, body).await {
                Ok(value) => return Ok(value),
                Err(e) if is_retriable(&e) => {
                    last_err = Some(e);
                    if attempt + 1 < MAX_RETRIES {
                        let delay_ms = jittered_backoff(attempt);
                        debug!(
                            attempt = attempt + 1,
                            delay_ms, "retrying after transient backend error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(EsError::RateLimited))
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, EsError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .http
            .request(method, &url)
            .header("User-Agent", crate::USER_AGENT)
            .timeout(REQUEST_TIMEOUT);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("backend rate limited");
            return Err(EsError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = extract_reason(&text).unwrap_or_else(|| {
                let snippet = if text.len() > 200 { &text[..200] } else { &text };
                format!("HTTP {status}: {snippet}")
            });
            warn!(status = %status, "backend error");
            return Err(EsError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response.json().await?)
    }

    async fn search<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<SearchResponse<T>, EsError> {
        let value = self.send_json(Method::POST, path, Some(body)).await?;
        Ok(serde_json::from_value(value)?)
    }
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 250;

fn is_retriable(e: &EsError) -> bool {
    matches!(
        e,
        EsError::RateLimited
            | EsError::Api {
                code: 500..=599,
                ..
            }
    )
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(attempt: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

fn extract_reason(text: &str) -> Option<String> {
    let body: Value = serde_json::from_str(text).ok()?;
    match &body["error"] {
        Value::String(message) => Some(message.clone()),
        detail => detail["reason"].as_str().map(str::to_string),
    }
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl SearchBackend for EsClient {
    async fn open_cursor(&self, index: CursorIndex) -> Result<String, EsError> {
        let path = format!(
            "/{}/_pit?keep_alive={CURSOR_KEEP_ALIVE}",
            self.index_name(index)
        );
        let value = self.send_json(Method::POST, &path, None).await?;
        let pit: PitResponse = serde_json::from_value(value)?;
        debug!(index = index.label(), "cursor opened");
        Ok(pit.id)
    }

    async fn close_cursor(&self, cursor_id: &str) -> Result<(), EsError> {
        self.send_json(Method::DELETE, "/_pit", Some(&json!({"id": cursor_id})))
            .await?;
        debug!("cursor closed");
        Ok(())
    }

    async fn words_page(&self, request: &WordsPageRequest<'_>) -> Result<WordsPage, EsError> {
        let body = query::words_page_body(
            query::words_search_query(
                request.meeting_id,
                request.words,
                request.speaker,
                request.lang,
                request.loose,
            ),
            request.size,
            request.cursor_id,
            CURSOR_KEEP_ALIVE,
            request.search_after,
        );
        // Cursor searches address the whole cluster; the index is pinned by
        // the cursor itself.
        let response: SearchResponse<WordSource> = self.search("/_search", &body).await?;
        let hits = response.hits.hits;
        let last_sort = hits.last().and_then(|h| h.sort.clone());
        debug!(hits = hits.len(), "words page fetched");
        Ok(WordsPage { hits, last_sort })
    }

    async fn phrases_page(
        &self,
        request: &PhrasesPageRequest<'_>,
    ) -> Result<PhrasesPage, EsError> {
        let body = query::phrases_page_body(
            query::phrases_search_query(
                request.meeting_id,
                request.phrases,
                request.speaker,
                request.lang,
                request.loose,
            ),
            request.size,
            request.cursor_id,
            CURSOR_KEEP_ALIVE,
            request.search_after,
        );
        let response: SearchResponse<SentenceSource> = self.search("/_search", &body).await?;
        let hits = response.hits.hits;
        let last_sort = hits.last().and_then(|h| h.sort.clone());
        debug!(hits = hits.len(), "phrases page fetched");
        Ok(PhrasesPage { hits, last_sort })
    }

    async fn sentence_coordinates(
        &self,
        meeting_id: &str,
        sentence_ids: &[String],
    ) -> Result<Vec<EsHit<SentenceSource>>, EsError> {
        let body = json!({
            "query": query::sentence_coordinates_query(meeting_id, sentence_ids),
            "size": LOOKUP_SIZE
        });
        let path = format!("/{}/_search", self.sentences_index);
        let response: SearchResponse<SentenceSource> = self.search(&path, &body).await?;
        Ok(response.hits.hits)
    }

    async fn words_at_positions(
        &self,
        meeting_id: &str,
        sentence_id: &str,
        translation: TranslationFilter<'_>,
        positions: Option<&[usize]>,
    ) -> Result<Vec<EsHit<WordSource>>, EsError> {
        let body = json!({
            "query": query::words_at_positions_query(meeting_id, sentence_id, translation, positions),
            "size": LOOKUP_SIZE,
            "sort": [{"wpos": "asc"}]
        });
        let path = format!("/{}/_search", self.words_index);
        let response: SearchResponse<WordSource> = self.search(&path, &body).await?;
        Ok(response.hits.hits)
    }
}
