//! Highlight resolution: turns a free-text query plus language/speaker
//! filters into a stream of deduplicated highlight regions.
//!
//! One [`HighlightStream`] owns one pair of backend cursors (word index,
//! sentence index) and yields one chunk per iteration until both cursors are
//! exhausted. Chunks are independent: clients apply each as it arrives.

pub(crate) mod align;
pub(crate) mod coords;
pub(crate) mod dedup;
pub(crate) mod strategy;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::es::client::{CursorIndex, EsError, SearchBackend};
use crate::query;
use coords::{Coordinate, PageRects, group_coordinates};
use strategy::SearchStrategy;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("meeting id must not be empty")]
    MissingMeetingId,

    #[error("at least one of a words query or a speaker filter is required")]
    MissingQuery,

    #[error("chunk size must be positive")]
    InvalidChunkSize,
}

#[derive(Debug, thiserror::Error)]
pub enum HighlightError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("could not open backend cursors: {0}")]
    CursorOpen(#[source] EsError),
}

/// A highlight request as received from the transport layer.
#[derive(Debug, Clone)]
pub struct HighlightRequest {
    pub meeting_id: String,
    /// Raw query text, e.g. `"foo bar" baz OR qux`.
    pub words_query: String,
    pub speaker: Option<String>,
    /// Target translation language; absent means original-language mode.
    pub lang: Option<String>,
    pub loose_search: bool,
    pub chunk_size: usize,
}

impl HighlightRequest {
    fn validate(&self) -> Result<(), RequestError> {
        if self.meeting_id.trim().is_empty() {
            return Err(RequestError::MissingMeetingId);
        }
        if self.words_query.trim().is_empty() && self.speaker.is_none() {
            return Err(RequestError::MissingQuery);
        }
        if self.chunk_size == 0 {
            return Err(RequestError::InvalidChunkSize);
        }
        Ok(())
    }
}

/// Granularity of a highlight candidate, coarsest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CandidateKind {
    Sentence,
    Phrase,
    Word,
}

/// An internal highlight candidate. `sentence_id` is the owning sentence,
/// carried from the hit source so overlap checks never slice id strings.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub kind: CandidateKind,
    pub sentence_id: String,
    pub ids: Vec<String>,
    pub coordinates: Vec<Coordinate>,
}

impl Candidate {
    pub(crate) fn word(source: &crate::es::types::WordSource) -> Self {
        Self {
            kind: CandidateKind::Word,
            sentence_id: source.sentence_id.clone(),
            ids: vec![source.word_id.clone()],
            coordinates: source.coordinates.clone(),
        }
    }

    pub(crate) fn sentence(sentence_id: String, coordinates: Vec<Coordinate>) -> Self {
        Self {
            kind: CandidateKind::Sentence,
            ids: vec![sentence_id.clone()],
            sentence_id,
            coordinates,
        }
    }

    pub(crate) fn phrase_run(
        sentence_id: &str,
        run: &[crate::es::types::EsHit<crate::es::types::WordSource>],
    ) -> Self {
        Self {
            kind: CandidateKind::Phrase,
            sentence_id: sentence_id.to_string(),
            ids: run.iter().map(|h| h.source.word_id.clone()).collect(),
            coordinates: run
                .iter()
                .flat_map(|h| h.source.coordinates.iter().cloned())
                .collect(),
        }
    }

    /// A phrase match that could not be aligned to word positions. Reported
    /// with the sentence's own coordinates rather than dropped.
    pub(crate) fn best_effort(
        hit: &crate::es::types::EsHit<crate::es::types::SentenceSource>,
    ) -> Self {
        Self {
            kind: CandidateKind::Phrase,
            sentence_id: hit.source.sentence_id.clone(),
            ids: Vec::new(),
            coordinates: hit.source.coordinates.clone(),
        }
    }

    fn into_highlight(self) -> Highlight {
        Highlight {
            rects: group_coordinates(&self.coordinates),
            ids: self.ids,
        }
    }
}

/// One emitted highlight region: transcript element ids plus merged PDF
/// rectangles.
#[derive(Debug, Clone, Serialize)]
pub struct Highlight {
    pub ids: Vec<String>,
    pub rects: Vec<PageRects>,
}

/// One streamed chunk. The searched terms are echoed in every chunk so the
/// client can mark them in the transcript as regions arrive.
#[derive(Debug, Serialize)]
pub struct HighlightChunk {
    pub words: Vec<String>,
    pub phrases: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub highlights: Vec<Highlight>,
}

struct CursorPair {
    words: String,
    sentences: String,
}

/// Parameters of one chunk iteration, handed to the strategy.
pub(crate) struct ChunkQuery<'a> {
    pub meeting_id: &'a str,
    pub words: &'a [String],
    pub phrases: &'a [Vec<String>],
    pub speaker: Option<&'a str>,
    pub loose: bool,
    pub size: usize,
    pub words_cursor: &'a str,
    pub sentences_cursor: &'a str,
    pub after_words: Option<&'a [Value]>,
    pub after_sentences: Option<&'a [Value]>,
}

/// A streaming highlight resolution over one pair of backend cursors.
///
/// The stream is pull-based: nothing is queried until [`next_chunk`] is
/// called, and a slow consumer simply delays the next backend round-trip.
/// Cursors are released when the stream ends naturally; callers abandoning a
/// stream early must call [`close`].
///
/// [`next_chunk`]: HighlightStream::next_chunk
/// [`close`]: HighlightStream::close
pub struct HighlightStream<'a, B: SearchBackend> {
    backend: &'a B,
    strategy: SearchStrategy,
    request: HighlightRequest,
    words: Vec<String>,
    phrases: Vec<Vec<String>>,
    cursors: Option<CursorPair>,
    after_words: Option<Vec<Value>>,
    after_sentences: Option<Vec<Value>>,
    words_done: bool,
    phrases_done: bool,
}

impl<'a, B: SearchBackend> HighlightStream<'a, B> {
    /// Validates the request and opens both index cursors. Failing to open
    /// either cursor is fatal; a cursor that did open is released before the
    /// error is returned.
    pub async fn open(backend: &'a B, request: HighlightRequest) -> Result<Self, HighlightError> {
        request.validate()?;
        let groups = query::tokenize(&request.words_query);
        let (words, phrases) = query::split_terms(&groups);
        let strategy = SearchStrategy::for_lang(request.lang.as_deref());

        let (words_cursor, sentences_cursor) = futures::join!(
            backend.open_cursor(CursorIndex::Words),
            backend.open_cursor(CursorIndex::Sentences)
        );
        let cursors = match (words_cursor, sentences_cursor) {
            (Ok(words), Ok(sentences)) => CursorPair { words, sentences },
            (Ok(words), Err(e)) => {
                release_cursor(backend, &words).await;
                return Err(HighlightError::CursorOpen(e));
            }
            (Err(e), Ok(sentences)) => {
                release_cursor(backend, &sentences).await;
                return Err(HighlightError::CursorOpen(e));
            }
            (Err(e), Err(_)) => return Err(HighlightError::CursorOpen(e)),
        };

        let words_done = words.is_empty() && request.speaker.is_none();
        let phrases_done = phrases.is_empty();
        Ok(Self {
            backend,
            strategy,
            request,
            words,
            phrases,
            cursors: Some(cursors),
            after_words: None,
            after_sentences: None,
            words_done,
            phrases_done,
        })
    }

    /// Runs one iteration: fetches up to `chunk_size` further hits from each
    /// non-exhausted index, resolves them to highlight regions and returns
    /// them as one chunk. Returns `None` once both cursors are exhausted (the
    /// cursors are then released) or after the stream was closed.
    pub async fn next_chunk(&mut self) -> Option<HighlightChunk> {
        if self.words_done && self.phrases_done {
            self.close().await;
            return None;
        }
        let want_words = !self.words_done;
        let want_phrases = !self.phrases_done;

        let (words_page, phrases_page) = {
            let cursors = self.cursors.as_ref()?;
            let chunk_query = ChunkQuery {
                meeting_id: &self.request.meeting_id,
                words: &self.words,
                phrases: &self.phrases,
                speaker: self.request.speaker.as_deref(),
                loose: self.request.loose_search,
                size: self.request.chunk_size,
                words_cursor: &cursors.words,
                sentences_cursor: &cursors.sentences,
                after_words: self.after_words.as_deref(),
                after_sentences: self.after_sentences.as_deref(),
            };
            self.strategy
                .search(self.backend, &chunk_query, want_words, want_phrases)
                .await
        };

        if want_words {
            if words_page.last_sort.is_some() {
                self.after_words = words_page.last_sort.clone();
            } else if !words_page.hits.is_empty() {
                warn!("word page carried no search-after key; ending word pagination");
                self.words_done = true;
            }
            if words_page.hits.len() < self.request.chunk_size {
                self.words_done = true;
            }
        }
        if want_phrases {
            if phrases_page.last_sort.is_some() {
                self.after_sentences = phrases_page.last_sort.clone();
            } else if !phrases_page.hits.is_empty() {
                warn!("sentence page carried no search-after key; ending phrase pagination");
                self.phrases_done = true;
            }
            if phrases_page.hits.len() < self.request.chunk_size {
                self.phrases_done = true;
            }
        }

        let meeting_id = self.request.meeting_id.clone();
        let mut candidates = self
            .strategy
            .process_phrases(self.backend, &meeting_id, &self.phrases, &phrases_page)
            .await;
        candidates.extend(
            self.strategy
                .process_words(self.backend, &meeting_id, &words_page)
                .await,
        );
        let kept = dedup::dedupe(candidates);
        debug!(
            words = words_page.hits.len(),
            sentences = phrases_page.hits.len(),
            highlights = kept.len(),
            "chunk resolved"
        );

        let chunk = HighlightChunk {
            words: self.words.clone(),
            phrases: self.phrases.clone(),
            speaker: self.request.speaker.clone(),
            highlights: kept.into_iter().map(Candidate::into_highlight).collect(),
        };
        if self.words_done && self.phrases_done {
            self.close().await;
        }
        Some(chunk)
    }

    /// Releases both backend cursors. Idempotent; close failures are logged
    /// and never surfaced since the delivered data is unaffected.
    pub async fn close(&mut self) {
        if let Some(cursors) = self.cursors.take() {
            release_cursor(self.backend, &cursors.words).await;
            release_cursor(self.backend, &cursors.sentences).await;
            debug!("backend cursors released");
        }
    }
}

impl<B: SearchBackend> Drop for HighlightStream<'_, B> {
    fn drop(&mut self) {
        if self.cursors.is_some() {
            warn!("highlight stream dropped with open cursors; backend holds them until keep-alive expiry");
        }
    }
}

async fn release_cursor(backend: &impl SearchBackend, cursor_id: &str) {
    if let Err(e) = backend.close_cursor(cursor_id).await {
        warn!(error = %e, "failed to release backend cursor");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    use serde_json::json;

    use crate::es::client::{
        CursorIndex, EsError, PhrasesPageRequest, SearchBackend, WordsPageRequest,
    };
    use crate::es::query::TranslationFilter;
    use crate::es::types::{
        EsHit, HighlightBlock, InnerHit, InnerHits, InnerHitsBlock, InnerHitsList, PhrasesPage,
        SentenceSource, TranslationSource, WordSource, WordsPage,
    };
    use crate::highlight::coords::Coordinate;

    /// Queue-backed backend double: pages are served in order, follow-up
    /// lookups answer from in-memory sentence/word stores.
    #[derive(Default)]
    pub(crate) struct MockBackend {
        pub words_pages: Mutex<VecDeque<Result<WordsPage, EsError>>>,
        pub phrases_pages: Mutex<VecDeque<Result<PhrasesPage, EsError>>>,
        pub sentences: Mutex<Vec<EsHit<SentenceSource>>>,
        pub sentence_words: Mutex<HashMap<String, Vec<EsHit<WordSource>>>>,
        pub fail_open: Mutex<Vec<CursorIndex>>,
        pub opened: Mutex<Vec<String>>,
        pub closed: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn queue_words(&self, page: Result<WordsPage, EsError>) {
            self.words_pages.lock().unwrap().push_back(page);
        }

        pub fn queue_phrases(&self, page: Result<PhrasesPage, EsError>) {
            self.phrases_pages.lock().unwrap().push_back(page);
        }

        pub fn store_sentence(&self, hit: EsHit<SentenceSource>) {
            self.sentences.lock().unwrap().push(hit);
        }

        pub fn store_words(&self, sentence_id: &str, hits: Vec<EsHit<WordSource>>) {
            self.sentence_words
                .lock()
                .unwrap()
                .insert(sentence_id.to_string(), hits);
        }
    }

    impl SearchBackend for MockBackend {
        async fn open_cursor(&self, index: CursorIndex) -> Result<String, EsError> {
            if self.fail_open.lock().unwrap().contains(&index) {
                return Err(EsError::Api {
                    code: 500,
                    message: "cursor refused".into(),
                });
            }
            let id = format!("{}-cursor", index.label());
            self.opened.lock().unwrap().push(id.clone());
            Ok(id)
        }

        async fn close_cursor(&self, cursor_id: &str) -> Result<(), EsError> {
            self.closed.lock().unwrap().push(cursor_id.to_string());
            Ok(())
        }

        async fn words_page(&self, _request: &WordsPageRequest<'_>) -> Result<WordsPage, EsError> {
            self.words_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(WordsPage::default()))
        }

        async fn phrases_page(
            &self,
            _request: &PhrasesPageRequest<'_>,
        ) -> Result<PhrasesPage, EsError> {
            self.phrases_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PhrasesPage::default()))
        }

        async fn sentence_coordinates(
            &self,
            _meeting_id: &str,
            sentence_ids: &[String],
        ) -> Result<Vec<EsHit<SentenceSource>>, EsError> {
            Ok(self
                .sentences
                .lock()
                .unwrap()
                .iter()
                .filter(|h| sentence_ids.contains(&h.source.sentence_id))
                .cloned()
                .collect())
        }

        async fn words_at_positions(
            &self,
            _meeting_id: &str,
            sentence_id: &str,
            translation: TranslationFilter<'_>,
            positions: Option<&[usize]>,
        ) -> Result<Vec<EsHit<WordSource>>, EsError> {
            let store = self.sentence_words.lock().unwrap();
            let mut hits: Vec<EsHit<WordSource>> = store
                .get(sentence_id)
                .cloned()
                .unwrap_or_default()
                .into_iter()
                .filter(|h| match translation {
                    TranslationFilter::Original => h.source.original,
                    TranslationFilter::Lang(lang) => h.source.lang == lang,
                })
                .filter(|h| positions.is_none_or(|p| p.contains(&(h.source.wpos as usize))))
                .collect();
            hits.sort_by_key(|h| h.source.wpos);
            Ok(hits)
        }
    }

    pub(crate) fn coord(page: u32, x0: f64, y0: f64) -> Coordinate {
        Coordinate {
            page,
            x0,
            y0,
            x1: x0 + 10.0,
            y1: y0 + 10.0,
        }
    }

    pub(crate) fn word_hit(
        word_id: &str,
        sentence_id: &str,
        text: &str,
        lang: &str,
        original: bool,
        propn: bool,
        wpos: u32,
    ) -> EsHit<WordSource> {
        EsHit {
            source: WordSource {
                meeting_id: "m1".into(),
                sentence_id: sentence_id.into(),
                segment_id: String::new(),
                word_id: word_id.into(),
                text: text.into(),
                lemma: text.to_lowercase(),
                speaker: None,
                pos: wpos,
                wpos,
                coordinates: vec![coord(0, f64::from(wpos) * 20.0, 100.0)],
                lang: lang.into(),
                original,
                propn,
            },
            sort: Some(vec![json!(word_id)]),
            highlight: None,
            inner_hits: None,
        }
    }

    pub(crate) fn sentence_hit(
        sentence_id: &str,
        matched: Option<(&str, bool, &str)>,
        markup: Option<&str>,
    ) -> EsHit<SentenceSource> {
        EsHit {
            source: SentenceSource {
                meeting_id: "m1".into(),
                sentence_id: sentence_id.into(),
                segment_id: String::new(),
                speaker: None,
                coordinates: vec![coord(0, 0.0, 50.0)],
                translations: Vec::new(),
            },
            sort: Some(vec![json!(sentence_id)]),
            highlight: markup.map(|m| HighlightBlock {
                translations_text: vec![m.to_string()],
            }),
            inner_hits: matched.map(|(lang, original, text)| InnerHits {
                matched_translation: InnerHitsBlock {
                    hits: InnerHitsList {
                        hits: vec![InnerHit {
                            source: TranslationSource {
                                text: text.to_string(),
                                lang: lang.to_string(),
                                original,
                            },
                        }],
                    },
                },
            }),
        }
    }

    pub(crate) fn words_page(hits: Vec<EsHit<WordSource>>) -> WordsPage {
        let last_sort = hits.last().and_then(|h| h.sort.clone());
        WordsPage { hits, last_sort }
    }

    pub(crate) fn phrases_page(hits: Vec<EsHit<SentenceSource>>) -> PhrasesPage {
        let last_sort = hits.last().and_then(|h| h.sort.clone());
        PhrasesPage { hits, last_sort }
    }
}
