//! Wire types for the backend search service.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::highlight::coords::Coordinate;

/// The index stores boolean flags as 0/1 integers.
fn de_int_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(u8::deserialize(deserializer)? != 0)
}

/// A word-index document.
#[derive(Debug, Clone, Deserialize)]
pub struct WordSource {
    pub meeting_id: String,
    pub sentence_id: String,
    #[serde(default)]
    pub segment_id: String,
    pub word_id: String,
    pub text: String,
    #[serde(default)]
    pub lemma: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub pos: u32,
    #[serde(default)]
    pub wpos: u32,
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
    pub lang: String,
    #[serde(default, deserialize_with = "de_int_bool")]
    pub original: bool,
    #[serde(default, deserialize_with = "de_int_bool")]
    pub propn: bool,
}

/// A nested translation inside a sentence-index document.
#[derive(Debug, Clone, Deserialize)]
pub struct TranslationSource {
    #[serde(default)]
    pub text: String,
    pub lang: String,
    #[serde(default, deserialize_with = "de_int_bool")]
    pub original: bool,
}

/// A sentence-index document.
#[derive(Debug, Clone, Deserialize)]
pub struct SentenceSource {
    pub meeting_id: String,
    pub sentence_id: String,
    #[serde(default)]
    pub segment_id: String,
    #[serde(default)]
    pub speaker: Option<String>,
    #[serde(default)]
    pub coordinates: Vec<Coordinate>,
    #[serde(default)]
    pub translations: Vec<TranslationSource>,
}

/// Whole-field highlight markup returned alongside a phrase match.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HighlightBlock {
    #[serde(rename = "translations.text", default)]
    pub translations_text: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerHit {
    #[serde(rename = "_source")]
    pub source: TranslationSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerHitsList {
    #[serde(default)]
    pub hits: Vec<InnerHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InnerHitsBlock {
    pub hits: InnerHitsList,
}

/// The `matched_translation` inner hits of a phrase match, sorted so the
/// original translation comes first when several translations matched.
#[derive(Debug, Clone, Deserialize)]
pub struct InnerHits {
    pub matched_translation: InnerHitsBlock,
}

/// One ranked hit. `sort` carries the search-after key for cursor paging.
#[derive(Debug, Clone, Deserialize)]
pub struct EsHit<T> {
    #[serde(rename = "_source")]
    pub source: T,
    #[serde(default)]
    pub sort: Option<Vec<Value>>,
    #[serde(default)]
    pub highlight: Option<HighlightBlock>,
    #[serde(default)]
    pub inner_hits: Option<InnerHits>,
}

impl<T> EsHit<T> {
    /// The best matched translation of a phrase hit, when present.
    pub fn matched_translation(&self) -> Option<&TranslationSource> {
        self.inner_hits
            .as_ref()
            .and_then(|i| i.matched_translation.hits.hits.first())
            .map(|h| &h.source)
    }

    /// The whole-field highlight markup of a phrase hit, when present.
    pub fn highlight_markup(&self) -> Option<&str> {
        self.highlight
            .as_ref()
            .and_then(|h| h.translations_text.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct HitsEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub hits: Vec<EsHit<T>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct SearchResponse<T> {
    pub hits: HitsEnvelope<T>,
}

#[derive(Debug, Deserialize)]
pub struct PitResponse {
    pub id: String,
}

/// One page of word-index hits plus the search-after key to continue from.
#[derive(Debug, Default)]
pub struct WordsPage {
    pub hits: Vec<EsHit<WordSource>>,
    pub last_sort: Option<Vec<Value>>,
}

/// One page of sentence-index (phrase) hits plus its search-after key.
#[derive(Debug, Default)]
pub struct PhrasesPage {
    pub hits: Vec<EsHit<SentenceSource>>,
    pub last_sort: Option<Vec<Value>>,
}
