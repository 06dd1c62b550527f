//! Search strategies: original-language mode versus a requested translation.
//!
//! Without a target language the engine searches every translation and has
//! to decide, per hit, whether the reader of the original transcript can be
//! pointed at a word or only at the translated sentence as a whole. With a
//! target language every match is already in the language on screen, so hits
//! map straight to word highlights.

use std::collections::{HashMap, HashSet};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::es::client::{PhrasesPageRequest, SearchBackend, WordsPageRequest};
use crate::es::query::TranslationFilter;
use crate::es::types::{EsHit, PhrasesPage, SentenceSource, WordsPage};
use crate::highlight::coords::Coordinate;

use super::{Candidate, ChunkQuery, align};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SearchStrategy {
    /// Search across all languages, disambiguating original vs. translation.
    Original,
    /// Search restricted to one translation language.
    Translated { lang: String },
}

impl SearchStrategy {
    pub(crate) fn for_lang(lang: Option<&str>) -> Self {
        match lang.map(str::trim).filter(|l| !l.is_empty()) {
            Some(lang) => SearchStrategy::Translated {
                lang: lang.to_string(),
            },
            None => SearchStrategy::Original,
        }
    }

    fn lang(&self) -> Option<&str> {
        match self {
            SearchStrategy::Original => None,
            SearchStrategy::Translated { lang } => Some(lang),
        }
    }

    fn translation_filter(&self) -> TranslationFilter<'_> {
        match self {
            SearchStrategy::Original => TranslationFilter::Original,
            SearchStrategy::Translated { lang } => TranslationFilter::Lang(lang),
        }
    }

    /// Fetches one page from each index concurrently. A failed sub-query
    /// degrades to an empty page for that index: partial results beat total
    /// failure.
    pub(crate) async fn search(
        &self,
        backend: &impl SearchBackend,
        query: &ChunkQuery<'_>,
        want_words: bool,
        want_phrases: bool,
    ) -> (WordsPage, PhrasesPage) {
        let words_future = async {
            if !want_words {
                return WordsPage::default();
            }
            let request = WordsPageRequest {
                meeting_id: query.meeting_id,
                words: query.words,
                speaker: query.speaker,
                lang: self.lang(),
                loose: query.loose,
                size: query.size,
                cursor_id: query.words_cursor,
                search_after: query.after_words,
            };
            match backend.words_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "word search failed for this chunk (continuing without it)");
                    WordsPage::default()
                }
            }
        };
        let phrases_future = async {
            if !want_phrases {
                return PhrasesPage::default();
            }
            let request = PhrasesPageRequest {
                meeting_id: query.meeting_id,
                phrases: query.phrases,
                speaker: query.speaker,
                lang: self.lang(),
                loose: query.loose,
                size: query.size,
                cursor_id: query.sentences_cursor,
                search_after: query.after_sentences,
            };
            match backend.phrases_page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(error = %e, "phrase search failed for this chunk (continuing without it)");
                    PhrasesPage::default()
                }
            }
        };

        futures::join!(words_future, phrases_future)
    }

    /// Turns word-index hits into candidates.
    ///
    /// Original mode escalates matches found only in a translation to
    /// whole-sentence highlights; proper nouns are language-invariant and
    /// always stay word-level.
    pub(crate) async fn process_words(
        &self,
        backend: &impl SearchBackend,
        meeting_id: &str,
        page: &WordsPage,
    ) -> Vec<Candidate> {
        match self {
            SearchStrategy::Translated { .. } => {
                page.hits.iter().map(|hit| Candidate::word(&hit.source)).collect()
            }
            SearchStrategy::Original => {
                let mut escalated: Vec<String> = Vec::new();
                for hit in &page.hits {
                    let source = &hit.source;
                    if !source.original
                        && !source.propn
                        && !escalated.contains(&source.sentence_id)
                    {
                        escalated.push(source.sentence_id.clone());
                    }
                }
                let escalated_set: HashSet<&str> =
                    escalated.iter().map(String::as_str).collect();

                let mut candidates =
                    escalate_sentences(backend, meeting_id, &escalated).await;
                candidates.extend(
                    page.hits
                        .iter()
                        .filter(|hit| hit.source.original || hit.source.propn)
                        .filter(|hit| !escalated_set.contains(hit.source.sentence_id.as_str()))
                        .map(|hit| Candidate::word(&hit.source)),
                );
                candidates
            }
        }
    }

    /// Turns sentence-index (phrase) hits into candidates. Matches in the
    /// language being read resolve down to word ids through the aligner; in
    /// original mode a match found only in a translation escalates to the
    /// whole sentence.
    pub(crate) async fn process_phrases(
        &self,
        backend: &impl SearchBackend,
        meeting_id: &str,
        phrases: &[Vec<String>],
        page: &PhrasesPage,
    ) -> Vec<Candidate> {
        let mut candidates = Vec::new();
        let mut to_align = Vec::new();

        for hit in &page.hits {
            let escalate = matches!(self, SearchStrategy::Original)
                && hit.matched_translation().is_some_and(|t| !t.original);
            if escalate {
                candidates.push(Candidate::sentence(
                    hit.source.sentence_id.clone(),
                    hit.source.coordinates.clone(),
                ));
            } else {
                to_align.push(hit);
            }
        }

        let aligned = join_all(
            to_align
                .iter()
                .map(|hit| self.align_phrase_hit(backend, meeting_id, phrases, hit)),
        )
        .await;
        candidates.extend(aligned.into_iter().flatten());
        candidates
    }

    /// Resolves one phrase-matched sentence to runs of word ids. Prefers the
    /// backend's positional highlight; falls back to a sliding-window match
    /// over the sentence's words; reports the sentence best-effort when
    /// neither aligns.
    async fn align_phrase_hit(
        &self,
        backend: &impl SearchBackend,
        meeting_id: &str,
        phrases: &[Vec<String>],
        hit: &EsHit<SentenceSource>,
    ) -> Vec<Candidate> {
        let sentence_id = &hit.source.sentence_id;
        let translation = self.translation_filter();

        if let Some(marked) = hit.highlight_markup() {
            let positions = align::highlighted_positions(marked);
            if !positions.is_empty() {
                match backend
                    .words_at_positions(meeting_id, sentence_id, translation, Some(&positions))
                    .await
                {
                    Ok(word_hits) if !word_hits.is_empty() => {
                        return align::adjacent_runs(word_hits, |h| h.source.wpos)
                            .iter()
                            .map(|run| Candidate::phrase_run(sentence_id, run))
                            .collect();
                    }
                    Ok(_) => {
                        debug!(sentence = %sentence_id, "highlighted positions missing from word index");
                    }
                    Err(e) => {
                        warn!(error = %e, sentence = %sentence_id, "word position lookup failed");
                    }
                }
            }
        }

        match backend
            .words_at_positions(meeting_id, sentence_id, translation, None)
            .await
        {
            Ok(word_hits) if !word_hits.is_empty() => {
                let texts: Vec<&str> =
                    word_hits.iter().map(|h| h.source.text.as_str()).collect();
                let mut aligned = Vec::new();
                for phrase in phrases {
                    if let Some(start) = align::find_window(&texts, phrase) {
                        aligned.push(Candidate::phrase_run(
                            sentence_id,
                            &word_hits[start..start + phrase.len()],
                        ));
                    }
                }
                if aligned.is_empty() {
                    aligned.push(Candidate::best_effort(hit));
                }
                aligned
            }
            Ok(_) => vec![Candidate::best_effort(hit)],
            Err(e) => {
                warn!(error = %e, sentence = %sentence_id, "sentence word lookup failed; reporting best-effort match");
                vec![Candidate::best_effort(hit)]
            }
        }
    }
}

/// Fetches coordinates for sentences escalated to whole-sentence highlights.
/// A failed lookup still yields the candidates, without rectangles, so the
/// transcript side of the highlight survives.
async fn escalate_sentences(
    backend: &impl SearchBackend,
    meeting_id: &str,
    sentence_ids: &[String],
) -> Vec<Candidate> {
    if sentence_ids.is_empty() {
        return Vec::new();
    }
    let mut coordinates: HashMap<String, Vec<Coordinate>> =
        match backend.sentence_coordinates(meeting_id, sentence_ids).await {
            Ok(hits) => hits
                .into_iter()
                .map(|h| (h.source.sentence_id, h.source.coordinates))
                .collect(),
            Err(e) => {
                warn!(error = %e, "sentence lookup failed; escalating without coordinates");
                HashMap::new()
            }
        };

    sentence_ids
        .iter()
        .map(|id| Candidate::sentence(id.clone(), coordinates.remove(id).unwrap_or_default()))
        .collect()
}
