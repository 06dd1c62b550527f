//! Query-body builders for the backend search service.

use serde_json::{Value, json};

/// Which translation of a sentence a word lookup should address.
#[derive(Debug, Clone, Copy)]
pub enum TranslationFilter<'a> {
    /// The original-language translation.
    Original,
    /// A specific translation language.
    Lang(&'a str),
}

/// Fuzziness applied to term matching. Exact unless loose search is on.
pub(crate) fn fuzziness(loose: bool) -> &'static str {
    if loose { "AUTO:5,10" } else { "0" }
}

fn speaker_clause(speaker: &str) -> Value {
    json!({
        "match": {
            "speaker": {
                "query": speaker,
                "fuzziness": "2",
                "operator": "and"
            }
        }
    })
}

/// Word-index query: one fuzzy-capable `multi_match` per word over text and
/// lemma, OR-combined, AND-ed with the optional speaker filter. `lang`
/// restricts to one translation language; without it every language is
/// searched and disambiguation happens during response processing.
pub(crate) fn words_search_query(
    meeting_id: &str,
    words: &[String],
    speaker: Option<&str>,
    lang: Option<&str>,
    loose: bool,
) -> Value {
    let mut filter = vec![json!({"term": {"meeting_id": meeting_id}})];
    if let Some(lang) = lang {
        filter.push(json!({"term": {"lang": lang}}));
    }

    let mut must = Vec::new();
    if let Some(speaker) = speaker {
        must.push(speaker_clause(speaker));
    }
    if !words.is_empty() {
        let should: Vec<Value> = words
            .iter()
            .map(|word| {
                json!({
                    "multi_match": {
                        "query": word,
                        "type": "best_fields",
                        "fields": ["text", "lemma"],
                        "minimum_should_match": 1,
                        "fuzziness": fuzziness(loose)
                    }
                })
            })
            .collect();
        must.push(json!({"bool": {"should": should, "minimum_should_match": 1}}));
    }

    json!({"bool": {"filter": filter, "must": must}})
}

/// Sentence-index query: one `span_near` (in order, no slop) per phrase over
/// the nested translation text, with `matched_translation` inner hits sorted
/// original-first and whole-field term highlighting.
pub(crate) fn phrases_search_query(
    meeting_id: &str,
    phrases: &[Vec<String>],
    speaker: Option<&str>,
    lang: Option<&str>,
    loose: bool,
) -> Value {
    let spans: Vec<Value> = phrases
        .iter()
        .map(|phrase| {
            let clauses: Vec<Value> = phrase
                .iter()
                .map(|word| {
                    json!({
                        "span_multi": {
                            "match": {
                                "fuzzy": {
                                    "translations.text": {
                                        "value": word,
                                        "fuzziness": fuzziness(loose)
                                    }
                                }
                            }
                        }
                    })
                })
                .collect();
            json!({"span_near": {"clauses": clauses, "slop": 0, "in_order": true}})
        })
        .collect();

    let mut nested_query = json!({"bool": {"should": spans, "minimum_should_match": 1}});
    if let Some(lang) = lang {
        nested_query["bool"]["filter"] = json!([{"term": {"translations.lang": lang}}]);
    }

    let mut must = Vec::new();
    if let Some(speaker) = speaker {
        must.push(speaker_clause(speaker));
    }
    must.push(json!({
        "nested": {
            "path": "translations",
            "query": nested_query,
            "inner_hits": {
                "name": "matched_translation",
                "highlight": {
                    "number_of_fragments": 0,
                    "fields": {"translations.text": {}}
                },
                "sort": [{"translations.original": {"order": "desc"}}]
            }
        }
    }));

    json!({
        "bool": {
            "filter": [{"term": {"meeting_id": meeting_id}}],
            "must": must
        }
    })
}

/// Lookup of whole sentences by id, for escalated sentence highlights.
pub(crate) fn sentence_coordinates_query(meeting_id: &str, sentence_ids: &[String]) -> Value {
    json!({
        "bool": {
            "filter": [
                {"term": {"meeting_id": meeting_id}},
                {"terms": {"sentence_id": sentence_ids}}
            ]
        }
    })
}

/// Lookup of one sentence's words in a given translation, optionally narrowed
/// to a set of word positions. Without positions the whole word sequence is
/// returned, which the sliding-window aligner scans.
pub(crate) fn words_at_positions_query(
    meeting_id: &str,
    sentence_id: &str,
    translation: TranslationFilter<'_>,
    positions: Option<&[usize]>,
) -> Value {
    let mut filter = vec![
        json!({"term": {"meeting_id": meeting_id}}),
        json!({"term": {"sentence_id": sentence_id}}),
    ];
    match translation {
        TranslationFilter::Original => filter.push(json!({"term": {"original": 1}})),
        TranslationFilter::Lang(lang) => filter.push(json!({"term": {"lang": lang}})),
    }
    if let Some(positions) = positions {
        filter.push(json!({"terms": {"wpos": positions}}));
    }

    json!({"bool": {"filter": filter}})
}

/// Assembles a words-index page request running under a cursor.
pub(crate) fn words_page_body(
    query: Value,
    size: usize,
    cursor_id: &str,
    keep_alive: &str,
    search_after: Option<&[Value]>,
) -> Value {
    let mut body = json!({
        "query": query,
        "size": size,
        "sort": [{"word_id": "asc"}],
        "pit": {"id": cursor_id, "keep_alive": keep_alive}
    });
    if let Some(after) = search_after {
        body["search_after"] = Value::Array(after.to_vec());
    }
    body
}

/// Assembles a sentences-index page request running under a cursor. The
/// top-level highlight mirrors the inner-hits one: response processing reads
/// the whole-field markup from here.
pub(crate) fn phrases_page_body(
    query: Value,
    size: usize,
    cursor_id: &str,
    keep_alive: &str,
    search_after: Option<&[Value]>,
) -> Value {
    let mut body = json!({
        "query": query,
        "size": size,
        "min_score": 1,
        "sort": [{"sentence_id": "asc"}],
        "pit": {"id": cursor_id, "keep_alive": keep_alive},
        "highlight": {
            "number_of_fragments": 0,
            "fragment_size": 10000,
            "fields": {"translations.text": {}}
        }
    });
    if let Some(after) = search_after {
        body["search_after"] = Value::Array(after.to_vec());
    }
    body
}
