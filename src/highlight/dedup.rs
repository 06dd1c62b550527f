//! Overlap removal: each logical match is represented exactly once, at the
//! coarsest granularity available.

use std::collections::HashSet;

use super::{Candidate, CandidateKind};

/// Filters a mixed set of candidates so that a whole-sentence highlight
/// suppresses any word or phrase highlight inside it, and an accepted phrase
/// suppresses the words it covers.
///
/// The passes run per granularity (sentence, phrase, word), so the result is
/// independent of input order and feeding an output back in reproduces it.
/// Output order is sentence candidates first, then phrases, then words.
pub(crate) fn dedupe(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut sentences = Vec::new();
    let mut phrases = Vec::new();
    let mut words = Vec::new();
    for candidate in candidates {
        match candidate.kind {
            CandidateKind::Sentence => sentences.push(candidate),
            CandidateKind::Phrase => phrases.push(candidate),
            CandidateKind::Word => words.push(candidate),
        }
    }

    let mut covered_sentences: HashSet<String> = HashSet::new();
    let mut kept = Vec::new();
    for candidate in sentences {
        if covered_sentences.insert(candidate.sentence_id.clone()) {
            kept.push(candidate);
        }
    }

    // Longer phrases first, so a sub-phrase never suppresses its superset.
    phrases.sort_by(|a, b| b.ids.len().cmp(&a.ids.len()));
    let mut accepted_phrases: Vec<HashSet<String>> = Vec::new();
    let mut best_effort_sentences: HashSet<String> = HashSet::new();
    let mut kept_phrases = Vec::new();
    for candidate in phrases {
        if covered_sentences.contains(&candidate.sentence_id) {
            continue;
        }
        if candidate.ids.is_empty() {
            // Best-effort alignment result: no word ids, but the match must
            // still be reported once for its sentence.
            if best_effort_sentences.insert(candidate.sentence_id.clone()) {
                kept_phrases.push(candidate);
            }
            continue;
        }
        let ids: HashSet<String> = candidate.ids.iter().cloned().collect();
        if accepted_phrases.iter().any(|p| ids.is_subset(p)) {
            continue;
        }
        accepted_phrases.push(ids);
        kept_phrases.push(candidate);
    }

    let mut seen_words: HashSet<String> = HashSet::new();
    let mut kept_words = Vec::new();
    for candidate in words {
        if covered_sentences.contains(&candidate.sentence_id) {
            continue;
        }
        let Some(id) = candidate.ids.first() else {
            continue;
        };
        if accepted_phrases.iter().any(|p| p.contains(id)) {
            continue;
        }
        if seen_words.insert(id.clone()) {
            kept_words.push(candidate);
        }
    }

    kept.extend(kept_phrases);
    kept.extend(kept_words);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(sentence_id: &str) -> Candidate {
        Candidate {
            kind: CandidateKind::Sentence,
            sentence_id: sentence_id.to_string(),
            ids: vec![sentence_id.to_string()],
            coordinates: Vec::new(),
        }
    }

    fn word(sentence_id: &str, id: &str) -> Candidate {
        Candidate {
            kind: CandidateKind::Word,
            sentence_id: sentence_id.to_string(),
            ids: vec![id.to_string()],
            coordinates: Vec::new(),
        }
    }

    fn phrase(sentence_id: &str, ids: &[&str]) -> Candidate {
        Candidate {
            kind: CandidateKind::Phrase,
            sentence_id: sentence_id.to_string(),
            ids: ids.iter().map(|i| i.to_string()).collect(),
            coordinates: Vec::new(),
        }
    }

    fn id_sets(candidates: &[Candidate]) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = candidates.iter().map(|c| c.ids.clone()).collect();
        sets.sort();
        sets
    }

    #[test]
    fn sentence_suppresses_its_words_and_phrases() {
        let kept = dedupe(vec![
            word("s1", "s1.w0"),
            sentence("s1"),
            phrase("s1", &["s1.w2", "s1.w3"]),
            word("s2", "s2.w1"),
        ]);

        assert_eq!(id_sets(&kept), vec![vec!["s1".to_string()], vec!["s2.w1".to_string()]]);
    }

    #[test]
    fn phrase_suppresses_the_words_it_covers() {
        let kept = dedupe(vec![
            phrase("s1", &["s1.w1", "s1.w2"]),
            word("s1", "s1.w1"),
            word("s1", "s1.w4"),
        ]);

        assert_eq!(
            id_sets(&kept),
            vec![
                vec!["s1.w1".to_string(), "s1.w2".to_string()],
                vec!["s1.w4".to_string()],
            ]
        );
    }

    #[test]
    fn duplicate_candidates_collapse() {
        let kept = dedupe(vec![
            sentence("s1"),
            sentence("s1"),
            word("s2", "s2.w0"),
            word("s2", "s2.w0"),
            phrase("s3", &["s3.w0", "s3.w1"]),
            phrase("s3", &["s3.w0", "s3.w1"]),
        ]);

        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn idempotent_and_order_independent() {
        let build = || {
            vec![
                word("s1", "s1.w0"),
                sentence("s1"),
                phrase("s2", &["s2.w0", "s2.w1"]),
                word("s2", "s2.w0"),
                word("s3", "s3.w5"),
            ]
        };

        let once = dedupe(build());
        let mut reversed = build();
        reversed.reverse();
        let backwards = dedupe(reversed);
        let twice = dedupe(once.iter().cloned().chain(once.iter().cloned()).collect());

        assert_eq!(id_sets(&once), id_sets(&backwards));
        assert_eq!(id_sets(&once), id_sets(&twice));
    }

    #[test]
    fn sub_phrase_is_covered_by_its_superset() {
        let kept = dedupe(vec![
            phrase("s1", &["s1.w1", "s1.w2"]),
            phrase("s1", &["s1.w1", "s1.w2", "s1.w3"]),
        ]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].ids.len(), 3);
    }

    #[test]
    fn best_effort_phrase_without_ids_is_kept_once() {
        let kept = dedupe(vec![
            phrase("s1", &[]),
            phrase("s1", &[]),
            phrase("s2", &["s2.w0", "s2.w1"]),
        ]);

        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn best_effort_phrase_still_suppressed_by_sentence() {
        let kept = dedupe(vec![sentence("s1"), phrase("s1", &[])]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].kind, CandidateKind::Sentence);
    }

    #[test]
    fn output_order_is_sentences_then_phrases_then_words() {
        let kept = dedupe(vec![
            word("s3", "s3.w0"),
            phrase("s2", &["s2.w0", "s2.w1"]),
            sentence("s1"),
        ]);

        let kinds: Vec<_> = kept.iter().map(|c| c.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![CandidateKind::Sentence, CandidateKind::Phrase, CandidateKind::Word]
        );
    }
}
