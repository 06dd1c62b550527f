//! Phrase alignment: recovering the word positions covered by a phrase match.
//!
//! The backend marks matched terms in a whole-field highlight with `<em>`
//! tags. [`highlighted_positions`] turns that markup into zero-based token
//! indexes. When no markup is available, [`find_window`] slides the phrase
//! over the sentence's word sequence instead.

use std::sync::LazyLock;

use regex::Regex;

use crate::query::fold;

static EM_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<em>(.*?)</em>").expect("valid regex"));

/// Zero-based token indexes of the `<em>`-marked terms in a highlighted
/// sentence. Tokens without any alphanumeric character (punctuation split off
/// by the tokenizer) are not counted, matching the index's word positions.
pub(crate) fn highlighted_positions(marked: &str) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut index = 0;
    let mut cursor = 0;

    for caps in EM_SPAN.captures_iter(marked) {
        let span = caps.get(0).expect("group 0 always present");
        index += count_tokens(&marked[cursor..span.start()]);
        // A span usually marks one term, but count its tokens to stay
        // correct if the backend ever merges adjacent terms into one tag.
        for _ in 0..count_tokens(&caps[1]).max(1) {
            positions.push(index);
            index += 1;
        }
        cursor = span.end();
    }

    positions
}

fn count_tokens(text: &str) -> usize {
    text.split_whitespace()
        .filter(|t| t.chars().any(char::is_alphanumeric))
        .count()
}

/// Finds the earliest window of `words` equal to `phrase` after folding.
/// Returns the starting index of the window, or `None` when the phrase does
/// not occur as a contiguous run.
pub(crate) fn find_window<S: AsRef<str>>(words: &[S], phrase: &[String]) -> Option<usize> {
    if phrase.is_empty() || words.len() < phrase.len() {
        return None;
    }
    let folded: Vec<String> = words.iter().map(|w| fold(w.as_ref())).collect();
    (0..=folded.len() - phrase.len())
        .find(|&start| phrase.iter().enumerate().all(|(i, tok)| folded[start + i] == *tok))
}

/// Splits items into runs of consecutive `wpos`, preserving order. Used to
/// separate multiple occurrences of a phrase within one sentence.
pub(crate) fn adjacent_runs<T>(items: Vec<T>, wpos: impl Fn(&T) -> u32) -> Vec<Vec<T>> {
    let mut runs: Vec<Vec<T>> = Vec::new();
    for item in items {
        match runs.last_mut() {
            Some(run) if wpos(run.last().expect("runs are never empty")) + 1 == wpos(&item) => {
                run.push(item)
            }
            _ => runs.push(vec![item]),
        }
    }
    runs
}
