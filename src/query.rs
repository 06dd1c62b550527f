//! Query tokenization: OR-groups of single words and quoted phrases.

use deunicode::deunicode;

/// A single search token. Quoted substrings with more than one word become a
/// [`Token::Phrase`]; everything else splits on whitespace into words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    Phrase(Vec<String>),
}

/// Folds a term for matching: lowercased, diacritics reduced to ASCII.
/// Display text shown to users is never passed through this.
pub(crate) fn fold(text: &str) -> String {
    deunicode(&text.to_lowercase())
}

/// Splits a raw query into OR-groups of tokens.
///
/// The standalone unquoted token `OR` separates groups. Quoted substrings
/// become one token; an unmatched quote is kept as literal text. Empty groups
/// are dropped, so a blank query yields no groups.
pub fn tokenize(query: &str) -> Vec<Vec<Token>> {
    let mut groups = Vec::new();
    let mut group = Vec::new();
    let mut rest = query;

    while let Some(quote) = rest.find('"') {
        let Some(len) = rest[quote + 1..].find('"') else {
            // No closing quote: the quote character is literal text.
            push_words(&mut groups, &mut group, rest);
            rest = "";
            break;
        };
        push_words(&mut groups, &mut group, &rest[..quote]);
        let inner = &rest[quote + 1..quote + 1 + len];
        let mut words: Vec<String> = inner.split_whitespace().map(fold).collect();
        match words.len() {
            0 => {}
            1 => group.push(Token::Word(words.remove(0))),
            _ => group.push(Token::Phrase(words)),
        }
        rest = &rest[quote + 2 + len..];
    }
    push_words(&mut groups, &mut group, rest);

    if !group.is_empty() {
        groups.push(group);
    }
    groups
}

fn push_words(groups: &mut Vec<Vec<Token>>, group: &mut Vec<Token>, text: &str) {
    for raw in text.split_whitespace() {
        if raw == "OR" {
            if !group.is_empty() {
                groups.push(std::mem::take(group));
            }
        } else {
            group.push(Token::Word(fold(raw)));
        }
    }
}

/// Flattens OR-groups into the word and phrase term lists the highlight
/// engine queries with. Highlighting is indifferent to the OR-structure:
/// every term that matches anywhere gets highlighted.
pub fn split_terms(groups: &[Vec<Token>]) -> (Vec<String>, Vec<Vec<String>>) {
    let mut words = Vec::new();
    let mut phrases = Vec::new();
    for token in groups.iter().flatten() {
        match token {
            Token::Word(w) => words.push(w.clone()),
            Token::Phrase(p) => phrases.push(p.clone()),
        }
    }
    (words, phrases)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(w: &str) -> Token {
        Token::Word(w.to_string())
    }

    fn phrase(words: &[&str]) -> Token {
        Token::Phrase(words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn quoted_phrase_and_or_groups() {
        let groups = tokenize(r#""a b" c OR d"#);
        assert_eq!(
            groups,
            vec![
                vec![phrase(&["a", "b"]), word("c")],
                vec![word("d")],
            ]
        );
    }

    #[test]
    fn unmatched_quote_is_literal() {
        let groups = tokenize(r#"foo "bar"#);
        assert_eq!(groups, vec![vec![word("foo"), word("\"bar")]]);
    }

    #[test]
    fn empty_and_whitespace_queries_yield_nothing() {
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn empty_or_groups_are_dropped() {
        let groups = tokenize("a OR OR b OR");
        assert_eq!(groups, vec![vec![word("a")], vec![word("b")]]);
    }

    #[test]
    fn or_inside_quotes_is_part_of_the_phrase() {
        let groups = tokenize(r#""to be OR not""#);
        assert_eq!(groups, vec![vec![phrase(&["to", "be", "or", "not"])]]);
    }

    #[test]
    fn quoted_single_word_is_a_word() {
        let groups = tokenize(r#""quick""#);
        assert_eq!(groups, vec![vec![word("quick")]]);
    }

    #[test]
    fn folds_case_and_diacritics() {
        let groups = tokenize("Čaj Über");
        assert_eq!(groups, vec![vec![word("caj"), word("uber")]]);
    }

    #[test]
    fn lowercase_or_is_not_a_separator() {
        let groups = tokenize("a or b");
        assert_eq!(groups, vec![vec![word("a"), word("or"), word("b")]]);
    }

    #[test]
    fn split_terms_separates_words_from_phrases() {
        let groups = tokenize(r#""quick fox" lazy OR dog"#);
        let (words, phrases) = split_terms(&groups);
        assert_eq!(words, vec!["lazy", "dog"]);
        assert_eq!(phrases, vec![vec!["quick", "fox"]]);
    }

    #[test]
    fn empty_quotes_are_ignored() {
        let groups = tokenize(r#""" a"#);
        assert_eq!(groups, vec![vec![word("a")]]);
    }
}
