use crate::http::{CleanBody, CleanReply, CleanService, TransportError};

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;

/// Typographic and zero-width characters stripped from the text.
const INVISIBLE: [char; 34] = [
    '\u{2014}', '\u{2003}', '\u{2013}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}',
    '\u{200B}', '\u{2002}', '\u{00A0}', '\u{202F}', '\u{2060}', '\u{200C}', '\u{200D}',
    '\u{200E}', '\u{200F}', '\u{FEFF}', '\u{2061}', '\u{2062}', '\u{2063}', '\u{2064}',
    '\u{180E}', '\u{2001}', '\u{2008}', '\u{2009}', '\u{200A}', '\u{3164}', '\u{2E3B}',
    '\u{00AD}', '\u{202E}', '\u{2800}', '\u{2011}', '\u{2212}', '\u{02BC}',
];

static DASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?:--+|[\u{2013}\u{2014}\u{2015}\u{2E3B}]+)").unwrap());
static MULTISPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn remove_control_chars(s: &str) -> String {
    s.chars().filter(|c| u32::from(*c) >= 32).collect()
}

fn normalize_dashes(s: &str) -> String {
    DASH_PATTERN.replace_all(s, "-").into_owned()
}

fn remove_invisible(s: &str) -> String {
    s.chars().filter(|c| !INVISIBLE.contains(c)).collect()
}

fn collapse_spaces(s: &str) -> String {
    MULTISPACE.replace_all(s, " ").trim().to_string()
}

/// Runs the cleaning pipeline: control characters, dash runs, invisible
/// characters, then whitespace. Dashes go before the invisible pass because
/// en and em dashes are on the invisible list too.
pub fn clean_text(s: &str) -> String {
    let s = remove_control_chars(s);
    let s = normalize_dashes(&s);
    let s = remove_invisible(&s);
    collapse_spaces(&s)
}

/// Answers clean requests in-process, the way a healthy service would.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCleaner;

#[async_trait]
impl CleanService for LocalCleaner {
    async fn clean(&self, _token: &str, text: &str) -> Result<CleanReply, TransportError> {
        Ok(CleanReply::new(StatusCode::OK, CleanBody::cleaned(clean_text(text))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(remove_control_chars("a\tb\nc\u{7}d"), "abcd");
        assert_eq!(remove_control_chars("plain text"), "plain text");
    }

    #[test]
    fn dash_runs_become_a_single_hyphen() {
        assert_eq!(normalize_dashes("a -- b"), "a - b");
        assert_eq!(normalize_dashes("a\u{2014}\u{2014}b"), "a-b");
        assert_eq!(normalize_dashes("1\u{2013}2"), "1-2");
        assert_eq!(normalize_dashes("x\u{2E3B}y"), "x-y");
        assert_eq!(normalize_dashes("well-known"), "well-known");
    }

    #[test]
    fn invisible_characters_are_removed() {
        assert_eq!(remove_invisible("zero\u{200B}width"), "zerowidth");
        assert_eq!(remove_invisible("\u{201C}quoted\u{201D}"), "quoted");
        assert_eq!(remove_invisible("soft\u{00AD}hyphen"), "softhyphen");
    }

    #[test]
    fn whitespace_is_collapsed_and_trimmed() {
        assert_eq!(collapse_spaces("  a   b \u{3000} c  "), "a b c");
    }

    #[test]
    fn pipeline_keeps_em_dashes_as_hyphens() {
        assert_eq!(
            clean_text("  Hello\u{200B}\u{2014}world --\tdone\n "),
            "Hello-world -done"
        );
        assert_eq!(clean_text("\u{2018}it\u{2019}s\u{00A0}fine\u{2019}"), "itsfine");
    }

    #[tokio::test]
    async fn local_cleaner_answers_like_the_service() {
        let reply = LocalCleaner.clean("ignored", "a  \u{2014} b").await.unwrap();
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body().clean(), Some("a - b"));
        assert_eq!(reply.body().detail(), None);
    }
}
