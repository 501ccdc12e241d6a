//! Word-bounded chunking of oversized note bodies

use std::str::SplitWhitespace;

/// Split `body` into runs of at most `max_words` words.
///
/// A body at or under the limit comes back unchanged as a single chunk.
/// Longer bodies are re-joined with single spaces. Splitting happens only
/// on whitespace, so a chunk never ends inside a character.
pub fn split(body: &str, max_words: usize) -> Chunks<'_> {
    let max_words = max_words.max(1);
    let whole = body.split_whitespace().nth(max_words).is_none();

    Chunks {
        body,
        words: body.split_whitespace(),
        max_words,
        whole,
        done: false,
    }
}

/// Lazy chunk iterator. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    body: &'a str,
    words: SplitWhitespace<'a>,
    max_words: usize,
    whole: bool,
    done: bool,
}

impl<'a> Chunks<'a> {
    /// Fresh iterator over the same body
    pub fn restart(&self) -> Chunks<'a> {
        split(self.body, self.max_words)
    }
}

impl Iterator for Chunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.done {
            return None;
        }
        if self.whole {
            self.done = true;
            return Some(self.body.to_string());
        }

        let words: Vec<&str> = self.words.by_ref().take(self.max_words).collect();
        if words.is_empty() {
            self.done = true;
            return None;
        }
        Some(words.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn test_short_body_is_single_chunk() {
        let body = "  keep   my\tspacing ";
        let chunks: Vec<String> = split(body, 10).collect();
        assert_eq!(chunks, vec![body.to_string()]);

        let exact = words(5);
        assert_eq!(split(&exact, 5).collect::<Vec<_>>(), vec![exact.clone()]);
    }

    #[test]
    fn test_long_body_splits_in_order() {
        let body = words(1200);
        let chunks: Vec<String> = split(&body, 500).collect();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].split(' ').count(), 500);
        assert_eq!(chunks[2].split(' ').count(), 200);
        assert!(chunks[1].starts_with("w500 "));
        assert_eq!(chunks.join(" "), body);
    }

    #[test]
    fn test_multibyte_words_stay_whole() {
        let body = "한국어 테스트 ünïcödé 🦊 fox";
        let chunks: Vec<String> = split(body, 2).collect();
        assert_eq!(chunks, vec!["한국어 테스트", "ünïcödé 🦊", "fox"]);
    }

    #[test]
    fn test_restart_and_zero_limit() {
        let body = words(3);
        let mut chunks = split(&body, 0);
        assert_eq!(chunks.next().as_deref(), Some("w0"));

        let again: Vec<String> = chunks.restart().collect();
        assert_eq!(again, vec!["w0", "w1", "w2"]);
        assert_eq!(chunks.count(), 2);
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(split("", 10).collect::<Vec<_>>(), vec![String::new()]);
    }
}
