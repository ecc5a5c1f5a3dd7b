//! Online sentence boundary detection over a token stream.
//!
//! Fragments are appended to an internal buffer; whenever the buffer
//! contains a real sentence boundary the prefix through the punctuation
//! is emitted. Abbreviations, decimals, ellipses and initials are not
//! boundaries. Newlines split when the preceding line is long enough.
//! The concatenation of emitted sentences, re-joined with the whitespace
//! the detector consumed, reproduces the input.

pub const DEFAULT_MIN_SENTENCE_LENGTH: usize = 10;
const MIN_FLUSH_LENGTH: usize = 3;

const SENTENCE_ENDERS: [char; 3] = ['.', '!', '?'];

/// Trailing-word abbreviations whose period does not end a sentence.
const ABBREVIATIONS: [&str; 29] = [
    "mr", "mrs", "ms", "dr", "prof", "sr", "jr", "vs", "etc", "inc", "ltd", "co", "corp", "st",
    "ave", "blvd", "rd", "apt", "no", "vol", "pg", "fig", "g", "e", "m", "b", "d", "a", "p",
];

pub struct SentenceTokenizer {
    min_sentence_length: usize,
    buffer: String,
}

impl SentenceTokenizer {
    pub fn new(min_sentence_length: usize) -> Self {
        SentenceTokenizer {
            min_sentence_length,
            buffer: String::new(),
        }
    }

    /// Append a fragment and return every complete sentence it finishes.
    pub fn push(&mut self, fragment: &str) -> Vec<String> {
        self.buffer.push_str(fragment);
        self.extract_sentences()
    }

    /// Emit whatever remains as a final sentence, if it is substantial
    /// enough to speak.
    pub fn flush(&mut self) -> Option<String> {
        let remainder = self.buffer.trim().to_string();
        self.buffer.clear();
        if remainder.chars().count() >= MIN_FLUSH_LENGTH {
            Some(remainder)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    fn extract_sentences(&mut self) -> Vec<String> {
        let mut extracted = Vec::new();
        loop {
            match self.find_boundary() {
                Some(split) => {
                    let sentence = self.buffer[..split].trim().to_string();
                    self.buffer = self.buffer[split..].trim_start().to_string();
                    extracted.push(sentence);
                }
                None => break,
            }
        }
        extracted
    }

    /// Byte index just past the next confirmed sentence boundary, or
    /// `None` when the buffer holds no complete sentence yet.
    fn find_boundary(&self) -> Option<usize> {
        for (pos, ch) in self.buffer.char_indices() {
            if !SENTENCE_ENDERS.contains(&ch) {
                continue;
            }
            let split = pos + ch.len_utf8();
            // Short prefixes are kept buffered rather than emitted.
            if self.buffer[..split].trim().chars().count() < self.min_sentence_length {
                continue;
            }
            if self.is_boundary(pos, ch) {
                return Some(split);
            }
        }

        // Newline boundary for lists and code lines.
        if let Some(newline_pos) = self.buffer.find('\n') {
            if self.buffer[..newline_pos].trim().chars().count() > self.min_sentence_length {
                return Some(newline_pos + 1);
            }
        }
        None
    }

    fn is_boundary(&self, pos: usize, ch: char) -> bool {
        let rest = &self.buffer[pos + ch.len_utf8()..];
        let next = rest.chars().next();

        // End of buffer counts as a boundary once the prefix is long
        // enough; the length gate ran before this check.
        let Some(next) = next else {
            return true;
        };

        if ch != '.' {
            return true;
        }
        if next == '.' {
            return false;
        }
        if next.is_ascii_digit() {
            return false;
        }
        if self.preceding_word_is_abbreviation(pos) {
            return false;
        }

        // Mid-buffer, a period only ends a sentence when whitespace and
        // an uppercase opener follow.
        let after_space = rest.trim_start();
        if after_space.is_empty() {
            return true;
        }
        next.is_whitespace()
            && after_space
                .chars()
                .next()
                .is_some_and(|c| c.is_uppercase())
    }

    fn preceding_word_is_abbreviation(&self, pos: usize) -> bool {
        let before = &self.buffer[..pos];
        let word: String = before
            .chars()
            .rev()
            .take_while(|c| c.is_alphabetic())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        if word.is_empty() {
            return false;
        }
        // Single letters read as initials ("J. Smith").
        if word.chars().count() == 1 {
            return true;
        }
        ABBREVIATIONS.contains(&word.to_lowercase().as_str())
    }
}

impl Default for SentenceTokenizer {
    fn default() -> Self {
        SentenceTokenizer::new(DEFAULT_MIN_SENTENCE_LENGTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(fragments: &[&str]) -> (Vec<String>, Option<String>) {
        let mut tokenizer = SentenceTokenizer::default();
        let mut sentences = Vec::new();
        for fragment in fragments {
            sentences.extend(tokenizer.push(fragment));
        }
        let tail = tokenizer.flush();
        (sentences, tail)
    }

    #[test]
    fn splits_the_canonical_token_sequence() {
        // The closing "?" lands at the end of the buffer and is emitted
        // immediately rather than waiting for a token that never comes.
        let (sentences, tail) = run(&["He", "llo", " world", ". How ", "are you", "?"]);
        assert_eq!(
            sentences,
            vec!["Hello world.".to_string(), "How are you?".to_string()]
        );
        assert_eq!(tail, None);
    }

    #[test]
    fn exclamations_and_questions_split_midstream() {
        let (sentences, tail) = run(&["What a day this is! Tomorrow looks better. Onward we go"]);
        assert_eq!(
            sentences,
            vec![
                "What a day this is!".to_string(),
                "Tomorrow looks better.".to_string(),
            ]
        );
        assert_eq!(tail, Some("Onward we go".to_string()));
    }

    #[test]
    fn abbreviations_do_not_split() {
        let (sentences, _tail) = run(&["Talk to Dr. Smith about the results. He knows best."]);
        assert_eq!(sentences[0], "Talk to Dr. Smith about the results.");
    }

    #[test]
    fn decimals_do_not_split() {
        let (sentences, tail) = run(&["The value of pi is 3.14159 approximately. Remember that."]);
        assert_eq!(
            sentences,
            vec![
                "The value of pi is 3.14159 approximately.".to_string(),
                "Remember that.".to_string(),
            ]
        );
        assert_eq!(tail, None);
    }

    #[test]
    fn ellipsis_dots_glue_until_the_last_one() {
        let (sentences, _tail) = run(&["Well then... Maybe we should wait. All right."]);
        assert_eq!(sentences[0], "Well then...");
        assert_eq!(sentences[1], "Maybe we should wait.");
    }

    #[test]
    fn initials_do_not_split() {
        let (sentences, _tail) = run(&["The book by J. R. Tolkien is long. Read it anyway."]);
        assert_eq!(sentences[0], "The book by J. R. Tolkien is long.");
    }

    #[test]
    fn lowercase_continuation_is_not_a_boundary() {
        let (sentences, tail) = run(&["He paused at ver. two of the song and left early"]);
        assert!(sentences.is_empty());
        assert_eq!(
            tail,
            Some("He paused at ver. two of the song and left early".to_string())
        );
    }

    #[test]
    fn newline_splits_long_lines() {
        let (sentences, tail) = run(&["First bullet item here\nsecond line continues"]);
        assert_eq!(sentences, vec!["First bullet item here".to_string()]);
        assert_eq!(tail, Some("second line continues".to_string()));
    }

    #[test]
    fn short_prefix_stays_buffered() {
        let (sentences, tail) = run(&["Hi. How are you doing today?"]);
        // "Hi." is under the minimum length, so the boundary is deferred.
        assert_eq!(sentences, vec!["Hi. How are you doing today?".to_string()]);
        assert_eq!(tail, None);
    }

    #[test]
    fn empty_input_emits_nothing() {
        let (sentences, tail) = run(&[""]);
        assert!(sentences.is_empty());
        assert_eq!(tail, None);
    }

    #[test]
    fn flush_drops_trivial_remainders() {
        let mut tokenizer = SentenceTokenizer::default();
        tokenizer.push("ok");
        assert_eq!(tokenizer.flush(), None);
    }

    #[test]
    fn reconstruction_joins_back_to_the_input() {
        let input = "The first sentence is here. The second one follows it! A third asks a question? Trailing words";
        let mut tokenizer = SentenceTokenizer::default();
        let mut parts = Vec::new();
        // Feed in uneven fragments to exercise buffering.
        for chunk in input.as_bytes().chunks(7) {
            parts.extend(tokenizer.push(std::str::from_utf8(chunk).unwrap()));
        }
        parts.extend(tokenizer.flush());
        assert_eq!(parts.join(" "), input);
    }

    #[test]
    fn indices_are_not_the_tokenizers_concern_but_order_is() {
        let (sentences, _) = run(&["One full sentence here. Another full sentence there. "]);
        assert_eq!(
            sentences,
            vec![
                "One full sentence here.".to_string(),
                "Another full sentence there.".to_string(),
            ]
        );
    }
}
