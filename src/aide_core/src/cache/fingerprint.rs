//! Request canonicalization and cache-key fingerprinting.
//!
//! Two requests that differ only in casing, whitespace runs, or the
//! presence of vocative filler words ("please", the assistant's name)
//! must land on the same cache entry. The canonical form is digested
//! with SHA-256 so keys have a fixed width regardless of prompt length.

use aide_types::prelude::{Fingerprint, Message};
use regex::Regex;
use sha2::{Digest, Sha256};

const BASE_FILLERS: [&str; 4] = ["please", "can you", "could you", "would you"];

pub struct Normalizer {
    filler_pattern: Regex,
    whitespace_pattern: Regex,
}

impl Normalizer {
    /// `assistant_name` joins the filler set so "aide, what's the weather"
    /// and "what's the weather" share a key.
    pub fn new(assistant_name: &str) -> Self {
        let mut fillers: Vec<String> = BASE_FILLERS.iter().map(|f| regex::escape(f)).collect();
        let name = assistant_name.trim().to_lowercase();
        if !name.is_empty() {
            fillers.push(regex::escape(&name));
        }
        // Longest phrase first so "could you" wins over a bare "could".
        fillers.sort_by_key(|f| std::cmp::Reverse(f.len()));

        // A vocative usually drags a comma with it: "aide, what's next".
        let filler_pattern = Regex::new(&format!(r"\b(?:{})\b[,!]?", fillers.join("|")))
            .expect("filler alternation is built from escaped literals");
        let whitespace_pattern = Regex::new(r"\s+").expect("static pattern");

        Normalizer {
            filler_pattern,
            whitespace_pattern,
        }
    }

    /// Lower-case, collapse whitespace runs, strip filler phrases.
    /// Idempotent: canonicalizing a canonical form is a no-op.
    pub fn canonicalize(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let stripped = self.filler_pattern.replace_all(&lowered, " ");
        self.whitespace_pattern
            .replace_all(stripped.trim(), " ")
            .trim()
            .to_string()
    }

    /// Fixed-width digest over the canonical form of every message, in
    /// order. Deterministic across processes.
    pub fn fingerprint(&self, messages: &[Message]) -> Fingerprint {
        let mut hasher = Sha256::new();
        for message in messages {
            hasher.update(message.role.as_str().as_bytes());
            hasher.update(b"\n");
            hasher.update(self.canonicalize(&message.content).as_bytes());
            hasher.update(b"\n");
        }
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }

    /// Key for a single query string, used by the cache facade when the
    /// caller supplies raw text rather than a message list.
    pub fn fingerprint_text(&self, text: &str) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(b"user\n");
        hasher.update(self.canonicalize(text).as_bytes());
        hasher.update(b"\n");
        let digest = hasher.finalize();
        let mut out = String::with_capacity(digest.len() * 2);
        for byte in digest {
            out.push_str(&format!("{:02x}", byte));
        }
        out
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer::new("aide")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aide_types::prelude::Message;

    #[test]
    fn casing_and_whitespace_do_not_change_the_key() {
        let normalizer = Normalizer::default();
        let a = normalizer.fingerprint(&[Message::user("What is   the Weather?")]);
        let b = normalizer.fingerprint(&[Message::user("what is the weather?")]);
        assert_eq!(a, b);
    }

    #[test]
    fn filler_words_do_not_change_the_key() {
        let normalizer = Normalizer::default();
        let a = normalizer.fingerprint(&[Message::user("Aide, could you check the news")]);
        let b = normalizer.fingerprint(&[Message::user("check the news")]);
        assert_eq!(a, b);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let normalizer = Normalizer::default();
        let once = normalizer.canonicalize("Please tell me a story  about ships");
        let twice = normalizer.canonicalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn fingerprint_of_canonical_form_matches() {
        let normalizer = Normalizer::default();
        let raw = "Would you    explain recursion, please";
        let canonical = normalizer.canonicalize(raw);
        assert_eq!(
            normalizer.fingerprint_text(raw),
            normalizer.fingerprint_text(&canonical)
        );
    }

    #[test]
    fn different_roles_produce_different_keys() {
        let normalizer = Normalizer::default();
        let a = normalizer.fingerprint(&[Message::user("hello")]);
        let b = normalizer.fingerprint(&[Message::system("hello")]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_message_list_digests_the_empty_form() {
        let normalizer = Normalizer::default();
        let fp = normalizer.fingerprint(&[]);
        assert_eq!(fp.len(), 64);
    }

    #[test]
    fn filler_inside_a_word_is_preserved() {
        let normalizer = Normalizer::default();
        // "pleased" must not lose its prefix to the "please" filler.
        assert_eq!(
            normalizer.canonicalize("I am pleased to meet you"),
            "i am pleased to meet you"
        );
    }
}
