//! L0: static response templates.
//!
//! Exact-match prompts ("hello", "what time is it") answer from a table
//! of generator functions without touching an embedding or a provider.
//! A small set of regex rules handles parameterised prompts.

use chrono::{Local, Timelike};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

type Generator = Arc<dyn Fn() -> String + Send + Sync>;
type PatternHandler = Box<dyn Fn(&regex::Captures<'_>) -> String + Send + Sync>;

pub struct ResponseTemplates {
    templates: HashMap<String, Generator>,
    patterns: Vec<(Regex, PatternHandler)>,
    strip_pattern: Regex,
}

impl ResponseTemplates {
    pub fn new() -> Self {
        let mut templates = ResponseTemplates {
            templates: HashMap::new(),
            patterns: Vec::new(),
            strip_pattern: Regex::new(r"[^\w\s]").expect("static pattern"),
        };
        templates.register_defaults();
        templates
    }

    fn register_defaults(&mut self) {
        let greeting: Generator = Arc::new(|| match Local::now().hour() {
            5..=11 => "Good morning! How can I help you today?".to_string(),
            12..=16 => "Good afternoon! What can I do for you?".to_string(),
            17..=20 => "Good evening! How may I assist you?".to_string(),
            _ => "Hello! I'm here to help, even at this late hour.".to_string(),
        });
        for key in ["hello", "hi", "hey", "good morning", "good afternoon", "good evening"] {
            self.templates.insert(key.to_string(), greeting.clone());
        }

        let time: Generator = Arc::new(|| {
            format!("The current time is {}.", Local::now().format("%I:%M %p"))
        });
        for key in ["what time is it", "whats the time", "current time", "time"] {
            self.templates.insert(key.to_string(), time.clone());
        }

        let date: Generator = Arc::new(|| {
            format!("Today is {}.", Local::now().format("%A, %B %d, %Y"))
        });
        for key in [
            "whats todays date",
            "what date is it",
            "what day is it",
            "todays date",
        ] {
            self.templates.insert(key.to_string(), date.clone());
        }

        let capabilities: Generator = Arc::new(|| {
            "I can help you with many things:\n\
             • Answer questions and have conversations\n\
             • Search the web for information\n\
             • Control smart home devices\n\
             • Help with coding and debugging\n\
             • Set reminders and check your schedule\n\
             Just ask me anything!"
                .to_string()
        });
        for key in ["help", "what can you do", "what are your capabilities"] {
            self.templates.insert(key.to_string(), capabilities.clone());
        }

        self.patterns.push((
            Regex::new(r"^what time is it in (\w+)").expect("static pattern"),
            Box::new(|captures| {
                format!(
                    "I'd need to look up the timezone for {}. Let me check...",
                    &captures[1]
                )
            }),
        ));
    }

    /// Template reply for a prompt, if one matches. Matching is on the
    /// lowercased, punctuation-stripped text.
    pub fn get(&self, query: &str) -> Option<String> {
        let normalized = query.trim().to_lowercase();
        let normalized = self
            .strip_pattern
            .replace_all(&normalized, "")
            .trim()
            .to_string();

        if let Some(generator) = self.templates.get(&normalized) {
            return Some(generator());
        }
        for (pattern, handler) in &self.patterns {
            if let Some(captures) = pattern.captures(&normalized) {
                return Some(handler(&captures));
            }
        }
        None
    }

    /// Register a fixed reply for an exact prompt.
    pub fn register(&mut self, key: &str, response: impl Into<String>) {
        let response = response.into();
        self.templates
            .insert(key.to_lowercase(), Arc::new(move || response.clone()));
    }

    /// Register a generator for an exact prompt.
    pub fn register_fn<F>(&mut self, key: &str, generator: F)
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.templates
            .insert(key.to_lowercase(), Arc::new(generator));
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }
}

impl Default for ResponseTemplates {
    fn default() -> Self {
        ResponseTemplates::new()
    }
}
