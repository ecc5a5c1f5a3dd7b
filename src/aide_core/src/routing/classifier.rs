//! Pattern-based task classification.
//!
//! A prioritised table of keyword families; the first family whose hit
//! count crosses its threshold wins. Priority order: coding →
//! complex-reasoning → creative → fast-query → conversation. Length
//! heuristics break ties: long prompts read as complex reasoning, short
//! "what/who/when" openers as fast queries. Synchronous and pure: the
//! classifier never calls a provider.

use aide_types::prelude::TaskType;

const CODING_KEYWORDS: [&str; 28] = [
    "code",
    "function",
    "class",
    "debug",
    "error",
    "bug",
    "python",
    "javascript",
    "typescript",
    "java",
    "c++",
    "rust",
    "go",
    "sql",
    "html",
    "css",
    "api",
    "implement",
    "refactor",
    "optimize",
    "algorithm",
    "data structure",
    "compile",
    "runtime",
    "exception",
    "syntax",
    "variable",
    "loop",
];

const COMPLEX_KEYWORDS: [&str; 19] = [
    "analyze",
    "compare",
    "evaluate",
    "explain why",
    "reason",
    "think through",
    "step by step",
    "pros and cons",
    "implications",
    "consequences",
    "research",
    "investigate",
    "deep dive",
    "comprehensive",
    "detailed",
    "strategy",
    "plan",
    "design",
    "architecture",
];

const CREATIVE_KEYWORDS: [&str; 12] = [
    "write",
    "story",
    "poem",
    "creative",
    "imagine",
    "brainstorm",
    "ideas",
    "suggest",
    "compose",
    "draft",
    "narrative",
    "fiction",
];

const FAST_KEYWORDS: [&str; 13] = [
    "what is",
    "who is",
    "when",
    "where",
    "how many",
    "define",
    "quick",
    "brief",
    "short",
    "simple",
    "just tell me",
    "yes or no",
    "true or false",
];

/// Markers that force the coding family regardless of keyword count.
const CODE_MARKERS: [&str; 4] = ["```", "def ", "class ", "function "];

const LONG_PROMPT_CHARS: usize = 500;
const SHORT_PROMPT_CHARS: usize = 50;

pub struct TaskClassifier;

impl TaskClassifier {
    /// Classify the last user message body. Empty input is `Unknown`.
    pub fn classify(text: &str) -> TaskType {
        if text.trim().is_empty() {
            return TaskType::Unknown;
        }
        let lower = text.to_lowercase();

        let coding_score = count_hits(&lower, &CODING_KEYWORDS);
        if coding_score >= 2 || CODE_MARKERS.iter().any(|m| lower.contains(m)) {
            return TaskType::Coding;
        }

        let complex_score = count_hits(&lower, &COMPLEX_KEYWORDS);
        if complex_score >= 2 || text.len() > LONG_PROMPT_CHARS {
            return TaskType::ComplexReasoning;
        }

        let creative_score = count_hits(&lower, &CREATIVE_KEYWORDS);
        if creative_score >= 2 {
            return TaskType::Creative;
        }

        let fast_score = count_hits(&lower, &FAST_KEYWORDS);
        if fast_score >= 1 || text.len() < SHORT_PROMPT_CHARS {
            return TaskType::FastQuery;
        }

        TaskType::Conversation
    }
}

fn count_hits(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().filter(|kw| text.contains(*kw)).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coding_queries_are_detected() {
        for query in [
            "Write a Python function to sort a list",
            "Debug this code: the loop never terminates",
            "How do I implement a binary search algorithm?",
            "Fix the syntax error in my JavaScript",
        ] {
            assert_eq!(TaskClassifier::classify(query), TaskType::Coding, "{query}");
        }
    }

    #[test]
    fn code_fences_force_coding() {
        assert_eq!(
            TaskClassifier::classify("what does this do ```x = [i for i in y]```"),
            TaskType::Coding
        );
    }

    #[test]
    fn fast_queries_are_detected() {
        for query in [
            "What is Rust?",
            "Who is Ada Lovelace?",
            "When was the moon landing?",
            "Define recursion",
        ] {
            assert_eq!(
                TaskClassifier::classify(query),
                TaskType::FastQuery,
                "{query}"
            );
        }
    }

    #[test]
    fn complex_queries_are_detected() {
        for query in [
            "Analyze the pros and cons of renewable energy",
            "Compare and evaluate different database architectures",
            "Think through the implications of automation step by step",
        ] {
            assert_eq!(
                TaskClassifier::classify(query),
                TaskType::ComplexReasoning,
                "{query}"
            );
        }
    }

    #[test]
    fn creative_queries_are_detected() {
        assert_eq!(
            TaskClassifier::classify("Write a short story about a lighthouse keeper and compose a poem to go with it"),
            TaskType::Creative
        );
    }

    #[test]
    fn long_prompts_become_complex_reasoning() {
        let long = "tell me about the economic history of shipping lanes ".repeat(12);
        assert!(long.len() > 500);
        assert_eq!(
            TaskClassifier::classify(&long),
            TaskType::ComplexReasoning
        );
    }

    #[test]
    fn empty_input_is_unknown() {
        assert_eq!(TaskClassifier::classify(""), TaskType::Unknown);
        assert_eq!(TaskClassifier::classify("   "), TaskType::Unknown);
    }

    #[test]
    fn weather_question_is_a_fast_query() {
        assert_eq!(
            TaskClassifier::classify("What is the weather in Chicago?"),
            TaskType::FastQuery
        );
    }
}
