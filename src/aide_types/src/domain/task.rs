use serde::{Deserialize, Serialize};

/// Task categories driving the provider-preference table.
#[derive(Deserialize, Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    FastQuery,
    ComplexReasoning,
    Coding,
    Creative,
    Conversation,
    Unknown,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::FastQuery => "fast-query",
            TaskType::ComplexReasoning => "complex-reasoning",
            TaskType::Coding => "coding",
            TaskType::Creative => "creative",
            TaskType::Conversation => "conversation",
            TaskType::Unknown => "unknown",
        }
    }

    pub const ALL: [TaskType; 6] = [
        TaskType::FastQuery,
        TaskType::ComplexReasoning,
        TaskType::Coding,
        TaskType::Creative,
        TaskType::Conversation,
        TaskType::Unknown,
    ];
}
