//! Task kinds: the closed set of inference capabilities.
//!
//! Design note: this is a closed enum rather than a free-form string so that
//! unknown kinds are rejected at creation time with a validation error,
//! instead of failing later at dispatch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::OrchestratorError;

/// Capability tag determining which workers are eligible for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    TextGeneration,
    ImageGeneration,
    SpeechSynthesis,
    ImageCaptioning,
}

impl TaskKind {
    /// All kinds, in a fixed order. Handy for capability sets in tests.
    pub const ALL: [TaskKind; 4] = [
        TaskKind::TextGeneration,
        TaskKind::ImageGeneration,
        TaskKind::SpeechSynthesis,
        TaskKind::ImageCaptioning,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::TextGeneration => "text_generation",
            TaskKind::ImageGeneration => "image_generation",
            TaskKind::SpeechSynthesis => "speech_synthesis",
            TaskKind::ImageCaptioning => "image_captioning",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text_generation" => Ok(TaskKind::TextGeneration),
            "image_generation" => Ok(TaskKind::ImageGeneration),
            "speech_synthesis" => Ok(TaskKind::SpeechSynthesis),
            "image_captioning" => Ok(TaskKind::ImageCaptioning),
            other => Err(OrchestratorError::InvalidKind(other.to_owned())),
        }
    }
}
