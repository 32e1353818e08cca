//! Generation settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Settings controlling text generation.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default, PartialEq)]
pub struct GenerationSettings {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
}

/// Why generation finished.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    Error,
}

/// Token usage reported by the generator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_only_requested_fields() {
        let settings = GenerationSettings::builder()
            .max_tokens(512)
            .temperature(0.2)
            .build();
        assert_eq!(settings.max_tokens, Some(512));
        assert_eq!(settings.top_p, None);
    }

    #[test]
    fn finish_reason_round_trips_through_strum() {
        assert_eq!("tool_calls".parse::<FinishReason>().unwrap(), FinishReason::ToolCalls);
        assert_eq!(FinishReason::Stop.to_string(), "stop");
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage { input_tokens: 3, output_tokens: 4 };
        total += Usage { input_tokens: 1, output_tokens: 1 };
        assert_eq!(total.total(), 9);
    }
}
