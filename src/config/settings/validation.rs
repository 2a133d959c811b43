// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use crate::error::{PilotError, Result};

use super::Settings;

impl Settings {
    /// Check that all values are usable by the agent loop.
    pub fn validate(&self) -> Result<()> {
        let agent = &self.agent;
        let conversation = &self.conversation;

        if agent.model.trim().is_empty() {
            return Err(PilotError::Config("agent.model must not be empty".into()));
        }
        if agent.max_iterations == 0 {
            return Err(PilotError::Config(
                "agent.max_iterations must be at least 1".into(),
            ));
        }
        if agent.token_budget == 0 {
            return Err(PilotError::Config(
                "agent.token_budget must be greater than 0".into(),
            ));
        }
        if agent.result_truncation_limit == 0 {
            return Err(PilotError::Config(
                "agent.result_truncation_limit must be greater than 0".into(),
            ));
        }
        if !(0.0..=2.0).contains(&agent.temperature) {
            return Err(PilotError::Config(format!(
                "agent.temperature must be within 0.0..=2.0 (got {})",
                agent.temperature
            )));
        }
        if conversation.chars_per_token == 0 {
            return Err(PilotError::Config(
                "conversation.chars_per_token must be greater than 0".into(),
            ));
        }
        if conversation.max_entries < 2 {
            return Err(PilotError::Config(
                "conversation.max_entries must be at least 2".into(),
            ));
        }
        if conversation.compaction_keep_chars >= conversation.compaction_min_chars {
            return Err(PilotError::Config(format!(
                "conversation.compaction_keep_chars ({}) must be below compaction_min_chars ({})",
                conversation.compaction_keep_chars, conversation.compaction_min_chars
            )));
        }
        if self.pricing.input_cost_per_1k < 0.0 || self.pricing.output_cost_per_1k < 0.0 {
            return Err(PilotError::Config("pricing must not be negative".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn test_zero_truncation_limit_rejected() {
        let mut settings = Settings::default();
        settings.agent.result_truncation_limit = 0;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("result_truncation_limit"));
    }

    #[test]
    fn test_keep_chars_must_be_below_min_chars() {
        let mut settings = Settings::default();
        settings.conversation.compaction_keep_chars = 600;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_temperature_out_of_range_rejected() {
        let mut settings = Settings::default();
        settings.agent.temperature = 3.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_model_rejected() {
        let mut settings = Settings::default();
        settings.agent.model = "  ".to_string();
        assert!(settings.validate().is_err());
    }
}
