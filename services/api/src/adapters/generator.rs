//! services/api/src/adapters/generator.rs
//!
//! This module contains the adapter for the card-generating LLM.
//! It implements the `CardGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;

use flashdeck_core::domain::GeneratedCard;
use flashdeck_core::ports::{CardGenerationService, PortError, PortResult};

const SYSTEM_INSTRUCTIONS: &str = "You are a flashcard author. Given a study topic, produce \
question/answer flashcards that test the most important facts about it. \
Respond with a JSON array only, no prose and no code fences. Each element must be an object \
with exactly two string fields: \"front\" (the question) and \"back\" (the answer). \
Keep fronts to one sentence and backs to at most two.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `CardGenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiCardGenerator {
    client: Client<OpenAIConfig>,
    model: String,
}

/// The JSON shape the model is instructed to return.
#[derive(Deserialize)]
struct CardDoc {
    front: String,
    back: String,
}

impl OpenAiCardGenerator {
    /// Creates a new `OpenAiCardGenerator`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }

    /// Parses the model output, tolerating stray markdown code fences.
    fn parse_cards(raw: &str) -> PortResult<Vec<GeneratedCard>> {
        let trimmed = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();
        let docs: Vec<CardDoc> = serde_json::from_str(trimmed).map_err(|e| {
            PortError::Unexpected(format!("Card generation LLM returned unparsable JSON: {}", e))
        })?;
        Ok(docs
            .into_iter()
            .map(|doc| GeneratedCard {
                front: doc.front,
                back: doc.back,
            })
            .collect())
    }
}

//=========================================================================================
// `CardGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl CardGenerationService for OpenAiCardGenerator {
    /// Generates `count` front/back pairs for the given topic.
    async fn generate_cards(&self, topic: &str, count: u8) -> PortResult<Vec<GeneratedCard>> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("TOPIC: {}\n\nGenerate exactly {} flashcards.", topic, count))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                PortError::Unexpected(
                    "Card generation LLM returned no text content.".to_string(),
                )
            })?;

        Self::parse_cards(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_plain_json_array() {
        let raw = r#"[{"front":"Q1","back":"A1"},{"front":"Q2","back":"A2"}]"#;
        let cards = OpenAiCardGenerator::parse_cards(raw).unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].front, "Q1");
        assert_eq!(cards[1].back, "A2");
    }

    #[test]
    fn strips_code_fences_before_parsing() {
        let raw = "```json\n[{\"front\":\"Q\",\"back\":\"A\"}]\n```";
        let cards = OpenAiCardGenerator::parse_cards(raw).unwrap();
        assert_eq!(cards.len(), 1);
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(OpenAiCardGenerator::parse_cards("Sure! Here are your cards:").is_err());
    }
}
