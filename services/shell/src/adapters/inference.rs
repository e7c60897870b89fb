//! services/shell/src/adapters/inference.rs
//!
//! This module contains the adapter for the remote inference function that
//! answers the assistant chat. It implements the `InferenceService` port.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use folklore_core::ports::{
    ConversationTurn, InferenceService, PortError, PortResult, TurnRole,
};
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `InferenceService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiInferenceAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiInferenceAdapter {
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

fn to_request_message(turn: &ConversationTurn) -> PortResult<ChatCompletionRequestMessage> {
    let message = match turn.role {
        TurnRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(turn.text.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        TurnRole::Model => ChatCompletionRequestAssistantMessageArgs::default()
            .content(turn.text.as_str())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
    };
    Ok(message)
}

//=========================================================================================
// `InferenceService` Trait Implementation
//=========================================================================================

#[async_trait]
impl InferenceService for OpenAiInferenceAdapter {
    async fn generate_reply(&self, turns: &[ConversationTurn]) -> PortResult<String> {
        let messages = turns
            .iter()
            .map(to_request_message)
            .collect::<PortResult<Vec<_>>>()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        debug!("Requesting a reply for {} turns from {}", turns.len(), self.model);
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(PortError::Unexpected(
                "Inference function returned no choices in its response.".to_string(),
            ));
        };
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(PortError::Unexpected(
                "Inference function response contained no text content.".to_string(),
            )),
        }
    }
}

//=========================================================================================
// Without Credentials
//=========================================================================================

/// Stands in when no API key is configured. Every call fails, so the assistant
/// answers with its apology.
pub struct UnconfiguredInference;

#[async_trait]
impl InferenceService for UnconfiguredInference {
    async fn generate_reply(&self, _turns: &[ConversationTurn]) -> PortResult<String> {
        Err(PortError::Unexpected("OPENAI_API_KEY is not configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_turns_become_assistant_messages() {
        let user = to_request_message(&ConversationTurn::user("hola")).unwrap();
        let model = to_request_message(&ConversationTurn::model("¡hola!")).unwrap();
        assert!(matches!(user, ChatCompletionRequestMessage::User(_)));
        assert!(matches!(model, ChatCompletionRequestMessage::Assistant(_)));
    }

    #[tokio::test]
    async fn missing_credentials_always_fail() {
        let result = UnconfiguredInference.generate_reply(&[ConversationTurn::user("hola")]).await;
        assert!(matches!(result, Err(PortError::Unexpected(_))));
    }
}
