// SPDX-FileCopyrightText: 2026 Twinlink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Generation adapter over `POST /chat/completions`.
//!
//! Each agent turn is one completion. The speaker's persona becomes the
//! system prompt, its own earlier messages are sent as `assistant` turns
//! and everything else as `user` turns. The model is asked to close each
//! reply with a `compatibility: <0..1>` line, which is parsed off the
//! content and returned separately.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};
use twinlink_config::model::GenerationConfig;
use twinlink_core::traits::{GeneratedTurn, ReasonRequest, TurnRequest};
use twinlink_core::types::{Agent, MessageKind, Party};
use twinlink_core::{AdapterType, GenerationAdapter, HealthStatus, PluginAdapter, TwinlinkError};

use crate::client::OpenAiClient;
use crate::resolve_api_key;
use crate::types::{ChatMessage, ChatRequest, ChatResponse};

const COMPATIBILITY_PREFIX: &str = "compatibility:";

pub struct OpenAiGenerator {
    client: OpenAiClient,
    model: String,
    max_tokens: u32,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, TwinlinkError> {
        let api_key = resolve_api_key(&config.api_key)?;
        let client = OpenAiClient::new(&api_key, &config.base_url, Duration::from_secs(120))?;
        info!(
            model = %config.model,
            base_url = %client.base_url(),
            "generation adapter initialized"
        );
        Ok(Self::with_client(client, config.model.clone(), config.max_tokens))
    }

    pub fn with_client(client: OpenAiClient, model: String, max_tokens: u32) -> Self {
        Self {
            client,
            model,
            max_tokens,
        }
    }

    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, TwinlinkError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
        };
        let response: ChatResponse = self.client.post_json("/chat/completions", &request).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default();
        if content.is_empty() {
            return Err(TwinlinkError::provider("completion returned no content"));
        }
        Ok(content)
    }
}

fn persona_prompt(request: &TurnRequest) -> String {
    let agent = &request.speaker;
    let style = &agent.conversation_style;
    let mut prompt = format!(
        "You are {}, a digital twin speaking on behalf of your owner.\n{}",
        agent.name,
        describe_agent(agent)
    );
    let _ = write!(
        prompt,
        "\nStyle: {} tone, {} enthusiasm, {} technical depth.",
        style.tone, style.enthusiasm_level, style.technical_depth
    );
    let _ = write!(
        prompt,
        "\nYou are talking with {}. Keep replies to a few sentences.",
        request.counterpart_name
    );
    if let Some(remaining) = request.remaining_turns {
        let _ = write!(prompt, " At most {remaining} turns remain.");
    }
    let _ = write!(
        prompt,
        "\nWhen the conversation has run its course, include {} in your reply.\
         \nEnd every reply with a final line `{COMPATIBILITY_PREFIX} <number between 0 and 1>` \
         estimating how well your owner and theirs would get along.",
        request.termination_marker
    );
    prompt
}

fn describe_agent(agent: &Agent) -> String {
    let mut out = format!("Persona: {}", agent.persona_description);
    if !agent.personality_type.is_empty() {
        let _ = write!(out, "\nPersonality: {}", agent.personality_type);
    }
    if !agent.background_context.is_empty() {
        let _ = write!(out, "\nBackground: {}", agent.background_context);
    }
    if !agent.goals.is_empty() {
        let _ = write!(out, "\nGoals: {}", agent.goals.join(", "));
    }
    if !agent.interests.is_empty() {
        let _ = write!(out, "\nInterests: {}", agent.interests.join(", "));
    }
    out
}

fn turn_messages(request: &TurnRequest) -> Vec<ChatMessage> {
    let me = Party::Agent(request.speaker.id.clone());
    let mut messages = vec![ChatMessage::new("system", persona_prompt(request))];
    for message in &request.transcript {
        let role = match (message.kind, message.sender == me) {
            (MessageKind::System, _) => "system",
            (MessageKind::Text, true) => "assistant",
            (MessageKind::Text, false) => "user",
        };
        messages.push(ChatMessage::new(role, message.content.clone()));
    }
    if request.transcript.is_empty() {
        messages.push(ChatMessage::new(
            "user",
            format!(
                "Introduce yourself to {} and open the conversation.",
                request.counterpart_name
            ),
        ));
    }
    messages
}

/// Split a trailing `compatibility: x` line off the reply.
pub(crate) fn parse_reply(content: &str) -> GeneratedTurn {
    let trimmed = content.trim_end();
    let (body, last) = match trimmed.rsplit_once('\n') {
        Some((body, last)) => (body, last),
        None => ("", trimmed),
    };
    let estimate = last
        .trim()
        .trim_matches('`')
        .to_ascii_lowercase()
        .strip_prefix(COMPATIBILITY_PREFIX)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite());

    match estimate {
        Some(value) => GeneratedTurn {
            content: body.trim().to_string(),
            compatibility: Some(value.clamp(0.0, 1.0)),
        },
        None => GeneratedTurn {
            content: trimmed.trim().to_string(),
            compatibility: None,
        },
    }
}

#[async_trait]
impl PluginAdapter for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai-chat"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Generation
    }

    async fn health_check(&self) -> Result<HealthStatus, TwinlinkError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), TwinlinkError> {
        debug!("generation adapter shutting down");
        Ok(())
    }
}

#[async_trait]
impl GenerationAdapter for OpenAiGenerator {
    async fn generate_turn(&self, request: TurnRequest) -> Result<GeneratedTurn, TwinlinkError> {
        let content = self.complete(turn_messages(&request)).await?;
        let turn = parse_reply(&content);
        debug!(
            conversation_id = %request.conversation_id,
            speaker = %request.speaker.id,
            compatibility = ?turn.compatibility,
            "turn generated"
        );
        Ok(turn)
    }

    async fn explain_match(&self, request: ReasonRequest) -> Result<String, TwinlinkError> {
        let messages = vec![
            ChatMessage::new(
                "system",
                "You explain in two or three friendly sentences why two people were introduced. \
                 Address both of them and mention concrete shared interests or goals.",
            ),
            ChatMessage::new(
                "user",
                format!(
                    "First person:\n{}\n\nSecond person:\n{}\n\nSimilarity score: {:.2}",
                    describe_agent(&request.first),
                    describe_agent(&request.second),
                    request.score
                ),
            ),
        ];
        self.complete(messages).await
    }
}
