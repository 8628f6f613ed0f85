//! Reasoning port backed by a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use triage_core::{
    Classification, ClassifyVerdict, CorrelationResult, CorrelationVerdict, FetchResults, ItemRef,
    NextAction, PortResult, ReasoningPort, RecommendationDraft, RecurringPattern, Source, Ticket,
};

use crate::config::OllamaConfig;
use crate::error::{AdapterError, Result};
use crate::json::{bool_field, extract_object, f64_field, str_field, str_list};
use crate::prompts;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'static str,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Prompts an Ollama model through `/api/generate` and parses its JSON
/// answers leniently.
pub struct OllamaReasoning {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
}

impl OllamaReasoning {
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/api/generate", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<Value> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };
        let response = self.http.post(&self.endpoint).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AdapterError::Status {
                service: "ollama",
                status,
                body,
            });
        }

        let generated: GenerateResponse = response.json().await?;
        debug!(model = %self.model, chars = generated.response.len(), "model answered");
        extract_object(&generated.response)
    }
}

#[async_trait]
impl ReasoningPort for OllamaReasoning {
    async fn classify(&self, ticket: &Ticket) -> PortResult<ClassifyVerdict> {
        let answer = self.generate(&prompts::classify(ticket)).await?;
        Ok(parse_classify(&answer)?)
    }

    async fn correlate(
        &self,
        ticket: &Ticket,
        fetched: &FetchResults,
    ) -> PortResult<CorrelationVerdict> {
        let answer = self.generate(&prompts::correlate(ticket, fetched)).await?;
        Ok(parse_correlation(&answer)?)
    }

    async fn recommend(
        &self,
        ticket: &Ticket,
        classification: &Classification,
        correlation: &CorrelationResult,
    ) -> PortResult<RecommendationDraft> {
        let answer = self
            .generate(&prompts::recommend(ticket, classification, correlation))
            .await?;
        Ok(parse_recommendation(&answer)?)
    }
}

pub(crate) fn parse_classify(answer: &Value) -> Result<ClassifyVerdict> {
    let label = str_field(answer, "issue_type")
        .or_else(|| str_field(answer, "category"))
        .ok_or_else(|| AdapterError::decode("classification", "missing issue_type"))?;
    Ok(ClassifyVerdict {
        label: label.to_string(),
        reasoning: str_field(answer, "reasoning").map(str::to_string),
    })
}

/// A verdict with `"correlated": false` never carries a match.
pub(crate) fn parse_correlation(answer: &Value) -> Result<CorrelationVerdict> {
    let rationale = str_field(answer, "reason")
        .unwrap_or("no reason given")
        .to_string();
    let related_tickets = str_list(answer, "related_tickets");
    let is_recurring = bool_field(answer, "is_recurring");
    let recurring = (is_recurring || !related_tickets.is_empty()).then(|| RecurringPattern {
        is_recurring,
        related_tickets,
        summary: str_field(answer, "pattern_summary").map(str::to_string),
    });

    let correlated = answer.get("correlated").map_or(true, |_| bool_field(answer, "correlated"));
    let matched = answer.get("matched_item").and_then(matched_ref);
    if !correlated || matched.is_none() {
        let mut verdict = CorrelationVerdict::no_match(rationale);
        verdict.recurring = recurring;
        return Ok(verdict);
    }

    let confidence = f64_field(answer, "confidence")
        .ok_or_else(|| AdapterError::decode("correlation", "missing confidence"))?;
    Ok(CorrelationVerdict {
        confidence,
        matched,
        rationale,
        recurring,
    })
}

fn matched_ref(value: &Value) -> Option<ItemRef> {
    let id = str_field(value, "id")?;
    let kind = str_field(value, "source").or_else(|| str_field(value, "type"))?;
    let source = match kind.to_ascii_lowercase().as_str() {
        "code_changes" | "pr" | "github_pr" => Source::CodeChanges,
        "feature_history" | "linear" | "linear_ticket" => Source::FeatureHistory,
        "prior_tickets" | "ticket" | "intercom" => Source::PriorTickets,
        _ => return None,
    };
    Some(ItemRef::new(source, id))
}

pub(crate) fn parse_recommendation(answer: &Value) -> Result<RecommendationDraft> {
    let action = str_field(answer, "next_action")
        .ok_or_else(|| AdapterError::decode("recommendation", "missing next_action"))?;
    let next_action = match action.to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
        "escalate" => NextAction::Escalate,
        "get_more_info" | "more_info" => NextAction::GetMoreInfo,
        "reproduce" => NextAction::Reproduce,
        other => {
            return Err(AdapterError::decode(
                "recommendation",
                format!("unknown next_action {other:?}"),
            ))
        }
    };
    Ok(RecommendationDraft {
        next_action,
        reason: str_field(answer, "next_action_reason")
            .unwrap_or_default()
            .to_string(),
        summary: str_field(answer, "correlation_summary")
            .unwrap_or_default()
            .to_string(),
        tags: str_list(answer, "suggested_tags"),
        questions_for_customer: str_list(answer, "questions_for_customer"),
        engineering_context: str_field(answer, "engineering_context").map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classification_keeps_raw_label() {
        let verdict =
            parse_classify(&json!({"issue_type": "unclear", "reasoning": "vague"})).unwrap();
        assert_eq!(verdict.label, "unclear");
        assert_eq!(verdict.reasoning.as_deref(), Some("vague"));
        assert!(parse_classify(&json!({"reasoning": "no label"})).is_err());
    }

    #[test]
    fn correlation_maps_legacy_item_types() {
        let verdict = parse_correlation(&json!({
            "correlated": true,
            "confidence": 0.82,
            "matched_item": {"type": "pr", "title": "Rework checkout", "id": "acme/web#12"},
            "reason": "same component",
            "is_recurring": true,
            "related_tickets": ["TKT-9"],
            "pattern_summary": "checkout failures"
        }))
        .unwrap();
        assert_eq!(verdict.confidence, 0.82);
        assert_eq!(
            verdict.matched,
            Some(ItemRef::new(Source::CodeChanges, "acme/web#12"))
        );
        let recurring = verdict.recurring.unwrap();
        assert!(recurring.is_recurring);
        assert_eq!(recurring.related_tickets, vec!["TKT-9".to_string()]);
    }

    #[test]
    fn uncorrelated_verdict_drops_the_match() {
        let verdict = parse_correlation(&json!({
            "correlated": false,
            "confidence": 0.9,
            "matched_item": {"source": "feature_history", "id": "ENG-7"},
            "reason": "unrelated area"
        }))
        .unwrap();
        assert_eq!(verdict.confidence, 0.0);
        assert!(verdict.matched.is_none());
        assert!(verdict.recurring.is_none());
    }

    #[test]
    fn recommendation_accepts_spaced_actions() {
        let draft = parse_recommendation(&json!({
            "next_action": "Get More Info",
            "next_action_reason": "no browser given",
            "suggested_tags": ["frontend"],
            "questions_for_customer": ["Which browser?"],
            "engineering_context": null
        }))
        .unwrap();
        assert_eq!(draft.next_action, NextAction::GetMoreInfo);
        assert_eq!(draft.questions_for_customer, vec!["Which browser?".to_string()]);
        assert!(draft.engineering_context.is_none());
        assert!(parse_recommendation(&json!({"next_action": "panic"})).is_err());
    }

    #[test]
    fn endpoint_joins_base_url() {
        let config = OllamaConfig {
            base_url: "http://gpu-box:11434/".to_string(),
            ..OllamaConfig::default()
        };
        let reasoning = OllamaReasoning::new(&config).unwrap();
        assert_eq!(reasoning.endpoint, "http://gpu-box:11434/api/generate");
        assert_eq!(reasoning.model(), "llama3.2");
    }
}
