//! Mood hint: a small LLM classification with a lexical fallback.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::CompletionRequest;

use super::{ApiError, SharedState};

/// Closed mood set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Mad,
    Upset,
    Shock,
    Question,
    Happy,
    Friend,
    Love,
}

impl Mood {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "mad" => Some(Self::Mad),
            "upset" => Some(Self::Upset),
            "shock" => Some(Self::Shock),
            "question" => Some(Self::Question),
            "happy" => Some(Self::Happy),
            "friend" => Some(Self::Friend),
            "love" => Some(Self::Love),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MoodBody {
    pub text: String,
}

/// Lexical fallback when the LLM is unavailable or emits nonsense.
fn lexical_mood(text: &str) -> Option<(Mood, f64)> {
    let lower = text.to_lowercase();
    let table: &[(&str, Mood)] = &[
        ("angry", Mood::Mad),
        ("furious", Mood::Mad),
        ("sad", Mood::Upset),
        ("upset", Mood::Upset),
        ("wow", Mood::Shock),
        ("what?!", Mood::Shock),
        ("?", Mood::Question),
        ("thanks", Mood::Happy),
        ("great", Mood::Happy),
        ("buddy", Mood::Friend),
        ("love", Mood::Love),
    ];
    table
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, mood)| (*mood, 0.4))
}

/// `POST /mood-hint`.
pub async fn mood_hint(
    State(state): State<SharedState>,
    Json(body): Json<MoodBody>,
) -> Result<Json<Value>, ApiError> {
    let prompt = format!(
        "Classify the emotional tone of the message into exactly one of: mad, upset, \
         shock, question, happy, friend, love. Reply with the single word only.\n\n\
         Message: {}\n",
        body.text.trim()
    );
    let request = CompletionRequest::new("mood", prompt, 8).with_temperature(0.0);

    match state.llm.complete(request).await {
        Ok(response) => {
            if let Some(mood) = Mood::parse(&response.text) {
                return Ok(Json(json!({
                    "mood": mood,
                    "confidence": 0.8,
                    "reason": "model classification",
                    "source": "llm",
                })));
            }
            let fallback = lexical_mood(&body.text);
            Ok(Json(mood_json(fallback, "model emission outside the mood set")))
        }
        Err(err) => {
            tracing::debug!(error = %err, "mood LLM unavailable, lexical fallback");
            let fallback = lexical_mood(&body.text);
            Ok(Json(mood_json(fallback, "llm unavailable")))
        }
    }
}

fn mood_json(fallback: Option<(Mood, f64)>, reason: &str) -> Value {
    match fallback {
        Some((mood, confidence)) => json!({
            "mood": mood,
            "confidence": confidence,
            "reason": reason,
            "source": "lexical",
        }),
        None => json!({
            "mood": null,
            "confidence": 0.0,
            "reason": reason,
            "source": "lexical",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_set_only() {
        assert_eq!(Mood::parse(" Happy \n"), Some(Mood::Happy));
        assert_eq!(Mood::parse("ecstatic"), None);
    }

    #[test]
    fn lexical_fallback_finds_keywords() {
        assert_eq!(lexical_mood("I love this!").map(|m| m.0), Some(Mood::Love));
        assert_eq!(lexical_mood("plain statement").map(|m| m.0), None);
    }
}
