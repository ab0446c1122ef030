//! Client for the hosted model endpoint that drafts checkpoints from a
//! converted slide deck. One attempt per request; failures are surfaced to
//! the caller and never retried automatically.

use anyhow::{anyhow, bail, Context, Result};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::AiConfig;

const CHECKPOINT_PROMPT: &str = "You are an education expert. Analyze the attached lecture slides \
and produce learning checkpoints as a JSON array, each element shaped as \
{\"seq\": 1, \"title\": \"...\", \"description\": \"...\", \"estimated_minutes\": 5}. \
Rules: produce between 5 and 15 checkpoints, keep titles under 20 words, keep descriptions \
under 100 words, keep estimated_minutes realistic (3-15), order them as a logical learning \
path, and return the JSON array only with no surrounding prose.";

/// A checkpoint suggestion returned to the instructor for review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointDraft {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_minutes")]
    pub estimated_minutes: i64,
}

fn default_minutes() -> i64 {
    5
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

pub struct CheckpointGenerator {
    client: reqwest::Client,
    config: AiConfig,
}

impl CheckpointGenerator {
    pub fn new(config: AiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.base_url.is_empty() && !self.config.api_key.is_empty()
    }

    /// Draft checkpoints from slide images. Decks larger than the configured
    /// cap are sampled evenly so the request stays bounded.
    pub async fn generate_from_slides(&self, images: &[Vec<u8>]) -> Result<Vec<CheckpointDraft>> {
        if !self.is_configured() {
            bail!("AI endpoint is not configured");
        }
        if images.is_empty() {
            bail!("no slide images to analyze");
        }

        let sampled = sample_evenly(images, self.config.max_slides);
        let payload = json!({
            "prompt": CHECKPOINT_PROMPT,
            "images": sampled
                .iter()
                .map(|bytes| json!({
                    "media_type": "image/png",
                    "data": base64::engine::general_purpose::STANDARD.encode(bytes),
                }))
                .collect::<Vec<_>>(),
        });

        let url = format!("{}/v1/generate", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .context("AI endpoint request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("AI endpoint returned {}: {}", status, body);
        }

        let body: GenerateResponse = response
            .json()
            .await
            .context("AI endpoint returned malformed JSON")?;
        parse_drafts(&body.text)
    }
}

/// Pick at most `max` items, spread evenly across the deck
fn sample_evenly<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    if items.len() <= max || max == 0 {
        return items.to_vec();
    }
    let step = items.len() as f64 / max as f64;
    (0..max)
        .map(|i| items[(i as f64 * step) as usize].clone())
        .collect()
}

/// The model is asked for a bare JSON array but may wrap it in prose or a
/// code fence; extract the array before parsing.
fn parse_drafts(text: &str) -> Result<Vec<CheckpointDraft>> {
    let start = text.find('[').ok_or_else(|| anyhow!("no JSON array in model output"))?;
    let end = text
        .rfind(']')
        .ok_or_else(|| anyhow!("unterminated JSON array in model output"))?;
    if end < start {
        bail!("malformed JSON array in model output");
    }
    let drafts: Vec<CheckpointDraft> =
        serde_json::from_str(&text[start..=end]).context("model output did not parse")?;
    if drafts.is_empty() {
        bail!("model returned no checkpoints");
    }
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_drafts_plain_array() {
        let text = r#"[{"title": "Intro", "description": "Course overview", "estimated_minutes": 5}]"#;
        let drafts = parse_drafts(text).unwrap();
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].title, "Intro");
        assert_eq!(drafts[0].estimated_minutes, 5);
    }

    #[test]
    fn test_parse_drafts_with_code_fence() {
        let text = "Here you go:\n```json\n[{\"title\": \"A\"}, {\"title\": \"B\"}]\n```";
        let drafts = parse_drafts(text).unwrap();
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[1].title, "B");
        // missing fields fall back to defaults
        assert_eq!(drafts[0].estimated_minutes, 5);
    }

    #[test]
    fn test_parse_drafts_rejects_garbage() {
        assert!(parse_drafts("no json here").is_err());
        assert!(parse_drafts("[]").is_err());
    }

    #[test]
    fn test_sample_evenly_caps_and_spreads() {
        let items: Vec<usize> = (0..100).collect();
        let sampled = sample_evenly(&items, 50);
        assert_eq!(sampled.len(), 50);
        assert_eq!(sampled[0], 0);
        assert_eq!(sampled[49], 98);

        let small: Vec<usize> = (0..10).collect();
        assert_eq!(sample_evenly(&small, 50).len(), 10);
    }

}
