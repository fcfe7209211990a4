//! Caption and vibe text from the Gemini `generateContent` endpoint.
//!
//! The generator never fails from the caller's point of view: a missing API
//! key, a transport error, a timeout or an empty answer all resolve to one of
//! the canned phrases below.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Sent as a header so the key stays out of request URLs and error text.
const API_KEY_HEADER: &str = "x-goog-api-key";

pub const FALLBACK_CAPTIONS: [&str; 8] = [
    "When the code finally works",
    "Debugging be like",
    "That moment when...",
    "Me trying to understand the documentation",
    "YOLO to the moon!",
    "Brrr goes stonks",
    "This is the way",
    "It just works",
];

pub const FALLBACK_VIBES: [&str; 8] = [
    "Coding Vibes",
    "Funny Vibes",
    "Relatable Vibes",
    "Tech Vibes",
    "Cyberpunk Vibes",
    "Neon Vibes",
    "Hacker Vibes",
    "Meme Vibes",
];

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".into(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct CaptionGenerator {
    remote: Option<Remote>,
}

struct Remote {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

// -- Gemini wire format (only the fields we touch) --

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl CaptionGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let remote = match config.api_key.filter(|k| !k.trim().is_empty()) {
            Some(api_key) => {
                let client = reqwest::Client::builder()
                    .timeout(config.timeout)
                    .build()
                    .context("building generator HTTP client")?;
                Some(Remote {
                    client,
                    endpoint: format!("{}/{}:generateContent", GEMINI_BASE_URL, config.model),
                    api_key,
                })
            }
            None => None,
        };

        Ok(Self { remote })
    }

    /// A generator that only ever returns canned phrases.
    pub fn offline() -> Self {
        Self { remote: None }
    }

    pub fn is_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub async fn caption(&self, title: &str, tags: &[String]) -> String {
        let prompt = format!(
            "Generate a funny, cyberpunk-style caption for a meme with title \"{}\" and tags: {}. \
             Make it short, witty, and in the style of internet memes. Keep it under 100 characters.",
            title,
            tags.join(", ")
        );
        self.generate_or(&prompt, &FALLBACK_CAPTIONS).await
    }

    pub async fn vibe(&self, tags: &[String]) -> String {
        let prompt = format!(
            "Describe the vibe of a meme with tags: {}. \
             Make it short and catchy, like a vibe description. Keep it under 50 characters.",
            tags.join(", ")
        );
        self.generate_or(&prompt, &FALLBACK_VIBES).await
    }

    async fn generate_or(&self, prompt: &str, fallbacks: &[&str]) -> String {
        if let Some(remote) = &self.remote {
            match remote.generate(prompt).await {
                Ok(text) => return text,
                Err(e) => warn!("Generator failed, using fallback: {:#}", e),
            }
        }
        pick(fallbacks)
    }
}

impl Remote {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            contents: [Content {
                parts: [Part { text: prompt }],
            }],
        };

        let response: GenerateResponse = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .find_map(|p| p.text)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| anyhow!("empty generator response"))?;

        debug!("Generated {} chars", text.len());
        Ok(text)
    }
}

fn pick(phrases: &[&str]) -> String {
    phrases
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_generator_uses_canned_phrases() {
        let generator = CaptionGenerator::offline();
        let tags = vec!["funny".to_string(), "test".to_string()];

        let caption = generator.caption("Title", &tags).await;
        let vibe = generator.vibe(&tags).await;

        assert!(FALLBACK_CAPTIONS.contains(&caption.as_str()));
        assert!(FALLBACK_VIBES.contains(&vibe.as_str()));
    }

    #[test]
    fn blank_key_means_offline() {
        let generator = CaptionGenerator::new(GeneratorConfig {
            api_key: Some("  ".into()),
            ..GeneratorConfig::default()
        })
        .unwrap();
        assert!(!generator.is_remote());
    }

    #[tokio::test]
    async fn unreachable_service_falls_back() {
        let generator = CaptionGenerator {
            remote: Some(Remote {
                client: reqwest::Client::builder()
                    .timeout(Duration::from_millis(200))
                    .build()
                    .unwrap(),
                // Port 9 (discard) on loopback: connection refused or timeout.
                endpoint: "http://127.0.0.1:9/models/x:generateContent".into(),
                api_key: "k".into(),
            }),
        };

        let vibe = generator.vibe(&[]).await;
        assert!(FALLBACK_VIBES.contains(&vibe.as_str()));
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_key() {
        let remote = Remote {
            client: reqwest::Client::builder()
                .timeout(Duration::from_millis(200))
                .build()
                .unwrap(),
            endpoint: "http://127.0.0.1:9/models/x:generateContent".into(),
            api_key: "SUPER-SECRET-KEY".into(),
        };

        let err = remote.generate("prompt").await.unwrap_err();
        let logged = format!("{:#}", err);
        assert!(!logged.contains("SUPER-SECRET-KEY"), "key in error text: {logged}");
    }

    #[test]
    fn response_text_is_extracted() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"  Stonks only go up  "}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let text = parsed.candidates[0].content.as_ref().unwrap().parts[0]
            .text
            .as_deref()
            .unwrap();
        assert_eq!(text.trim(), "Stonks only go up");
    }
}
