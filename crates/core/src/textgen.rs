//! Text-generation collaborator.
//!
//! Used by the construction-characteristics renderer to turn a narrative seed plus checklist
//! values into prose. Calls are synchronous and may be slow.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str) -> CoreResult<String>;
}

impl<F> TextGenerator for F
where
    F: Fn(&str) -> CoreResult<String> + Send + Sync,
{
    fn generate(&self, prompt: &str) -> CoreResult<String> {
        self(prompt)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Text generation over HTTP: `POST {"prompt": …}` answered by `{"text": …}`.
#[derive(Debug, Clone)]
pub struct HttpTextGenerator {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpTextGenerator {
    /// Creates a generator posting to `url`, bounding every call by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the URL is blank or the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> CoreResult<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(CoreError::Configuration(
                "text generation URL cannot be empty".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CoreError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }
}

impl TextGenerator for HttpTextGenerator {
    fn generate(&self, prompt: &str) -> CoreResult<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&GenerateRequest { prompt })
            .send()
            .map_err(|e| CoreError::TextGeneration(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::TextGeneration(format!(
                "service answered {}",
                status
            )));
        }

        let body: GenerateResponse = response
            .json()
            .map_err(|e| CoreError::TextGeneration(format!("malformed response: {}", e)))?;
        Ok(body.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{mock, Matcher};
    use serde_json::json;

    #[test]
    fn test_http_generator_posts_prompt_and_reads_text() {
        let m = mock("POST", "/generate")
            .match_body(Matcher::Json(json!({ "prompt": "seed" })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"text":" Фундамент ленточный. "}"#)
            .create();
        let url = format!("{}/generate", mockito::server_url());
        let generator = HttpTextGenerator::new(url, Duration::from_secs(5)).unwrap();

        let text = generator.generate("seed").unwrap();

        assert_eq!(text, "Фундамент ленточный.");
        m.assert();
    }

    #[test]
    fn test_http_generator_maps_error_status() {
        let m = mock("POST", "/generate-unavailable")
            .with_status(500)
            .with_body("{}")
            .create();
        let url = format!("{}/generate-unavailable", mockito::server_url());
        let generator = HttpTextGenerator::new(url, Duration::from_secs(5)).unwrap();

        assert!(matches!(
            generator.generate("x"),
            Err(CoreError::TextGeneration(_))
        ));
        m.assert();
    }

    #[test]
    fn test_blank_url_rejected() {
        assert!(matches!(
            HttpTextGenerator::new(" ", Duration::from_secs(1)),
            Err(CoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_closures_are_generators() {
        let generator = |prompt: &str| -> CoreResult<String> { Ok(prompt.to_uppercase()) };
        assert_eq!(generator.generate("ok").unwrap(), "OK");
    }
}
