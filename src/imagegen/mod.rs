mod openai;
mod scorer;

use async_trait::async_trait;
use std::time::Duration;

pub use openai::OpenAiImageProvider;
pub use scorer::HttpAccuracyScorer;

/// Result type for image pipeline operations
pub type ImageResult<T> = Result<T, ImageGenError>;

/// Errors that can occur while generating or scoring images. Generation
/// failure means "the player may retry", never a dead round.
#[derive(Debug, thiserror::Error)]
pub enum ImageGenError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// An image produced for a prompt, referenced by URL
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub url: String,
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate an image for the given prompt
    async fn generate(&self, prompt: &str) -> ImageResult<GeneratedImage>;

    /// Name of this provider
    fn name(&self) -> &str;
}

/// Trait for the external image-similarity scorer. Scores are 0-100; the
/// game stores whatever the scorer returns.
#[async_trait]
pub trait AccuracyScorer: Send + Sync {
    async fn score(&self, image_url: &str, target_url: &str) -> ImageResult<f32>;
}

/// Generation plus optional scoring behind one handle
pub struct ImagePipeline {
    generator: Box<dyn ImageGenerator>,
    scorer: Option<Box<dyn AccuracyScorer>>,
    timeout: Duration,
}

impl ImagePipeline {
    pub fn new(
        generator: Box<dyn ImageGenerator>,
        scorer: Option<Box<dyn AccuracyScorer>>,
        timeout: Duration,
    ) -> Self {
        Self {
            generator,
            scorer,
            timeout,
        }
    }

    /// Generate an image, bounded by the configured timeout
    pub async fn generate(&self, prompt: &str) -> ImageResult<GeneratedImage> {
        tokio::time::timeout(self.timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| ImageGenError::Timeout(self.timeout))?
    }

    /// Score an image against the round's target. A missing or failing
    /// scorer yields 0 rather than blocking the submission.
    pub async fn score_or_zero(&self, image_url: &str, target_url: &str) -> f32 {
        let Some(scorer) = &self.scorer else {
            return 0.0;
        };
        match tokio::time::timeout(self.timeout, scorer.score(image_url, target_url)).await {
            Ok(Ok(score)) => score.max(0.0),
            Ok(Err(e)) => {
                tracing::warn!("accuracy scoring failed: {}, storing 0", e);
                0.0
            }
            Err(_) => {
                tracing::warn!("accuracy scoring timed out, storing 0");
                0.0
            }
        }
    }
}

/// Configuration for the image pipeline
#[derive(Debug, Clone)]
pub struct ImageGenConfig {
    /// OpenAI API key; generation is unavailable without one
    pub openai_api_key: Option<String>,
    /// Image model to use
    pub image_model: String,
    /// Requested image size
    pub image_size: String,
    /// Base URL of the external accuracy scorer, if one is deployed
    pub scorer_base_url: Option<String>,
    /// Timeout for generation and scoring requests
    pub request_timeout: Duration,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
            scorer_base_url: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ImageGenConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        fn non_empty(key: &str) -> Option<String> {
            std::env::var(key).ok().and_then(|v| {
                let trimmed = v.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
        }

        let defaults = Self::default();
        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            image_model: non_empty("IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_size: non_empty("IMAGE_SIZE").unwrap_or(defaults.image_size),
            scorer_base_url: non_empty("SCORER_BASE_URL"),
            request_timeout: std::env::var("IMAGE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// Build the pipeline from this configuration. Errors when no
    /// generation backend is configured.
    pub fn build_pipeline(&self) -> ImageResult<ImagePipeline> {
        let Some(api_key) = &self.openai_api_key else {
            return Err(ImageGenError::ConfigError(
                "No image provider configured. Set OPENAI_API_KEY".to_string(),
            ));
        };

        let generator = Box::new(OpenAiImageProvider::new(
            api_key.clone(),
            self.image_model.clone(),
            self.image_size.clone(),
        ));

        let scorer: Option<Box<dyn AccuracyScorer>> = self
            .scorer_base_url
            .as_ref()
            .map(|url| Box::new(HttpAccuracyScorer::new(url.clone())) as Box<dyn AccuracyScorer>);

        Ok(ImagePipeline::new(generator, scorer, self.request_timeout))
    }
}
