use super::*;
use async_openai::{
    config::OpenAIConfig,
    types::{CreateImageRequestArgs, Image, ImageModel, ImageResponseFormat, ImageSize},
    Client,
};

/// OpenAI (DALL·E) image generation
pub struct OpenAiImageProvider {
    client: Client<OpenAIConfig>,
    model: String,
    size: String,
}

impl OpenAiImageProvider {
    /// Create a new provider with the given API key, model, and size
    pub fn new(api_key: String, model: String, size: String) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        let client = Client::with_config(config);

        Self {
            client,
            model,
            size,
        }
    }

    fn model(&self) -> ImageModel {
        match self.model.as_str() {
            "dall-e-2" => ImageModel::DallE2,
            "dall-e-3" => ImageModel::DallE3,
            other => ImageModel::Other(other.to_string()),
        }
    }

    fn size(&self) -> ImageSize {
        match self.size.as_str() {
            "256x256" => ImageSize::S256x256,
            "512x512" => ImageSize::S512x512,
            "1792x1024" => ImageSize::S1792x1024,
            "1024x1792" => ImageSize::S1024x1792,
            _ => ImageSize::S1024x1024,
        }
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageProvider {
    async fn generate(&self, prompt: &str) -> ImageResult<GeneratedImage> {
        let request = CreateImageRequestArgs::default()
            .prompt(prompt)
            .model(self.model())
            .n(1)
            .size(self.size())
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(|e| ImageGenError::ApiError(e.to_string()))?;

        let response = self
            .client
            .images()
            .create(request)
            .await
            .map_err(|e| ImageGenError::ApiError(e.to_string()))?;

        let image = response
            .data
            .first()
            .ok_or_else(|| ImageGenError::ParseError("No image in response".to_string()))?;

        match image.as_ref() {
            Image::Url { url, .. } => Ok(GeneratedImage { url: url.clone() }),
            _ => Err(ImageGenError::ParseError(
                "Expected an image URL in response".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_parsing_defaults_to_square() {
        let provider =
            OpenAiImageProvider::new("key".into(), "dall-e-3".into(), "weird".into());
        assert!(matches!(provider.size(), ImageSize::S1024x1024));

        let provider = OpenAiImageProvider::new("key".into(), "dall-e-2".into(), "512x512".into());
        assert!(matches!(provider.size(), ImageSize::S512x512));
        assert!(matches!(provider.model(), ImageModel::DallE2));
    }

    #[tokio::test]
    #[ignore] // Only run with an actual API key
    async fn test_openai_generate() {
        let api_key = std::env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY not set");
        let provider =
            OpenAiImageProvider::new(api_key, "dall-e-3".to_string(), "1024x1024".to_string());

        let image = provider
            .generate("a lighthouse on a cliff at sunset, oil painting")
            .await
            .unwrap();
        assert!(image.url.starts_with("http"));
    }
}
