use super::*;
use serde::{Deserialize, Serialize};

/// Client for the external image-similarity service. The scoring
/// algorithm is a black box; this just carries URLs over and a 0-100
/// score back.
pub struct HttpAccuracyScorer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAccuracyScorer {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self { base_url, client }
    }
}

#[derive(Debug, Serialize)]
struct ScoreRequest<'a> {
    image_url: &'a str,
    target_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ScoreResponse {
    score: f32,
}

#[async_trait]
impl AccuracyScorer for HttpAccuracyScorer {
    async fn score(&self, image_url: &str, target_url: &str) -> ImageResult<f32> {
        let url = format!("{}/score", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&ScoreRequest {
                image_url,
                target_url,
            })
            .send()
            .await
            .map_err(|e| ImageGenError::ApiError(format!("Scorer request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(ImageGenError::ApiError(format!(
                "Scorer returned status {}",
                response.status()
            )));
        }

        let body: ScoreResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::ParseError(e.to_string()))?;

        Ok(body.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_request_shape() {
        let request = ScoreRequest {
            image_url: "https://img/generated.png",
            target_url: "https://img/target.png",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["image_url"], "https://img/generated.png");
        assert_eq!(json["target_url"], "https://img/target.png");
    }
}
