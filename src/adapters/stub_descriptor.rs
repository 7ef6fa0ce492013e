//! Minimal reference [`DescriptorExtractor`] — not a production vision
//! backend (see the C9 non-goals). Lets `IMAGE` items exercise the rest of
//! the pipeline without a real model behind the port.

use std::time::Instant;

use async_trait::async_trait;

use super::DescriptorExtractor;
use crate::domain::model::NormalizedItem;
use crate::error::Result;

pub struct StubDescriptorExtractor;

#[async_trait]
impl DescriptorExtractor for StubDescriptorExtractor {
    async fn describe(&self, image_bytes: &[u8], _deadline: Instant) -> Result<NormalizedItem> {
        if image_bytes.is_empty() {
            anyhow::bail!("empty image payload");
        }

        Ok(NormalizedItem {
            title: "unidentified household item".to_string(),
            brand: None,
            model: None,
            category: Some("general".to_string()),
            attributes: Vec::new(),
            keywords: vec!["household".to_string(), "item".to_string()],
            condition: None,
            estimated_price: None,
            extras: serde_json::Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn describes_nonempty_images() {
        let extractor = StubDescriptorExtractor;
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        let described = extractor.describe(&[0xFF, 0xD8], deadline).await.unwrap();
        assert_eq!(described.category.as_deref(), Some("general"));
    }

    #[tokio::test]
    async fn rejects_empty_payloads() {
        let extractor = StubDescriptorExtractor;
        let deadline = Instant::now() + std::time::Duration::from_secs(1);
        assert!(extractor.describe(&[], deadline).await.is_err());
    }
}
