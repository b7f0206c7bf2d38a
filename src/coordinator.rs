use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::fallback::CopyEngine;
use crate::gemini::{GeminiClient, GeminiError};
use crate::models::{CaptionStyle, GenerationRequest, GenerationResult};
use crate::prompt;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("image generation failed: {0}")]
    Image(#[from] GeminiError),
}

/// Runs one image task and one caption task per style concurrently. The image
/// decides success; captions always resolve, falling back locally.
pub struct GenerationCoordinator {
    gemini: Arc<GeminiClient>,
    copy: Arc<CopyEngine>,
}

impl GenerationCoordinator {
    pub fn new(gemini: Arc<GeminiClient>, copy: Arc<CopyEngine>) -> Self {
        Self { gemini, copy }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult, GenerationError> {
        let started = Instant::now();
        let image_payload = prompt::compose_image_prompt(request);
        info!(
            product_id = %request.product_id,
            "🚀 Generating for '{}' with {} image part(s)",
            request.product_name,
            image_payload.parts.len()
        );

        let [a, b, c] = CaptionStyle::ALL;
        let (image, caption_a, caption_b, caption_c) = tokio::join!(
            self.gemini.generate_image(&image_payload),
            self.caption(a, &request.product_name),
            self.caption(b, &request.product_name),
            self.caption(c, &request.product_name),
        );

        let image_data = image.inspect_err(|e| {
            error!(
                "❌ Generation for '{}' failed after {:.1}s and {} attempt(s): {}",
                request.product_name,
                started.elapsed().as_secs_f64(),
                e.attempts(),
                e.reason()
            )
        })?;

        let captions = BTreeMap::from([(a, caption_a), (b, caption_b), (c, caption_c)]);
        info!(
            "✅ Generation for '{}' complete in {:.1}s ({} image bytes)",
            request.product_name,
            started.elapsed().as_secs_f64(),
            image_data.len()
        );
        Ok(GenerationResult {
            image_data,
            captions,
            product_name: request.product_name.clone(),
        })
    }

    /// Owns its persona, context and fallback draws. Never fails.
    async fn caption(&self, style: CaptionStyle, product_name: &str) -> String {
        let mut rng = StdRng::from_entropy();
        let payload = prompt::compose_caption_prompt(style, product_name, &mut rng);
        match self.gemini.generate_text(&payload).await {
            Ok(text) => {
                info!(style = style.id(), "✅ Remote caption ({} chars)", text.chars().count());
                text
            }
            Err(e) => {
                warn!(style = style.id(), "🔄 Remote caption failed ({}), using local copy engine", e.reason());
                self.copy.caption(product_name, style, &mut rng)
            }
        }
    }
}
