use serde::{Deserialize, Serialize};
use sidekick_rs_config::ImageGenConfig;

const DEFAULT_CLIP_SKIP: u32 = 2;

/// Text-to-image request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    pub negative_prompt: String,
    #[serde(rename = "sampler_name")]
    pub sampler: String,
    pub scheduler: String,
    pub steps: u32,
    pub cfg_scale: f32,
    /// `-1` picks a random seed.
    pub seed: i64,
    pub width: u32,
    pub height: u32,
    pub n_iter: u32,
    pub batch_size: u32,
    pub clip_skip: u32,
    /// Checkpoint to switch to before generating; not sent in the body.
    #[serde(skip)]
    pub model: Option<String>,
}

impl GenerationParams {
    /// Parameters for `prompt` using configured defaults.
    pub fn from_config(config: &ImageGenConfig, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: config.negative_prompt.clone(),
            sampler: config.sampler.clone(),
            scheduler: config.scheduler.clone(),
            steps: config.steps,
            cfg_scale: config.cfg_scale,
            seed: config.seed,
            width: config.width,
            height: config.height,
            n_iter: 1,
            batch_size: 1,
            clip_skip: DEFAULT_CLIP_SKIP,
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }
}
