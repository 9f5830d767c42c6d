//! HTTP client for the SD WebUI `sdapi/v1` endpoints.

use crate::error::ImageGenError;
use crate::params::GenerationParams;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use directories::BaseDirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sidekick_rs_config::ImageGenConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROGRESS_TIMEOUT: Duration = Duration::from_secs(3);
const OPTIONS_TIMEOUT: Duration = Duration::from_secs(30);
const MODELS_TIMEOUT: Duration = Duration::from_secs(10);
const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Generation progress as reported by the WebUI.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct GenerationProgress {
    /// Fraction done, `0.0..=1.0`.
    #[serde(default)]
    pub progress: f64,
    /// Estimated seconds remaining.
    #[serde(default)]
    pub eta_relative: f64,
}

/// Checkpoint installed in the WebUI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SdModel {
    /// Display title, also accepted by `switch_model`.
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Client for a locally running image diffusion service.
///
/// Requests never go through a proxy, since the service runs locally even
/// when chat providers need one.
#[derive(Debug, Clone)]
pub struct DiffusionClient {
    http: reqwest::Client,
    api_url: String,
    generate_timeout: Duration,
    output_dir: PathBuf,
}

impl DiffusionClient {
    pub fn new(
        api_url: impl Into<String>,
        generate_timeout: Duration,
        output_dir: impl Into<PathBuf>,
    ) -> Result<Self, ImageGenError> {
        let http = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            generate_timeout,
            output_dir: output_dir.into(),
        })
    }

    /// Build a client from config, saving images under `~/.sidekick/art` unless
    /// an output directory is configured.
    pub fn from_config(config: &ImageGenConfig) -> Result<Self, ImageGenError> {
        let output_dir = match &config.output_dir {
            Some(dir) => PathBuf::from(dir),
            None => BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(".sidekick").join("art"))
                .unwrap_or_else(|| PathBuf::from("art")),
        };
        Self::new(
            config.api_url.clone(),
            Duration::from_secs(config.timeout_secs),
            output_dir,
        )
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Check that the service answers.
    pub async fn check_connection(&self) -> Result<(), ImageGenError> {
        let url = self.url("/sdapi/v1/progress");
        let response = self
            .http
            .get(&url)
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await
            .map_err(|err| self.unreachable(err, CONNECT_TIMEOUT))?;
        check_status(response).await?;
        info!("image service reachable (url={})", self.api_url);
        Ok(())
    }

    /// Current generation progress.
    pub async fn progress(&self) -> Result<GenerationProgress, ImageGenError> {
        let response = self
            .http
            .get(self.url("/sdapi/v1/progress"))
            .timeout(PROGRESS_TIMEOUT)
            .send()
            .await
            .map_err(|err| self.unreachable(err, PROGRESS_TIMEOUT))?;
        let response = check_status(response).await?;
        response
            .json::<GenerationProgress>()
            .await
            .map_err(|err| ImageGenError::Decode(err.to_string()))
    }

    /// Installed checkpoints.
    pub async fn list_models(&self) -> Result<Vec<SdModel>, ImageGenError> {
        let response = self
            .http
            .get(self.url("/sdapi/v1/sd-models"))
            .timeout(MODELS_TIMEOUT)
            .send()
            .await
            .map_err(|err| self.unreachable(err, MODELS_TIMEOUT))?;
        let response = check_status(response).await?;
        response
            .json::<Vec<SdModel>>()
            .await
            .map_err(|err| ImageGenError::Decode(err.to_string()))
    }

    /// Load a different checkpoint.
    pub async fn switch_model(&self, model: &str) -> Result<(), ImageGenError> {
        info!("switching image model (model={model})");
        let response = self
            .http
            .post(self.url("/sdapi/v1/options"))
            .timeout(OPTIONS_TIMEOUT)
            .json(&json!({ "sd_model_checkpoint": model }))
            .send()
            .await
            .map_err(|err| self.unreachable(err, OPTIONS_TIMEOUT))?;
        check_status(response).await?;
        Ok(())
    }

    /// Generate one image and return its decoded bytes.
    ///
    /// Switches to `params.model` first when one is set.
    pub async fn txt2img(&self, params: &GenerationParams) -> Result<Vec<u8>, ImageGenError> {
        if let Some(model) = &params.model {
            self.switch_model(model).await?;
        }
        info!(
            "generating image (steps={}, size={}x{}, prompt_len={})",
            params.steps,
            params.width,
            params.height,
            params.prompt.len()
        );
        let response = self
            .http
            .post(self.url("/sdapi/v1/txt2img"))
            .timeout(self.generate_timeout)
            .json(params)
            .send()
            .await
            .map_err(|err| self.unreachable(err, self.generate_timeout))?;
        let response = check_status(response).await?;
        let body: Txt2ImgResponse = response
            .json()
            .await
            .map_err(|err| ImageGenError::Decode(err.to_string()))?;
        let encoded = body.images.into_iter().next().ok_or(ImageGenError::NoImage)?;
        decode_image(&encoded)
    }

    /// Generate one image and save it as `art_{timestamp}.png` in the output dir.
    pub async fn generate_to_file(
        &self,
        params: &GenerationParams,
    ) -> Result<PathBuf, ImageGenError> {
        let bytes = self.txt2img(params).await?;
        self.save(&bytes).await
    }

    /// Like [`DiffusionClient::generate_to_file`], reporting progress while the
    /// service works.
    pub async fn generate_with_progress<F>(
        &self,
        params: &GenerationParams,
        mut on_progress: F,
    ) -> Result<PathBuf, ImageGenError>
    where
        F: FnMut(GenerationProgress) + Send,
    {
        let generation = self.txt2img(params);
        tokio::pin!(generation);
        let mut ticker = tokio::time::interval(PROGRESS_POLL_INTERVAL);
        let mut last = 0.0;
        let bytes = loop {
            tokio::select! {
                result = &mut generation => break result?,
                _ = ticker.tick() => {
                    match self.progress().await {
                        Ok(progress) if progress.progress > last => {
                            last = progress.progress;
                            on_progress(progress);
                        }
                        Ok(_) => {}
                        Err(err) => debug!("progress poll failed: {err}"),
                    }
                }
            }
        };
        on_progress(GenerationProgress {
            progress: 1.0,
            eta_relative: 0.0,
        });
        self.save(&bytes).await
    }

    async fn save(&self, bytes: &[u8]) -> Result<PathBuf, ImageGenError> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
        let mut path = self.output_dir.join(format!("art_{stamp}.png"));
        let mut suffix = 1;
        while tokio::fs::try_exists(&path).await? {
            path = self.output_dir.join(format!("art_{stamp}_{suffix}.png"));
            suffix += 1;
        }
        tokio::fs::write(&path, bytes).await?;
        info!("image saved (path={}, bytes={})", path.display(), bytes.len());
        Ok(path)
    }

    fn unreachable(&self, err: reqwest::Error, timeout: Duration) -> ImageGenError {
        if err.is_timeout() {
            ImageGenError::Timeout(timeout.as_secs())
        } else if err.is_connect() {
            warn!("image service unreachable (url={})", self.api_url);
            ImageGenError::Unreachable {
                url: self.api_url.clone(),
                reason: err.to_string(),
            }
        } else {
            ImageGenError::Http(err)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ImageGenError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = match serde_json::from_str::<Value>(&body) {
        Ok(value) => value
            .get("detail")
            .or_else(|| value.get("error"))
            .map(|detail| match detail {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .unwrap_or(body),
        Err(_) => body,
    };
    Err(ImageGenError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

/// Decode a base64 image, accepting an optional data URL prefix.
fn decode_image(encoded: &str) -> Result<Vec<u8>, ImageGenError> {
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded,
    };
    STANDARD
        .decode(payload.trim())
        .map_err(|err| ImageGenError::Decode(format!("image is not base64: {err}")))
}
