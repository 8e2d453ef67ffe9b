use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use super::{
    ImageBackend, Img2ImgParams, MemoryStats, Progress, Sampler, SdApiError, SdModel, Txt2ImgParams, Upscaler,
};
use crate::config;
use crate::core::metrics;

/// Resources the backend can rescan from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum RefreshTarget {
    Embeddings,
    Checkpoints,
    Vae,
    Loras,
}

impl RefreshTarget {
    fn endpoint(self) -> &'static str {
        match self {
            Self::Embeddings => "sdapi/v1/refresh-embeddings",
            Self::Checkpoints => "sdapi/v1/refresh-checkpoints",
            Self::Vae => "sdapi/v1/refresh-vae",
            Self::Loras => "sdapi/v1/refresh-loras",
        }
    }
}

/// Async client for the Stable Diffusion WebUI API.
#[derive(Clone)]
pub struct SdApiClient {
    http: reqwest::Client,
    base_url: String,
    progress_timeout: Duration,
}

impl SdApiClient {
    /// Client with the configured request timeout (generations can take hours).
    pub fn new(base_url: impl Into<String>) -> Result<Self, SdApiError> {
        let http = reqwest::Client::builder().timeout(config::sd::request_timeout()).build()?;
        Ok(Self::with_http_client(http, base_url))
    }

    /// Client on `SD_API_URL`
    pub fn from_env() -> Result<Self, SdApiError> {
        Self::new(config::sd::API_URL.as_str())
    }

    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        log::debug!("SD client initialized with base URL: {}", base_url);
        Self {
            http,
            base_url,
            progress_timeout: config::sd::progress_timeout(),
        }
    }

    #[must_use]
    pub fn progress_timeout(mut self, timeout: Duration) -> Self {
        self.progress_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SdApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        log::error!("SD API error {}: {}", status, body);
        Err(SdApiError::Status { status, body })
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, SdApiError> {
        log::debug!("GET {}", endpoint);
        let response = self.http.get(self.url(endpoint)).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_json<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<Value, SdApiError> {
        log::debug!("POST {}", endpoint);
        let response = self.http.post(self.url(endpoint)).json(body).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    async fn post_text(&self, endpoint: &str) -> Result<String, SdApiError> {
        let response = self.http.post(self.url(endpoint)).json(&json!({})).send().await?;
        Ok(Self::check(response).await?.text().await?.trim().to_string())
    }

    pub async fn samplers(&self) -> Result<Vec<Sampler>, SdApiError> {
        self.get_json("sdapi/v1/samplers").await
    }

    pub async fn schedulers(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/schedulers").await
    }

    pub async fn upscalers(&self) -> Result<Vec<Upscaler>, SdApiError> {
        self.get_json("sdapi/v1/upscalers").await
    }

    pub async fn latent_upscale_modes(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/latent-upscale-modes").await
    }

    pub async fn sd_models(&self) -> Result<Vec<SdModel>, SdApiError> {
        self.get_json("sdapi/v1/sd-models").await
    }

    pub async fn hypernetworks(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/hypernetworks").await
    }

    pub async fn face_restorers(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/face-restorers").await
    }

    pub async fn realesrgan_models(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/realesrgan-models").await
    }

    pub async fn prompt_styles(&self) -> Result<Vec<Value>, SdApiError> {
        self.get_json("sdapi/v1/prompt-styles").await
    }

    /// Textual inversions; the backend answers with an object, not a list.
    pub async fn embeddings(&self) -> Result<Value, SdApiError> {
        self.get_json("sdapi/v1/embeddings").await
    }

    pub async fn cmd_flags(&self) -> Result<Value, SdApiError> {
        self.get_json("sdapi/v1/cmd-flags").await
    }

    pub async fn memory(&self) -> Result<MemoryStats, SdApiError> {
        log::info!("Requesting memory statistics");
        self.get_json("sdapi/v1/memory").await
    }

    pub async fn system_info(&self) -> Result<Value, SdApiError> {
        self.get_json("sdapi/v1/system-info").await
    }

    /// Asks the backend to rescan a resource directory.
    pub async fn refresh(&self, target: RefreshTarget) -> Result<String, SdApiError> {
        log::info!("Starting refresh of {}", target);
        let text = self.post_text(target.endpoint()).await?;
        log::info!("✅ Refreshed {}", target);
        Ok(text)
    }

    /// Interrupts the running generation.
    pub async fn interrupt(&self) -> Result<String, SdApiError> {
        self.post_text("sdapi/v1/interrupt").await
    }

    /// Skips the current image of a batch.
    pub async fn skip(&self) -> Result<String, SdApiError> {
        self.post_text("sdapi/v1/skip").await
    }

    /// Current progress, or `None` on timeout or any error.
    pub async fn progress(&self, skip_current_image: bool) -> Option<Progress> {
        let result = self
            .http
            .get(self.url("sdapi/v1/progress"))
            .query(&[("skip_current_image", skip_current_image.to_string())])
            .timeout(self.progress_timeout)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                log::warn!("Progress request timed out");
                return None;
            }
            Err(e) => {
                log::error!("Progress check failed: {}", e);
                return None;
            }
        };

        if !response.status().is_success() {
            log::error!("Progress check failed: HTTP {}", response.status());
            return None;
        }

        match response.json().await {
            Ok(progress) => Some(progress),
            Err(e) => {
                log::error!("Malformed progress response: {}", e);
                None
            }
        }
    }

    pub async fn txt2img(&self, params: &Txt2ImgParams) -> Result<Vec<Vec<u8>>, SdApiError> {
        params.validate()?;
        log::info!(
            "🎨 txt2img: {}x{}, {} steps, sampler {}",
            params.width,
            params.height,
            params.steps,
            params.sampler_name
        );
        let response = self.post_json("sdapi/v1/txt2img", params).await?;
        let images = decode_images(&response)?;
        metrics::IMAGES_GENERATED_TOTAL
            .with_label_values(&["txt2img"])
            .inc_by(images.len() as u64);
        Ok(images)
    }

    pub async fn img2img(&self, params: &Img2ImgParams, init_images: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, SdApiError> {
        if init_images.is_empty() {
            return Err(SdApiError::Validation("at least one init image required".to_string()));
        }
        params.validate()?;

        let mut payload = serde_json::to_value(params).map_err(|e| SdApiError::Validation(e.to_string()))?;
        if let Value::Object(map) = &mut payload {
            let encoded: Vec<Value> = init_images.iter().map(|img| Value::String(BASE64.encode(img))).collect();
            map.insert("init_images".to_string(), Value::Array(encoded));
        }

        log::info!("🎨 img2img with {} init image(s), denoising {}", init_images.len(), params.denoising_strength);
        let response = self.post_json("sdapi/v1/img2img", &payload).await?;
        let images = decode_images(&response)?;
        metrics::IMAGES_GENERATED_TOTAL
            .with_label_values(&["img2img"])
            .inc_by(images.len() as u64);
        Ok(images)
    }

    /// Upscales one image.
    pub async fn extra_single_image(&self, image: &[u8], upscaler: &str, resize: f32) -> Result<Vec<u8>, SdApiError> {
        let payload = json!({
            "image": BASE64.encode(image),
            "upscaler_1": upscaler,
            "resize_mode": 0,
            "upscaling_resize": resize,
        });
        let response = self.post_json("sdapi/v1/extra-single-image", &payload).await?;
        decode_images(&response)?
            .into_iter()
            .next()
            .ok_or_else(|| SdApiError::InvalidResponse("upscaler returned no image".to_string()))
    }

    /// Generation parameters embedded in a PNG.
    pub async fn png_info(&self, image: &[u8]) -> Result<Value, SdApiError> {
        self.post_json("sdapi/v1/png-info", &json!({ "image": BASE64.encode(image) }))
            .await
    }
}

/// Decodes the `images` list (or single `image`) from a generation response.
pub(crate) fn decode_images(response: &Value) -> Result<Vec<Vec<u8>>, SdApiError> {
    let encoded: Vec<&str> = match (response.get("images"), response.get("image")) {
        (Some(Value::Array(items)), _) => items.iter().filter_map(Value::as_str).collect(),
        (_, Some(Value::String(single))) => vec![single.as_str()],
        (Some(Value::Null), _) => Vec::new(),
        _ => {
            log::error!("No images in response");
            return Err(SdApiError::InvalidResponse("no images in response".to_string()));
        }
    };

    encoded
        .into_iter()
        .map(|data| {
            // Some WebUI builds prefix images with a data URL header
            let data = data.split_once("base64,").map(|(_, rest)| rest).unwrap_or(data);
            Ok(BASE64.decode(data)?)
        })
        .collect()
}

#[async_trait]
impl ImageBackend for SdApiClient {
    async fn samplers(&self) -> Result<Vec<Sampler>, SdApiError> {
        SdApiClient::samplers(self).await
    }

    async fn txt2img(&self, params: &Txt2ImgParams) -> Result<Vec<Vec<u8>>, SdApiError> {
        SdApiClient::txt2img(self, params).await
    }

    async fn img2img(&self, params: &Img2ImgParams, init_images: &[Vec<u8>]) -> Result<Vec<Vec<u8>>, SdApiError> {
        SdApiClient::img2img(self, params, init_images).await
    }
}
