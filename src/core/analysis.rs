//! Result providers for a captured frame
//!
//! No real inference happens here by default. [`SimulatedProvider`] draws
//! each field from its fixed option set; [`RemoteModelProvider`] posts the
//! frame to an HTTP model endpoint that answers with the same JSON shape.

use crate::core::camera::CapturedFrame;
use crate::core::config::{ProviderKind, ScanConfig};
use crate::core::errors::ErrorContext;
use crate::core::models::{
    SKIN_ISSUE_OPTIONS, SKIN_TONE_OPTIONS, SUN_DAMAGE_OPTIONS, ScanResults, SkinType,
    UNIQUE_FEATURE_OPTIONS,
};
use async_trait::async_trait;
use log::info;
use rand::SeedableRng;
use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use reqwest::Client;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

const MODEL_SERVICE: &str = "scan-model";

#[async_trait]
pub trait ResultProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn analyze(&self, frame: &CapturedFrame) -> io::Result<ScanResults>;
}

/// Build the provider selected in the scan configuration.
pub fn provider_from_config(
    config: &ScanConfig,
    timeout: Duration,
    error_log: Option<PathBuf>,
) -> io::Result<Box<dyn ResultProvider>> {
    match config.provider {
        ProviderKind::Simulated => Ok(Box::new(SimulatedProvider::new())),
        ProviderKind::RealModel => Ok(Box::new(RemoteModelProvider::new(
            &config.model_endpoint,
            timeout,
            error_log,
        )?)),
    }
}

/// One-line advice shown next to scan results.
pub fn skincare_focus(skin_type: SkinType) -> &'static str {
    match skin_type {
        SkinType::Dry => {
            "Focus on hydration and barrier repair. Look for products with hyaluronic acid and ceramides."
        }
        SkinType::Oily => {
            "Focus on oil control and gentle exfoliation. Avoid heavy moisturizers and look for non-comedogenic products."
        }
        SkinType::Combination => {
            "Use targeted products for different facial zones. Hydrate dry areas and control oil in the T-zone."
        }
        SkinType::Sensitive => {
            "Prioritize gentle, fragrance-free products with soothing ingredients like centella asiatica or oat extract."
        }
        SkinType::Normal => {
            "Maintain your balanced skin with consistent skincare and sun protection."
        }
    }
}

pub struct SimulatedProvider {
    rng: Mutex<StdRng>,
}

impl SimulatedProvider {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn pick<T: Copy>(options: &[T], rng: &mut StdRng) -> io::Result<T> {
    options
        .choose(rng)
        .copied()
        .ok_or_else(|| io::Error::other("empty option set"))
}

#[async_trait]
impl ResultProvider for SimulatedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn analyze(&self, frame: &CapturedFrame) -> io::Result<ScanResults> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| io::Error::other("simulated provider rng poisoned"))?;

        let results = ScanResults {
            skin_type: pick(&SkinType::ALL, &mut rng)?,
            skin_issues: pick(&SKIN_ISSUE_OPTIONS, &mut rng)?.to_string(),
            sun_damage: pick(&SUN_DAMAGE_OPTIONS, &mut rng)?.to_string(),
            unique_feature: pick(&UNIQUE_FEATURE_OPTIONS, &mut rng)?.to_string(),
            skin_tone: pick(&SKIN_TONE_OPTIONS, &mut rng)?.to_string(),
        };
        info!(
            "Simulated analysis of {} byte {} frame: {} skin",
            frame.bytes.len(),
            frame.mime_type,
            results.skin_type
        );
        Ok(results)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelRequest<'a> {
    image: &'a str,
}

/// Posts `{"image": <data url>}` and expects a `ScanResults` JSON body.
pub struct RemoteModelProvider {
    client: Client,
    endpoint: String,
    error_log: Option<PathBuf>,
}

impl RemoteModelProvider {
    pub fn new(endpoint: &str, timeout: Duration, error_log: Option<PathBuf>) -> io::Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                "provider is real_model but model_endpoint is not set",
            ));
        }
        url::Url::parse(endpoint).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Invalid model_endpoint '{endpoint}': {e}"),
            )
        })?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| io::Error::other(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            error_log,
        })
    }

    fn fail(&self, error_type: &str, message: &str, status: Option<u16>) -> io::Error {
        ErrorContext::new(MODEL_SERVICE, "analyze")
            .with_error(error_type, message)
            .with_request_details(&self.endpoint, status, None)
            .with_metadata("provider", "real_model")
            .log_error(self.error_log.as_deref());
        io::Error::other(format!("Scan model request failed: {message}"))
    }
}

#[async_trait]
impl ResultProvider for RemoteModelProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RealModel
    }

    async fn analyze(&self, frame: &CapturedFrame) -> io::Result<ScanResults> {
        let data_url = frame.to_data_url();
        info!("Sending {} byte frame to {}", frame.bytes.len(), self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ModelRequest { image: &data_url })
            .send()
            .await
            .map_err(|e| self.fail("network_error", &e.to_string(), None))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.fail(
                "api_error",
                &format!("HTTP {status}"),
                Some(status.as_u16()),
            ));
        }

        response
            .json::<ScanResults>()
            .await
            .map_err(|e| self.fail("json_parse_error", &e.to_string(), Some(status.as_u16())))
    }
}
