use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::targets;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8008";
pub const DEFAULT_OUTDIR: &str = "out";
pub const DEFAULT_PRICE_COMMODITY_MWH: f64 = 2200.0;
pub const DEFAULT_PRICE_DISTRIBUTION_MWH: f64 = 1800.0;
pub const DEFAULT_PRICE_FEED_IN_MWH: f64 = 1200.0;
pub const DEFAULT_MAX_RECIPIENTS: u32 = 3;

pub const UPLOAD_KEY_CONSUMPTION: &str = "eano_after_pv_csv";
pub const UPLOAD_KEY_GENERATION: &str = "eand_after_pv_csv";
pub const UPLOAD_KEY_SELF_CONSUMPTION: &str = "local_selfcons_csv";

pub fn upload_fallback_path(key: &str) -> String {
    format!("data/uploads/{key}.csv")
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl ApiConfig {
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionMethod {
    #[serde(rename = "hybrid")]
    Hybrid,
    #[serde(rename = "proportional")]
    Proportional,
}

impl DistributionMethod {
    pub const ALL: [DistributionMethod; 2] =
        [DistributionMethod::Hybrid, DistributionMethod::Proportional];

    pub fn label(self) -> &'static str {
        match self {
            DistributionMethod::Hybrid => "Hybrid",
            DistributionMethod::Proportional => "Proportional",
        }
    }
}

impl Default for DistributionMethod {
    fn default() -> Self {
        DistributionMethod::Hybrid
    }
}

impl fmt::Display for DistributionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Step3Params {
    pub eano_after_pv_csv: String,
    pub eand_after_pv_csv: String,
    pub local_selfcons_csv: String,
    pub outdir: String,
    pub price_commodity_mwh: f64,
    pub price_distribution_mwh: f64,
    pub price_feed_in_mwh: f64,
    pub mode: DistributionMethod,
    pub max_recipients: u32,
}

impl Default for Step3Params {
    fn default() -> Self {
        Self {
            eano_after_pv_csv: String::new(),
            eand_after_pv_csv: String::new(),
            local_selfcons_csv: String::new(),
            outdir: DEFAULT_OUTDIR.to_string(),
            price_commodity_mwh: DEFAULT_PRICE_COMMODITY_MWH,
            price_distribution_mwh: DEFAULT_PRICE_DISTRIBUTION_MWH,
            price_feed_in_mwh: DEFAULT_PRICE_FEED_IN_MWH,
            mode: DistributionMethod::Hybrid,
            max_recipients: DEFAULT_MAX_RECIPIENTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub key: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunReport {
    pub ok: bool,
    pub return_code: Option<i32>,
    #[serde(default)]
    pub log: String,
    #[serde(default)]
    pub new_csv: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OutputsListing {
    pub root: String,
    #[serde(default)]
    pub csv: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Step3Summary {
    pub ok: bool,
    #[serde(default)]
    pub rows: u64,
    #[serde(default)]
    pub sum_import_kwh: f64,
    #[serde(default)]
    pub sum_export_kwh: f64,
    pub note: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VersionInfo {
    pub service: String,
    pub ec_balance: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    ok: bool,
}

#[derive(Debug, Clone)]
pub struct ServiceClient {
    config: ApiConfig,
    http: reqwest::Client,
}

impl ServiceClient {
    pub fn new(config: ApiConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| Error::ClientInit { source })?;
        Ok(Self { config, http })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub async fn health(&self) -> Result<bool, Error> {
        let url = format!("{}/health", self.config.base_url);
        let response: HealthResponse = self.get_json(url).await?;
        Ok(response.ok)
    }

    pub async fn version(&self) -> Result<VersionInfo, Error> {
        let url = format!("{}/version", self.config.base_url);
        self.get_json(url).await
    }

    pub async fn upload(
        &self,
        key: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadResponse, Error> {
        let url = format!("{}/api/upload", self.config.base_url);
        tracing::debug!(target: targets::API, "Uploading {} as {}", file_name, key);

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("key", key.to_string())
            .part("file", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.clone(),
                source,
            })?;
        decode_json(url, response).await
    }

    pub async fn run_step3(&self, params: &Step3Params) -> Result<RunReport, Error> {
        let url = format!("{}/api/run/step3", self.config.base_url);
        tracing::debug!(target: targets::API, "Starting step3 run against {}", url);

        let response = self
            .http
            .post(&url)
            .json(params)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.clone(),
                source,
            })?;
        decode_json(url, response).await
    }

    pub async fn list_outputs(&self) -> Result<OutputsListing, Error> {
        let url = format!("{}/api/outputs", self.config.base_url);
        self.get_json(url).await
    }

    pub async fn summary_step3(&self) -> Result<Step3Summary, Error> {
        let url = format!("{}/api/summary/step3", self.config.base_url);
        self.get_json(url).await
    }

    pub fn download_url(&self, name: &str) -> String {
        let base = format!("{}/api/outputs/", self.config.base_url);
        match reqwest::Url::parse(&base).and_then(|url| url.join(name)) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{base}{name}"),
        }
    }

    pub async fn fetch_output(&self, name: &str) -> Result<Vec<u8>, Error> {
        let url = self.download_url(name);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                url,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| Error::Http { url, source })?;
        Ok(bytes.to_vec())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, Error> {
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| Error::Http {
                url: url.clone(),
                source,
            })?;
        decode_json(url, response).await
    }
}

async fn decode_json<T: DeserializeOwned>(
    url: String,
    response: reqwest::Response,
) -> Result<T, Error> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api {
            url,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|source| Error::Decode { url, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> ServiceClient {
        ServiceClient::new(ApiConfig::with_base_url(base)).expect("build client")
    }

    #[test]
    fn step3_params_serialize_with_service_names() {
        let params = Step3Params {
            eano_after_pv_csv: "data/uploads/eano_after_pv_csv.csv".to_string(),
            eand_after_pv_csv: "data/uploads/eand_after_pv_csv.csv".to_string(),
            local_selfcons_csv: "data/uploads/local_selfcons_csv.csv".to_string(),
            ..Step3Params::default()
        };

        let value = serde_json::to_value(&params).expect("serialize params");
        assert_eq!(
            value["eano_after_pv_csv"],
            "data/uploads/eano_after_pv_csv.csv"
        );
        assert_eq!(value["outdir"], "out");
        assert_eq!(value["price_commodity_mwh"], 2200.0);
        assert_eq!(value["price_distribution_mwh"], 1800.0);
        assert_eq!(value["price_feed_in_mwh"], 1200.0);
        assert_eq!(value["mode"], "hybrid");
        assert_eq!(value["max_recipients"], 3);
    }

    #[test]
    fn distribution_method_serializes_lowercase() {
        let json = serde_json::to_string(&DistributionMethod::Proportional).expect("serialize");
        assert_eq!(json, "\"proportional\"");
    }

    #[test]
    fn run_report_decodes_success_shape() {
        let report: RunReport = serde_json::from_str(
            r#"{"ok":true,"return_code":0,"log":"done\n","new_csv":["by_hour_after.csv"]}"#,
        )
        .expect("decode report");
        assert!(report.ok);
        assert_eq!(report.return_code, Some(0));
        assert_eq!(report.new_csv, vec!["by_hour_after.csv".to_string()]);
        assert_eq!(report.error, None);
    }

    #[test]
    fn run_report_tolerates_unknown_step_shape() {
        let report: RunReport =
            serde_json::from_str(r#"{"ok":false,"error":"Unknown step: step9"}"#)
                .expect("decode error report");
        assert!(!report.ok);
        assert_eq!(report.return_code, None);
        assert!(report.log.is_empty());
        assert_eq!(report.error.as_deref(), Some("Unknown step: step9"));
    }

    #[test]
    fn upload_response_defaults_missing_path() {
        let response: UploadResponse =
            serde_json::from_str(r#"{"ok":true,"key":"eano_after_pv_csv"}"#).expect("decode");
        assert!(response.path.is_empty());
    }

    #[test]
    fn summary_decodes_both_shapes() {
        let summary: Step3Summary = serde_json::from_str(
            r#"{"ok":true,"rows":8760,"sum_import_kwh":1234.5,"sum_export_kwh":987.6,"note":"approximate"}"#,
        )
        .expect("decode summary");
        assert!(summary.ok);
        assert_eq!(summary.rows, 8760);
        assert_eq!(summary.note.as_deref(), Some("approximate"));

        let missing: Step3Summary =
            serde_json::from_str(r#"{"ok":false,"error":"by_hour_after.csv not found"}"#)
                .expect("decode missing summary");
        assert!(!missing.ok);
        assert_eq!(missing.rows, 0);
        assert_eq!(missing.error.as_deref(), Some("by_hour_after.csv not found"));
    }

    #[test]
    fn outputs_listing_decodes() {
        let listing: OutputsListing =
            serde_json::from_str(r#"{"root":"out","csv":["a.csv","b.csv"]}"#).expect("decode");
        assert_eq!(listing.root, "out");
        assert_eq!(listing.csv.len(), 2);
    }

    #[test]
    fn version_info_decodes() {
        let version: VersionInfo =
            serde_json::from_str(r#"{"service":"ec-balance-service","ec_balance":"1.4.0"}"#)
                .expect("decode version");
        assert_eq!(version.service, "ec-balance-service");
        assert_eq!(version.ec_balance, "1.4.0");
    }

    #[test]
    fn health_response_decodes() {
        let healthy: HealthResponse =
            serde_json::from_str(r#"{"ok":true}"#).expect("decode health");
        assert!(healthy.ok);

        let degraded: HealthResponse =
            serde_json::from_str(r#"{"ok":false}"#).expect("decode degraded health");
        assert!(!degraded.ok);
    }

    #[test]
    fn base_url_trailing_slash_is_stripped() {
        let client = client("http://localhost:8008/");
        assert_eq!(client.base_url(), "http://localhost:8008");
    }

    #[test]
    fn download_url_percent_encodes_names() {
        let client = client("http://localhost:8008");
        assert_eq!(
            client.download_url("by_hour_after.csv"),
            "http://localhost:8008/api/outputs/by_hour_after.csv"
        );
        assert_eq!(
            client.download_url("by hour.csv"),
            "http://localhost:8008/api/outputs/by%20hour.csv"
        );
    }

    #[test]
    fn upload_fallback_matches_service_layout() {
        assert_eq!(
            upload_fallback_path(UPLOAD_KEY_CONSUMPTION),
            "data/uploads/eano_after_pv_csv.csv"
        );
        assert_eq!(
            upload_fallback_path(UPLOAD_KEY_SELF_CONSUMPTION),
            "data/uploads/local_selfcons_csv.csv"
        );
    }
}
