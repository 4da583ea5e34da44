//! GPU marketplace access.
//!
//! Recipes only see [`GpuMarketplace`]; [`VastClient`] implements it over the
//! Vast.ai REST API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::VastConfig;
use crate::error::AppError;
use crate::ssh::shell_quote;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VastInstance {
  pub id: i64,
  pub actual_status: Option<String>,
  pub gpu_name: Option<String>,
  pub num_gpus: Option<i64>,
  pub dph_total: Option<f64>,
  pub ssh_host: Option<String>,
  pub ssh_port: Option<i64>,
  pub label: Option<String>,
}

impl VastInstance {
  pub fn status(&self) -> &str {
    self.actual_status.as_deref().unwrap_or("unknown")
  }

  pub fn is_running(&self) -> bool {
    self.status().eq_ignore_ascii_case("running")
  }

  /// SSH spec for the instance, once the API reports its endpoint.
  pub fn ssh_spec(&self, user: &str, key_path: Option<&str>) -> Option<String> {
    let host = self.ssh_host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
    let port = self.ssh_port.filter(|p| *p > 0)?;
    let mut spec = format!("{user}@{host} -p {port}");
    if let Some(key) = key_path.map(str::trim).filter(|k| !k.is_empty()) {
      spec.push_str(" -i ");
      spec.push_str(&shell_quote(key));
    }
    Some(spec)
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct VastOffer {
  pub id: i64,
  pub gpu_name: Option<String>,
  pub num_gpus: Option<i64>,
  pub gpu_ram: Option<f64>,
  pub dph_total: Option<f64>,
  pub reliability2: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferFilters {
  pub gpu_name: Option<String>,
  pub num_gpus: Option<i64>,
  pub min_gpu_ram: Option<f64>,
  pub max_dph_total: Option<f64>,
  pub min_reliability2: Option<f64>,
  pub limit: Option<i64>,
  pub order: Option<String>, // e.g. "dph_total" or "-dph_total"
}

#[async_trait]
pub trait GpuMarketplace: Send + Sync {
  async fn get_instance(&self, id: i64) -> Result<VastInstance, AppError>;
  async fn list_instances(&self) -> Result<Vec<VastInstance>, AppError>;
  async fn start_instance(&self, id: i64) -> Result<(), AppError>;
  async fn stop_instance(&self, id: i64) -> Result<(), AppError>;
  async fn search_offers(&self, filters: OfferFilters) -> Result<Vec<VastOffer>, AppError>;
}

pub struct VastClient {
  http: reqwest::Client,
  api_base: String,
  api_key: String,
}

/// Known marketplace names for common GPU shorthands.
fn gpu_name_patterns(name: &str) -> Vec<&'static str> {
  match name {
    s if s.contains("H100") => vec!["NVIDIA H100 80GB HBM3", "NVIDIA H100 PCIe", "H100 SXM", "H100_SXM5", "H100_NVL"],
    s if s.contains("H200") => vec!["H200"],
    s if s.contains("A100") => vec![
      "NVIDIA A100-SXM4-80GB",
      "NVIDIA A100-SXM4-40GB",
      "NVIDIA A100-PCIE-40GB",
      "NVIDIA A100 80GB PCIe",
    ],
    s if s.contains("4090") => vec!["NVIDIA GeForce RTX 4090", "RTX 4090", "GeForce RTX 4090"],
    s if s.contains("3090") => vec!["NVIDIA GeForce RTX 3090", "RTX 3090", "RTX 3090 Ti"],
    s if s.contains("L40") => vec!["L40S", "L40", "NVIDIA L40S", "NVIDIA L40"],
    s if s.contains("L4") => vec!["L4", "NVIDIA L4"],
    s if s.contains("A6000") => vec!["RTX A6000", "NVIDIA RTX A6000"],
    _ => vec![],
  }
}

impl VastClient {
  pub fn from_cfg(cfg: &VastConfig) -> Result<Self, AppError> {
    let key = cfg.api_key.clone().unwrap_or_default().trim().to_string();
    if key.is_empty() {
      return Err(AppError::invalid_input("Missing Vast API key (config: vast.api_key)"));
    }
    let base = cfg.url.trim().trim_end_matches('/').to_string();
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(15))
      .connect_timeout(Duration::from_secs(10))
      .build()
      .map_err(|e| AppError::http(format!("Failed to create HTTP client: {}", e)))?;
    Ok(Self {
      http,
      api_base: format!("{base}/api/v0"),
      api_key: key,
    })
  }

  fn url_candidates(&self, path: &str) -> [String; 2] {
    let p = path.trim_start_matches('/');
    [format!("{}/{}", self.api_base, p), format!("{}/{}/", self.api_base, p)]
  }

  /// Try each URL form in turn; return the first successful body.
  async fn send(
    &self,
    method: reqwest::Method,
    urls: &[String],
    query: &[(&str, &str)],
    body: Option<&Value>,
  ) -> Result<String, AppError> {
    let mut last_err: Option<String> = None;
    for url in urls {
      let mut req = self
        .http
        .request(method.clone(), url)
        .query(&[("api_key", &self.api_key)])
        .query(query);
      if let Some(b) = body {
        req = req.json(b);
      }
      match req.send().await {
        Ok(resp) => {
          let status = resp.status();
          let text = resp.text().await.unwrap_or_default();
          if status.is_success() {
            return Ok(text);
          }
          last_err = Some(format!("{status} {text}"));
        }
        Err(e) => last_err = Some(e.to_string()),
      }
    }
    Err(AppError::vast_api(format!(
      "Vast API request failed: {}",
      last_err.unwrap_or_else(|| "unknown error".to_string())
    )))
  }

  async fn send_json(
    &self,
    method: reqwest::Method,
    urls: &[String],
    query: &[(&str, &str)],
    body: Option<&Value>,
  ) -> Result<Value, AppError> {
    let text = self.send(method, urls, query, body).await?;
    serde_json::from_str(&text)
      .map_err(|e| AppError::vast_api(format!("Invalid JSON from Vast API: {e}. Body: {text}")))
  }

  async fn set_state(&self, id: i64, state: &str) -> Result<(), AppError> {
    let urls = self.url_candidates(&format!("instances/{id}"));
    let body = serde_json::json!({ "state": state });
    self.send(reqwest::Method::PUT, &urls, &[], Some(&body)).await?;
    Ok(())
  }
}

fn parse_instance(item: Value) -> Result<VastInstance, AppError> {
  serde_json::from_value(item).map_err(|e| AppError::vast_api(format!("Failed to parse Vast instance: {e}")))
}

fn offers_query(filters: &OfferFilters) -> Value {
  let mut q = serde_json::Map::<String, Value>::new();
  q.insert("rentable".to_string(), serde_json::json!({ "eq": true }));
  q.insert("rented".to_string(), serde_json::json!({ "eq": false }));
  if let Some(name) = filters.gpu_name.as_deref().filter(|s| !s.trim().is_empty()) {
    let name = name.trim().to_uppercase().replace('_', " ");
    let patterns = gpu_name_patterns(&name);
    if patterns.is_empty() {
      q.insert("gpu_name".to_string(), serde_json::json!({ "eq": name }));
    } else {
      q.insert("gpu_name".to_string(), serde_json::json!({ "in": patterns }));
    }
  }
  if let Some(n) = filters.num_gpus.filter(|n| *n > 0) {
    q.insert("num_gpus".to_string(), serde_json::json!({ "gte": n }));
  }
  if let Some(v) = filters.min_gpu_ram.filter(|v| *v > 0.0) {
    // API reports gpu_ram in MB.
    q.insert("gpu_ram".to_string(), serde_json::json!({ "gte": v * 1024.0 }));
  }
  if let Some(v) = filters.max_dph_total.filter(|v| *v > 0.0) {
    q.insert("dph_total".to_string(), serde_json::json!({ "lte": v }));
  }
  if let Some(v) = filters.min_reliability2.filter(|v| *v > 0.0) {
    q.insert("reliability2".to_string(), serde_json::json!({ "gte": v }));
  }
  q.insert("type".to_string(), serde_json::json!("on-demand"));

  let order = filters.order.clone().unwrap_or_else(|| "dph_total".to_string());
  let raw = order.trim();
  let (field, dir) = match raw.strip_prefix('-') {
    Some(rest) => (rest, "desc"),
    None => (raw.trim_start_matches('+'), "asc"),
  };
  q.insert("order".to_string(), serde_json::json!([[field, dir]]));

  serde_json::json!({
    "select_cols": ["*"],
    "q": Value::Object(q),
    "limit": filters.limit.unwrap_or(50),
  })
}

#[async_trait]
impl GpuMarketplace for VastClient {
  async fn get_instance(&self, id: i64) -> Result<VastInstance, AppError> {
    let urls = self.url_candidates(&format!("instances/{id}"));
    let v = self.send_json(reqwest::Method::GET, &urls, &[("owner", "me")], None).await?;
    // `{"instances": {...}}` for a single id, occasionally a bare object.
    let item = match v.get("instances") {
      Some(Value::Object(_)) => v.get("instances").cloned(),
      Some(Value::Array(arr)) => arr.first().cloned(),
      _ if v.get("id").is_some() => Some(v.clone()),
      _ => None,
    };
    let item = item.ok_or_else(|| AppError::not_found(format!("Vast instance {id} not found")))?;
    parse_instance(item)
  }

  async fn list_instances(&self) -> Result<Vec<VastInstance>, AppError> {
    let urls = self.url_candidates("instances");
    let v = self.send_json(reqwest::Method::GET, &urls, &[("owner", "me")], None).await?;
    let arr = v
      .get("instances")
      .and_then(|x| x.as_array())
      .cloned()
      .or_else(|| v.as_array().cloned())
      .ok_or_else(|| AppError::vast_api(format!("Unexpected Vast instances response shape: {v}")))?;
    arr.into_iter().map(parse_instance).collect()
  }

  async fn start_instance(&self, id: i64) -> Result<(), AppError> {
    self.set_state(id, "running").await
  }

  async fn stop_instance(&self, id: i64) -> Result<(), AppError> {
    self.set_state(id, "stopped").await
  }

  async fn search_offers(&self, filters: OfferFilters) -> Result<Vec<VastOffer>, AppError> {
    let body = offers_query(&filters);
    let urls = self.url_candidates("search/asks");
    let v = self.send_json(reqwest::Method::PUT, &urls, &[], Some(&body)).await?;
    let offers = v
      .get("offers")
      .and_then(|x| x.as_array())
      .cloned()
      .or_else(|| v.as_array().cloned())
      .unwrap_or_default();
    let mut out: Vec<VastOffer> = offers
      .into_iter()
      .filter_map(|item| serde_json::from_value::<VastOffer>(item).ok())
      .collect();
    out.truncate(filters.limit.unwrap_or(50).max(0) as usize);
    Ok(out)
  }
}
