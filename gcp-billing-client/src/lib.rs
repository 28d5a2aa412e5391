use serde::Deserialize;
use serde::Serialize;
use std::future::Future;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://cloudbilling.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum Error {
  // URLs are stripped from these as the API key travels in the query string.
  #[error("billing API request failed: {0}")]
  Http(reqwest::Error),
  #[error("no billing service named {0:?}")]
  ServiceNotFound(String),
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    Error::Http(err.without_url())
  }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
  pub service_id: String,
  pub display_name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  #[serde(default)]
  pub resource_family: String,
  #[serde(default)]
  pub usage_type: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct GeoTaxonomy {
  #[serde(default)]
  pub regions: Vec<String>,
}

// Proto3 JSON leaves out zero values, so both fields may be missing. `units` is an int64 and therefore encoded as a string.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Money {
  #[serde(default)]
  pub units: Option<String>,
  #[serde(default)]
  pub nanos: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TieredRate {
  #[serde(default)]
  pub start_usage_amount: f64,
  #[serde(default)]
  pub unit_price: Money,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricingExpression {
  #[serde(default)]
  pub usage_unit: String,
  #[serde(default)]
  pub tiered_rates: Vec<TieredRate>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PricingInfo {
  #[serde(default)]
  pub pricing_expression: PricingExpression,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
  #[serde(default)]
  pub sku_id: String,
  pub description: String,
  #[serde(default)]
  pub category: Category,
  #[serde(default)]
  pub geo_taxonomy: GeoTaxonomy,
  #[serde(default)]
  pub pricing_info: Vec<PricingInfo>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListServicesResponse {
  #[serde(default)]
  services: Vec<Service>,
  next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSkusResponse {
  #[serde(default)]
  skus: Vec<Sku>,
  next_page_token: Option<String>,
}

/// The API sends an empty string rather than omitting the token on the last page.
fn continuation(token: Option<String>) -> Option<String> {
  token.filter(|t| !t.trim().is_empty())
}

/// Calls `fetch_page` with each continuation token in turn, starting without one, until a page comes back without a further token.
async fn collect_pages<T, F, Fut>(mut fetch_page: F) -> Result<Vec<T>>
where
  F: FnMut(Option<String>) -> Fut,
  Fut: Future<Output = Result<(Vec<T>, Option<String>)>>,
{
  let mut items = Vec::new();
  let mut page_token = None;
  loop {
    let (page, next_page_token) = fetch_page(page_token.take()).await?;
    items.extend(page);
    page_token = continuation(next_page_token);
    if page_token.is_none() {
      break;
    };
  }
  Ok(items)
}

pub struct BillingClient {
  client: reqwest::Client,
  url_prefix: String,
  api_key: String,
}

impl BillingClient {
  pub fn new(url_prefix: String, api_key: String) -> BillingClient {
    BillingClient {
      client: reqwest::Client::new(),
      url_prefix: url_prefix.trim_end_matches('/').to_string(),
      api_key,
    }
  }

  async fn get_page<T: for<'de> Deserialize<'de>>(
    &self,
    path: &str,
    page_token: Option<&str>,
  ) -> Result<T> {
    let mut query = vec![("key", self.api_key.as_str())];
    if let Some(t) = page_token {
      query.push(("pageToken", t));
    };
    let res = self
      .client
      .get(format!("{}{}", self.url_prefix, path))
      .query(&query)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(res)
  }

  pub async fn list_services(&self) -> Result<Vec<Service>> {
    collect_pages(|page_token| async move {
      let page: ListServicesResponse = self.get_page("/services", page_token.as_deref()).await?;
      Ok::<_, Error>((page.services, page.next_page_token))
    })
    .await
  }

  pub async fn find_service_id(&self, display_name: &str) -> Result<String> {
    self
      .list_services()
      .await?
      .into_iter()
      .find(|s| s.display_name == display_name)
      .map(|s| s.service_id)
      .ok_or_else(|| Error::ServiceNotFound(display_name.to_string()))
  }

  /// Walks every page of the service's SKU listing.
  pub async fn list_skus(&self, service_id: &str) -> Result<Vec<Sku>> {
    let path = format!("/services/{}/skus", service_id);
    let path = path.as_str();
    collect_pages(|page_token| async move {
      let page: ListSkusResponse = self.get_page(path, page_token.as_deref()).await?;
      debug!(count = page.skus.len(), "fetched sku page");
      Ok::<_, Error>((page.skus, page.next_page_token))
    })
    .await
  }
}
