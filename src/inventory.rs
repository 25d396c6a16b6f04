use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use crate::models::DiamondSnapshot;

#[derive(Debug, Error)]
pub enum InventoryError {
  #[error(transparent)]
  Http(#[from] reqwest::Error),
  #[error("invalid inventory url: {0}")]
  InvalidUrl(String),
}

/// Diamond record as served by the inventory backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiamondRecord {
  #[serde(alias = "stock")]
  pub stock_number: String,
  pub shape: String,
  pub weight: f64,
  pub color: String,
  pub clarity: String,
  #[serde(default)]
  pub cut: Option<String>,
  #[serde(default, alias = "imageUrl", alias = "image_url")]
  pub picture: Option<String>,
  #[serde(alias = "price")]
  pub total_price: i64,
}

impl DiamondRecord {
  pub fn snapshot(&self) -> DiamondSnapshot {
    DiamondSnapshot {
      stock_number: self.stock_number.clone(),
      shape: self.shape.clone(),
      weight: self.weight,
      color: self.color.clone(),
      clarity: self.clarity.clone(),
      cut: self.cut.clone(),
      picture: self.picture.clone().filter(|url| !url.trim().is_empty()),
      total_price: self.total_price,
    }
  }
}

#[async_trait]
pub trait DiamondInventory: Send + Sync {
  async fn fetch(&self, stock_number: &str) -> Result<Option<DiamondRecord>, InventoryError>;

  /// Other stones resembling `snapshot`, excluding the stone itself.
  async fn similar(&self, snapshot: &DiamondSnapshot, limit: usize) -> Result<Vec<DiamondRecord>, InventoryError>;
}

pub struct HttpInventory {
  client: Client,
  base_url: Url,
}

impl HttpInventory {
  pub fn new(base_url: &str) -> Result<Self, InventoryError> {
    let base_url = Url::parse(base_url).map_err(|err| InventoryError::InvalidUrl(err.to_string()))?;
    if base_url.cannot_be_a_base() {
      return Err(InventoryError::InvalidUrl(base_url.to_string()));
    }
    Ok(Self {
      client: Client::new(),
      base_url,
    })
  }

  fn diamonds_url(&self, stock_number: Option<&str>) -> Result<Url, InventoryError> {
    let mut url = self.base_url.clone();
    {
      let mut segments = url
        .path_segments_mut()
        .map_err(|_| InventoryError::InvalidUrl(self.base_url.to_string()))?;
      segments.pop_if_empty().extend(["api", "v1", "diamonds"]);
      if let Some(stock_number) = stock_number {
        segments.push(stock_number);
      }
    }
    Ok(url)
  }
}

#[async_trait]
impl DiamondInventory for HttpInventory {
  #[instrument(skip(self))]
  async fn fetch(&self, stock_number: &str) -> Result<Option<DiamondRecord>, InventoryError> {
    let response = self.client.get(self.diamonds_url(Some(stock_number))?).send().await?;
    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    let record = response.error_for_status()?.json::<DiamondRecord>().await?;
    Ok(Some(record))
  }

  #[instrument(skip(self, snapshot), fields(stock_number = %snapshot.stock_number))]
  async fn similar(&self, snapshot: &DiamondSnapshot, limit: usize) -> Result<Vec<DiamondRecord>, InventoryError> {
    let limit = limit.to_string();
    let records = self
      .client
      .get(self.diamonds_url(None)?)
      .query(&[
        ("shape", snapshot.shape.as_str()),
        ("color", snapshot.color.as_str()),
        ("limit", limit.as_str()),
      ])
      .send()
      .await?
      .error_for_status()?
      .json::<Vec<DiamondRecord>>()
      .await?;
    Ok(
      records
        .into_iter()
        .filter(|record| record.stock_number != snapshot.stock_number)
        .collect(),
    )
  }
}
