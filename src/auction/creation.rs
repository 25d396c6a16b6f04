use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use thiserror::Error;

use crate::models::DiamondSnapshot;
use crate::models::NewAuction;

pub const DEFAULT_MIN_INCREMENT: i64 = 50;
pub const DEFAULT_DURATION_HOURS: i64 = 24;
pub const MIN_DURATION_HOURS: i64 = 1;
pub const MAX_DURATION_HOURS: i64 = 168;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("invalid starting price")]
  InvalidStartingPrice,
  #[error("unable to identify user")]
  MissingSeller,
  #[error("stock number is required")]
  EmptyStockNumber,
  #[error("minimum increment must be at least 1")]
  InvalidIncrement,
  #[error("duration must be between 1 and 168 hours")]
  InvalidDuration,
}

#[derive(Debug, Clone)]
pub struct CreateAuctionRequest {
  pub stock_number: String,
  pub starting_price: i64,
  pub min_increment: i64,
  pub duration_hours: i64,
  pub currency: String,
  pub seller_telegram_id: Option<i64>,
  pub snapshot: DiamondSnapshot,
}

impl CreateAuctionRequest {
  pub fn new(snapshot: DiamondSnapshot, starting_price: i64, currency: impl Into<String>) -> Self {
    Self {
      stock_number: snapshot.stock_number.clone(),
      starting_price,
      min_increment: DEFAULT_MIN_INCREMENT,
      duration_hours: DEFAULT_DURATION_HOURS,
      currency: currency.into(),
      seller_telegram_id: None,
      snapshot,
    }
  }
}

pub fn validate(request: &CreateAuctionRequest) -> Result<i64, ValidationError> {
  if request.starting_price <= 0 {
    return Err(ValidationError::InvalidStartingPrice);
  }
  let seller = request.seller_telegram_id.ok_or(ValidationError::MissingSeller)?;
  if request.stock_number.trim().is_empty() {
    return Err(ValidationError::EmptyStockNumber);
  }
  if request.min_increment < 1 {
    return Err(ValidationError::InvalidIncrement);
  }
  if !(MIN_DURATION_HOURS ..= MAX_DURATION_HOURS).contains(&request.duration_hours) {
    return Err(ValidationError::InvalidDuration);
  }
  Ok(seller)
}

/// Validates the request and resolves it into an insertable row anchored at `now`.
pub fn prepare(request: &CreateAuctionRequest, now: DateTime<Utc>) -> Result<NewAuction, ValidationError> {
  let seller_telegram_id = validate(request)?;
  Ok(NewAuction {
    stock_number: request.stock_number.trim().to_string(),
    starting_price: request.starting_price,
    min_increment: request.min_increment,
    currency: request.currency.clone(),
    ends_at: now + Duration::hours(request.duration_hours),
    snapshot: request.snapshot.clone(),
    seller_telegram_id,
    created_at: now,
  })
}
