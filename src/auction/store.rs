use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use thiserror::Error;

use crate::models::AuctionRow;
use crate::models::BidRow;
use crate::models::NewAnalyticsEvent;
use crate::models::NewAuction;
use crate::models::NewBid;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error(transparent)]
  Database(#[from] sqlx::Error),
  #[error("failed to encode stored value: {0}")]
  Encoding(#[from] serde_json::Error),
  #[error("unexpected auction status {0:?}")]
  UnknownStatus(String),
}

/// Persistence for `auctions`, `auction_bids` and `auction_analytics`.
#[async_trait]
pub trait AuctionStore: Send + Sync {
  async fn insert_auction(&self, auction: &NewAuction) -> Result<AuctionRow, StoreError>;

  async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRow>, StoreError>;

  /// Raises `current_price` and appends the bid in one step. Returns `None` when
  /// the auction is no longer active or its price moved away from `expected_price`.
  async fn insert_bid(&self, bid: &NewBid) -> Result<Option<BidRow>, StoreError>;

  async fn count_bids_since(&self, auction_id: i64, since: DateTime<Utc>) -> Result<i64, StoreError>;

  /// Highest bid per bidder, best first.
  async fn top_bids_by_bidder(&self, auction_id: i64) -> Result<Vec<BidRow>, StoreError>;

  /// Pushes `ends_at` forward by `by` as a single write and returns the new value,
  /// or `None` when the auction does not exist.
  async fn extend_auction_end(&self, auction_id: i64, by: Duration) -> Result<Option<DateTime<Utc>>, StoreError>;

  /// Flips an active auction to ended. Returns `false` if it was not active.
  async fn mark_auction_ended(&self, auction_id: i64) -> Result<bool, StoreError>;

  async fn record_event(&self, event: &NewAnalyticsEvent) -> Result<(), StoreError>;
}
