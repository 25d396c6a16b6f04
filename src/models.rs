use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

/// Point-in-time copy of the inventory record an auction is selling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiamondSnapshot {
  pub stock_number: String,
  pub shape: String,
  pub weight: f64,
  pub color: String,
  pub clarity: String,
  pub cut: Option<String>,
  pub picture: Option<String>,
  pub total_price: i64,
}

impl DiamondSnapshot {
  pub fn describe(&self) -> String {
    let mut text = format!("{:.2}ct {} {} {}", self.weight, self.shape, self.color, self.clarity);
    if let Some(cut) = self.cut.as_deref().filter(|cut| !cut.is_empty()) {
      text.push(' ');
      text.push_str(cut);
    }
    text
  }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
  Active,
  Ended,
}

impl AuctionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Ended => "ended",
    }
  }

  pub fn from_db(value: &str) -> Option<Self> {
    match value {
      "active" => Some(Self::Active),
      "ended" => Some(Self::Ended),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionRow {
  pub id: i64,
  pub stock_number: String,
  pub starting_price: i64,
  pub current_price: i64,
  pub min_increment: i64,
  pub currency: String,
  pub status: AuctionStatus,
  pub ends_at: DateTime<Utc>,
  pub snapshot: DiamondSnapshot,
  pub seller_telegram_id: i64,
  pub created_at: DateTime<Utc>,
}

impl AuctionRow {
  pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
    self.status == AuctionStatus::Active && self.ends_at > now
  }

  /// Amount a bid of `steps` increments over the current price would place.
  pub fn next_bid(&self, steps: u32) -> Option<i64> {
    self
      .min_increment
      .checked_mul(i64::from(steps.max(1)))
      .and_then(|raise| self.current_price.checked_add(raise))
  }
}

/// Auction ready to be inserted; `ends_at` is already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuction {
  pub stock_number: String,
  pub starting_price: i64,
  pub min_increment: i64,
  pub currency: String,
  pub ends_at: DateTime<Utc>,
  pub snapshot: DiamondSnapshot,
  pub seller_telegram_id: i64,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidRow {
  pub id: i64,
  pub auction_id: i64,
  pub bidder_telegram_id: i64,
  pub bidder_name: String,
  pub amount: i64,
  pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBid {
  pub auction_id: i64,
  pub bidder_telegram_id: i64,
  pub bidder_name: String,
  pub amount: i64,
  /// Price the bid was computed against; the write only lands if it still holds.
  pub expected_price: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventKind {
  ViralShare,
  BidWarActivated,
  WinnerAnnounced,
  ConsolationSent,
}

impl AnalyticsEventKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::ViralShare => "viral_share",
      Self::BidWarActivated => "bid_war_activated",
      Self::WinnerAnnounced => "winner_announced",
      Self::ConsolationSent => "consolation_sent",
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewAnalyticsEvent {
  pub auction_id: i64,
  pub telegram_id: i64,
  pub kind: AnalyticsEventKind,
  pub data: serde_json::Value,
}
