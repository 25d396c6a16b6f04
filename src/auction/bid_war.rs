use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::store::AuctionStore;
use crate::auction::store::StoreError;
use crate::models::AnalyticsEventKind;
use crate::models::NewAnalyticsEvent;

pub const BID_WAR_WINDOW_MINUTES: i64 = 5;
pub const BID_WAR_THRESHOLD: i64 = 3;
pub const BID_WAR_EXTENSION_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionReason {
  BidWarMode,
}

impl ExtensionReason {
  pub fn code(self) -> &'static str {
    match self {
      Self::BidWarMode => "bid_war_mode",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BidWarOutcome {
  NotExtended,
  Extended {
    new_ends_at: DateTime<Utc>,
    recent_bids: i64,
    reason: ExtensionReason,
  },
}

impl BidWarOutcome {
  pub fn extended(&self) -> bool {
    matches!(self, Self::Extended { .. })
  }
}

/// Pushes an auction's deadline back while it is being bid on rapidly.
///
/// Each call re-evaluates the trailing window on its own, so calls made while the
/// window still holds enough bids keep extending the auction.
pub struct BidWarMonitor<'a> {
  store: &'a dyn AuctionStore,
}

impl<'a> BidWarMonitor<'a> {
  pub fn new(store: &'a dyn AuctionStore) -> Self {
    Self { store }
  }

  pub async fn check(&self, auction_id: i64, actor_telegram_id: i64) -> BidWarOutcome {
    self.check_at(auction_id, actor_telegram_id, Utc::now()).await
  }

  #[instrument(skip(self))]
  pub async fn check_at(&self, auction_id: i64, actor_telegram_id: i64, now: DateTime<Utc>) -> BidWarOutcome {
    match self.evaluate(auction_id, actor_telegram_id, now).await {
      Ok(outcome) => outcome,
      Err(err) => {
        warn!(error = %err, auction_id, "bid war check failed, leaving deadline unchanged");
        BidWarOutcome::NotExtended
      },
    }
  }

  async fn evaluate(
    &self,
    auction_id: i64,
    actor_telegram_id: i64,
    now: DateTime<Utc>,
  ) -> Result<BidWarOutcome, StoreError> {
    let since = now - Duration::minutes(BID_WAR_WINDOW_MINUTES);
    let recent_bids = self.store.count_bids_since(auction_id, since).await?;
    if recent_bids < BID_WAR_THRESHOLD {
      return Ok(BidWarOutcome::NotExtended);
    }

    let Some(new_ends_at) = self
      .store
      .extend_auction_end(auction_id, Duration::minutes(BID_WAR_EXTENSION_MINUTES))
      .await?
    else {
      warn!(auction_id, "bid war detected for missing auction");
      return Ok(BidWarOutcome::NotExtended);
    };

    let reason = ExtensionReason::BidWarMode;
    info!(auction_id, recent_bids, %new_ends_at, "bid war extended auction");

    let event = NewAnalyticsEvent {
      auction_id,
      telegram_id: actor_telegram_id,
      kind: AnalyticsEventKind::BidWarActivated,
      data: json!({
        "bid_count": recent_bids,
        "new_ends_at": new_ends_at,
        "extension_minutes": BID_WAR_EXTENSION_MINUTES,
        "reason": reason.code(),
      }),
    };
    if let Err(err) = self.store.record_event(&event).await {
      warn!(error = %err, auction_id, "failed to record bid war activation");
    }

    Ok(BidWarOutcome::Extended {
      new_ends_at,
      recent_bids,
      reason,
    })
  }
}
