use serde_json::json;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::store::AuctionStore;
use crate::inventory::DiamondRecord;
use crate::models::AnalyticsEventKind;
use crate::models::AuctionRow;
use crate::models::NewAnalyticsEvent;

/// Records terminal auction events. Failures are logged and reported as `false`.
pub struct Notifier<'a> {
  store: &'a dyn AuctionStore,
}

impl<'a> Notifier<'a> {
  pub fn new(store: &'a dyn AuctionStore) -> Self {
    Self { store }
  }

  #[instrument(skip(self, auction), fields(auction_id = auction.id))]
  pub async fn announce_winner(
    &self,
    auction: &AuctionRow,
    winner_name: &str,
    final_price: i64,
    stock_number: &str,
    image_url: Option<&str>,
  ) -> bool {
    let event = NewAnalyticsEvent {
      auction_id: auction.id,
      telegram_id: auction.seller_telegram_id,
      kind: AnalyticsEventKind::WinnerAnnounced,
      data: json!({
        "winner_name": winner_name,
        "final_price": final_price,
        "currency": auction.currency,
        "stock_number": stock_number,
        "image_url": image_url,
      }),
    };
    match self.store.record_event(&event).await {
      Ok(()) => {
        info!(auction_id = auction.id, winner_name, final_price, "winner announced");
        true
      },
      Err(err) => {
        warn!(error = %err, auction_id = auction.id, "failed to record winner announcement");
        false
      },
    }
  }

  #[instrument(skip(self, similar_diamonds))]
  pub async fn send_loser_consolation(
    &self,
    loser_telegram_id: i64,
    auction_id: i64,
    similar_diamonds: &[DiamondRecord],
  ) -> bool {
    let event = NewAnalyticsEvent {
      auction_id,
      telegram_id: loser_telegram_id,
      kind: AnalyticsEventKind::ConsolationSent,
      data: json!({
        "similar_count": similar_diamonds.len(),
        "stock_numbers": similar_diamonds.iter().map(|d| d.stock_number.as_str()).collect::<Vec<_>>(),
      }),
    };
    match self.store.record_event(&event).await {
      Ok(()) => true,
      Err(err) => {
        warn!(error = %err, auction_id, loser_telegram_id, "failed to record consolation");
        false
      },
    }
  }
}
