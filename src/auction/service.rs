use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::bid_war::BidWarMonitor;
use crate::auction::bid_war::BidWarOutcome;
use crate::auction::broadcast::AggregateDispatchError;
use crate::auction::broadcast::AuctionAnnouncement;
use crate::auction::broadcast::BroadcastReport;
use crate::auction::broadcast::Messenger;
use crate::auction::broadcast::broadcast_auction;
use crate::auction::creation;
use crate::auction::creation::CreateAuctionRequest;
use crate::auction::creation::ValidationError;
use crate::auction::notifier::Notifier;
use crate::auction::store::AuctionStore;
use crate::auction::store::StoreError;
use crate::inventory::DiamondInventory;
use crate::inventory::DiamondRecord;
use crate::inventory::InventoryError;
use crate::models::AuctionRow;
use crate::models::AuctionStatus;
use crate::models::BidRow;
use crate::models::DiamondSnapshot;
use crate::models::NewBid;
use crate::util::format_amount;

const SIMILAR_DIAMONDS_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum AuctionError {
  #[error(transparent)]
  Validation(#[from] ValidationError),
  #[error("failed to store auction: {0}")]
  Persistence(#[from] StoreError),
}

/// A committed auction and the separate outcome of announcing it.
#[derive(Debug)]
pub struct CreatedAuction {
  pub auction: AuctionRow,
  pub broadcast: Result<BroadcastReport, AggregateDispatchError>,
}

#[derive(Debug, Error)]
pub enum BidError {
  #[error(transparent)]
  Storage(#[from] StoreError),
  #[error("auction not found")]
  NotFound,
  #[error("auction is closed")]
  Closed,
  #[error("sellers cannot bid on their own auction")]
  OwnAuction,
  #[error("another bid landed first")]
  PriceMoved,
  #[error("bid amount out of range")]
  OutOfRange,
}

#[derive(Debug)]
pub struct BidReceipt {
  pub bid: BidRow,
  pub currency: String,
  pub bid_war: BidWarOutcome,
}

#[derive(Debug, Error)]
pub enum SettleError {
  #[error(transparent)]
  Storage(#[from] StoreError),
  #[error("auction not found")]
  NotFound,
  #[error("auction already ended")]
  AlreadyEnded,
}

#[derive(Debug)]
pub struct Settlement {
  pub auction: AuctionRow,
  pub winner: Option<BidRow>,
  pub consoled: usize,
}

#[derive(Clone)]
pub struct AuctionService {
  store: Arc<dyn AuctionStore>,
  messenger: Arc<dyn Messenger>,
  inventory: Arc<dyn DiamondInventory>,
  group_ids: Vec<i64>,
}

impl AuctionService {
  pub fn new(
    store: Arc<dyn AuctionStore>,
    messenger: Arc<dyn Messenger>,
    inventory: Arc<dyn DiamondInventory>,
    group_ids: Vec<i64>,
  ) -> Self {
    Self {
      store,
      messenger,
      inventory,
      group_ids,
    }
  }

  pub fn group_ids(&self) -> &[i64] {
    &self.group_ids
  }

  pub async fn snapshot_for(&self, stock_number: &str) -> Result<Option<DiamondSnapshot>, InventoryError> {
    Ok(self.inventory.fetch(stock_number).await?.map(|record| record.snapshot()))
  }

  pub async fn create_auction(&self, request: &CreateAuctionRequest) -> Result<CreatedAuction, AuctionError> {
    self.create_auction_with_groups(request, &self.group_ids).await
  }

  /// Commits the auction first; the announcement runs afterwards and its outcome
  /// never undoes the commit.
  #[instrument(skip(self, request), fields(stock_number = %request.stock_number))]
  pub async fn create_auction_with_groups(
    &self,
    request: &CreateAuctionRequest,
    groups: &[i64],
  ) -> Result<CreatedAuction, AuctionError> {
    let new_auction = creation::prepare(request, Utc::now())?;
    let auction = self.store.insert_auction(&new_auction).await?;
    info!(
      auction_id = auction.id,
      seller_id = auction.seller_telegram_id,
      ends_at = %auction.ends_at,
      "auction created"
    );

    let announcement = AuctionAnnouncement::for_auction(&auction);
    let broadcast = broadcast_auction(
      self.store.as_ref(),
      self.messenger.as_ref(),
      &announcement,
      auction.seller_telegram_id,
      groups,
    )
    .await;

    Ok(CreatedAuction { auction, broadcast })
  }

  /// Bids `steps` increments over the current price, then lets the bid-war
  /// monitor look at the auction.
  #[instrument(skip(self))]
  pub async fn place_bid(
    &self,
    auction_id: i64,
    bidder_telegram_id: i64,
    bidder_name: &str,
    steps: u32,
  ) -> Result<BidReceipt, BidError> {
    let auction = self.store.get_auction(auction_id).await?.ok_or(BidError::NotFound)?;
    if !auction.is_open_at(Utc::now()) {
      return Err(BidError::Closed);
    }
    if auction.seller_telegram_id == bidder_telegram_id {
      return Err(BidError::OwnAuction);
    }
    let amount = auction.next_bid(steps).ok_or(BidError::OutOfRange)?;

    let bid = self
      .store
      .insert_bid(&NewBid {
        auction_id,
        bidder_telegram_id,
        bidder_name: bidder_name.to_string(),
        amount,
        expected_price: auction.current_price,
      })
      .await?;
    let Some(bid) = bid else {
      return Err(self.rejected_bid_reason(auction_id).await);
    };
    info!(auction_id, bidder_telegram_id, amount, "bid accepted");

    let bid_war = BidWarMonitor::new(self.store.as_ref())
      .check(auction_id, bidder_telegram_id)
      .await;
    if bid_war.extended() {
      info!(auction_id, "bid placed during bid war");
    }

    Ok(BidReceipt {
      bid,
      currency: auction.currency,
      bid_war,
    })
  }

  /// Ends an active auction, announces the winner and consoles the other bidders.
  #[instrument(skip(self))]
  pub async fn settle_auction(&self, auction_id: i64) -> Result<Settlement, SettleError> {
    let mut auction = self.store.get_auction(auction_id).await?.ok_or(SettleError::NotFound)?;
    if auction.status == AuctionStatus::Ended {
      return Err(SettleError::AlreadyEnded);
    }
    // A failed bid read must leave the auction active.
    let bids = self.store.top_bids_by_bidder(auction_id).await?;
    if !self.store.mark_auction_ended(auction_id).await? {
      return Err(SettleError::AlreadyEnded);
    }
    auction.status = AuctionStatus::Ended;
    let notifier = Notifier::new(self.store.as_ref());

    let Some((winner, losers)) = bids.split_first() else {
      info!(auction_id, "auction ended without bids");
      let text = format!(
        "🏁 Auction #{} ({}) ended with no bids.",
        auction.id,
        auction.snapshot.describe()
      );
      self.deliver(auction.seller_telegram_id, &text).await;
      return Ok(Settlement {
        auction,
        winner: None,
        consoled: 0,
      });
    };

    notifier
      .announce_winner(
        &auction,
        &winner.bidder_name,
        winner.amount,
        &auction.stock_number,
        auction.snapshot.picture.as_deref(),
      )
      .await;
    self
      .deliver(winner.bidder_telegram_id, &render_winner_text(&auction, winner))
      .await;
    self
      .deliver(auction.seller_telegram_id, &render_seller_text(&auction, winner))
      .await;

    let similar = if losers.is_empty() {
      Vec::new()
    } else {
      match self.inventory.similar(&auction.snapshot, SIMILAR_DIAMONDS_LIMIT).await {
        Ok(records) => records,
        Err(err) => {
          warn!(error = %err, auction_id, "failed to look up similar diamonds");
          Vec::new()
        },
      }
    };

    let mut consoled = 0;
    for loser in losers {
      if notifier
        .send_loser_consolation(loser.bidder_telegram_id, auction_id, &similar)
        .await
      {
        consoled += 1;
      }
      self
        .deliver(loser.bidder_telegram_id, &render_consolation_text(&auction, loser, &similar))
        .await;
    }

    info!(auction_id, winner_id = winner.bidder_telegram_id, consoled, "auction settled");
    Ok(Settlement {
      auction,
      winner: Some(winner.clone()),
      consoled,
    })
  }

  /// Tells a closed auction apart from a lost price race after a guarded write missed.
  async fn rejected_bid_reason(&self, auction_id: i64) -> BidError {
    match self.store.get_auction(auction_id).await {
      Ok(Some(auction)) if auction.is_open_at(Utc::now()) => BidError::PriceMoved,
      Ok(Some(_)) => BidError::Closed,
      Ok(None) => BidError::NotFound,
      Err(err) => BidError::Storage(err),
    }
  }

  async fn deliver(&self, chat_id: i64, text: &str) {
    if let Err(err) = self.messenger.send_text(chat_id, text).await {
      warn!(error = %err, chat_id, "failed to deliver auction notice");
    }
  }
}

fn render_winner_text(auction: &AuctionRow, winner: &BidRow) -> String {
  format!(
    "🏆 You won auction #{} for {} with a bid of {}!",
    auction.id,
    auction.snapshot.describe(),
    format_amount(winner.amount, &auction.currency),
  )
}

fn render_seller_text(auction: &AuctionRow, winner: &BidRow) -> String {
  format!(
    "🏁 Auction #{} ({}) sold to {} for {}.",
    auction.id,
    auction.stock_number,
    winner.bidder_name,
    format_amount(winner.amount, &auction.currency),
  )
}

fn render_consolation_text(auction: &AuctionRow, loser: &BidRow, similar: &[DiamondRecord]) -> String {
  let mut text = format!(
    "🏁 Auction #{} for {} has ended. Your best bid was {}, thanks for taking part!",
    auction.id,
    auction.snapshot.describe(),
    format_amount(loser.amount, &auction.currency),
  );
  if !similar.is_empty() {
    text.push_str("\n\n💎 You might like:");
    for record in similar {
      text.push_str(&format!(
        "\n• {} ({}) {}",
        record.snapshot().describe(),
        record.stock_number,
        format_amount(record.total_price, &auction.currency),
      ));
    }
  }
  text
}
