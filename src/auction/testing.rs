//! In-memory doubles for the auction seams, shared by the unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

use crate::auction::broadcast::AuctionAnnouncement;
use crate::auction::broadcast::DispatchError;
use crate::auction::broadcast::Messenger;
use crate::auction::broadcast::SentMessage;
use crate::auction::store::AuctionStore;
use crate::auction::store::StoreError;
use crate::inventory::DiamondInventory;
use crate::inventory::DiamondRecord;
use crate::inventory::InventoryError;
use crate::models::AuctionRow;
use crate::models::AuctionStatus;
use crate::models::BidRow;
use crate::models::DiamondSnapshot;
use crate::models::NewAnalyticsEvent;
use crate::models::NewAuction;
use crate::models::NewBid;

pub fn snapshot(stock_number: &str) -> DiamondSnapshot {
  DiamondSnapshot {
    stock_number: stock_number.to_string(),
    shape: "Round".to_string(),
    weight: 1.01,
    color: "F".to_string(),
    clarity: "VS2".to_string(),
    cut: Some("Excellent".to_string()),
    picture: Some(format!("https://img.example.com/{stock_number}.jpg")),
    total_price: 5400,
  }
}

pub fn auction_row(id: i64, stock_number: &str) -> AuctionRow {
  let now = Utc::now();
  AuctionRow {
    id,
    stock_number: stock_number.to_string(),
    starting_price: 1000,
    current_price: 1000,
    min_increment: 50,
    currency: "USD".to_string(),
    status: AuctionStatus::Active,
    ends_at: now + Duration::hours(24),
    snapshot: snapshot(stock_number),
    seller_telegram_id: 42,
    created_at: now,
  }
}

type AuctionChange = Box<dyn FnOnce(&mut AuctionRow) + Send>;

#[derive(Default)]
struct StoreState {
  auctions: Vec<AuctionRow>,
  bids: Vec<BidRow>,
  events: Vec<NewAnalyticsEvent>,
  fail_reads: bool,
  fail_writes: bool,
  fail_next_top_bids: bool,
  before_next_bid: Option<AuctionChange>,
}

fn unavailable() -> StoreError {
  StoreError::Database(sqlx::Error::PoolTimedOut)
}

#[derive(Default)]
pub struct InMemoryStore {
  state: Mutex<StoreState>,
}

impl InMemoryStore {
  pub fn with_auction(auction: AuctionRow) -> Self {
    let store = Self::default();
    store.state.lock().unwrap().auctions.push(auction);
    store
  }

  pub fn fail_reads(&self) {
    self.state.lock().unwrap().fail_reads = true;
  }

  pub fn fail_writes(&self) {
    self.state.lock().unwrap().fail_writes = true;
  }

  pub fn fail_next_top_bids(&self) {
    self.state.lock().unwrap().fail_next_top_bids = true;
  }

  /// Applies `change` to the target auction right before the next bid is written.
  pub fn before_next_bid(&self, change: impl FnOnce(&mut AuctionRow) + Send + 'static) {
    self.state.lock().unwrap().before_next_bid = Some(Box::new(change));
  }

  pub fn auctions(&self) -> Vec<AuctionRow> {
    self.state.lock().unwrap().auctions.clone()
  }

  pub fn auction(&self, auction_id: i64) -> Option<AuctionRow> {
    self.auctions().into_iter().find(|auction| auction.id == auction_id)
  }

  pub fn events(&self) -> Vec<NewAnalyticsEvent> {
    self.state.lock().unwrap().events.clone()
  }

  pub fn bids(&self) -> Vec<BidRow> {
    self.state.lock().unwrap().bids.clone()
  }

  /// Appends a bid with an explicit timestamp, bypassing price checks.
  pub fn seed_bid(&self, auction_id: i64, bidder_telegram_id: i64, amount: i64, created_at: DateTime<Utc>) {
    let mut state = self.state.lock().unwrap();
    let id = state.bids.len() as i64 + 1;
    state.bids.push(BidRow {
      id,
      auction_id,
      bidder_telegram_id,
      bidder_name: format!("bidder-{bidder_telegram_id}"),
      amount,
      created_at,
    });
  }

  fn check_read(state: &StoreState) -> Result<(), StoreError> {
    if state.fail_reads {
      return Err(unavailable());
    }
    Ok(())
  }

  fn check_write(state: &StoreState) -> Result<(), StoreError> {
    if state.fail_writes {
      return Err(unavailable());
    }
    Ok(())
  }
}

#[async_trait]
impl AuctionStore for InMemoryStore {
  async fn insert_auction(&self, auction: &NewAuction) -> Result<AuctionRow, StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_write(&state)?;
    let row = AuctionRow {
      id: state.auctions.len() as i64 + 1,
      stock_number: auction.stock_number.clone(),
      starting_price: auction.starting_price,
      current_price: auction.starting_price,
      min_increment: auction.min_increment,
      currency: auction.currency.clone(),
      status: AuctionStatus::Active,
      ends_at: auction.ends_at,
      snapshot: auction.snapshot.clone(),
      seller_telegram_id: auction.seller_telegram_id,
      created_at: auction.created_at,
    };
    state.auctions.push(row.clone());
    Ok(row)
  }

  async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRow>, StoreError> {
    let state = self.state.lock().unwrap();
    Self::check_read(&state)?;
    Ok(state.auctions.iter().find(|auction| auction.id == auction_id).cloned())
  }

  async fn insert_bid(&self, bid: &NewBid) -> Result<Option<BidRow>, StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_write(&state)?;
    let now = Utc::now();
    let change = state.before_next_bid.take();
    let Some(auction) = state.auctions.iter_mut().find(|auction| auction.id == bid.auction_id) else {
      return Ok(None);
    };
    if let Some(change) = change {
      change(auction);
    }
    if !auction.is_open_at(now) || auction.current_price != bid.expected_price {
      return Ok(None);
    }
    auction.current_price = bid.amount;
    let row = BidRow {
      id: state.bids.len() as i64 + 1,
      auction_id: bid.auction_id,
      bidder_telegram_id: bid.bidder_telegram_id,
      bidder_name: bid.bidder_name.clone(),
      amount: bid.amount,
      created_at: now,
    };
    state.bids.push(row.clone());
    Ok(Some(row))
  }

  async fn count_bids_since(&self, auction_id: i64, since: DateTime<Utc>) -> Result<i64, StoreError> {
    let state = self.state.lock().unwrap();
    Self::check_read(&state)?;
    Ok(
      state
        .bids
        .iter()
        .filter(|bid| bid.auction_id == auction_id && bid.created_at >= since)
        .count() as i64,
    )
  }

  async fn top_bids_by_bidder(&self, auction_id: i64) -> Result<Vec<BidRow>, StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_read(&state)?;
    if std::mem::take(&mut state.fail_next_top_bids) {
      return Err(unavailable());
    }
    let mut best: HashMap<i64, BidRow> = HashMap::new();
    for bid in state.bids.iter().filter(|bid| bid.auction_id == auction_id) {
      match best.get(&bid.bidder_telegram_id) {
        Some(existing) if existing.amount >= bid.amount => {},
        _ => {
          best.insert(bid.bidder_telegram_id, bid.clone());
        },
      }
    }
    let mut rows: Vec<BidRow> = best.into_values().collect();
    rows.sort_by(|a, b| b.amount.cmp(&a.amount).then(a.created_at.cmp(&b.created_at)));
    Ok(rows)
  }

  async fn extend_auction_end(&self, auction_id: i64, by: Duration) -> Result<Option<DateTime<Utc>>, StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_write(&state)?;
    Ok(
      state
        .auctions
        .iter_mut()
        .find(|auction| auction.id == auction_id)
        .map(|auction| {
          auction.ends_at += by;
          auction.ends_at
        }),
    )
  }

  async fn mark_auction_ended(&self, auction_id: i64) -> Result<bool, StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_write(&state)?;
    match state
      .auctions
      .iter_mut()
      .find(|auction| auction.id == auction_id && auction.status == AuctionStatus::Active)
    {
      Some(auction) => {
        auction.status = AuctionStatus::Ended;
        Ok(true)
      },
      None => Ok(false),
    }
  }

  async fn record_event(&self, event: &NewAnalyticsEvent) -> Result<(), StoreError> {
    let mut state = self.state.lock().unwrap();
    Self::check_write(&state)?;
    state.events.push(event.clone());
    Ok(())
  }
}

#[derive(Clone)]
enum Failure {
  Rejected(String),
  Transport,
}

#[derive(Default)]
pub struct FakeMessenger {
  failures: Mutex<HashMap<i64, Failure>>,
  announcements: Mutex<Vec<AuctionAnnouncement>>,
  texts: Mutex<Vec<(i64, String)>>,
}

impl FakeMessenger {
  pub fn reject(&self, chat_id: i64, message: &str) {
    self
      .failures
      .lock()
      .unwrap()
      .insert(chat_id, Failure::Rejected(message.to_string()));
  }

  pub fn fail_transport(&self, chat_id: i64) {
    self.failures.lock().unwrap().insert(chat_id, Failure::Transport);
  }

  pub fn announcements(&self) -> Vec<AuctionAnnouncement> {
    self.announcements.lock().unwrap().clone()
  }

  pub fn texts(&self) -> Vec<(i64, String)> {
    self.texts.lock().unwrap().clone()
  }

  fn outcome(&self, chat_id: i64, sent_so_far: usize) -> Result<SentMessage, DispatchError> {
    match self.failures.lock().unwrap().get(&chat_id).cloned() {
      Some(Failure::Rejected(message)) => Err(DispatchError::Rejected { message, payload: None }),
      Some(Failure::Transport) => Err(DispatchError::Transport("connection reset".to_string())),
      None => Ok(SentMessage {
        chat_id,
        message_id: Some(sent_so_far as i64 + 1),
      }),
    }
  }
}

#[async_trait]
impl Messenger for FakeMessenger {
  async fn send_announcement(&self, announcement: &AuctionAnnouncement) -> Result<SentMessage, DispatchError> {
    let sent_so_far = {
      let mut sent = self.announcements.lock().unwrap();
      sent.push(announcement.clone());
      sent.len()
    };
    self.outcome(announcement.chat_id, sent_so_far)
  }

  async fn send_text(&self, chat_id: i64, text: &str) -> Result<SentMessage, DispatchError> {
    let sent_so_far = {
      let mut sent = self.texts.lock().unwrap();
      sent.push((chat_id, text.to_string()));
      sent.len()
    };
    self.outcome(chat_id, sent_so_far)
  }
}

#[derive(Default)]
pub struct FakeInventory {
  pub records: Vec<DiamondRecord>,
}

#[async_trait]
impl DiamondInventory for FakeInventory {
  async fn fetch(&self, stock_number: &str) -> Result<Option<DiamondRecord>, InventoryError> {
    Ok(self.records.iter().find(|record| record.stock_number == stock_number).cloned())
  }

  async fn similar(&self, snapshot: &DiamondSnapshot, limit: usize) -> Result<Vec<DiamondRecord>, InventoryError> {
    Ok(
      self
        .records
        .iter()
        .filter(|record| record.stock_number != snapshot.stock_number && record.shape == snapshot.shape)
        .take(limit)
        .cloned()
        .collect(),
    )
  }
}
