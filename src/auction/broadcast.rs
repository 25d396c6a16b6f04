use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::store::AuctionStore;
use crate::models::AnalyticsEventKind;
use crate::models::AuctionRow;
use crate::models::NewAnalyticsEvent;

/// Payload announcing one auction in one chat.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuctionAnnouncement {
  pub chat_id: i64,
  pub auction_id: i64,
  pub stock_number: String,
  pub diamond_description: String,
  pub current_price: i64,
  pub min_increment: i64,
  pub currency: String,
  pub ends_at: DateTime<Utc>,
  pub image_url: Option<String>,
}

impl AuctionAnnouncement {
  pub fn for_auction(auction: &AuctionRow) -> Self {
    Self {
      chat_id: 0,
      auction_id: auction.id,
      stock_number: auction.stock_number.clone(),
      diamond_description: auction.snapshot.describe(),
      current_price: auction.current_price,
      min_increment: auction.min_increment,
      currency: auction.currency.clone(),
      ends_at: auction.ends_at,
      image_url: auction.snapshot.picture.clone(),
    }
  }

  pub fn to_chat(&self, chat_id: i64) -> Self {
    Self {
      chat_id,
      ..self.clone()
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
  pub chat_id: i64,
  pub message_id: Option<i64>,
}

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
  /// The messaging backend answered and refused the message.
  #[error("{message}")]
  Rejected {
    message: String,
    payload: Option<serde_json::Value>,
  },
  #[error("messaging endpoint returned HTTP {status}: {body}")]
  Http { status: u16, body: String },
  #[error("transport error: {0}")]
  Transport(String),
}

impl DispatchError {
  /// Error text reported by the backend itself, if it gave one.
  pub fn specific_message(&self) -> Option<&str> {
    match self {
      Self::Rejected { message, .. } if !message.trim().is_empty() => Some(message),
      _ => None,
    }
  }

  /// Raw response body from the backend, kept for operator follow-up.
  pub fn payload(&self) -> Option<&serde_json::Value> {
    match self {
      Self::Rejected { payload, .. } => payload.as_ref(),
      _ => None,
    }
  }
}

#[async_trait]
pub trait Messenger: Send + Sync {
  async fn send_announcement(&self, announcement: &AuctionAnnouncement) -> Result<SentMessage, DispatchError>;

  async fn send_text(&self, chat_id: i64, text: &str) -> Result<SentMessage, DispatchError>;
}

#[derive(Debug, Clone)]
pub struct DispatchFailure {
  pub chat_id: i64,
  pub auction_id: i64,
  pub failed_at: DateTime<Utc>,
  pub error: DispatchError,
}

#[derive(Debug, Clone)]
pub struct BroadcastReport {
  pub attempted: usize,
  pub delivered: Vec<SentMessage>,
  pub failures: Vec<DispatchFailure>,
}

impl BroadcastReport {
  pub fn success_count(&self) -> usize {
    self.delivered.len()
  }

  pub fn is_partial(&self) -> bool {
    !self.failures.is_empty()
  }

  pub fn last_failure(&self) -> Option<&DispatchFailure> {
    self.failures.last()
  }
}

/// No target group accepted the announcement.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct AggregateDispatchError {
  pub attempted: usize,
  pub message: String,
  pub failures: Vec<DispatchFailure>,
}

impl AggregateDispatchError {
  fn from_failures(failures: Vec<DispatchFailure>) -> Self {
    let attempted = failures.len();
    let message = failures
      .iter()
      .rev()
      .find_map(|failure| failure.error.specific_message())
      .map(str::to_string)
      .unwrap_or_else(|| format!("failed to deliver auction to any of {attempted} groups"));
    Self {
      attempted,
      message,
      failures,
    }
  }

  pub fn last_failure(&self) -> Option<&DispatchFailure> {
    self.failures.last()
  }
}

/// Sends `announcement` to every group at once and waits for all sends to settle.
/// Succeeds when at least one group accepted it.
#[instrument(skip(store, messenger, announcement), fields(auction_id = announcement.auction_id))]
pub async fn broadcast_auction(
  store: &dyn AuctionStore,
  messenger: &dyn Messenger,
  announcement: &AuctionAnnouncement,
  actor_telegram_id: i64,
  groups: &[i64],
) -> Result<BroadcastReport, AggregateDispatchError> {
  let auction_id = announcement.auction_id;
  if groups.is_empty() {
    info!(auction_id, "no broadcast groups configured");
    return Ok(BroadcastReport {
      attempted: 0,
      delivered: Vec::new(),
      failures: Vec::new(),
    });
  }

  let sends = groups.iter().map(|chat_id| {
    let message = announcement.to_chat(*chat_id);
    async move {
      let result = messenger
        .send_announcement(&message)
        .await
        .map_err(|error| (Utc::now(), error));
      (message.chat_id, result)
    }
  });
  let results = join_all(sends).await;

  let mut delivered = Vec::new();
  let mut failures = Vec::new();
  for (chat_id, result) in results {
    match result {
      Ok(sent) => {
        debug!(auction_id, chat_id, message_id = ?sent.message_id, "auction announced in group");
        delivered.push(sent);
      },
      Err((failed_at, error)) => {
        warn!(
          error = %error,
          payload = ?error.payload(),
          auction_id,
          chat_id,
          "failed to announce auction in group"
        );
        failures.push(DispatchFailure {
          chat_id,
          auction_id,
          failed_at,
          error,
        });
      },
    }
  }

  if delivered.is_empty() {
    let err = AggregateDispatchError::from_failures(failures);
    warn!(auction_id, attempted = err.attempted, error = %err, "auction broadcast reached no groups");
    return Err(err);
  }

  let event = NewAnalyticsEvent {
    auction_id,
    telegram_id: actor_telegram_id,
    kind: AnalyticsEventKind::ViralShare,
    data: json!({
      "groups_count": delivered.len(),
      "total_attempted": groups.len(),
      "failed_groups": failures.iter().map(|failure| failure.chat_id).collect::<Vec<_>>(),
    }),
  };
  if let Err(err) = store.record_event(&event).await {
    warn!(error = %err, auction_id, "failed to record viral share");
  }

  info!(
    auction_id,
    delivered = delivered.len(),
    attempted = groups.len(),
    "auction broadcast finished"
  );
  Ok(BroadcastReport {
    attempted: groups.len(),
    delivered,
    failures,
  })
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use async_trait::async_trait;
  use chrono::Utc;
  use serde_json::json;
  use tokio::sync::Barrier;

  use super::AuctionAnnouncement;
  use super::DispatchError;
  use super::Messenger;
  use super::SentMessage;
  use super::broadcast_auction;
  use crate::auction::testing::FakeMessenger;
  use crate::auction::testing::InMemoryStore;
  use crate::auction::testing::auction_row;
  use crate::models::AnalyticsEventKind;

  fn announcement() -> AuctionAnnouncement {
    AuctionAnnouncement::for_auction(&auction_row(7, "ABC123"))
  }

  #[tokio::test]
  async fn empty_group_list_is_a_quiet_success() {
    let store = InMemoryStore::default();
    let messenger = FakeMessenger::default();

    let report = broadcast_auction(&store, &messenger, &announcement(), 42, &[])
      .await
      .expect("empty broadcast succeeds");

    assert_eq!(report.attempted, 0);
    assert_eq!(report.success_count(), 0);
    assert!(messenger.announcements().is_empty());
    assert!(store.events().is_empty());
  }

  #[tokio::test]
  async fn partial_delivery_counts_accepted_groups() {
    let store = InMemoryStore::default();
    let messenger = FakeMessenger::default();
    messenger.reject(-300, "chat not found");

    let report = broadcast_auction(&store, &messenger, &announcement(), 42, &[-100, -200, -300])
      .await
      .expect("partial broadcast succeeds");

    assert_eq!(report.attempted, 3);
    assert_eq!(report.success_count(), 2);
    assert!(report.is_partial());
    let failure = report.last_failure().expect("one failure");
    assert_eq!(failure.chat_id, -300);
    assert_eq!(failure.auction_id, 7);

    let events = store.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AnalyticsEventKind::ViralShare);
    assert_eq!(events[0].telegram_id, 42);
    assert_eq!(events[0].data["groups_count"], 2);
    assert_eq!(events[0].data["total_attempted"], 3);
  }

  #[tokio::test]
  async fn sends_one_message_per_group_in_order() {
    let store = InMemoryStore::default();
    let messenger = FakeMessenger::default();

    broadcast_auction(&store, &messenger, &announcement(), 42, &[-1, -2, -3])
      .await
      .expect("broadcast succeeds");

    let chats: Vec<i64> = messenger.announcements().iter().map(|a| a.chat_id).collect();
    assert_eq!(chats, vec![-1, -2, -3]);
  }

  #[tokio::test]
  async fn total_failure_surfaces_backend_message() {
    let store = InMemoryStore::default();
    let messenger = FakeMessenger::default();
    messenger.fail_transport(-100);
    messenger.reject(-200, "bot was kicked from the group chat");

    let err = broadcast_auction(&store, &messenger, &announcement(), 42, &[-100, -200])
      .await
      .unwrap_err();

    assert_eq!(err.attempted, 2);
    assert_eq!(err.message, "bot was kicked from the group chat");
    assert_eq!(err.last_failure().map(|f| f.chat_id), Some(-200));
    assert!(store.events().is_empty());
  }

  #[tokio::test]
  async fn total_failure_without_backend_message_uses_count() {
    let store = InMemoryStore::default();
    let messenger = FakeMessenger::default();
    messenger.fail_transport(-100);
    messenger.fail_transport(-200);

    let err = broadcast_auction(&store, &messenger, &announcement(), 42, &[-100, -200])
      .await
      .unwrap_err();

    assert_eq!(err.to_string(), "failed to deliver auction to any of 2 groups");
  }

  #[tokio::test]
  async fn analytics_failure_does_not_fail_broadcast() {
    let store = InMemoryStore::default();
    store.fail_writes();
    let messenger = FakeMessenger::default();

    let report = broadcast_auction(&store, &messenger, &announcement(), 42, &[-100])
      .await
      .expect("broadcast still succeeds");
    assert_eq!(report.success_count(), 1);
  }

  #[test]
  fn only_rejections_carry_a_specific_message() {
    let rejected = DispatchError::Rejected {
      message: "Forbidden".to_string(),
      payload: None,
    };
    assert_eq!(rejected.specific_message(), Some("Forbidden"));
    let http = DispatchError::Http {
      status: 500,
      body: "oops".to_string(),
    };
    assert_eq!(http.specific_message(), None);
  }

  /// Holds every send until `groups` of them are in flight together.
  struct RendezvousMessenger {
    barrier: Barrier,
  }

  #[async_trait]
  impl Messenger for RendezvousMessenger {
    async fn send_announcement(&self, announcement: &AuctionAnnouncement) -> Result<SentMessage, DispatchError> {
      self.barrier.wait().await;
      match announcement.chat_id {
        -300 => return Err(DispatchError::Transport("connection reset".to_string())),
        -100 => tokio::time::sleep(Duration::from_millis(300)).await,
        _ => {},
      }
      Ok(SentMessage {
        chat_id: announcement.chat_id,
        message_id: None,
      })
    }

    async fn send_text(&self, chat_id: i64, _text: &str) -> Result<SentMessage, DispatchError> {
      Ok(SentMessage { chat_id, message_id: None })
    }
  }

  #[tokio::test]
  async fn sends_to_all_groups_at_once() {
    let store = InMemoryStore::default();
    let groups = [-100, -200, -300];
    let messenger = RendezvousMessenger {
      barrier: Barrier::new(groups.len()),
    };

    let report = tokio::time::timeout(
      Duration::from_secs(5),
      broadcast_auction(&store, &messenger, &announcement(), 42, &groups),
    )
    .await
    .expect("sends must be in flight together")
    .expect("broadcast succeeds");

    assert_eq!(report.success_count(), 2);
    assert_eq!(report.last_failure().map(|f| f.chat_id), Some(-300));
  }

  #[tokio::test]
  async fn failure_time_is_taken_when_the_send_fails() {
    let store = InMemoryStore::default();
    let groups = [-100, -300];
    let messenger = RendezvousMessenger {
      barrier: Barrier::new(groups.len()),
    };
    let started = Utc::now();

    let report = broadcast_auction(&store, &messenger, &announcement(), 42, &groups)
      .await
      .expect("broadcast succeeds");

    let finished = Utc::now();
    let failure = report.last_failure().expect("one failure");
    assert!(failure.failed_at >= started);
    assert!(finished - failure.failed_at >= chrono::Duration::milliseconds(200));
  }

  #[test]
  fn rejection_keeps_backend_payload() {
    let body = json!({"success": false, "error": "Forbidden"});
    let rejected = DispatchError::Rejected {
      message: "Forbidden".to_string(),
      payload: Some(body.clone()),
    };
    assert_eq!(rejected.payload(), Some(&body));
    assert_eq!(DispatchError::Transport("reset".to_string()).payload(), None);
  }
}
