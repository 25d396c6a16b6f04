use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;
use sqlx::Pool;
use sqlx::Postgres;
use sqlx::Row;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use tracing::instrument;

use crate::auction::AuctionStore;
use crate::auction::store::StoreError;
use crate::models::AuctionRow;
use crate::models::AuctionStatus;
use crate::models::BidRow;
use crate::models::DiamondSnapshot;
use crate::models::NewAnalyticsEvent;
use crate::models::NewAuction;
use crate::models::NewBid;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const AUCTION_COLUMNS: &str = r#"
  id,
  stock_number,
  starting_price,
  current_price,
  min_increment,
  currency,
  status,
  ends_at,
  diamond_snapshot,
  seller_telegram_id,
  created_at
"#;

const BID_COLUMNS: &str = "id, auction_id, bidder_telegram_id, bidder_name, amount, created_at";

#[derive(Clone)]
pub struct Db {
  pool: Pool<Postgres>,
}

impl Db {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
    MIGRATOR.run(&pool).await?;
    Ok(Self { pool })
  }
}

fn auction_from_row(row: &PgRow) -> Result<AuctionRow, StoreError> {
  let status_text: String = row.try_get("status")?;
  let Some(status) = AuctionStatus::from_db(&status_text) else {
    return Err(StoreError::UnknownStatus(status_text));
  };
  let Json(snapshot) = row.try_get::<Json<DiamondSnapshot>, _>("diamond_snapshot")?;
  Ok(AuctionRow {
    id: row.try_get("id")?,
    stock_number: row.try_get("stock_number")?,
    starting_price: row.try_get("starting_price")?,
    current_price: row.try_get("current_price")?,
    min_increment: row.try_get("min_increment")?,
    currency: row.try_get("currency")?,
    status,
    ends_at: row.try_get("ends_at")?,
    snapshot,
    seller_telegram_id: row.try_get("seller_telegram_id")?,
    created_at: row.try_get("created_at")?,
  })
}

fn bid_from_row(row: &PgRow) -> Result<BidRow, StoreError> {
  Ok(BidRow {
    id: row.try_get("id")?,
    auction_id: row.try_get("auction_id")?,
    bidder_telegram_id: row.try_get("bidder_telegram_id")?,
    bidder_name: row.try_get("bidder_name")?,
    amount: row.try_get("amount")?,
    created_at: row.try_get("created_at")?,
  })
}

#[async_trait]
impl AuctionStore for Db {
  #[instrument(skip(self, auction), fields(stock_number = %auction.stock_number))]
  async fn insert_auction(&self, auction: &NewAuction) -> Result<AuctionRow, StoreError> {
    let snapshot = serde_json::to_value(&auction.snapshot)?;
    let row = sqlx::query(&format!(
      r#"
      INSERT INTO auctions (
        stock_number, starting_price, current_price, min_increment, currency,
        status, ends_at, diamond_snapshot, seller_telegram_id, created_at
      )
      VALUES ($1, $2, $2, $3, $4, $5, $6, $7, $8, $9)
      RETURNING {AUCTION_COLUMNS}
      "#
    ))
    .bind(&auction.stock_number)
    .bind(auction.starting_price)
    .bind(auction.min_increment)
    .bind(&auction.currency)
    .bind(AuctionStatus::Active.as_str())
    .bind(auction.ends_at)
    .bind(snapshot)
    .bind(auction.seller_telegram_id)
    .bind(auction.created_at)
    .fetch_one(&self.pool)
    .await?;
    auction_from_row(&row)
  }

  #[instrument(skip(self))]
  async fn get_auction(&self, auction_id: i64) -> Result<Option<AuctionRow>, StoreError> {
    let row = sqlx::query(&format!("SELECT {AUCTION_COLUMNS} FROM auctions WHERE id = $1"))
      .bind(auction_id)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(auction_from_row).transpose()
  }

  #[instrument(skip(self, bid), fields(auction_id = bid.auction_id, amount = bid.amount))]
  async fn insert_bid(&self, bid: &NewBid) -> Result<Option<BidRow>, StoreError> {
    let mut tx = self.pool.begin().await?;
    let raised = sqlx::query(
      r#"
      UPDATE auctions
      SET current_price = $2
      WHERE id = $1
        AND status = 'active'
        AND ends_at > NOW()
        AND current_price = $3
      "#,
    )
    .bind(bid.auction_id)
    .bind(bid.amount)
    .bind(bid.expected_price)
    .execute(&mut *tx)
    .await?;

    if raised.rows_affected() == 0 {
      tx.rollback().await?;
      return Ok(None);
    }

    let row = sqlx::query(&format!(
      r#"
      INSERT INTO auction_bids (auction_id, bidder_telegram_id, bidder_name, amount)
      VALUES ($1, $2, $3, $4)
      RETURNING {BID_COLUMNS}
      "#
    ))
    .bind(bid.auction_id)
    .bind(bid.bidder_telegram_id)
    .bind(&bid.bidder_name)
    .bind(bid.amount)
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    bid_from_row(&row).map(Some)
  }

  #[instrument(skip(self))]
  async fn count_bids_since(&self, auction_id: i64, since: DateTime<Utc>) -> Result<i64, StoreError> {
    let count =
      sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM auction_bids WHERE auction_id = $1 AND created_at >= $2")
        .bind(auction_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
    Ok(count)
  }

  #[instrument(skip(self))]
  async fn top_bids_by_bidder(&self, auction_id: i64) -> Result<Vec<BidRow>, StoreError> {
    let rows = sqlx::query(&format!(
      r#"
      SELECT {BID_COLUMNS}
      FROM (
        SELECT DISTINCT ON (bidder_telegram_id) {BID_COLUMNS}
        FROM auction_bids
        WHERE auction_id = $1
        ORDER BY bidder_telegram_id, amount DESC, created_at ASC
      ) best
      ORDER BY amount DESC, created_at ASC
      "#
    ))
    .bind(auction_id)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(bid_from_row).collect()
  }

  #[instrument(skip(self))]
  async fn extend_auction_end(&self, auction_id: i64, by: Duration) -> Result<Option<DateTime<Utc>>, StoreError> {
    let ends_at = sqlx::query_scalar::<_, DateTime<Utc>>(
      r#"
      UPDATE auctions
      SET ends_at = ends_at + make_interval(secs => $2)
      WHERE id = $1
      RETURNING ends_at
      "#,
    )
    .bind(auction_id)
    .bind(by.num_seconds() as f64)
    .fetch_optional(&self.pool)
    .await?;
    Ok(ends_at)
  }

  #[instrument(skip(self))]
  async fn mark_auction_ended(&self, auction_id: i64) -> Result<bool, StoreError> {
    let result = sqlx::query("UPDATE auctions SET status = $2 WHERE id = $1 AND status = $3")
      .bind(auction_id)
      .bind(AuctionStatus::Ended.as_str())
      .bind(AuctionStatus::Active.as_str())
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  #[instrument(skip(self, event), fields(auction_id = event.auction_id, kind = event.kind.as_str()))]
  async fn record_event(&self, event: &NewAnalyticsEvent) -> Result<(), StoreError> {
    sqlx::query(
      r#"
      INSERT INTO auction_analytics (auction_id, telegram_id, event_type, event_data)
      VALUES ($1, $2, $3, $4)
      "#,
    )
    .bind(event.auction_id)
    .bind(event.telegram_id)
    .bind(event.kind.as_str())
    .bind(&event.data)
    .execute(&self.pool)
    .await?;
    Ok(())
  }
}
