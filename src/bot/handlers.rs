use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use teloxide::types::Message;
use teloxide::types::User;
use teloxide::utils::command::BotCommands;
use thiserror::Error;
use tracing::info;
use tracing::instrument;
use tracing::warn;

use crate::auction::CreateAuctionRequest;
use crate::auction::bid_war::BidWarOutcome;
use crate::auction::broadcast::DispatchFailure;
use crate::auction::service::AuctionError;
use crate::auction::service::BidError;
use crate::auction::service::BidReceipt;
use crate::auction::service::CreatedAuction;
use crate::auction::service::SettleError;
use crate::auction::service::Settlement;
use crate::bot::Command;
use crate::bot::HandlerResult;
use crate::bot::context::AppContext;
use crate::bot::messenger::BID_CALLBACK_PREFIX;
use crate::util::MoneyError;
use crate::util::format_amount;
use crate::util::parse_amount;

type SharedContext = Arc<AppContext>;

const MAX_BID_STEPS: u32 = 10;
const WELCOME_TEXT: &str = "💎 Welcome to the diamond auction house! Tap the bid buttons on any auction \
                            announcement to place a bid.";

pub fn build_schema() -> UpdateHandler<anyhow::Error> {
  let message_handler = Update::filter_message().branch(command_branch());
  let callback_handler = Update::filter_callback_query().endpoint(handle_callback_query);

  dptree::entry().branch(message_handler).branch(callback_handler)
}

fn command_branch() -> UpdateHandler<anyhow::Error> {
  dptree::entry()
    .filter_command::<Command>()
    .branch(dptree::case![Command::Start].endpoint(handle_start))
    .branch(dptree::case![Command::Help].endpoint(handle_help))
    .branch(dptree::case![Command::Auction(args)].endpoint(handle_auction))
    .branch(dptree::case![Command::Settle(args)].endpoint(handle_settle))
}

#[instrument(skip(bot, msg))]
async fn handle_start(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /start command");
  bot.send_message(msg.chat.id, WELCOME_TEXT).await?;
  Ok(())
}

#[instrument(skip(bot, msg))]
async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
  info!(chat_id = %msg.chat.id, "received /help command");
  let mut text = Command::descriptions().to_string();
  text.push_str("\n\nBids are placed from the buttons under each auction announcement.");
  bot.send_message(msg.chat.id, text).await?;
  Ok(())
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_auction(bot: Bot, ctx: SharedContext, msg: Message, args: String) -> HandlerResult {
  let chat_id = msg.chat.id;
  let seller_id = msg.from.as_ref().map(|user| user.id.0 as i64);
  if let Some(user_id) = seller_id
    && !ctx.is_admin(user_id)
  {
    bot.send_message(chat_id, "🛡️ Admins only.").await?;
    return Ok(());
  }

  let parsed = match parse_auction_args(&args) {
    Ok(parsed) => parsed,
    Err(err) => {
      bot.send_message(chat_id, format!("⚠️ {err}")).await?;
      return Ok(());
    },
  };

  let snapshot = match ctx.service().snapshot_for(&parsed.stock_number).await {
    Ok(Some(snapshot)) => snapshot,
    Ok(None) => {
      bot
        .send_message(
          chat_id,
          format!("💎 Diamond {} was not found in the inventory.", parsed.stock_number),
        )
        .await?;
      return Ok(());
    },
    Err(err) => {
      warn!(error = %err, stock_number = %parsed.stock_number, "inventory lookup failed");
      bot
        .send_message(chat_id, "Failed to reach the inventory, try again later.")
        .await?;
      return Ok(());
    },
  };

  let mut request = CreateAuctionRequest::new(snapshot, parsed.starting_price, ctx.currency());
  if let Some(min_increment) = parsed.min_increment {
    request.min_increment = min_increment;
  }
  if let Some(duration_hours) = parsed.duration_hours {
    request.duration_hours = duration_hours;
  }
  request.seller_telegram_id = seller_id;

  match ctx.service().create_auction(&request).await {
    Ok(created) => {
      info!(auction_id = created.auction.id, chat_id = %chat_id, "auction created from command");
      bot.send_message(chat_id, render_creation_summary(&created)).await?;
    },
    Err(AuctionError::Validation(err)) => {
      bot.send_message(chat_id, format!("⚠️ {err}")).await?;
    },
    Err(err) => {
      warn!(error = %err, chat_id = %chat_id, "failed to create auction");
      bot
        .send_message(chat_id, "Failed to create auction, try again later.")
        .await?;
    },
  }
  Ok(())
}

#[instrument(skip(bot, ctx, msg))]
async fn handle_settle(bot: Bot, ctx: SharedContext, msg: Message, args: String) -> HandlerResult {
  let chat_id = msg.chat.id;
  let Some(user) = msg.from.as_ref() else {
    bot.send_message(chat_id, "⚠️ unable to identify user").await?;
    return Ok(());
  };
  if !ctx.is_admin(user.id.0 as i64) {
    bot.send_message(chat_id, "🛡️ Admins only.").await?;
    return Ok(());
  }

  let Ok(auction_id) = args.trim().parse::<i64>() else {
    bot.send_message(chat_id, "⚠️ usage: /settle <auction id>").await?;
    return Ok(());
  };

  let text = match ctx.service().settle_auction(auction_id).await {
    Ok(settlement) => render_settlement(&settlement),
    Err(SettleError::Storage(err)) => {
      warn!(error = %err, auction_id, "failed to settle auction");
      "Failed to settle auction, try again later.".to_string()
    },
    Err(err) => format!("⚠️ Auction #{auction_id}: {err}."),
  };
  bot.send_message(chat_id, text).await?;
  Ok(())
}

#[instrument(skip(bot, ctx, query))]
async fn handle_callback_query(bot: Bot, ctx: SharedContext, query: CallbackQuery) -> HandlerResult {
  let user_id = query.from.id.0 as i64;
  let callback_data = query.data.as_deref().unwrap_or("<empty>");
  info!(user_id, callback = callback_data, "handling callback query");

  let Some((auction_id, steps)) = parse_bid_callback(callback_data) else {
    bot.answer_callback_query(query.id).await?;
    return Ok(());
  };

  let bidder_name = bidder_label(&query.from);
  let (text, alert) = match ctx.service().place_bid(auction_id, user_id, &bidder_name, steps).await {
    Ok(receipt) => {
      if let BidWarOutcome::Extended { new_ends_at, .. } = receipt.bid_war
        && let Some(message) = query.message.as_ref()
      {
        let notice = format!(
          "⚔️ Bid war on auction #{auction_id}! Deadline extended to {}.",
          new_ends_at.format("%H:%M UTC")
        );
        if let Err(err) = bot.send_message(message.chat().id, notice).await {
          warn!(error = %err, auction_id, "failed to post bid war notice");
        }
      }
      (render_bid_receipt(auction_id, &receipt), false)
    },
    Err(BidError::Storage(err)) => {
      warn!(error = %err, auction_id, user_id, "storage error while placing bid");
      ("Temporary error placing bid.".to_string(), true)
    },
    Err(err) => (bid_error_message(&err), true),
  };

  bot.answer_callback_query(query.id).text(text).show_alert(alert).await?;
  Ok(())
}

#[derive(Debug, PartialEq, Eq)]
struct AuctionArgs {
  stock_number: String,
  starting_price: i64,
  min_increment: Option<i64>,
  duration_hours: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
enum ArgsError {
  #[error("usage: /auction <stock> <price> [increment] [hours]")]
  Usage,
  #[error("invalid {field}: {error}")]
  Amount { field: &'static str, error: MoneyError },
  #[error("hours must be a whole number")]
  Hours,
}

fn parse_auction_args(input: &str) -> Result<AuctionArgs, ArgsError> {
  let parts: Vec<&str> = input.split_whitespace().collect();
  let [stock_number, price, rest @ ..] = parts.as_slice() else {
    return Err(ArgsError::Usage);
  };
  if rest.len() > 2 {
    return Err(ArgsError::Usage);
  }

  let starting_price = parse_amount(price).map_err(|error| ArgsError::Amount {
    field: "price",
    error,
  })?;
  let min_increment = rest
    .first()
    .map(|value| parse_amount(value))
    .transpose()
    .map_err(|error| ArgsError::Amount {
      field: "increment",
      error,
    })?;
  let duration_hours = rest
    .get(1)
    .map(|value| value.parse::<i64>())
    .transpose()
    .map_err(|_| ArgsError::Hours)?;

  Ok(AuctionArgs {
    stock_number: stock_number.to_string(),
    starting_price,
    min_increment,
    duration_hours,
  })
}

fn parse_bid_callback(data: &str) -> Option<(i64, u32)> {
  let mut parts = data.split(':');
  if parts.next()? != BID_CALLBACK_PREFIX {
    return None;
  }
  let auction_id = parts.next()?.parse::<i64>().ok()?;
  let steps = parts.next()?.parse::<u32>().ok()?;
  if parts.next().is_some() || !(1 ..= MAX_BID_STEPS).contains(&steps) {
    return None;
  }
  Some((auction_id, steps))
}

fn bidder_label(user: &User) -> String {
  if let Some(username) = &user.username {
    format!("@{username}")
  } else if let Some(last) = &user.last_name {
    format!("{} {last}", user.first_name)
  } else {
    user.first_name.clone()
  }
}

fn render_failure(failure: &DispatchFailure) -> String {
  let mut text = format!(
    "chat {} at {}: {}",
    failure.chat_id,
    failure.failed_at.format("%H:%M:%S UTC"),
    failure.error
  );
  if let Some(payload) = failure.error.payload() {
    text.push_str(&format!("\nResponse: {payload}"));
  }
  text
}

fn render_creation_summary(created: &CreatedAuction) -> String {
  let auction = &created.auction;
  let mut text = format!(
    "✅ Auction #{} created for {} starting at {}, ends {}.",
    auction.id,
    auction.stock_number,
    format_amount(auction.starting_price, &auction.currency),
    auction.ends_at.format("%Y-%m-%d %H:%M UTC"),
  );
  match &created.broadcast {
    Ok(report) if report.attempted == 0 => {
      text.push_str("\nNo broadcast groups are configured.");
    },
    Ok(report) => {
      text.push_str(&format!(
        "\n📣 Announced in {} of {} groups.",
        report.success_count(),
        report.attempted
      ));
      if let Some(failure) = report.last_failure() {
        text.push_str(&format!(
          "\n⚠️ {} group(s) failed. Last failure: {}",
          report.failures.len(),
          render_failure(failure)
        ));
      }
    },
    Err(err) => {
      text.push_str(&format!("\n⚠️ The auction could not be announced: {err}"));
      if let Some(failure) = err.last_failure() {
        text.push_str(&format!("\nLast failure: {}", render_failure(failure)));
      }
    },
  }
  text
}

fn render_bid_receipt(auction_id: i64, receipt: &BidReceipt) -> String {
  let mut text = format!(
    "✅ Bid of {} placed on auction #{auction_id}.",
    format_amount(receipt.bid.amount, &receipt.currency)
  );
  if let BidWarOutcome::Extended { new_ends_at, .. } = receipt.bid_war {
    text.push_str(&format!(" ⚔️ Bid war! Now ends {}.", new_ends_at.format("%H:%M UTC")));
  }
  text
}

fn render_settlement(settlement: &Settlement) -> String {
  let auction = &settlement.auction;
  match &settlement.winner {
    Some(winner) => format!(
      "🏁 Auction #{} settled. Winner: {} with {}. Consoled {} other bidder(s).",
      auction.id,
      winner.bidder_name,
      format_amount(winner.amount, &auction.currency),
      settlement.consoled,
    ),
    None => format!("🏁 Auction #{} settled with no bids.", auction.id),
  }
}

fn bid_error_message(err: &BidError) -> String {
  match err {
    BidError::NotFound => "Auction not found.".to_string(),
    BidError::Closed => "This auction has ended.".to_string(),
    BidError::OwnAuction => "You cannot bid on your own auction.".to_string(),
    BidError::PriceMoved => "Someone bid first, check the new price and try again.".to_string(),
    BidError::OutOfRange => "Bid amount is out of range.".to_string(),
    BidError::Storage(_) => "Temporary error placing bid.".to_string(),
  }
}
