use std::env;

use anyhow::Context;
use anyhow::Result;

const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone)]
pub struct MessagingFunction {
  pub url: String,
  pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Config {
  pub bot_token: String,
  pub database_url: String,
  pub admins: Vec<i64>,
  pub group_ids: Vec<i64>,
  pub inventory_url: String,
  pub currency: String,
  /// When set, announcements go through the hosted messaging functions instead of
  /// the bot's own Bot API connection.
  pub messaging_function: Option<MessagingFunction>,
}

impl Config {
  pub fn from_env() -> Result<Self> {
    let bot_token = env::var("BOT_TOKEN")
      .or_else(|_| env::var("TELOXIDE_TOKEN"))
      .context("BOT_TOKEN or TELOXIDE_TOKEN must be set")?;
    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let inventory_url = env::var("INVENTORY_API_URL").context("INVENTORY_API_URL must be set")?;
    let admins = parse_ids("ADMIN_IDS", &env::var("ADMIN_IDS").unwrap_or_default());
    let group_ids = parse_ids("AUCTION_GROUP_IDS", &env::var("AUCTION_GROUP_IDS").unwrap_or_default());
    let currency = env::var("AUCTION_CURRENCY")
      .ok()
      .map(|value| value.trim().to_uppercase())
      .filter(|value| !value.is_empty())
      .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    let messaging_function = match env::var("MESSAGING_FUNCTION_URL") {
      Ok(url) if !url.trim().is_empty() => Some(MessagingFunction {
        url,
        api_key: env::var("MESSAGING_FUNCTION_KEY")
          .context("MESSAGING_FUNCTION_KEY must be set when MESSAGING_FUNCTION_URL is")?,
      }),
      _ => None,
    };
    Ok(Self {
      bot_token,
      database_url,
      admins,
      group_ids,
      inventory_url,
      currency,
      messaging_function,
    })
  }
}

fn parse_ids(name: &str, raw: &str) -> Vec<i64> {
  raw
    .split(',')
    .filter_map(|id| {
      let trimmed = id.trim();
      if trimmed.is_empty() {
        return None;
      }
      match trimmed.parse::<i64>() {
        Ok(value) => Some(value),
        Err(err) => {
          tracing::warn!(variable = name, value = trimmed, error = %err, "invalid id entry");
          None
        },
      }
    })
    .collect()
}
