use async_trait::async_trait;
use reqwest::Url;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::ChatId;
use teloxide::types::InlineKeyboardButton;
use teloxide::types::InlineKeyboardMarkup;
use teloxide::types::InputFile;
use teloxide::types::Message;
use teloxide::types::ParseMode;
use teloxide::utils::markdown;
use tracing::instrument;

use crate::auction::broadcast::AuctionAnnouncement;
use crate::auction::broadcast::DispatchError;
use crate::auction::broadcast::Messenger;
use crate::auction::broadcast::SentMessage;
use crate::util::format_amount;

pub const BID_CALLBACK_PREFIX: &str = "bid";

/// Delivers auction messages straight through the Bot API.
pub struct TelegramMessenger {
  bot: Bot,
}

impl TelegramMessenger {
  pub fn new(bot: Bot) -> Self {
    Self { bot }
  }
}

fn sent(chat_id: i64, message: Message) -> SentMessage {
  SentMessage {
    chat_id,
    message_id: Some(i64::from(message.id.0)),
  }
}

fn dispatch_error(err: RequestError) -> DispatchError {
  match err {
    RequestError::Api(api) => DispatchError::Rejected {
      message: api.to_string(),
      payload: None,
    },
    other => DispatchError::Transport(other.to_string()),
  }
}

#[async_trait]
impl Messenger for TelegramMessenger {
  #[instrument(skip(self, announcement), fields(auction_id = announcement.auction_id, chat_id = announcement.chat_id))]
  async fn send_announcement(&self, announcement: &AuctionAnnouncement) -> Result<SentMessage, DispatchError> {
    let chat = ChatId(announcement.chat_id);
    let text = render_announcement(announcement);
    let keyboard = bid_keyboard(announcement);
    let photo = announcement
      .image_url
      .as_deref()
      .and_then(|url| Url::parse(url).ok());

    let result = match photo {
      Some(url) => {
        self
          .bot
          .send_photo(chat, InputFile::url(url))
          .caption(text)
          .parse_mode(ParseMode::MarkdownV2)
          .reply_markup(keyboard)
          .await
      },
      None => {
        self
          .bot
          .send_message(chat, text)
          .parse_mode(ParseMode::MarkdownV2)
          .reply_markup(keyboard)
          .await
      },
    };
    result
      .map(|message| sent(announcement.chat_id, message))
      .map_err(dispatch_error)
  }

  #[instrument(skip(self, text))]
  async fn send_text(&self, chat_id: i64, text: &str) -> Result<SentMessage, DispatchError> {
    self
      .bot
      .send_message(ChatId(chat_id), text.to_string())
      .await
      .map(|message| sent(chat_id, message))
      .map_err(dispatch_error)
  }
}

pub fn render_announcement(announcement: &AuctionAnnouncement) -> String {
  let header = markdown::bold(&markdown::escape(&format!(
    "💎 Auction #{}: {}",
    announcement.auction_id, announcement.diamond_description
  )));
  let lines = [
    format!("Stock: {}", announcement.stock_number),
    format!(
      "💰 Current price: {}",
      format_amount(announcement.current_price, &announcement.currency)
    ),
    format!(
      "➕ Min increment: {}",
      format_amount(announcement.min_increment, &announcement.currency)
    ),
    format!("⏰ Ends: {}", announcement.ends_at.format("%Y-%m-%d %H:%M UTC")),
  ];
  let body: Vec<String> = lines.iter().map(|line| markdown::escape(line)).collect();
  format!("{header}\n\n{}", body.join("\n"))
}

pub fn bid_keyboard(announcement: &AuctionAnnouncement) -> InlineKeyboardMarkup {
  let one_step = announcement.current_price.saturating_add(announcement.min_increment);
  let two_steps = one_step.saturating_add(announcement.min_increment);
  InlineKeyboardMarkup::new(vec![vec![
    InlineKeyboardButton::callback(
      format!("🔨 Bid {}", format_amount(one_step, &announcement.currency)),
      format!("{BID_CALLBACK_PREFIX}:{}:1", announcement.auction_id),
    ),
    InlineKeyboardButton::callback(
      format!("⚡ Bid {}", format_amount(two_steps, &announcement.currency)),
      format!("{BID_CALLBACK_PREFIX}:{}:2", announcement.auction_id),
    ),
  ]])
}
