use async_trait::async_trait;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::instrument;

use crate::auction::broadcast::AuctionAnnouncement;
use crate::auction::broadcast::DispatchError;
use crate::auction::broadcast::Messenger;
use crate::auction::broadcast::SentMessage;

const ANNOUNCE_FUNCTION: &str = "send-auction-message";
const TEXT_FUNCTION: &str = "send-telegram-message";

#[derive(Debug, Deserialize)]
struct FunctionResponse {
  success: bool,
  #[serde(default)]
  message_id: Option<i64>,
  #[serde(default)]
  error: Option<String>,
}

#[derive(Serialize)]
struct TextPayload<'a> {
  chat_id: i64,
  message: &'a str,
}

/// Delivers messages through the hosted messaging functions that wrap the Bot API.
pub struct EdgeFunctionMessenger {
  client: Client,
  base_url: String,
  api_key: String,
}

impl EdgeFunctionMessenger {
  pub fn new(base_url: &str, api_key: String) -> Self {
    Self {
      client: Client::new(),
      base_url: base_url.trim_end_matches('/').to_string(),
      api_key,
    }
  }

  async fn invoke<T: Serialize + Sync>(
    &self,
    function: &str,
    chat_id: i64,
    payload: &T,
  ) -> Result<SentMessage, DispatchError> {
    let response = self
      .client
      .post(format!("{}/{function}", self.base_url))
      .bearer_auth(&self.api_key)
      .json(payload)
      .send()
      .await
      .map_err(|err| DispatchError::Transport(err.to_string()))?;
    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|err| DispatchError::Transport(err.to_string()))?;
    interpret_response(chat_id, status, &body)
  }
}

fn interpret_response(chat_id: i64, status: StatusCode, body: &str) -> Result<SentMessage, DispatchError> {
  let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
  let response = parsed
    .as_ref()
    .and_then(|value| FunctionResponse::deserialize(value).ok());

  match response {
    Some(FunctionResponse {
      success: true,
      message_id,
      ..
    }) if status.is_success() => Ok(SentMessage { chat_id, message_id }),
    Some(FunctionResponse { error, .. }) => Err(DispatchError::Rejected {
      message: error.unwrap_or_else(|| format!("messaging function failed with HTTP {}", status.as_u16())),
      payload: parsed,
    }),
    None => Err(DispatchError::Http {
      status: status.as_u16(),
      body: body.to_string(),
    }),
  }
}

#[async_trait]
impl Messenger for EdgeFunctionMessenger {
  #[instrument(skip(self, announcement), fields(auction_id = announcement.auction_id, chat_id = announcement.chat_id))]
  async fn send_announcement(&self, announcement: &AuctionAnnouncement) -> Result<SentMessage, DispatchError> {
    self
      .invoke(ANNOUNCE_FUNCTION, announcement.chat_id, announcement)
      .await
  }

  #[instrument(skip(self, text))]
  async fn send_text(&self, chat_id: i64, text: &str) -> Result<SentMessage, DispatchError> {
    self
      .invoke(TEXT_FUNCTION, chat_id, &TextPayload { chat_id, message: text })
      .await
  }
}
