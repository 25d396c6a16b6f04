use std::sync::Arc;

use teloxide::dispatching::UpdateHandler;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::info;

use crate::auction::AuctionService;
use crate::auction::Messenger;
use crate::bot;
use crate::bot::AppContext;
use crate::bot::TelegramMessenger;
use crate::config::Config;
use crate::db::Db;
use crate::inventory::HttpInventory;
use crate::messaging::EdgeFunctionMessenger;

pub struct App {
  bot: Bot,
  context: Arc<AppContext>,
  handler: UpdateHandler<anyhow::Error>,
}

impl App {
  pub fn new(bot: Bot, db: Db, config: Config) -> anyhow::Result<Self> {
    let messenger: Arc<dyn Messenger> = match &config.messaging_function {
      Some(function) => {
        info!(url = %function.url, "delivering announcements through messaging function");
        Arc::new(EdgeFunctionMessenger::new(&function.url, function.api_key.clone()))
      },
      None => Arc::new(TelegramMessenger::new(bot.clone())),
    };
    let inventory = Arc::new(HttpInventory::new(&config.inventory_url)?);
    let service = AuctionService::new(Arc::new(db), messenger, inventory, config.group_ids);
    let context = Arc::new(AppContext::new(service, config.admins, config.currency));
    let handler = bot::build_schema();
    Ok(Self { bot, context, handler })
  }

  pub async fn run(self) -> anyhow::Result<()> {
    let me = self.bot.get_me().await?;
    info!(
      bot_id = %me.id,
      groups = self.context.service().group_ids().len(),
      "bot connected"
    );

    Dispatcher::builder(self.bot.clone(), self.handler)
      .dependencies(dptree::deps![self.context.clone(), me])
      .enable_ctrlc_handler()
      .build()
      .dispatch()
      .await;

    Ok(())
  }
}
