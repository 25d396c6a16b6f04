use teloxide::utils::command::BotCommands;

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
  /// Show the welcome message
  Start,
  /// Show the help text
  Help,
  /// Create an auction: /auction <stock> <price> [increment] [hours]
  Auction(String),
  /// End an auction and notify bidders: /settle <auction id>
  Settle(String),
}
