pub mod bid_war;
pub mod broadcast;
pub mod creation;
pub mod notifier;
pub mod service;
pub mod store;
#[cfg(test)]
pub mod testing;

pub use broadcast::Messenger;
pub use creation::CreateAuctionRequest;
pub use service::AuctionService;
pub use store::AuctionStore;
