use std::collections::HashSet;

use crate::auction::AuctionService;

#[derive(Clone)]
pub struct AppContext {
  service: AuctionService,
  admins: HashSet<i64>,
  currency: String,
}

impl AppContext {
  pub fn new(service: AuctionService, admins: Vec<i64>, currency: String) -> Self {
    Self {
      service,
      admins: admins.into_iter().collect(),
      currency,
    }
  }

  pub fn service(&self) -> &AuctionService {
    &self.service
  }

  pub fn currency(&self) -> &str {
    &self.currency
  }

  pub fn is_admin(&self, tg_id: i64) -> bool {
    self.admins.contains(&tg_id)
  }
}
