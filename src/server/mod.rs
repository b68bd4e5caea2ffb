pub mod api;

use crate::cli::Args;
use crate::relay::RelayService;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    relay: Arc<RelayService>,
    args: Args,
}

impl Server {
    pub fn new(relay: Arc<RelayService>, args: Args) -> Self {
        Self { relay, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(self.relay.clone(), self.args.clone()).await
    }
}
