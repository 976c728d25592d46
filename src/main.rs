mod config;
mod export;
mod record;
mod sheets;
mod spotify;
mod utils;

use env_logger::Env;
use std::error::Error;
use std::process;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run().await {
        utils::log_error(e.as_ref());
        process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    // Load configuration
    let config = config::load_config()?;

    // Fetch from Spotify and append to the sheet
    export::run(&config).await
}
