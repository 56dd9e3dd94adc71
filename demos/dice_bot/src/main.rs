//! Dice Bot Demo
//!
//! Runs the full Ingot stack against the console instead of a network
//! gateway: every line typed on stdin is delivered as a private message from
//! the first configured admin, and outbound sends are printed.
//!
//! Try:
//!
//! ```text
//! 2d6
//! .help
//! 列出模块 42
//! exit
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package dice-bot
//! ```

use std::any::Any;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

use ingot::prelude::*;
use ingot::runtime::logging;
use ingot_modules::{AdminControl, Dice, Repeater};

const SELF_ID: i64 = 10000;

/// Gateway double that prints outbound traffic to the console.
struct ConsoleGateway;

#[async_trait::async_trait]
impl Gateway for ConsoleGateway {
    async fn call_api(&self, action: &str, params: Value) -> ApiResult<Value> {
        info!(action, %params, "API call");
        Ok(json!({ "retcode": 0, "data": null }))
    }

    async fn send_private(&self, user_id: i64, message: &str) -> ApiResult<()> {
        println!("-> [private {user_id}] {message}");
        Ok(())
    }

    async fn send_group(&self, group_id: i64, message: &str) -> ApiResult<()> {
        println!("-> [group {group_id}] {message}");
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = BotConfig::load()?;
    let _log_guard = logging::init_from_config(&config.logging);

    // Console input impersonates the first configured admin so the admin
    // command surface is reachable.
    let user_id = config.admins.first().copied().unwrap_or(20000);
    let admins = if config.admins.is_empty() {
        vec![user_id]
    } else {
        config.admins.clone()
    };

    let mut bot = Bot::new(config, Arc::new(ConsoleGateway));
    bot.register_module(Arc::new(Dice::new()));
    bot.register_module(Arc::new(Repeater::new()));
    bot.register_module(Arc::new(AdminControl::new(admins, bot.shutdown_token())));

    let (tx, rx) = mpsc::channel(32);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut message_id = 0;
        while let Ok(Some(line)) = lines.next_line().await {
            message_id += 1;
            let event = Event::Message(MessageEvent {
                self_id: SELF_ID,
                time: now(),
                user_id,
                group_id: None,
                message_type: MessageType::Private,
                message_id,
                message: line,
            });
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let shutdown = bot.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    bot.run(rx).await?;
    Ok(())
}
