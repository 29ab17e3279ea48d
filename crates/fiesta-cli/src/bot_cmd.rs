//! Telegram transport for the assistant relay (long polling).

use std::sync::Arc;

use anyhow::Result;
use teloxide::types::ChatAction;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{debug, info, warn};

use fiesta_core::relay::Relay;

const START_REPLY: &str = "Hi! I'm the fiesta assistant. Send me a message and I'll help you plan \
your holiday.\nUse /new to start a new conversation.";

const NEW_CONVERSATION_REPLY: &str = "Starting a new conversation. Send me a message!";

#[derive(Debug, PartialEq, Eq)]
enum BotCommand {
    Start,
    New,
}

/// Recognize `/start` and `/new`, including the `/cmd@botname` form.
/// Anything else, other slash commands included, goes to the assistant.
fn parse_command(text: &str) -> Option<BotCommand> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?.split('@').next()?.to_lowercase();
    match name.as_str() {
        "start" => Some(BotCommand::Start),
        "new" => Some(BotCommand::New),
        _ => None,
    }
}

pub async fn run_bot(token: &str, relay: Arc<Relay>) -> Result<()> {
    let bot = Bot::new(token);

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "telegram bot started"),
        Err(e) => warn!(error = %e, "could not fetch bot identity"),
    }

    let handler = Update::filter_message().endpoint(handle_message);

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![relay])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("telegram bot stopped");
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, relay: Arc<Relay>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id;

    match parse_command(text) {
        Some(BotCommand::Start) => {
            bot.send_message(chat_id, START_REPLY).await?;
        }
        Some(BotCommand::New) => {
            relay.reset(chat_id.0).await;
            bot.send_message(chat_id, NEW_CONVERSATION_REPLY).await?;
        }
        None => {
            if let Err(e) = bot.send_chat_action(chat_id, ChatAction::Typing).await {
                debug!(chat_id = chat_id.0, error = %e, "typing action failed");
            }
            for chunk in relay.handle_text(chat_id.0, text).await {
                bot.send_message(chat_id, chunk).await?;
            }
        }
    }

    Ok(())
}
