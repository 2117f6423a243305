use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*, types::BotCommand};

use tokio_util::sync::CancellationToken;

use cac_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use cac_core::{
    admins::{AdminRoster, Tier},
    config::Config,
    dispatcher::{Command, CommandDispatcher, DispatchSettings, Services},
    messaging::port::MessagingPort,
    ports::Storage,
    stats::ProcSampler,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<CommandDispatcher>,
}

/// Wire the console together and long-poll Telegram until Ctrl-C.
pub async fn run_polling<S: Storage>(cfg: Arc<Config>, storage: Arc<S>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "telegram bot connected"),
        Err(e) => tracing::warn!(error = %e, "get_me failed"),
    }
    tracing::info!(
        super_admin = cfg.super_admin_id.0,
        admins = cfg.admin_ids.len(),
        operator_chat = cfg.operator_chat_id.0,
        "admin console starting"
    );

    register_commands(&bot).await;

    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        Arc::new(TelegramMessenger::new(bot.clone())),
        ThrottleConfig::default(),
    ));

    let services = Services::new(storage, Arc::new(ProcSampler::new()));
    let roster = AdminRoster::new(cfg.super_admin_id, cfg.admin_ids.iter().copied());
    let settings = DispatchSettings {
        operator_chat: cfg.operator_chat_id,
        recent_keys_limit: cfg.recent_keys_limit,
        security_log_limit: cfg.security_log_limit,
        default_key_days: cfg.default_key_days,
        safe_limit: cfg.telegram_safe_limit,
    };

    let cancel = CancellationToken::new();
    let refresher = cfg
        .stats_refresh_interval
        .map(|every| services.stats.spawn_refresher(every, cancel.clone()));
    if refresher.is_none() {
        tracing::info!("periodic stats refresh disabled");
    }

    let state = Arc::new(AppState {
        dispatcher: Arc::new(CommandDispatcher::new(services, roster, messenger, settings)),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    if let Some(handle) = refresher {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "stats refresher did not stop cleanly");
        }
    }
    tracing::info!("admin console stopped");
    Ok(())
}

/// Publish the admin-tier commands as the bot's command menu. Best effort.
async fn register_commands(bot: &Bot) {
    let commands = menu_commands();
    if let Err(e) = bot.set_my_commands(commands).await {
        tracing::warn!(error = %e, "set_my_commands failed");
    }
}

fn menu_commands() -> Vec<BotCommand> {
    Command::ALL
        .into_iter()
        .filter(|c| c.tier() == Tier::Admin)
        .map(|c| BotCommand::new(c.token().trim_start_matches('/'), c.synopsis().1))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_lists_only_admin_tier_commands() {
        let names: Vec<String> = menu_commands().into_iter().map(|c| c.command).collect();
        assert!(names.contains(&"genkey".to_string()));
        assert!(names.contains(&"block".to_string()));
        assert!(!names.contains(&"addadmin".to_string()));
        assert!(!names.contains(&"admins".to_string()));
        assert!(names.iter().all(|n| !n.starts_with('/')));
    }
}
