//! Inbound command dispatch.
//!
//! One call to [`CommandDispatcher::dispatch`] per inbound message. The transport spawns each
//! call on its own task, so a slow handler never holds up the next message.

mod command;
mod handlers;

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use chrono::Utc;
use futures::FutureExt;

pub use command::Command;

use crate::{
    accounts::AccountRepository,
    admins::{AdminRoster, Tier},
    domain::{ChatId, InboundMessage, Sender},
    errors::Error,
    formatting::{escape_html, split_html_chunks, truncate_text},
    keys::KeyRepository,
    messaging::port::MessagingPort,
    model::SecurityLogEntry,
    ports::{SecurityLogStore, Storage},
    stats::{ResourceSampler, StatsAggregator},
};

const DENIED_TEXT: &str = "⛔ You are not authorized to use this bot.";
const FAILURE_TEXT: &str = "❌ The command failed. The operator has been notified.";

/// Knobs the handlers read.
#[derive(Clone, Debug)]
pub struct DispatchSettings {
    pub operator_chat: ChatId,
    pub recent_keys_limit: usize,
    pub security_log_limit: usize,
    pub default_key_days: u32,
    /// Max bytes per outbound message; the transport's own cap wins when lower.
    pub safe_limit: usize,
}

/// Application services shared by every handler.
#[derive(Clone)]
pub struct Services {
    pub accounts: AccountRepository,
    pub keys: KeyRepository,
    pub stats: StatsAggregator,
    pub security_log: Arc<dyn SecurityLogStore>,
}

impl Services {
    pub fn new<S: Storage>(storage: Arc<S>, sampler: Arc<dyn ResourceSampler>) -> Self {
        let accounts = AccountRepository::new(storage.clone());
        Self {
            keys: KeyRepository::new(storage.clone()),
            stats: StatsAggregator::new(storage.clone(), accounts.clone(), sampler),
            security_log: storage,
            accounts,
        }
    }
}

/// Maps inbound command tokens to handlers behind the admin roster.
///
/// The dispatcher owns the roster; `/addadmin` and `/deladmin` mutate it through `&self`.
pub struct CommandDispatcher {
    services: Services,
    roster: AdminRoster,
    messenger: Arc<dyn MessagingPort>,
    settings: DispatchSettings,
}

impl CommandDispatcher {
    pub fn new(
        services: Services,
        roster: AdminRoster,
        messenger: Arc<dyn MessagingPort>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            services,
            roster,
            messenger,
            settings,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn roster(&self) -> &AdminRoster {
        &self.roster
    }

    /// Handle one inbound message. Never fails: every error ends as a reply or a log line.
    pub async fn dispatch(&self, msg: &InboundMessage) {
        let mut parts = msg.text.split_whitespace();
        let Some(token) = parts.next() else {
            return;
        };
        if !token.starts_with('/') {
            return;
        }
        let args: Vec<String> = parts.map(str::to_string).collect();
        let sender = &msg.sender;

        if !self.roster.is_admin(sender.user_id).await {
            self.reject(msg).await;
            return;
        }

        let Some(command) = Command::from_token(token) else {
            tracing::debug!(token, user_id = sender.user_id.0, "ignoring unknown command");
            return;
        };

        if command.tier() == Tier::SuperAdmin
            && !self.roster.is_authorized(sender.user_id, Tier::SuperAdmin).await
        {
            self.reject(msg).await;
            return;
        }

        tracing::info!(
            command = command.token(),
            user_id = sender.user_id.0,
            args = args.len(),
            "dispatching command"
        );

        let outcome = AssertUnwindSafe(self.run(command, sender, &args))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(Error::Internal(panic_message(payload.as_ref()))));

        match outcome {
            Ok(reply) => self.reply(msg.chat_id, &reply).await,
            Err(e) => self.report_failure(msg, command, e).await,
        }
    }

    async fn run(&self, command: Command, sender: &Sender, args: &[String]) -> crate::Result<String> {
        let now = Utc::now();
        match command {
            Command::Start => Ok(self.start(sender)),
            Command::Help => Ok(self.help(sender)),
            Command::GenKey => self.genkey(sender, args, now).await,
            Command::Keys => self.keys(now).await,
            Command::AllKeys => self.all_keys(now).await,
            Command::DelKey => self.delkey(args).await,
            Command::Users => self.users(now).await,
            Command::AllUsers => self.all_users(now).await,
            Command::Stats => self.services.stats.report().await,
            Command::Block => self.block(args, now).await,
            Command::Unblock => self.unblock(args).await,
            Command::Check => self.check(args, now).await,
            Command::Security => self.security().await,
            Command::AddAdmin => self.add_admin(sender, args).await,
            Command::DelAdmin => self.del_admin(sender, args).await,
            Command::Admins => Ok(self.admins().await),
        }
    }

    /// Unauthorized sender: audit, alert the operator, and answer with a bare denial.
    async fn reject(&self, msg: &InboundMessage) {
        let sender = &msg.sender;
        tracing::warn!(
            user_id = sender.user_id.0,
            username = sender.display_username(),
            "unauthorized command attempt"
        );

        let entry = SecurityLogEntry {
            username: sender.username.clone(),
            user_id: sender.user_id.0,
            command_text: msg.text.clone(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.services.security_log.append(&entry).await {
            tracing::error!(error = %e, "failed to record security log entry");
        }

        let alert = format!(
            "🚨 <b>Unauthorized access attempt</b>\n\nUser: @{} (<code>{}</code>)\nCommand: <code>{}</code>",
            escape_html(sender.display_username()),
            sender.user_id.0,
            escape_html(&truncate_text(&msg.text, 200)),
        );
        self.send(self.settings.operator_chat, &alert).await;
        self.send(msg.chat_id, DENIED_TEXT).await;
    }

    async fn report_failure(&self, msg: &InboundMessage, command: Command, e: Error) {
        if let Some(text) = e.user_message() {
            self.send(msg.chat_id, &format!("❌ {}", escape_html(text))).await;
            return;
        }

        tracing::error!(
            command = command.token(),
            user_id = msg.sender.user_id.0,
            error = %e,
            "command failed"
        );
        self.send(msg.chat_id, FAILURE_TEXT).await;

        if e.notifies_operator() {
            let alert = format!(
                "⚠️ <b>Command failed</b>\n\nCommand: <code>{}</code>\nUser: <code>{}</code>\nError: <code>{}</code>",
                command.token(),
                msg.sender.user_id.0,
                escape_html(&truncate_text(&e.to_string(), 500)),
            );
            self.send(self.settings.operator_chat, &alert).await;
        }
    }

    async fn reply(&self, chat_id: ChatId, html: &str) {
        let limit = self
            .settings
            .safe_limit
            .min(self.messenger.capabilities().max_message_len);
        for chunk in split_html_chunks(html, limit) {
            self.send(chat_id, &chunk).await;
        }
    }

    /// Send failures are logged and dropped; nothing is retried from here.
    async fn send(&self, chat_id: ChatId, html: &str) {
        if let Err(e) = self.messenger.send_html(chat_id, html).await {
            tracing::warn!(chat_id = chat_id.0, error = %e, "failed to send message");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
