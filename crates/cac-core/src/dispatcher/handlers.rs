use chrono::{DateTime, Utc};

use super::{Command, CommandDispatcher};
use crate::{
    admins::Tier,
    block::{evaluate, BlockVerdict},
    domain::{Sender, UserId},
    errors::Error,
    formatting::{escape_html, format_date, format_timestamp, truncate_text},
    keys::KeyValidity,
    model::{Account, KeyIssuer},
    Result,
};

const GENKEY_USAGE: &str = "Usage: /genkey <days> | /genkey d <days> | /genkey h <hours>";

fn usage(command: Command) -> Error {
    let (args, _) = command.synopsis();
    Error::invalid(format!(
        "Usage: {} {}",
        command.token(),
        args.replace("&lt;", "<").replace("&gt;", ">")
    ))
}

fn arg(args: &[String], i: usize, command: Command) -> Result<&str> {
    args.get(i).map(String::as_str).ok_or_else(|| usage(command))
}

fn parse_user_id(raw: &str, command: Command) -> Result<UserId> {
    raw.parse::<i64>().map(UserId).map_err(|_| usage(command))
}

fn code(s: &str) -> String {
    format!("<code>{}</code>", escape_html(s))
}

fn block_line(verdict: &BlockVerdict) -> String {
    match verdict {
        BlockVerdict::NotBlocked { .. } => "✅ Not blocked".to_string(),
        BlockVerdict::Permanent { .. } => "⛔ Permanent block".to_string(),
        BlockVerdict::Timed {
            expires_at,
            hours_remaining,
            ..
        } => format!(
            "🔒 Blocked for {hours_remaining} more hours (until {})",
            format_timestamp(*expires_at)
        ),
    }
}

fn account_line(account: &Account, now: DateTime<Utc>) -> String {
    let sub = &account.subscription;
    let verdict = evaluate(&account.block_state, now);
    let lock = if verdict.is_blocked() { "🔒 " } else { "" };
    let expiry = match sub.end_date {
        Some(end) => format!(
            "until {} ({} days left)",
            format_date(end),
            sub.remaining_days(now)
        ),
        None => "no end date".to_string(),
    };
    let seen = account
        .last_activity()
        .map(format_date)
        .unwrap_or_else(|| "never".to_string());
    format!(
        "• {lock}{} | {} | {expiry} | last seen {seen}",
        code(&account.username),
        sub.status.as_str(),
    )
}

impl CommandDispatcher {
    pub(super) fn start(&self, sender: &Sender) -> String {
        let name = sender
            .first_name
            .as_deref()
            .or(sender.username.as_deref())
            .unwrap_or("admin");
        format!(
            "👋 Welcome, <b>{}</b>.\n\nThis is the checker admin console. Send /help for the command list.",
            escape_html(name)
        )
    }

    pub(super) fn help(&self, sender: &Sender) -> String {
        let is_super = self.roster.is_super_admin(sender.user_id);
        let line = |c: Command| {
            let (args, desc) = c.synopsis();
            if args.is_empty() {
                format!("{} - {desc}", c.token())
            } else {
                format!("{} {args} - {desc}", c.token())
            }
        };

        let mut out = vec!["📋 <b>Commands</b>".to_string(), String::new()];
        out.extend(
            Command::ALL
                .into_iter()
                .filter(|c| c.tier() == Tier::Admin)
                .map(line),
        );
        if is_super {
            out.push(String::new());
            out.push("👑 <b>Super admin</b>".to_string());
            out.extend(
                Command::ALL
                    .into_iter()
                    .filter(|c| c.tier() == Tier::SuperAdmin)
                    .map(line),
            );
        }
        out.join("\n")
    }

    pub(super) async fn genkey(
        &self,
        sender: &Sender,
        args: &[String],
        now: DateTime<Utc>,
    ) -> Result<String> {
        let validity = KeyValidity::parse_args(args, self.settings.default_key_days)
            .map_err(|e| Error::invalid(format!("{e}\n{GENKEY_USAGE}")))?;

        let issuer = KeyIssuer {
            admin_id: sender.user_id.0.to_string(),
            admin_username: sender.username.clone(),
            admin_name: sender.first_name.clone(),
        };
        let key = self.services.keys.generate(validity, Some(issuer), now).await?;

        Ok(format!(
            "✅ <b>Key generated</b>\n\n🔑 {}\n⏳ Validity: {validity}\n📅 Expires: {}",
            code(&key.key),
            format_timestamp(key.expires_at)
        ))
    }

    pub(super) async fn keys(&self, now: DateTime<Utc>) -> Result<String> {
        let recent = self
            .services
            .keys
            .list_recent(self.settings.recent_keys_limit)
            .await?;
        if recent.is_empty() {
            return Ok("🔑 No keys found.".to_string());
        }

        let mut out = vec![format!("🔑 <b>Recent keys</b> ({})", recent.len()), String::new()];
        for d in &recent {
            out.push(format!(
                "{} | {}d left | {} | {}",
                code(&d.key.key),
                d.key.remaining_days(now),
                d.usage.status_label(),
                escape_html(d.usage.used_by_label()),
            ));
        }
        Ok(out.join("\n"))
    }

    pub(super) async fn all_keys(&self, now: DateTime<Utc>) -> Result<String> {
        let keys = self.services.keys.list_all().await?;
        if keys.is_empty() {
            return Ok("🔑 No keys found.".to_string());
        }

        let valid = keys.iter().filter(|k| k.is_valid(now)).count();
        let mut out = vec![
            format!("🔑 <b>All keys</b> ({} total, {valid} redeemable)", keys.len()),
            String::new(),
        ];
        for k in &keys {
            let state = if k.used {
                "used"
            } else if k.is_valid(now) {
                "unused"
            } else {
                "expired"
            };
            out.push(format!(
                "{} | {state} | expires {}",
                code(&k.key),
                format_date(k.expires_at)
            ));
        }
        Ok(out.join("\n"))
    }

    pub(super) async fn delkey(&self, args: &[String]) -> Result<String> {
        let key = arg(args, 0, Command::DelKey)?;
        if !self.services.keys.delete(key).await? {
            return Err(Error::not_found(format!("Key {key} not found")));
        }
        Ok(format!("🗑️ Key {} deleted.", code(key)))
    }

    pub(super) async fn users(&self, now: DateTime<Utc>) -> Result<String> {
        let active = self.services.accounts.list_active(now).await?;
        if active.is_empty() {
            return Ok("👥 No active users.".to_string());
        }

        let mut out = vec![format!("👥 <b>Active users</b> ({})", active.len()), String::new()];
        out.extend(active.iter().map(|a| account_line(a, now)));
        Ok(out.join("\n"))
    }

    pub(super) async fn all_users(&self, now: DateTime<Utc>) -> Result<String> {
        let all = self.services.accounts.list_all().await?;
        if all.is_empty() {
            return Ok("👥 No users registered.".to_string());
        }

        let mut out = vec![format!("👥 <b>All users</b> ({})", all.len()), String::new()];
        out.extend(all.iter().map(|a| account_line(a, now)));
        Ok(out.join("\n"))
    }

    pub(super) async fn block(&self, args: &[String], now: DateTime<Utc>) -> Result<String> {
        let username = arg(args, 0, Command::Block)?;
        let code_arg = arg(args, 1, Command::Block)?;
        let reason = match args.get(2..) {
            Some(rest) if !rest.is_empty() => rest.join(" "),
            _ => "No reason given".to_string(),
        };

        let Some(applied) = self
            .services
            .accounts
            .block(username, code_arg, &reason, now)
            .await?
        else {
            return Err(Error::not_found(format!("User {username} not found")));
        };

        let until = match applied.blocked_until {
            Some(t) => format_timestamp(t),
            None => "never (permanent)".to_string(),
        };
        Ok(format!(
            "🔒 User {} blocked {}\n\nUntil: {until}\nReason: {}",
            code(username),
            applied.block_type.describe(),
            escape_html(&applied.reason)
        ))
    }

    pub(super) async fn unblock(&self, args: &[String]) -> Result<String> {
        let username = arg(args, 0, Command::Unblock)?;
        if !self.services.accounts.unblock(username).await? {
            return Err(Error::not_found(format!("User {username} not found")));
        }
        Ok(format!("🔓 User {} unblocked.", code(username)))
    }

    pub(super) async fn check(&self, args: &[String], now: DateTime<Utc>) -> Result<String> {
        let username = arg(args, 0, Command::Check)?;
        let Some(verdict) = self.services.accounts.check_block(username, now).await? else {
            return Err(Error::not_found(format!("User {username} not found")));
        };

        let mut out = vec![format!("👤 User {}", code(username)), String::new()];
        out.push(block_line(&verdict));
        if let Some(reason) = verdict.reason() {
            out.push(format!("Reason: {}", escape_html(reason)));
        }
        if verdict.needs_clear() {
            out.push("Expired block cleared.".to_string());
        }
        Ok(out.join("\n"))
    }

    pub(super) async fn security(&self) -> Result<String> {
        let entries = self
            .services
            .security_log
            .list_recent(self.settings.security_log_limit)
            .await?;
        if entries.is_empty() {
            return Ok("🛡️ No unauthorized attempts recorded.".to_string());
        }

        let mut out = vec![
            format!("🛡️ <b>Recent unauthorized attempts</b> ({})", entries.len()),
            String::new(),
        ];
        for e in &entries {
            out.push(format!(
                "• {} | @{} ({}) | {}",
                format_timestamp(e.timestamp),
                escape_html(e.username.as_deref().unwrap_or("unknown")),
                e.user_id,
                code(&truncate_text(&e.command_text, 200)),
            ));
        }
        Ok(out.join("\n"))
    }

    pub(super) async fn add_admin(&self, sender: &Sender, args: &[String]) -> Result<String> {
        let id = parse_user_id(arg(args, 0, Command::AddAdmin)?, Command::AddAdmin)?;
        let added = self.roster.add(sender.user_id, id).await?;
        tracing::info!(admin_id = id.0, added, "admin roster updated");
        Ok(if added {
            format!("✅ {} is now an admin.", code(&id.0.to_string()))
        } else {
            format!("ℹ️ {} is already an admin.", code(&id.0.to_string()))
        })
    }

    pub(super) async fn del_admin(&self, sender: &Sender, args: &[String]) -> Result<String> {
        let id = parse_user_id(arg(args, 0, Command::DelAdmin)?, Command::DelAdmin)?;
        let removed = self.roster.remove(sender.user_id, id).await?;
        tracing::info!(admin_id = id.0, removed, "admin roster updated");
        if !removed {
            return Err(Error::not_found(format!("{} is not an admin", id.0)));
        }
        Ok(format!("✅ {} is no longer an admin.", code(&id.0.to_string())))
    }

    pub(super) async fn admins(&self) -> String {
        let ids = self.roster.list().await;
        let mut out = vec![format!("👑 <b>Admins</b> ({})", ids.len()), String::new()];
        for id in ids {
            let marker = if self.roster.is_super_admin(id) { " (super admin)" } else { "" };
            out.push(format!("• {}{marker}", code(&id.0.to_string())));
        }
        out.join("\n")
    }
}
