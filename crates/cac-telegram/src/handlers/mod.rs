//! Telegram update handlers.
//!
//! Each text message is converted to a transport-agnostic `InboundMessage` and handed to the
//! core dispatcher on its own task, so the update loop is never held up by storage.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use cac_core::domain::{ChatId, InboundMessage, Sender, UserId};

use crate::router::AppState;

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(inbound) = to_inbound(&msg) else {
        return Ok(());
    };

    tokio::spawn(async move {
        state.dispatcher.dispatch(&inbound).await;
    });
    Ok(())
}

/// Text messages with a known sender only; everything else is ignored.
fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let text = msg.text()?;
    let user = msg.from()?;
    Some(inbound_from_parts(
        msg.chat.id.0,
        user.id.0,
        user.username.as_deref(),
        &user.first_name,
        text,
    ))
}

fn inbound_from_parts(
    chat_id: i64,
    user_id: u64,
    username: Option<&str>,
    first_name: &str,
    text: &str,
) -> InboundMessage {
    InboundMessage {
        chat_id: ChatId(chat_id),
        sender: Sender {
            user_id: UserId(user_id as i64),
            username: username.map(str::to_string),
            first_name: Some(first_name.to_string()).filter(|s| !s.is_empty()),
        },
        text: text.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_inbound_message() {
        let m = inbound_from_parts(-100, 6000, Some("root"), "Root", "  /block alice 24h \n");
        assert_eq!(m.chat_id, ChatId(-100));
        assert_eq!(m.sender.user_id, UserId(6000));
        assert_eq!(m.sender.username.as_deref(), Some("root"));
        assert_eq!(m.sender.first_name.as_deref(), Some("Root"));
        assert_eq!(m.text, "/block alice 24h");
    }

    #[test]
    fn empty_first_name_is_dropped() {
        let m = inbound_from_parts(1, 2, None, "", "/help");
        assert_eq!(m.sender.first_name, None);
        assert_eq!(m.sender.display_username(), "unknown");
    }
}
