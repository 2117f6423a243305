use crate::admins::Tier;

/// Every command the console answers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Help,
    GenKey,
    Keys,
    AllKeys,
    DelKey,
    Users,
    AllUsers,
    Stats,
    Block,
    Unblock,
    Check,
    Security,
    AddAdmin,
    DelAdmin,
    Admins,
}

impl Command {
    /// Order used by `/help`.
    pub const ALL: [Command; 16] = [
        Command::Start,
        Command::Help,
        Command::GenKey,
        Command::Keys,
        Command::AllKeys,
        Command::DelKey,
        Command::Users,
        Command::AllUsers,
        Command::Check,
        Command::Block,
        Command::Unblock,
        Command::Stats,
        Command::Security,
        Command::AddAdmin,
        Command::DelAdmin,
        Command::Admins,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Self::Start => "/start",
            Self::Help => "/help",
            Self::GenKey => "/genkey",
            Self::Keys => "/keys",
            Self::AllKeys => "/allkeys",
            Self::DelKey => "/delkey",
            Self::Users => "/users",
            Self::AllUsers => "/allusers",
            Self::Stats => "/stats",
            Self::Block => "/block",
            Self::Unblock => "/unblock",
            Self::Check => "/check",
            Self::Security => "/security",
            Self::AddAdmin => "/addadmin",
            Self::DelAdmin => "/deladmin",
            Self::Admins => "/admins",
        }
    }

    /// Exact, case-sensitive match. A `@botname` suffix (group chats) is ignored.
    pub fn from_token(token: &str) -> Option<Self> {
        let bare = token.split_once('@').map_or(token, |(cmd, _)| cmd);
        Self::ALL.into_iter().find(|c| c.token() == bare)
    }

    pub fn tier(self) -> Tier {
        match self {
            Self::AddAdmin | Self::DelAdmin | Self::Admins => Tier::SuperAdmin,
            _ => Tier::Admin,
        }
    }

    /// Argument synopsis and one-line description for `/help`.
    pub fn synopsis(self) -> (&'static str, &'static str) {
        match self {
            Self::Start => ("", "Show the welcome message"),
            Self::Help => ("", "List available commands"),
            Self::GenKey => ("[days | d &lt;days&gt; | h &lt;hours&gt;]", "Generate an access key"),
            Self::Keys => ("", "Show the most recent keys"),
            Self::AllKeys => ("", "Show every key"),
            Self::DelKey => ("&lt;key&gt;", "Delete a key"),
            Self::Users => ("", "Show active users"),
            Self::AllUsers => ("", "Show every user"),
            Self::Stats => ("", "Show system statistics"),
            Self::Block => ("&lt;user&gt; &lt;24h|48h|week|permanent&gt; [reason]", "Block a user"),
            Self::Unblock => ("&lt;user&gt;", "Unblock a user"),
            Self::Check => ("&lt;user&gt;", "Show a user's block status"),
            Self::Security => ("", "Show recent unauthorized attempts"),
            Self::AddAdmin => ("&lt;id&gt;", "Grant admin access"),
            Self::DelAdmin => ("&lt;id&gt;", "Revoke admin access"),
            Self::Admins => ("", "List admins"),
        }
    }
}
