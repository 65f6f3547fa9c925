use crate::events::MessageEvent;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    PostPanel,
}

/// Recognizes the panel trigger. Only exact matches from non-bot
/// administrators count; everything else is chatter.
pub fn parse_admin_command(event: &MessageEvent, panel_command: &str) -> Option<AdminCommand> {
    if event.author_is_bot || !event.author_is_admin {
        return None;
    }

    (event.content.trim() == panel_command.trim()).then_some(AdminCommand::PostPanel)
}
