//! Composer command parsing.
//!
//! Text starting with `/` is a command; anything else is a message.

use hangspace_proto::{ChatId, NotificationId, UserId};

/// A parsed composer line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain message text.
    Message {
        /// Text as typed.
        content: String,
    },
    /// `/open <chat_id>`
    Open {
        /// Chat to open.
        chat_id: ChatId,
    },
    /// `/close`
    Close,
    /// `/retry`
    Retry,
    /// `/edit <text>`: replace the body of our newest stored message
    Edit {
        /// Replacement text.
        content: String,
    },
    /// `/delete`: delete our newest stored message
    Delete,
    /// `/read <notification_id>`
    Read {
        /// Notification to mark.
        notification_id: NotificationId,
    },
    /// `/readall`
    ReadAll,
    /// `/clear <sender_id>`
    Clear {
        /// Sender whose message notifications to clear.
        sender_id: UserId,
    },
    /// `/refresh`
    Refresh,
    /// `/friends`
    Friends,
    /// `/add <user_id>`
    Add {
        /// User to befriend.
        user_id: UserId,
    },
    /// `/accept <request_id>`
    Accept {
        /// Request to accept.
        request_id: String,
    },
    /// `/decline <request_id>`
    Decline {
        /// Request to decline.
        request_id: String,
    },
    /// `/unfriend <user_id>`
    Remove {
        /// Friend to remove.
        friend_id: UserId,
    },
    /// `/dm <user_id>` or `/group <user_id>...`
    CreateChat {
        /// Other participants.
        participants: Vec<UserId>,
        /// Whether `/group` was used.
        is_group: bool,
    },
    /// `/reconnect`
    Reconnect,
    /// `/quit`
    Quit,
    /// Unrecognized command.
    Unknown {
        /// Raw input.
        input: String,
    },
    /// Known command with bad arguments.
    InvalidArgs {
        /// Command name without the slash.
        command: String,
        /// What was wrong.
        error: String,
    },
}

/// Parse one composer line.
pub fn parse(input: &str) -> Command {
    let Some(rest) = input.trim().strip_prefix('/') else {
        return Command::Message { content: input.to_string() };
    };

    let mut words = rest.split_whitespace();
    let Some(name) = words.next() else {
        return Command::Unknown { input: input.to_string() };
    };
    let args: Vec<&str> = words.collect();

    match name {
        "open" => one_arg(name, &args, |id| Command::Open { chat_id: ChatId::from(id) }),
        "close" => no_args(name, &args, Command::Close),
        "retry" => no_args(name, &args, Command::Retry),
        "edit" if args.is_empty() => Command::InvalidArgs {
            command: name.to_string(),
            error: "expected the new text".to_string(),
        },
        "edit" => Command::Edit { content: args.join(" ") },
        "delete" => no_args(name, &args, Command::Delete),
        "read" => one_arg(name, &args, |id| Command::Read {
            notification_id: NotificationId::from(id),
        }),
        "readall" => no_args(name, &args, Command::ReadAll),
        "clear" => one_arg(name, &args, |id| Command::Clear { sender_id: UserId::from(id) }),
        "refresh" => no_args(name, &args, Command::Refresh),
        "friends" => no_args(name, &args, Command::Friends),
        "add" => one_arg(name, &args, |id| Command::Add { user_id: UserId::from(id) }),
        "accept" => one_arg(name, &args, |id| Command::Accept { request_id: id.to_string() }),
        "decline" => one_arg(name, &args, |id| Command::Decline { request_id: id.to_string() }),
        "unfriend" => one_arg(name, &args, |id| Command::Remove { friend_id: UserId::from(id) }),
        "dm" => one_arg(name, &args, |id| Command::CreateChat {
            participants: vec![UserId::from(id)],
            is_group: false,
        }),
        "group" if args.is_empty() => Command::InvalidArgs {
            command: name.to_string(),
            error: "expected at least one user id".to_string(),
        },
        "group" => Command::CreateChat {
            participants: args.iter().map(|id| UserId::from(*id)).collect(),
            is_group: true,
        },
        "reconnect" => no_args(name, &args, Command::Reconnect),
        "quit" | "q" => no_args(name, &args, Command::Quit),
        _ => Command::Unknown { input: input.to_string() },
    }
}

fn one_arg(name: &str, args: &[&str], build: impl FnOnce(&str) -> Command) -> Command {
    match args {
        [arg] => build(arg),
        _ => Command::InvalidArgs {
            command: name.to_string(),
            error: "expected exactly one argument".to_string(),
        },
    }
}

fn no_args(name: &str, args: &[&str], command: Command) -> Command {
    if args.is_empty() {
        command
    } else {
        Command::InvalidArgs { command: name.to_string(), error: "takes no arguments".to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_message() {
        assert_eq!(parse("hello there"), Command::Message { content: "hello there".into() });
    }

    #[test]
    fn open_takes_one_argument() {
        assert_eq!(parse("/open c1"), Command::Open { chat_id: ChatId::from("c1") });
        assert!(matches!(parse("/open"), Command::InvalidArgs { .. }));
        assert!(matches!(parse("/open a b"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn group_collects_participants() {
        assert_eq!(parse("/group u1 u2"), Command::CreateChat {
            participants: vec![UserId::from("u1"), UserId::from("u2")],
            is_group: true,
        });
        assert!(matches!(parse("/group"), Command::InvalidArgs { .. }));
    }

    #[test]
    fn edit_keeps_the_whole_text() {
        assert_eq!(parse("/edit hello  there"), Command::Edit { content: "hello there".into() });
        assert!(matches!(parse("/edit"), Command::InvalidArgs { .. }));
        assert_eq!(parse("/delete"), Command::Delete);
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("/dance"), Command::Unknown { input: "/dance".into() });
        assert_eq!(parse("/"), Command::Unknown { input: "/".into() });
    }

    #[test]
    fn no_arg_commands_reject_arguments() {
        assert_eq!(parse("/readall"), Command::ReadAll);
        assert!(matches!(parse("/readall now"), Command::InvalidArgs { .. }));
        assert_eq!(parse("  /q "), Command::Quit);
    }
}
