//! Chat events produced by connection handlers and consumed by the fanout.

use tcptalk_common::ServerLine;

/// A unit of broadcastable content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    Joined { name: String },
    Left { name: String },
    Message { name: String, body: String },
}

impl ChatEvent {
    /// Name of the session that produced the event.
    pub fn name(&self) -> &str {
        match self {
            ChatEvent::Joined { name } | ChatEvent::Left { name } => name,
            ChatEvent::Message { name, .. } => name,
        }
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ChatEvent::Joined { .. } => "joined",
            ChatEvent::Left { .. } => "left",
            ChatEvent::Message { .. } => "message",
        }
    }

    pub fn to_server_line(&self) -> ServerLine {
        match self {
            ChatEvent::Joined { name } => ServerLine::Join { name: name.clone() },
            ChatEvent::Left { name } => ServerLine::Leave { name: name.clone() },
            ChatEvent::Message { name, body } => ServerLine::Msg {
                name: name.clone(),
                body: body.clone(),
            },
        }
    }
}
