use crate::proto;
use guildtalk::{Invocation, Permissions, Reply};

impl From<proto::InvokeRequest> for Invocation {
    fn from(req: proto::InvokeRequest) -> Self {
        Self {
            guild_id: req.guild_id,
            author: req.author,
            command: req.command,
            argument: req.argument,
            permissions: Permissions {
                manage_messages: req.manage_messages,
                administrator: req.administrator,
            },
            guild_ids: req.guild_ids,
        }
    }
}

impl From<Reply> for proto::Reply {
    fn from(reply: Reply) -> Self {
        let kind = match reply {
            Reply::Text(text) => proto::reply::Kind::Text(text),
            Reply::Typing => proto::reply::Kind::Typing(proto::Typing {}),
        };
        Self { kind: Some(kind) }
    }
}

impl proto::Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into()).into()
    }

    /// The posted text, if this is a text reply.
    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            Some(proto::reply::Kind::Text(text)) => Some(text),
            _ => None,
        }
    }
}
