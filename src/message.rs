use serde_json::{Map, Value};

use crate::address::Address;

/// Reserved control tags. User code must not send a tag that begins and
/// ends with a double underscore.
pub const TAG_PING: &str = "__ping__";
pub const TAG_PONG: &str = "__pong__";
pub const TAG_QUIT: &str = "__quit__";
pub const TAG_ADDRESS: &str = "__address__";
pub const TAG_LOW_LEVEL_PING: &str = "__low_level_ping__";
pub const TAG_EXCEPTION: &str = "__exception__";

/// The wildcard pattern key: matches any tag not otherwise listed.
pub const WILDCARD: &str = "_";
/// The pattern key selected when a `receive` call times out.
pub const TIMED_OUT: &str = "timed_out";

/// True for any tag reserved by the runtime (begins and ends with `__`).
pub fn is_reserved_tag(tag: &str) -> bool {
    tag.len() >= 4 && tag.starts_with("__") && tag.ends_with("__")
}

/// A string-keyed JSON record exchanged between actors.
///
/// The `tag` field identifies the message kind; `reply_to`, when present,
/// carries an [`Address`] the recipient can reply to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message(Map<String, Value>);

impl Message {
    pub fn new(tag: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("tag".to_string(), Value::String(tag.into()));
        Message(map)
    }

    /// Build from a raw JSON object, validating it has a string `tag`.
    pub fn from_value(value: Value) -> Option<Self> {
        let map = value.as_object()?.clone();
        if !matches!(map.get("tag"), Some(Value::String(_))) {
            return None;
        }
        Some(Message(map))
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn tag(&self) -> &str {
        match self.0.get("tag") {
            Some(Value::String(s)) => s.as_str(),
            _ => "",
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn reply_to(mut self, address: &Address) -> Self {
        self.0.insert(
            "reply_to".to_string(),
            serde_json::to_value(address).expect("Address always serializes"),
        );
        self
    }

    pub fn get_reply_to(&self) -> Option<Address> {
        self.0
            .get("reply_to")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_reply_to_host(&mut self, host: String) {
        if let Some(Value::Object(reply)) = self.0.get_mut("reply_to") {
            reply.insert("host".to_string(), Value::String(host));
        }
    }
}

/// Well-known control-plane message constructors.
impl Message {
    pub fn pong() -> Self {
        Message::new(TAG_PONG)
    }

    pub fn ping(reply_to: &Address) -> Self {
        Message::new(TAG_PING).reply_to(reply_to)
    }

    pub fn low_level_ping(reply_to_uri: &str) -> Self {
        Message::new(TAG_LOW_LEVEL_PING).field("reply_to", reply_to_uri)
    }

    pub fn address_query(reply_to: &Address) -> Self {
        Message::new(TAG_ADDRESS).reply_to(reply_to)
    }

    pub fn quit(confirm_to: Option<&Address>, confirm_msg: Option<Message>) -> Self {
        let mut m = Message::new(TAG_QUIT);
        if let Some(addr) = confirm_to {
            m = m.field(
                "confirm_to",
                serde_json::to_value(addr).expect("Address always serializes"),
            );
        }
        if let Some(msg) = confirm_msg {
            m = m.field("confirm_msg", msg.into_value());
        }
        m
    }

    pub fn closed() -> Self {
        Message::new("closed")
    }
}
