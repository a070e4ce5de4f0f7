use serde::{Deserialize, Deserializer, Serialize};

/// Conservative per-chunk character limit shared by every supported target.
///
/// Both platforms publish larger limits, but long payloads are rejected
/// unpredictably well before them.
pub const RELAY_CHAR_LIMIT: usize = 2000;

/// Relay progress of a stored message. The only allowed transition is
/// `Pending -> Relayed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Pending,
    Relayed,
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Relayed => write!(f, "relayed"),
        }
    }
}

impl std::str::FromStr for RelayState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "relayed" => Ok(Self::Relayed),
            other => Err(format!("unknown relay state: {other}")),
        }
    }
}

/// Destination platform for relayed messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RelayTarget {
    /// Relay disabled; dispatch short-circuits.
    #[default]
    None,
    /// Slack-style incoming webhook (`text` + `blocks`).
    Slack,
    /// Discord-style webhook (`content` + `embeds`).
    Discord,
}

impl RelayTarget {
    /// Maximum characters per delivered chunk, or `None` when relay is off.
    pub fn char_limit(self) -> Option<usize> {
        match self {
            Self::None => None,
            Self::Slack | Self::Discord => Some(RELAY_CHAR_LIMIT),
        }
    }
}

impl std::fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Slack => write!(f, "slack"),
            Self::Discord => write!(f, "discord"),
        }
    }
}

impl std::str::FromStr for RelayTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "slack" => Ok(Self::Slack),
            "discord" => Ok(Self::Discord),
            other => Err(format!("unknown relay target: {other}")),
        }
    }
}

/// When ingested messages are forwarded.
///
/// Config and env values go through [`FromStr`](std::str::FromStr), so they
/// accept the same spellings as the `--mode` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum RelayMode {
    /// Never relay; records stay pending for a later run.
    #[default]
    Off,
    /// Sweep all pending records after ingestion finishes.
    Database,
    /// Relay each record right after it is stored.
    Receipt,
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Database => write!(f, "database"),
            Self::Receipt => write!(f, "receipt"),
        }
    }
}

impl std::str::FromStr for RelayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" | "" => Ok(Self::Off),
            "database" | "backlog" => Ok(Self::Database),
            "receipt" | "immediate" => Ok(Self::Receipt),
            other => Err(format!("unknown relay mode: {other}")),
        }
    }
}

impl TryFrom<String> for RelayTarget {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<String> for RelayMode {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A persisted message row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub channel: String,
    /// Source timestamp; doubles as the pagination cursor.
    pub timestamp: f64,
    /// Raw JSON envelope exactly as received from the source.
    pub body: String,
    pub relay_state: RelayState,
    pub created_at: String,
    pub relayed_at: Option<String>,
}

impl MessageRecord {
    /// Decode the stored envelope.
    pub fn message(&self) -> serde_json::Result<SourceMessage> {
        serde_json::from_str(&self.body)
    }
}

/// The fields of a source message the pipeline relies on.
///
/// Unknown fields are ignored here; the full envelope is kept verbatim in
/// [`MessageRecord::body`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SourceMessage {
    #[serde(deserialize_with = "de_timestamp")]
    pub ts: f64,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default, deserialize_with = "de_text")]
    pub text: String,
    #[serde(default)]
    pub client_msg_id: Option<String>,
}

impl SourceMessage {
    /// Identifier used for the profile lookup. Bot posts carry no `user`.
    pub fn sender_id(&self) -> &str {
        self.user
            .as_deref()
            .or(self.bot_id.as_deref())
            .unwrap_or("unknown")
    }
}

/// Display metadata for a message sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileInfo {
    pub name: String,
    pub handle: String,
    pub avatar: Option<String>,
}

impl ProfileInfo {
    /// Placeholder used when the profile lookup fails.
    pub fn fallback(sender_id: &str) -> Self {
        Self {
            name: format!("Unknown User {sender_id}"),
            handle: sender_id.to_string(),
            avatar: None,
        }
    }
}

/// Source timestamps arrive as decimal strings (`"1630447200.000100"`).
fn de_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(d)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn de_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}
