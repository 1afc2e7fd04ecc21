//! The message envelope that travels over the socket in both directions.
//!
//! Every frame is a JSON document `{"type": ..., "data": ...}` where `data`
//! is an opaque string. For the structured message kinds the string holds a
//! second JSON document, so payloads are double-encoded on the wire. That
//! shape is load-bearing for existing clients and must not change.

use serde::{Deserialize, Serialize};

/// The message kinds understood by the director and its clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMessageType {
    /// Broadcast whenever the roster changes; `data` is the client count.
    NewPlayer,
    /// Free-form chat, echoed verbatim to everyone.
    ChatMessage,
    /// Sent to the one client that just became host; `data` is `"1"`.
    HostChange,
    /// Host request to begin the draft; `data` is a [`TimerSettings`] document.
    StartGame,
    /// Broadcast when the draft is over; `data` is the client count.
    EndGame,
    /// A seat's pack for the new round; `data` is a [`crate::cards::CardPack`].
    RoundContent,
    /// A player's accumulated picks; `data` is a JSON array of cards.
    PoolContent,
    /// A player's pick; `data` is a [`ChooseCardJson`] document.
    ChooseCard,
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: GameMessageType,
    pub data: String,
}

impl Message {
    pub fn new(kind: GameMessageType, data: impl Into<String>) -> Message {
        Message {
            kind,
            data: data.into(),
        }
    }
}

/// Payload of a `start_game` request. An empty string disables the round
/// timer; the recognized values are listed in [`crate::timer::RoundTimer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    pub timer: String,
}

/// Payload of a `choose_card` request. The index is signed so an out-of-range
/// value like `-1` surfaces as a protocol error instead of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChooseCardJson {
    #[serde(rename = "pickedCardIndex")]
    pub picked_card_index: i64,
}
