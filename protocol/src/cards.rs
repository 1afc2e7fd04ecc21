//! The card and booster-pack data model.
//!
//! The director never looks inside a card; it only moves cards between packs
//! and pools and serializes them back out. The named fields cover what the
//! client renders, and the flattened remainder keeps every other field of the
//! upstream card database intact across a round trip.

use serde::{Deserialize, Serialize};

/// A single card of a set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetCard {
    pub name: String,
    pub mana_cost: String,
    pub converted_mana_cost: f64,
    pub colors: Vec<String>,
    pub color_identity: Vec<String>,
    pub rarity: String,
    #[serde(rename = "type")]
    pub type_line: String,
    pub types: Vec<String>,
    pub text: String,
    pub number: String,
    pub artist: String,
    pub layout: String,
    pub uuid: String,
    pub scryfall_id: String,
    /// Everything else the card database ships that the server has no
    /// opinion about.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SetCard {
    /// A minimal card carrying just a name, enough for anything that treats
    /// cards as opaque values.
    pub fn named(name: impl Into<String>) -> SetCard {
        SetCard {
            name: name.into(),
            ..SetCard::default()
        }
    }
}

/// The pack a seat sees for one round, as sent in a `round_content` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPack {
    pub set_name: String,
    /// 1-based round within the pack.
    pub round: u32,
    /// 1-based pack number as shown to players.
    pub pack_number: usize,
    pub pack: Vec<SetCard>,
    /// Whole seconds available for this pick. Absent when the timer is off.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u64>,
}

/// Response of the config service's booster endpoint: one freshly rolled pack
/// per seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPacks {
    #[serde(rename = "Packs")]
    pub packs: Vec<Vec<SetCard>>,
}
