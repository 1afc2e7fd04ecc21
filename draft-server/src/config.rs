//! The game configuration handed out by the external config service, plus the
//! HTTP client functions that fetch it. The director loads this once at
//! startup; a failure here is fatal.

use protocol::cards::SetPacks;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Startup resource failures. All of them end the process with exit code 1.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("config service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("no set selected for pack number {0}")]
    MissingSelectedPack(usize),
}

/// What is being handed to the players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum GameType {
    Draft,
    Sealed,
}

impl TryFrom<u8> for GameType {
    type Error = String;

    fn try_from(value: u8) -> Result<GameType, String> {
        match value {
            1 => Ok(GameType::Draft),
            2 => Ok(GameType::Sealed),
            other => Err(format!("unknown game type {other}")),
        }
    }
}

/// How the card pool for the game is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum GameMode {
    Regular,
    Cube,
    Chaos,
}

impl TryFrom<u8> for GameMode {
    type Error = String;

    fn try_from(value: u8) -> Result<GameMode, String> {
        match value {
            1 => Ok(GameMode::Regular),
            2 => Ok(GameMode::Cube),
            3 => Ok(GameMode::Chaos),
            other => Err(format!("unknown game mode {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftRegularOptions {
    pub total_packs: usize,
    /// Pack number (as a decimal string) to set abbreviation.
    pub selected_packs: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftCubeOptions {
    pub cards_per_pack: usize,
    pub total_packs: usize,
    pub cube_list: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DraftChaosOptions {
    pub total_packs: usize,
    pub only_modern: bool,
    pub total_chaos: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SealedRegularOptions {
    pub total_packs: usize,
    pub selected_packs: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SealedCubeOptions {
    pub cards_per_player: usize,
    pub cube_list: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SealedChaosOptions {
    pub total_packs: usize,
    pub only_modern: bool,
    pub total_chaos: bool,
}

/// Per-mode options of a draft game, keyed by the numeric mode on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DraftOptions {
    #[serde(rename = "1")]
    pub regular: DraftRegularOptions,
    #[serde(rename = "2")]
    pub cube: DraftCubeOptions,
    #[serde(rename = "3")]
    pub chaos: DraftChaosOptions,
}

/// Per-mode options of a sealed game.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SealedOptions {
    #[serde(rename = "1")]
    pub regular: SealedRegularOptions,
    #[serde(rename = "2")]
    pub cube: SealedCubeOptions,
    #[serde(rename = "3")]
    pub chaos: SealedChaosOptions,
}

/// The game-type level of the options document, keyed by the numeric type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModeMap {
    #[serde(rename = "1")]
    pub draft: DraftOptions,
    #[serde(rename = "2")]
    pub sealed: SealedOptions,
}

/// The configuration of one game as served by `GET {api}/game/{gameId}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralOptions {
    pub total_players: usize,
    #[serde(default)]
    pub game_title: String,
    #[serde(default)]
    pub private_game: bool,
    pub game_mode: GameMode,
    pub game_type: GameType,
    #[serde(default)]
    pub options: ModeMap,
}

/// Resolves the config service base address. `NODE_ENV=docker` points at the
/// in-compose service name, anything else at the local reverse proxy.
pub fn api_base_from_env() -> String {
    match std::env::var("NODE_ENV") {
        Ok(env) if env == "docker" => "http://api:8002".to_string(),
        _ => "http://localhost/api".to_string(),
    }
}

pub async fn fetch_general_options(
    client: &reqwest::Client,
    api: &str,
    game_id: &str,
) -> Result<GeneralOptions, ResourceError> {
    let response = client
        .get(format!("{api}/game/{game_id}"))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}

/// Fetches `n` freshly rolled boosters of the given set, one per seat.
pub async fn fetch_set_packs(
    client: &reqwest::Client,
    api: &str,
    set_abbrev: &str,
    total_players: usize,
) -> Result<SetPacks, ResourceError> {
    let response = client
        .get(format!("{api}/set/{set_abbrev}/pack?n={total_players}"))
        .send()
        .await?
        .error_for_status()?;
    Ok(response.json().await?)
}
