//! Booster-pack resources loaded from the config service before the director
//! starts, and the per-pack round table the director drafts from.

use crate::config::{self, GameMode, GameType, GeneralOptions, ResourceError};
use protocol::cards::SetCard;
use std::collections::HashMap;

/// One pack number's worth of boosters: the pack currently in front of each
/// seat. A `None` entry means that seat already picked this round.
#[derive(Debug, Clone, Default)]
pub struct DraftRound {
    pub set_abbreviation: String,
    pub player_packs: HashMap<usize, Option<Vec<SetCard>>>,
}

impl DraftRound {
    pub fn new(set_abbreviation: impl Into<String>, packs: Vec<Vec<SetCard>>) -> DraftRound {
        DraftRound {
            set_abbreviation: set_abbreviation.into(),
            player_packs: packs
                .into_iter()
                .enumerate()
                .map(|(seat, pack)| (seat, Some(pack)))
                .collect(),
        }
    }
}

/// Everything the director needs before the first client connects.
#[derive(Debug, Clone, Default)]
pub struct DraftResources {
    /// Pack number to the boosters dealt for it. Only populated for regular
    /// drafts; the other modes load their pools elsewhere.
    pub round_packs: HashMap<usize, DraftRound>,
    pub total_packs: usize,
}

impl DraftResources {
    /// Loads the resources the configured game needs. For a regular draft
    /// that is one set of boosters per pack number; the cube, chaos and
    /// sealed variants only account for their pack totals here.
    pub async fn load(
        client: &reqwest::Client,
        api: &str,
        options: &GeneralOptions,
    ) -> Result<DraftResources, ResourceError> {
        match (options.game_type, options.game_mode) {
            (GameType::Draft, GameMode::Regular) => {
                let opts = &options.options.draft.regular;
                let mut round_packs = HashMap::new();
                for pack_number in 0..opts.total_packs {
                    let set_abbrev = opts
                        .selected_packs
                        .get(&pack_number.to_string())
                        .ok_or(ResourceError::MissingSelectedPack(pack_number))?;
                    let boosters =
                        config::fetch_set_packs(client, api, set_abbrev, options.total_players)
                            .await?;
                    round_packs
                        .insert(pack_number, DraftRound::new(set_abbrev.clone(), boosters.packs));
                }
                Ok(DraftResources {
                    round_packs,
                    total_packs: opts.total_packs,
                })
            }
            (GameType::Draft, GameMode::Cube) => {
                let opts = &options.options.draft.cube;
                tracing::debug!(
                    total_packs = opts.total_packs,
                    cards_per_pack = opts.cards_per_pack,
                    cube_list = %opts.cube_list,
                    "accounted cube draft resources"
                );
                Ok(DraftResources::counted(opts.total_packs))
            }
            (GameType::Draft, GameMode::Chaos) => {
                let opts = &options.options.draft.chaos;
                tracing::debug!(
                    total_packs = opts.total_packs,
                    only_modern = opts.only_modern,
                    total_chaos = opts.total_chaos,
                    "accounted chaos draft resources"
                );
                Ok(DraftResources::counted(opts.total_packs))
            }
            (GameType::Sealed, GameMode::Regular) => {
                let opts = &options.options.sealed.regular;
                tracing::debug!(
                    total_packs = opts.total_packs,
                    selected_sets = opts.selected_packs.len(),
                    "accounted sealed resources"
                );
                Ok(DraftResources::counted(opts.total_packs))
            }
            (GameType::Sealed, GameMode::Cube) => {
                let opts = &options.options.sealed.cube;
                tracing::debug!(
                    cards_per_player = opts.cards_per_player,
                    cube_list = %opts.cube_list,
                    "accounted sealed cube resources"
                );
                // A sealed cube is always a single pool per player.
                Ok(DraftResources::counted(1))
            }
            (GameType::Sealed, GameMode::Chaos) => {
                let opts = &options.options.sealed.chaos;
                tracing::debug!(
                    total_packs = opts.total_packs,
                    only_modern = opts.only_modern,
                    total_chaos = opts.total_chaos,
                    "accounted sealed chaos resources"
                );
                Ok(DraftResources::counted(opts.total_packs))
            }
        }
    }

    fn counted(total_packs: usize) -> DraftResources {
        DraftResources {
            round_packs: HashMap::new(),
            total_packs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_seats_follow_booster_order() {
        let round = DraftRound::new(
            "M19",
            vec![
                vec![SetCard::named("Shock")],
                vec![SetCard::named("Opt")],
            ],
        );
        assert_eq!(round.player_packs.len(), 2);
        assert_eq!(
            round.player_packs[&1].as_ref().unwrap()[0].name,
            "Opt"
        );
    }
}
