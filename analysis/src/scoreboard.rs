//! Builds the per player statistics of a finished [`Game`].

use std::collections::HashMap;

use common::demo_analysis::{ScoreBoard, ScoreBoardPlayer, ScoreBoardTeam};

use crate::model::{Game, PlayerId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("frag {frag} references unknown player {player:?}")]
    DanglingFragPlayer { frag: usize, player: PlayerId },
    #[error("round {round} has unknown mvp {player:?}")]
    DanglingMvp { round: usize, player: PlayerId },
}

#[derive(Debug, Default)]
struct Tally {
    kills: usize,
    deaths: usize,
    assists: usize,
    headshots: usize,
    mvps: usize,
}

#[tracing::instrument(skip(game), fields(map = game.map()))]
pub fn build(game: &Game) -> Result<ScoreBoard, BuildError> {
    let mut tallies: HashMap<PlayerId, Tally> = HashMap::new();

    let known = |player: PlayerId| game.player(player).is_some();

    for (index, frag) in game.frags().iter().enumerate() {
        for player in [Some(frag.killer), Some(frag.victim), frag.assist]
            .into_iter()
            .flatten()
        {
            if !known(player) {
                return Err(BuildError::DanglingFragPlayer {
                    frag: index,
                    player,
                });
            }
        }

        // Suicides only count as a death
        if frag.killer != frag.victim {
            let killer = tallies.entry(frag.killer).or_default();
            killer.kills += 1;
            if frag.headshot {
                killer.headshots += 1;
            }
        }

        tallies.entry(frag.victim).or_default().deaths += 1;

        if let Some(assist) = frag.assist {
            tallies.entry(assist).or_default().assists += 1;
        }
    }

    for (index, round) in game.rounds().iter().enumerate() {
        if let Some(mvp) = round.mvp {
            if !known(mvp) {
                return Err(BuildError::DanglingMvp {
                    round: index,
                    player: mvp,
                });
            }
            tallies.entry(mvp).or_default().mvps += 1;
        }
    }

    let entry = |id: PlayerId| -> Option<ScoreBoardPlayer> {
        let player = game.player(id)?;
        let tally = tallies.get(&id);

        Some(ScoreBoardPlayer {
            name: player.name.clone(),
            steam_id: player.steam_id,
            kills: tally.map(|t| t.kills).unwrap_or(0),
            deaths: tally.map(|t| t.deaths).unwrap_or(0),
            assists: tally.map(|t| t.assists).unwrap_or(0),
            headshots: tally.map(|t| t.headshots).unwrap_or(0),
            mvps: tally.map(|t| t.mvps).unwrap_or(0),
        })
    };

    let teams = game
        .teams()
        .iter()
        .map(|team| {
            let mut players: Vec<_> = team.players.iter().filter_map(|p| entry(*p)).collect();
            sort_players(&mut players);

            ScoreBoardTeam {
                number: team.external_id,
                name: team.name.clone(),
                score: team.score,
                players,
            }
        })
        .collect();

    let mut unassigned: Vec<_> = game
        .players()
        .iter()
        .enumerate()
        .filter(|(_, p)| p.team.is_none())
        .filter_map(|(i, _)| entry(PlayerId(i)))
        .collect();
    sort_players(&mut unassigned);

    Ok(ScoreBoard {
        map: game.map().to_owned(),
        teams,
        unassigned,
    })
}

fn sort_players(players: &mut [ScoreBoardPlayer]) {
    players.sort_by(|a, b| {
        b.kills
            .cmp(&a.kills)
            .then(a.deaths.cmp(&b.deaths))
            .then_with(|| a.name.cmp(&b.name))
    });
}
