//! Maps the decoder's external ids onto the handles of the single
//! [`Team`]/[`Player`] stored for that id.

use std::collections::HashMap;

use crate::model::{Player, PlayerId, Team, TeamId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    teams: HashMap<i32, TeamId>,
    players: HashMap<u64, PlayerId>,
}

impl Registry {
    pub fn team(&self, external_id: i32) -> Option<TeamId> {
        self.teams.get(&external_id).copied()
    }

    pub fn player(&self, steam_id: u64) -> Option<PlayerId> {
        self.players.get(&steam_id).copied()
    }

    /// Returns the handle for `external_id`, appending a new unnamed team to
    /// `teams` if the id has not been seen before.
    pub fn get_or_create_team(&mut self, teams: &mut Vec<Team>, external_id: i32) -> TeamId {
        *self.teams.entry(external_id).or_insert_with(|| {
            tracing::trace!(external_id, "Creating team");

            let id = TeamId(teams.len());
            teams.push(Team::new(external_id));
            id
        })
    }

    pub fn get_or_create_player(&mut self, players: &mut Vec<Player>, steam_id: u64) -> PlayerId {
        *self.players.entry(steam_id).or_insert_with(|| {
            tracing::trace!(steam_id, "Creating player");

            let id = PlayerId(players.len());
            players.push(Player::new(steam_id));
            id
        })
    }
}
