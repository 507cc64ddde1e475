//! Folds [`DemoEvent`]s into a [`Game`].
//!
//! Events have to be applied in the order the decoder produced them, the
//! aggregator itself is not synchronized.

use common::demo_analysis::ScoreBoard;

use crate::events::{
    DemoEvent, Header, PlayerInfo, PlayerKilled, RoundEnded, RoundMvp, TeamInfo, MVP_REASON,
    ROUND_WIN_REASON,
};
use crate::model::{Frag, FragId, Game, Round};
use crate::scoreboard::{self, BuildError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef {
    Team(i32),
    Player(u64),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Team(id) => write!(f, "team {}", id),
            Self::Player(id) => write!(f, "player {}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("event references unknown {0}")]
    UnknownEntityReference(EntityRef),
    #[error("building scoreboard: {0}")]
    ScoreBoard(#[from] BuildError),
}

#[derive(Debug, Default)]
pub struct MatchAggregator {
    game: Game,
    scoreboard: Option<std::sync::Arc<ScoreBoard>>,
}

impl MatchAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// The scoreboard published by the last match end
    pub fn scoreboard(&self) -> Option<std::sync::Arc<ScoreBoard>> {
        self.scoreboard.clone()
    }

    pub fn into_parts(self) -> (Game, Option<std::sync::Arc<ScoreBoard>>) {
        (self.game, self.scoreboard)
    }

    /// Builds and publishes the scoreboard if no match end has done so yet.
    pub fn finish(&mut self) -> Result<std::sync::Arc<ScoreBoard>, BuildError> {
        if let Some(board) = self.scoreboard.as_ref() {
            return Ok(board.clone());
        }

        let board = std::sync::Arc::new(scoreboard::build(&self.game)?);
        self.scoreboard = Some(board.clone());
        Ok(board)
    }

    /// Applies a single event.
    ///
    /// On error the game is left exactly as it was before the call.
    pub fn apply(&mut self, event: DemoEvent) -> Result<(), ApplyError> {
        tracing::trace!(event = event.name(), "Applying");

        match event {
            DemoEvent::HeaderParsed(header) => {
                self.header_parsed(header);
                Ok(())
            }
            DemoEvent::TeamParsed(team) => {
                self.team_parsed(team);
                Ok(())
            }
            DemoEvent::PlayerParsed(player) => {
                self.player_parsed(player);
                Ok(())
            }
            DemoEvent::MatchStarted => {
                self.match_started();
                Ok(())
            }
            DemoEvent::MatchEnded => self.match_ended(),
            DemoEvent::RoundStart => {
                self.round_start();
                Ok(())
            }
            DemoEvent::RoundEnd(ended) => self.round_end(ended),
            DemoEvent::RoundMvp(mvp) => self.round_mvp(mvp),
            DemoEvent::PlayerKilled(killed) => self.player_killed(killed),
            DemoEvent::BombPlanted(bomb) => {
                tracing::trace!(?bomb, "Bomb planted");
                Ok(())
            }
            DemoEvent::BombDefused(bomb) => {
                tracing::trace!(?bomb, "Bomb defused");
                Ok(())
            }
            DemoEvent::BombExploded(bomb) => {
                tracing::trace!(?bomb, "Bomb exploded");
                Ok(())
            }
        }
    }

    fn header_parsed(&mut self, header: Header) {
        tracing::debug!(map = %header.map_name, ticks = header.playback_ticks, "Parsed header");

        self.game.header = Some(header);
        self.game.date = Some(chrono::Local::now());
    }

    fn team_parsed(&mut self, info: TeamInfo) {
        let game = &mut self.game;
        let id = game.registry.get_or_create_team(&mut game.teams, info.id);

        let team = &mut game.teams[id.0];
        team.name = info.name;
        team.flag = info.flag;
        team.side = info.side;
        team.score = info.score;
        team.first_half_score = info.first_half_score;
    }

    fn player_parsed(&mut self, info: PlayerInfo) {
        let game = &mut self.game;

        let team = info
            .team
            .map(|team| game.registry.get_or_create_team(&mut game.teams, team));
        let id = game
            .registry
            .get_or_create_player(&mut game.players, info.steam_id);

        let player = &mut game.players[id.0];
        player.name = info.name;

        let previous = std::mem::replace(&mut player.team, team);
        if previous == team {
            if let Some(team) = team {
                let members = &mut game.teams[team.0].players;
                if !members.contains(&id) {
                    members.push(id);
                }
            }
            return;
        }

        if let Some(previous) = previous {
            tracing::debug!(steam_id = info.steam_id, "Player switched team");
            game.teams[previous.0].players.retain(|p| *p != id);
        }
        if let Some(team) = team {
            game.teams[team.0].players.push(id);
        }
    }

    fn match_started(&mut self) {
        tracing::debug!("Match started");

        let game = &mut self.game;
        game.started = true;
        game.finished = false;

        // Everything that referenced the old rounds goes with them
        game.rounds.clear();
        game.frags.clear();
        for player in game.players.iter_mut() {
            player.frags.clear();
        }
        game.push_round(Round::default());

        self.scoreboard = None;
    }

    fn match_ended(&mut self) -> Result<(), ApplyError> {
        tracing::debug!(rounds = self.game.rounds.len(), "Match ended");

        if self.scoreboard.is_some() {
            tracing::warn!("Match ended twice, keeping the first scoreboard");
            return Ok(());
        }

        let board = scoreboard::build(&self.game)?;
        self.scoreboard = Some(std::sync::Arc::new(board));

        // The last round stays current, its end and MVP can arrive after this
        self.game.finished = true;

        Ok(())
    }

    /// Whether round level events should be applied at all
    fn is_live(&self, event: &str) -> bool {
        if !self.game.started {
            tracing::debug!(event, "Ignoring event before match start");
            return false;
        }
        true
    }

    fn round_start(&mut self) {
        if !self.is_live("RoundStart") {
            return;
        }

        if let Some(round) = self.game.current_round_mut().filter(|r| !r.started) {
            round.started = true;
            return;
        }

        self.game.push_round(Round {
            started: true,
            ..Default::default()
        });
    }

    fn round_end(&mut self, ended: RoundEnded) -> Result<(), ApplyError> {
        if !self.is_live("RoundEnd") {
            return Ok(());
        }

        let winner = self
            .game
            .registry
            .team(ended.winner)
            .ok_or(ApplyError::UnknownEntityReference(EntityRef::Team(
                ended.winner,
            )))?;

        let reason = ROUND_WIN_REASON.get(&ended.reason).copied();
        if reason.is_none() {
            tracing::warn!(code = ended.reason, "Unknown round end reason");
        }

        let Some(round) = self.game.current_round_mut() else {
            return Ok(());
        };
        round.winner = Some(winner);
        round.end_reason = reason;
        round.end_message = Some(ended.message);
        round.ended = true;

        Ok(())
    }

    fn round_mvp(&mut self, mvp: RoundMvp) -> Result<(), ApplyError> {
        if !self.is_live("RoundMvp") {
            return Ok(());
        }

        let player = self
            .game
            .registry
            .player(mvp.player)
            .ok_or(ApplyError::UnknownEntityReference(EntityRef::Player(
                mvp.player,
            )))?;

        let reason = MVP_REASON.get(&mvp.reason).copied();

        let Some(round) = self.game.current_round_mut() else {
            return Ok(());
        };
        round.mvp = Some(player);
        round.mvp_reason = reason;

        Ok(())
    }

    fn player_killed(&mut self, killed: PlayerKilled) -> Result<(), ApplyError> {
        if !self.is_live("PlayerKilled") {
            return Ok(());
        }

        let registry = &self.game.registry;
        let resolve = |steam_id: u64| {
            registry
                .player(steam_id)
                .ok_or(ApplyError::UnknownEntityReference(EntityRef::Player(
                    steam_id,
                )))
        };

        let killer = resolve(killed.killer)?;
        let victim = resolve(killed.victim)?;
        let assist = match killed.assist {
            Some(assist) => Some(resolve(assist)?),
            None => None,
        };

        let Some(round) = self.game.current_round else {
            return Ok(());
        };

        let frag = Frag::new(
            killer,
            victim,
            assist,
            killed.headshot,
            killed.penetrated_objects,
            killed.weapon,
        );

        let game = &mut self.game;
        let id = FragId(game.frags.len());
        game.frags.push(frag);
        game.rounds[round.0].frags.push(id);
        game.players[killer.0].frags.push(id);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::*;
    use crate::model::RoundId;
    use common::demo_analysis::{MvpReason, RoundWinReason};
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn team(id: i32, name: &str) -> DemoEvent {
        DemoEvent::TeamParsed(TeamInfo {
            id,
            name: name.to_owned(),
            flag: None,
            side: Default::default(),
            score: 0,
            first_half_score: 0,
        })
    }

    fn player(steam_id: u64, name: &str, team: Option<i32>) -> DemoEvent {
        DemoEvent::PlayerParsed(PlayerInfo {
            steam_id,
            name: name.to_owned(),
            team,
        })
    }

    fn kill(killer: u64, victim: u64, assist: Option<u64>) -> DemoEvent {
        DemoEvent::PlayerKilled(PlayerKilled {
            killer,
            victim,
            assist,
            headshot: false,
            penetrated_objects: 0,
            weapon: "m4a1".to_owned(),
        })
    }

    fn aggregate(events: impl IntoIterator<Item = DemoEvent>) -> MatchAggregator {
        let mut aggregator = MatchAggregator::new();
        for event in events {
            aggregator.apply(event).unwrap();
        }
        aggregator
    }

    fn lobby() -> Vec<DemoEvent> {
        vec![
            team(2, "T"),
            team(3, "CT"),
            player(10, "a", Some(2)),
            player(20, "b", Some(3)),
            player(30, "c", Some(3)),
        ]
    }

    #[test]
    fn distinct_team_ids() {
        let aggregator = aggregate([team(1, "a"), team(2, "b"), team(1, "a2"), team(7, "c")]);
        let game = aggregator.game();

        assert_eq!(3, game.teams().len());
        assert_eq!("a2", game.team_by_external_id(1).unwrap().name);
        assert_eq!(game.team_id(1), game.team_id(1));
    }

    #[test]
    fn player_creates_missing_team() {
        let aggregator = aggregate([player(5, "lonely", Some(9))]);
        let game = aggregator.game();

        let team = game.team_by_external_id(9).unwrap();
        assert_eq!(vec![game.player_id(5).unwrap()], team.players);
        assert_eq!(game.team_id(9), game.player_by_steam_id(5).unwrap().team);
    }

    #[test]
    fn unassigned_player() {
        let aggregator = aggregate([team(2, "T"), player(5, "spec", None)]);
        let game = aggregator.game();

        assert_eq!(1, game.players().len());
        assert!(game.teams()[0].players.is_empty());
        assert_eq!(None, game.players()[0].team);
    }

    #[test]
    fn player_switches_team() {
        let mut events = lobby();
        events.push(player(10, "a-renamed", Some(3)));
        events.push(player(10, "a-renamed", Some(3)));
        let aggregator = aggregate(events);
        let game = aggregator.game();

        let id = game.player_id(10).unwrap();
        assert_eq!(3, game.players().len());
        assert!(game.team_by_external_id(2).unwrap().players.is_empty());
        assert_eq!(
            vec![game.player_id(20).unwrap(), game.player_id(30).unwrap(), id],
            game.team_by_external_id(3).unwrap().players
        );
        assert_eq!("a-renamed", game.player(id).unwrap().name);
    }

    #[test]
    fn round_count_matches_round_starts() {
        for n in 1..6 {
            let mut events = vec![DemoEvent::MatchStarted];
            events.extend(std::iter::repeat(DemoEvent::RoundStart).take(n));

            let aggregator = aggregate(events);
            assert_eq!(n, aggregator.game().rounds().len());
        }
    }

    #[test]
    fn match_start_seeds_round() {
        let aggregator = aggregate([DemoEvent::MatchStarted]);
        let game = aggregator.game();

        assert!(game.is_started());
        assert_eq!(1, game.rounds().len());
        assert_eq!(Some(&game.rounds()[0]), game.current_round());
    }

    #[test]
    #[traced_test]
    fn ignored_before_start() {
        let mut events = lobby();
        events.extend([
            DemoEvent::RoundStart,
            kill(10, 20, None),
            DemoEvent::RoundEnd(RoundEnded {
                winner: 2,
                reason: 9,
                message: String::new(),
            }),
            DemoEvent::RoundMvp(RoundMvp {
                player: 10,
                reason: 1,
            }),
        ]);
        let aggregator = aggregate(events);
        let game = aggregator.game();

        assert!(game.rounds().is_empty());
        assert!(game.frags().is_empty());
        assert!(logs_contain("Ignoring event before match start"));
    }

    #[test]
    fn kill_appends_to_three_places() {
        let mut events = lobby();
        events.extend([DemoEvent::MatchStarted, DemoEvent::RoundStart]);
        let mut aggregator = aggregate(events);

        for (i, event) in [kill(10, 20, None), kill(10, 30, Some(20))]
            .into_iter()
            .enumerate()
        {
            aggregator.apply(event).unwrap();

            let game = aggregator.game();
            let killer = game.player_by_steam_id(10).unwrap();
            assert_eq!(i + 1, game.frags().len());
            assert_eq!(i + 1, game.current_round().unwrap().frags.len());
            assert_eq!(i + 1, killer.frags.len());
        }

        let game = aggregator.game();
        assert_eq!(game.player_id(20), game.frags()[1].assist);
        assert!(game.player_by_steam_id(20).unwrap().frags.is_empty());
    }

    #[test]
    fn unknown_entities_leave_game_untouched() {
        let mut events = lobby();
        events.extend([DemoEvent::MatchStarted, DemoEvent::RoundStart]);
        let mut aggregator = aggregate(events);

        assert_eq!(
            Err(ApplyError::UnknownEntityReference(EntityRef::Player(99))),
            aggregator.apply(kill(10, 99, None))
        );
        assert_eq!(
            Err(ApplyError::UnknownEntityReference(EntityRef::Player(77))),
            aggregator.apply(kill(10, 20, Some(77)))
        );
        assert_eq!(
            Err(ApplyError::UnknownEntityReference(EntityRef::Team(5))),
            aggregator.apply(DemoEvent::RoundEnd(RoundEnded {
                winner: 5,
                reason: 9,
                message: String::new(),
            }))
        );
        assert_eq!(
            Err(ApplyError::UnknownEntityReference(EntityRef::Player(1))),
            aggregator.apply(DemoEvent::RoundMvp(RoundMvp { player: 1, reason: 1 }))
        );

        let game = aggregator.game();
        assert!(game.frags().is_empty());
        assert_eq!(&Round {
            started: true,
            ..Default::default()
        }, game.current_round().unwrap());
    }

    #[test]
    fn round_end_and_mvp_keep_separate_reasons() {
        let mut events = lobby();
        events.extend([
            DemoEvent::MatchStarted,
            DemoEvent::RoundStart,
            DemoEvent::RoundEnd(RoundEnded {
                winner: 3,
                reason: 9,
                message: "#SFUI_Notice_CTs_Win".to_owned(),
            }),
            DemoEvent::RoundMvp(RoundMvp {
                player: 20,
                reason: 1,
            }),
        ]);
        let aggregator = aggregate(events);
        let game = aggregator.game();
        let round = &game.rounds()[0];

        assert_eq!(game.team_id(3), round.winner);
        assert_eq!(Some(RoundWinReason::CTKilled), round.end_reason);
        assert_eq!(Some("#SFUI_Notice_CTs_Win"), round.end_message.as_deref());
        assert_eq!(game.player_id(20), round.mvp);
        assert_eq!(Some(MvpReason::MostEliminations), round.mvp_reason);
        assert!(round.ended);
    }

    #[test]
    fn post_round_kill_stays_in_round() {
        let mut events = lobby();
        events.extend([
            DemoEvent::MatchStarted,
            DemoEvent::RoundStart,
            DemoEvent::RoundEnd(RoundEnded {
                winner: 2,
                reason: 8,
                message: String::new(),
            }),
            kill(10, 30, None),
            DemoEvent::RoundStart,
        ]);
        let aggregator = aggregate(events);
        let game = aggregator.game();

        assert_eq!(2, game.rounds().len());
        assert_eq!(1, game.rounds()[0].frags.len());
        assert!(game.rounds()[1].frags.is_empty());
    }

    #[test]
    fn match_end_publishes_scoreboard_once() {
        let mut events = lobby();
        events.extend([
            DemoEvent::MatchStarted,
            DemoEvent::RoundStart,
            kill(10, 20, None),
            DemoEvent::MatchEnded,
        ]);
        let mut aggregator = aggregate(events);

        let board = aggregator.scoreboard().unwrap();
        assert_eq!(1, board.player(10).unwrap().kills);
        assert!(aggregator.game().is_finished());
        assert_eq!(Some(RoundId(0)), aggregator.game().current_round_id());

        aggregator.apply(kill(10, 30, None)).unwrap();
        aggregator.apply(DemoEvent::MatchEnded).unwrap();

        // The model keeps going, the published scoreboard does not
        assert_eq!(2, aggregator.game().frags().len());
        assert_eq!(1, board.player(10).unwrap().kills);
        assert!(std::sync::Arc::ptr_eq(&board, &aggregator.scoreboard().unwrap()));
        assert!(std::sync::Arc::ptr_eq(&board, &aggregator.finish().unwrap()));
    }

    #[test]
    fn round_events_after_match_end() {
        let mut events = lobby();
        events.extend([
            DemoEvent::MatchStarted,
            DemoEvent::RoundStart,
            DemoEvent::MatchEnded,
            DemoEvent::RoundEnd(RoundEnded {
                winner: 2,
                reason: 9,
                message: String::new(),
            }),
            DemoEvent::RoundMvp(RoundMvp {
                player: 10,
                reason: 1,
            }),
            kill(10, 20, None),
            DemoEvent::RoundStart,
        ]);
        let aggregator = aggregate(events);
        let game = aggregator.game();

        assert!(game.is_started());
        assert_eq!(2, game.rounds().len());

        let last = &game.rounds()[0];
        assert_eq!(game.team_id(2), last.winner);
        assert_eq!(game.player_id(10), last.mvp);
        assert_eq!(1, last.frags.len());
        assert!(last.ended);

        assert_eq!(Some(RoundId(1)), game.current_round_id());
        assert!(game.rounds()[1].started);
        assert_eq!(1, game.frags().len());
    }

    #[test]
    fn restart_clears_rounds_and_frags() {
        let mut events = lobby();
        events.extend([
            DemoEvent::MatchStarted,
            DemoEvent::RoundStart,
            kill(10, 20, None),
            DemoEvent::RoundStart,
            DemoEvent::MatchStarted,
        ]);
        let aggregator = aggregate(events);
        let game = aggregator.game();

        assert_eq!(1, game.rounds().len());
        assert!(game.frags().is_empty());
        assert!(game.players().iter().all(|p| p.frags.is_empty()));
        assert_eq!(3, game.players().len());
    }

    #[test]
    fn header_sets_metadata() {
        let aggregator = aggregate([DemoEvent::HeaderParsed(Header {
            map_name: "de_nuke".to_owned(),
            playback_time: 90.5,
            playback_ticks: 5792,
            server_name: "Valve".to_owned(),
            client_name: "GOTV".to_owned(),
        })]);
        let game = aggregator.game();

        assert_eq!("de_nuke", game.map());
        assert_eq!(std::time::Duration::from_secs_f32(90.5), game.duration());
        assert!(game.date().is_some());
    }

    #[test]
    fn bomb_events_change_nothing() {
        let mut events = lobby();
        events.push(DemoEvent::MatchStarted);
        let mut aggregator = aggregate(events);
        let before = aggregator.game().clone();

        for event in [
            DemoEvent::BombPlanted(BombEvent {
                player: Some(10),
                site: BombSite::A,
            }),
            DemoEvent::BombDefused(BombEvent {
                player: Some(20),
                site: BombSite::A,
            }),
            DemoEvent::BombExploded(BombEvent {
                player: None,
                site: BombSite::B,
            }),
        ] {
            aggregator.apply(event).unwrap();
        }

        assert_eq!(before.rounds(), aggregator.game().rounds());
        assert_eq!(before.players(), aggregator.game().players());
    }
}
