use common::demo_analysis::{MvpReason, RoundWinReason, Side};

use crate::events::Header;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct TeamId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct PlayerId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct RoundId(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct FragId(pub(crate) usize);

macro_rules! index_handle {
    ($($name:ident),*) => {
        $(
            impl $name {
                pub fn index(&self) -> usize {
                    self.0
                }
            }
        )*
    };
}

index_handle!(TeamId, PlayerId, RoundId, FragId);

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Team {
    pub external_id: i32,
    pub name: String,
    pub flag: Option<String>,
    pub score: u32,
    pub side: Side,
    pub first_half_score: u32,
    /// Membership only, the players themselves live in [`Game::players`]
    pub players: Vec<PlayerId>,
}

impl Team {
    pub(crate) fn new(external_id: i32) -> Self {
        Self {
            external_id,
            name: String::new(),
            flag: None,
            score: 0,
            side: Side::Unassigned,
            first_half_score: 0,
            players: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Player {
    pub steam_id: u64,
    pub name: String,
    pub team: Option<TeamId>,
    /// Frags where this player is the killer
    pub frags: Vec<FragId>,
}

impl Player {
    pub(crate) fn new(steam_id: u64) -> Self {
        Self {
            steam_id,
            name: String::new(),
            team: None,
            frags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct Round {
    pub winner: Option<TeamId>,
    pub end_reason: Option<RoundWinReason>,
    pub end_message: Option<String>,
    pub mvp: Option<PlayerId>,
    pub mvp_reason: Option<MvpReason>,
    pub frags: Vec<FragId>,
    /// A round start event was seen for this round. Only the round seeded by
    /// the match start can be `false` here.
    pub started: bool,
    pub ended: bool,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Frag {
    pub killer: PlayerId,
    pub victim: PlayerId,
    pub assist: Option<PlayerId>,
    pub headshot: bool,
    pub penetrated: bool,
    pub weapon: String,
}

impl Frag {
    pub fn new(
        killer: PlayerId,
        victim: PlayerId,
        assist: Option<PlayerId>,
        headshot: bool,
        penetrated_objects: u32,
        weapon: impl Into<String>,
    ) -> Self {
        Self {
            killer,
            victim,
            assist,
            headshot,
            penetrated: penetrated_objects > 0,
            weapon: weapon.into(),
        }
    }
}

/// The match as it has been reconstructed so far.
///
/// All collections are append-only while a match is running, handles into
/// them stay valid for the lifetime of the game.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct Game {
    pub(crate) header: Option<Header>,
    pub(crate) date: Option<chrono::DateTime<chrono::Local>>,
    pub(crate) started: bool,
    pub(crate) finished: bool,
    pub(crate) teams: Vec<Team>,
    pub(crate) players: Vec<Player>,
    pub(crate) rounds: Vec<Round>,
    pub(crate) frags: Vec<Frag>,
    pub(crate) current_round: Option<RoundId>,
    #[serde(skip)]
    pub(crate) registry: Registry,
}

impl Game {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn map(&self) -> &str {
        self.header.as_ref().map(|h| h.map_name.as_str()).unwrap_or("")
    }

    pub fn duration(&self) -> std::time::Duration {
        self.header
            .as_ref()
            .and_then(|h| std::time::Duration::try_from_secs_f32(h.playback_time).ok())
            .unwrap_or_default()
    }

    /// Wall clock time at which the header was parsed
    pub fn date(&self) -> Option<chrono::DateTime<chrono::Local>> {
        self.date
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn teams(&self) -> &[Team] {
        &self.teams
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn frags(&self) -> &[Frag] {
        &self.frags
    }

    pub fn team(&self, id: TeamId) -> Option<&Team> {
        self.teams.get(id.0)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(id.0)
    }

    pub fn round(&self, id: RoundId) -> Option<&Round> {
        self.rounds.get(id.0)
    }

    pub fn frag(&self, id: FragId) -> Option<&Frag> {
        self.frags.get(id.0)
    }

    pub fn team_by_external_id(&self, external_id: i32) -> Option<&Team> {
        self.registry.team(external_id).and_then(|id| self.team(id))
    }

    pub fn player_by_steam_id(&self, steam_id: u64) -> Option<&Player> {
        self.registry.player(steam_id).and_then(|id| self.player(id))
    }

    pub fn team_id(&self, external_id: i32) -> Option<TeamId> {
        self.registry.team(external_id)
    }

    pub fn player_id(&self, steam_id: u64) -> Option<PlayerId> {
        self.registry.player(steam_id)
    }

    pub fn current_round_id(&self) -> Option<RoundId> {
        self.current_round
    }

    pub fn current_round(&self) -> Option<&Round> {
        self.current_round.and_then(|id| self.round(id))
    }

    pub(crate) fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.current_round.and_then(|id| self.rounds.get_mut(id.0))
    }

    /// Iterates the frags of a player as killer
    pub fn frags_of(&self, player: PlayerId) -> impl Iterator<Item = &Frag> {
        self.player(player)
            .into_iter()
            .flat_map(|p| p.frags.iter())
            .filter_map(|f| self.frag(*f))
    }

    pub(crate) fn push_round(&mut self, round: Round) -> RoundId {
        let id = RoundId(self.rounds.len());
        self.rounds.push(round);
        self.current_round = Some(id);
        id
    }
}

/// The state of a run that was cancelled before the decoder reached the end
/// of the recording. Never a finished match.
#[derive(Debug, Clone)]
pub struct PartialGame(pub Game);

impl PartialGame {
    pub fn game(&self) -> &Game {
        &self.0
    }

    pub fn into_inner(self) -> Game {
        self.0
    }
}
