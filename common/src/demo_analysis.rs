#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreBoard {
    pub map: String,
    pub teams: Vec<ScoreBoardTeam>,
    /// Players that never joined a team (spectators, casters, bots that left)
    pub unassigned: Vec<ScoreBoardPlayer>,
}

impl ScoreBoard {
    pub fn players(&self) -> impl Iterator<Item = &ScoreBoardPlayer> {
        self.teams
            .iter()
            .flat_map(|t| t.players.iter())
            .chain(self.unassigned.iter())
    }

    pub fn player(&self, steam_id: u64) -> Option<&ScoreBoardPlayer> {
        self.players().find(|p| p.steam_id == steam_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreBoardTeam {
    pub number: i32,
    pub name: String,
    pub score: u32,
    pub players: Vec<ScoreBoardPlayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScoreBoardPlayer {
    pub name: String,
    pub steam_id: u64,
    pub kills: usize,
    pub deaths: usize,
    pub assists: usize,
    pub headshots: usize,
    pub mvps: usize,
}

impl ScoreBoardPlayer {
    /// Kills per death, a player without deaths reports their kill count
    pub fn kill_death_ratio(&self) -> f32 {
        if self.deaths == 0 {
            return self.kills as f32;
        }
        self.kills as f32 / self.deaths as f32
    }

    pub fn headshot_percentage(&self) -> f32 {
        if self.kills == 0 {
            return 0.0;
        }
        (self.headshots as f32 / self.kills as f32) * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Side {
    #[default]
    Unassigned,
    Spectator,
    Terrorist,
    CounterTerrorist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RoundWinReason {
    StillInProgress,
    BombExploded,
    VipEscaped,
    VipKilled,
    TSaved,
    CtStoppedEscape,
    RoundEndReasonTerroristsStopped,
    BombDefused,
    TKilled,
    CTKilled,
    Draw,
    HostageRescued,
    TimeRanOut,
    RoundEndReasonHostagesNotRescued,
    TerroristsNotEscaped,
    VipNotEscaped,
    GameStart,
    TSurrender,
    CTSurrender,
    TPlanted,
    CTReachedHostage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MvpReason {
    MostEliminations,
    BombPlanted,
    BombDefused,
}
