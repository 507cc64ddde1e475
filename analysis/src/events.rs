//! The events a demo decoder emits while it walks through a recording.
//!
//! Ids are the decoder's external ids: teams use the engine team number and
//! players their steam id. Codes (round end reason, mvp reason) are passed
//! through raw and resolved by the aggregator.

use common::demo_analysis::{MvpReason, RoundWinReason, Side};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Header {
    pub map_name: String,
    /// Playback time in seconds
    pub playback_time: f32,
    pub playback_ticks: u64,
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub client_name: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TeamInfo {
    pub id: i32,
    pub name: String,
    #[serde(default)]
    pub flag: Option<String>,
    #[serde(default)]
    pub side: Side,
    #[serde(default)]
    pub score: u32,
    #[serde(default)]
    pub first_half_score: u32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayerInfo {
    pub steam_id: u64,
    pub name: String,
    #[serde(default)]
    pub team: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoundEnded {
    pub winner: i32,
    pub reason: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoundMvp {
    pub player: u64,
    pub reason: i32,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlayerKilled {
    pub killer: u64,
    pub victim: u64,
    #[serde(default)]
    pub assist: Option<u64>,
    #[serde(default)]
    pub headshot: bool,
    #[serde(default)]
    pub penetrated_objects: u32,
    pub weapon: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BombSite {
    A,
    B,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BombEvent {
    #[serde(default)]
    pub player: Option<u64>,
    pub site: BombSite,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DemoEvent {
    HeaderParsed(Header),
    TeamParsed(TeamInfo),
    PlayerParsed(PlayerInfo),
    MatchStarted,
    MatchEnded,
    RoundStart,
    RoundEnd(RoundEnded),
    RoundMvp(RoundMvp),
    PlayerKilled(PlayerKilled),
    BombPlanted(BombEvent),
    BombDefused(BombEvent),
    BombExploded(BombEvent),
}

impl DemoEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::HeaderParsed(_) => "HeaderParsed",
            Self::TeamParsed(_) => "TeamParsed",
            Self::PlayerParsed(_) => "PlayerParsed",
            Self::MatchStarted => "MatchStarted",
            Self::MatchEnded => "MatchEnded",
            Self::RoundStart => "RoundStart",
            Self::RoundEnd(_) => "RoundEnd",
            Self::RoundMvp(_) => "RoundMvp",
            Self::PlayerKilled(_) => "PlayerKilled",
            Self::BombPlanted(_) => "BombPlanted",
            Self::BombDefused(_) => "BombDefused",
            Self::BombExploded(_) => "BombExploded",
        }
    }
}

// https://github.com/markus-wa/demoinfocs-golang/blob/205b0bb25e9f3e96e1d306d154199b4a6292940e/pkg/demoinfocs/events/events.go#L53
pub static ROUND_WIN_REASON: phf::Map<i32, RoundWinReason> = phf::phf_map! {
    0_i32 => RoundWinReason::StillInProgress,
    1_i32 => RoundWinReason::BombExploded,
    2_i32 => RoundWinReason::VipEscaped,
    3_i32 => RoundWinReason::VipKilled,
    4_i32 => RoundWinReason::TSaved,
    5_i32 => RoundWinReason::CtStoppedEscape,
    6_i32 => RoundWinReason::RoundEndReasonTerroristsStopped,
    7_i32 => RoundWinReason::BombDefused,
    8_i32 => RoundWinReason::TKilled,
    9_i32 => RoundWinReason::CTKilled,
    10_i32 => RoundWinReason::Draw,
    11_i32 => RoundWinReason::HostageRescued,
    12_i32 => RoundWinReason::TimeRanOut,
    13_i32 => RoundWinReason::RoundEndReasonHostagesNotRescued,
    14_i32 => RoundWinReason::TerroristsNotEscaped,
    15_i32 => RoundWinReason::VipNotEscaped,
    16_i32 => RoundWinReason::GameStart,
    17_i32 => RoundWinReason::TSurrender,
    18_i32 => RoundWinReason::CTSurrender,
    19_i32 => RoundWinReason::TPlanted,
    20_i32 => RoundWinReason::CTReachedHostage,
};

pub static MVP_REASON: phf::Map<i32, MvpReason> = phf::phf_map! {
    1_i32 => MvpReason::MostEliminations,
    2_i32 => MvpReason::BombPlanted,
    3_i32 => MvpReason::BombDefused,
};
