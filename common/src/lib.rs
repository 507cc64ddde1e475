pub mod demo_analysis;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DemoInfo {
    pub map: String,
    pub server: String,
    pub duration_secs: u32,
}
