use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VodCategory {
    pub id: String,
    pub title: String,
}

/// A movie or series entry from an ordered VOD listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VodItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub id: String,
    pub name: String,
    pub cmd: Option<String>,
    /// Episode numbers available in this season
    pub episodes: Vec<u32>,
}
