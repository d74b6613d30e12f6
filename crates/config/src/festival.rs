//! Static festival dataset
//!
//! The markdown document is the domain knowledge embedded in the system
//! prompt. `FestivalInfo` is the structured subset served by the info
//! endpoint.

use serde::{Deserialize, Serialize};

const FESTIVAL_CONTEXT: &str = include_str!("../data/festival.md");

/// Full festival document, used verbatim as prompt context
pub fn festival_context() -> &'static str {
    FESTIVAL_CONTEXT
}

/// Headline facts about the festival
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FestivalInfo {
    pub festival_name: String,
    pub edition: String,
    pub dates: String,
    pub institution: String,
    pub prize_pool: String,
    pub theme: String,
    pub website: String,
    pub registration_url: String,
}

impl FestivalInfo {
    pub fn cognizance() -> Self {
        Self {
            festival_name: "Cognizance".to_string(),
            edition: "Cognizance'2026".to_string(),
            dates: "13th - 15th March 2026".to_string(),
            institution: "IIT Roorkee".to_string(),
            prize_pool: "50 Lacs INR".to_string(),
            theme: "Empyrean Technogenesis".to_string(),
            website: "https://www.cognizance.org.in".to_string(),
            registration_url: "https://www.cognizance.org.in/events".to_string(),
        }
    }
}

impl Default for FestivalInfo {
    fn default() -> Self {
        Self::cognizance()
    }
}
