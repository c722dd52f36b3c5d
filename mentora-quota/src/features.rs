use serde::{Deserialize, Serialize};

use crate::period::ResetPeriod;

/// Quota-limited features of the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureKind {
    AiChatbotRequests,
    AiRoadmapGeneration,
    MentorBooking,
}

impl FeatureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::AiChatbotRequests => "AI_CHATBOT_REQUESTS",
            FeatureKind::AiRoadmapGeneration => "AI_ROADMAP_GENERATION",
            FeatureKind::MentorBooking => "MENTOR_BOOKING",
        }
    }
}

/// Ceiling and reset cadence for one feature. A feature with no policy
/// configured is unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaPolicy {
    pub ceiling: u32,
    pub reset: ResetPeriod,
}
