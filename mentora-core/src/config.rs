use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub quota: QuotaRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// How long a reservation hold lives, matching the gateway's intent lifetime
    #[serde(default = "default_hold_seconds")]
    pub slot_hold_seconds: u64,
    #[serde(default = "default_auto_cancel_hours")]
    pub pending_auto_cancel_hours: i64,
    /// A CONFIRMED booking may only be cancelled up to this long before it starts
    #[serde(default = "default_cutoff_hours")]
    pub cancellation_cutoff_hours: i64,
    #[serde(default = "default_payout_rate")]
    pub mentor_payout_rate: f64,
    #[serde(default = "default_meeting_base_url")]
    pub meeting_base_url: String,
}

fn default_hold_seconds() -> u64 {
    900
}
fn default_auto_cancel_hours() -> i64 {
    24
}
fn default_cutoff_hours() -> i64 {
    24
}
fn default_payout_rate() -> f64 {
    0.80
}
fn default_meeting_base_url() -> String {
    "https://meet.jit.si".to_string()
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            slot_hold_seconds: default_hold_seconds(),
            pending_auto_cancel_hours: default_auto_cancel_hours(),
            cancellation_cutoff_hours: default_cutoff_hours(),
            mentor_payout_rate: default_payout_rate(),
            meeting_base_url: default_meeting_base_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuotaRules {
    #[serde(default = "default_chat_daily")]
    pub ai_chat_daily: u32,
    #[serde(default = "default_roadmap_monthly")]
    pub ai_roadmap_monthly: u32,
    #[serde(default = "default_booking_monthly")]
    pub mentor_booking_monthly: u32,
}

fn default_chat_daily() -> u32 {
    10
}
fn default_roadmap_monthly() -> u32 {
    3
}
fn default_booking_monthly() -> u32 {
    5
}

impl Default for QuotaRules {
    fn default() -> Self {
        Self {
            ai_chat_daily: default_chat_daily(),
            ai_roadmap_monthly: default_roadmap_monthly(),
            mentor_booking_monthly: default_booking_monthly(),
        }
    }
}

impl EngineConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Settings from the environment, e.g. MENTORA__BUSINESS_RULES__SLOT_HOLD_SECONDS=600
            .add_source(config::Environment::with_prefix("MENTORA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
