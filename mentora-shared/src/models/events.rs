use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub mentor_id: Uuid,
    pub learner_id: Uuid,
    pub session_start: i64,
    pub meeting_link: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub mentor_id: Uuid,
    pub learner_id: Uuid,
    pub reason: String,
    pub refund_due: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct QuotaDeniedEvent {
    pub user_id: Uuid,
    pub feature: String,
    pub period_start: i64,
    pub period_end: i64,
    pub timestamp: i64,
}
