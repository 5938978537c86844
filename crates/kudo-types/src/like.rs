use serde::{Deserialize, Serialize};

/// Outcome of one call against the external like-action API.
///
/// The three variants mirror the service's contract: likes delivered,
/// target account already at its like cap, or the call failed outright
/// (transport error, decode error, or a status we don't recognize).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LikeOutcome {
    Delivered(LikeDelivery),
    Saturated,
    Failed { detail: Option<String> },
}

/// Fields reported by the action API on a successful delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeDelivery {
    pub nickname: String,
    pub likes_before: i64,
    pub likes_added: i64,
    pub likes_after: i64,
}
