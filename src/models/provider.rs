use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::enums::{CareSetting, EvidenceTier, ProviderKind};

/// One cited mention of a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEvidence {
    pub page_number: u32,
    pub citation_id: String,
    pub tier: EvidenceTier,
}

/// A deduplicated provider entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: String,
    /// First raw mention, as written
    pub display_name: String,
    pub normalized_name: String,
    pub kind: ProviderKind,
    pub care_setting: CareSetting,
    pub first_seen: Option<NaiveDate>,
    pub last_seen: Option<NaiveDate>,
    pub event_count: u32,
    pub evidence: Vec<ProviderEvidence>,
}
