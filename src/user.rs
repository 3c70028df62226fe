//! Account records for donors, recipients and administrators
use super::types::{Actor, BloodType, Role, TimeStamp};
use chrono::Utc;

pub const USER_KEY_PREFIX: &str = "user_";

/// One account. `last_donation` and `donation_count` are mutated only by
/// donation completion, never by the user directly. Eligibility is not
/// cached here; it is computed on demand from `last_donation`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "user_" hrp
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub blood_type: Option<BloodType>,
    #[n(4)]
    pub last_donation: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub donation_count: u32,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl User {
    pub fn new(id: String, name: String, role: Role, blood_type: Option<BloodType>) -> Self {
        Self {
            id,
            name,
            role,
            blood_type,
            last_donation: None,
            donation_count: 0,
            created_at: TimeStamp::new(),
        }
    }

    /// The caller identity this account presents to gated operations
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role)
    }
}
