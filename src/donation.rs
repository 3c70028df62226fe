//! Donation records and their lifecycle state machine
use super::types::{BloodType, TimeStamp};
use chrono::Utc;
use std::fmt;

pub const DONATION_KEY_PREFIX: &str = "don_";

pub const MIN_UNITS_COLLECTED: u32 = 1;
pub const MAX_UNITS_COLLECTED: u32 = 2;

/// Lifecycle: `Scheduled -> {Completed, Cancelled, Rejected}`, all
/// terminal. A record in a terminal state never transitions again.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonationStatus {
    #[n(0)]
    Scheduled,
    #[n(1)]
    Completed,
    #[n(2)]
    Cancelled,
    #[n(3)]
    Rejected,
}

impl DonationStatus {
    pub fn can_transition_to(self, target: DonationStatus) -> bool {
        use DonationStatus::*;
        matches!(
            (self, target),
            (Scheduled, Completed) | (Scheduled, Cancelled) | (Scheduled, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, DonationStatus::Scheduled)
    }
}

impl fmt::Display for DonationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DonationStatus::Scheduled => "scheduled",
            DonationStatus::Completed => "completed",
            DonationStatus::Cancelled => "cancelled",
            DonationStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Staff-entered vitals taken at the chair. The `eligible` flag is the
/// operator's judgement and is recorded as-is; completion does not enforce
/// it.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct PreScreening {
    #[n(0)]
    pub weight_kg: f32,
    #[n(1)]
    pub blood_pressure: String,
    #[n(2)]
    pub pulse: u32,
    #[n(3)]
    pub temperature_c: f32,
    #[n(4)]
    pub hemoglobin: f32,
    #[n(5)]
    pub eligible: bool,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PostDonation {
    #[n(0)]
    pub complications: Option<String>,
    #[n(1)]
    pub notes: Option<String>,
}

/// A scheduled or completed contribution. `blood_type` is copied from the
/// donor's profile at creation, never supplied by the caller, so it cannot
/// disagree with the profile. Clinical fields are populated only when the
/// record leaves `Scheduled`.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct Donation {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "don_" hrp
    #[n(1)]
    pub donor_id: String,
    #[n(2)]
    pub donation_date: TimeStamp<Utc>,
    #[n(3)]
    pub blood_type: BloodType,
    #[n(4)]
    pub units_collected: u32,
    #[n(5)]
    pub status: DonationStatus,
    #[n(6)]
    pub location: String,
    #[n(7)]
    pub pre_screening: Option<PreScreening>,
    #[n(8)]
    pub post_donation: Option<PostDonation>,
    #[n(9)]
    pub staff_member: Option<String>,
    #[n(10)]
    pub notes: Option<String>,
    #[n(11)]
    pub created_at: TimeStamp<Utc>,
}

impl Donation {
    pub fn scheduled(
        id: String,
        donor_id: String,
        donation_date: TimeStamp<Utc>,
        blood_type: BloodType,
        location: String,
    ) -> Self {
        Self {
            id,
            donor_id,
            donation_date,
            blood_type,
            units_collected: MIN_UNITS_COLLECTED,
            status: DonationStatus::Scheduled,
            location,
            pre_screening: None,
            post_donation: None,
            staff_member: None,
            notes: None,
            created_at: TimeStamp::new(),
        }
    }
}

/// Everything a staff member records when marking a donation completed
#[derive(Debug, Clone)]
pub struct CompletionReport {
    pub pre_screening: PreScreening,
    pub units_collected: u32,
    pub post_donation: Option<PostDonation>,
    pub staff_member: Option<String>,
    pub notes: Option<String>,
}
