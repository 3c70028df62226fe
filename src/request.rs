//! Blood request records and their lifecycle state machine
use super::error::BankError;
use super::types::{BloodType, TimeStamp, Urgency};
use chrono::Utc;
use std::fmt;

pub const REQUEST_KEY_PREFIX: &str = "req_";

pub const MIN_UNITS_NEEDED: u32 = 1;
pub const MAX_UNITS_NEEDED: u32 = 10;

/// Lifecycle: `Pending -> {Approved, Cancelled}`,
/// `Approved -> {Fulfilled, Expired, Cancelled}`. Everything else is
/// rejected; terminal states stay terminal. The table is the single
/// authority, so side effects can never fire on an illegal transition.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Approved,
    #[n(2)]
    Fulfilled,
    #[n(3)]
    Cancelled,
    #[n(4)]
    Expired,
}

impl RequestStatus {
    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        use RequestStatus::*;
        matches!(
            (self, target),
            (Pending, Approved)
                | (Pending, Cancelled)
                | (Approved, Fulfilled)
                | (Approved, Expired)
                | (Approved, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Fulfilled | RequestStatus::Cancelled | RequestStatus::Expired
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A recipient's ask for units. Status moves only through the admin
/// transition endpoint; approval and fulfilment stamps are set exactly when
/// those states are reached.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct BloodRequest {
    #[n(0)]
    pub id: String, // uuid7, bech32 encoded with the "req_" hrp
    #[n(1)]
    pub requester_id: String,
    #[n(2)]
    pub patient_name: String,
    #[n(3)]
    pub blood_type: BloodType,
    #[n(4)]
    pub units_needed: u32,
    #[n(5)]
    pub urgency: Urgency,
    #[n(6)]
    pub hospital_name: String,
    #[n(7)]
    pub hospital_address: String,
    #[n(8)]
    pub contact_person: String,
    #[n(9)]
    pub medical_reason: String,
    #[n(10)]
    pub required_date: TimeStamp<Utc>,
    #[n(11)]
    pub status: RequestStatus,
    #[n(12)]
    pub approved_by: Option<String>,
    #[n(13)]
    pub approved_date: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub fulfilled_date: Option<TimeStamp<Utc>>,
    #[n(15)]
    pub notes: Option<String>,
    #[n(16)]
    pub created_at: TimeStamp<Utc>,
}

impl BloodRequest {
    /// Requests may only be removed before any units are committed to them
    pub fn is_deletable(&self) -> bool {
        matches!(
            self.status,
            RequestStatus::Pending | RequestStatus::Cancelled
        )
    }
}

// Also used for constructing drafts before submission
#[derive(Debug, Default, Clone)]
pub struct RequestDraft {
    patient_name: Option<String>,
    blood_type: Option<BloodType>,
    units_needed: u32,
    urgency: Option<Urgency>,
    hospital_name: Option<String>,
    hospital_address: Option<String>,
    contact_person: Option<String>,
    medical_reason: Option<String>,
    required_date: Option<TimeStamp<Utc>>,
    notes: Option<String>,
}

impl RequestDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_patient_name(mut self, name: &str) -> Self {
        self.patient_name = Some(name.to_string());
        self
    }
    pub fn set_blood_type(mut self, blood_type: BloodType) -> Self {
        self.blood_type = Some(blood_type);
        self
    }
    pub fn set_units_needed(mut self, units: u32) -> Self {
        self.units_needed = units;
        self
    }
    pub fn set_urgency(mut self, urgency: Urgency) -> Self {
        self.urgency = Some(urgency);
        self
    }
    pub fn set_hospital_name(mut self, name: &str) -> Self {
        self.hospital_name = Some(name.to_string());
        self
    }
    pub fn set_hospital_address(mut self, address: &str) -> Self {
        self.hospital_address = Some(address.to_string());
        self
    }
    pub fn set_contact_person(mut self, contact: &str) -> Self {
        self.contact_person = Some(contact.to_string());
        self
    }
    pub fn set_medical_reason(mut self, reason: &str) -> Self {
        self.medical_reason = Some(reason.to_string());
        self
    }
    pub fn set_required_date(mut self, date: TimeStamp<Utc>) -> Self {
        self.required_date = Some(date);
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    // Checks fields then builds the pending request record
    pub fn validate_and_finalise(
        self,
        id: String,
        requester_id: String,
    ) -> anyhow::Result<BloodRequest> {
        let patient_name = require_text(self.patient_name, "patient name")?;
        let hospital_name = require_text(self.hospital_name, "hospital name")?;
        let hospital_address = require_text(self.hospital_address, "hospital address")?;
        let contact_person = require_text(self.contact_person, "contact person")?;
        let medical_reason = require_text(self.medical_reason, "medical reason")?;

        let blood_type = self
            .blood_type
            .ok_or_else(|| BankError::InvalidInput("blood type is not set".into()))?;
        let urgency = self
            .urgency
            .ok_or_else(|| BankError::InvalidInput("urgency is not set".into()))?;
        let required_date = self
            .required_date
            .ok_or_else(|| BankError::InvalidInput("required date is not set".into()))?;

        if !(MIN_UNITS_NEEDED..=MAX_UNITS_NEEDED).contains(&self.units_needed) {
            return Err(BankError::InvalidInput(format!(
                "units needed must be between {MIN_UNITS_NEEDED} and {MAX_UNITS_NEEDED}, got {}",
                self.units_needed
            ))
            .into());
        }

        Ok(BloodRequest {
            id,
            requester_id,
            patient_name,
            blood_type,
            units_needed: self.units_needed,
            urgency,
            hospital_name,
            hospital_address,
            contact_person,
            medical_reason,
            required_date,
            status: RequestStatus::Pending,
            approved_by: None,
            approved_date: None,
            fulfilled_date: None,
            notes: self.notes,
            created_at: TimeStamp::new(),
        })
    }
}

fn require_text(field: Option<String>, label: &str) -> Result<String, BankError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BankError::InvalidInput(format!("{label} is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_draft() -> RequestDraft {
        RequestDraft::new()
            .set_patient_name("Jo Bloggs")
            .set_blood_type(BloodType::OPos)
            .set_units_needed(3)
            .set_urgency(Urgency::High)
            .set_hospital_name("St Mary's")
            .set_hospital_address("1 Hospital Way")
            .set_contact_person("Dr Reyes")
            .set_medical_reason("surgery")
            .set_required_date(TimeStamp::new())
    }

    #[test]
    fn complete_draft_finalises_as_pending() {
        let request = complete_draft()
            .validate_and_finalise("req_1x".into(), "user_1x".into())
            .unwrap();

        assert_eq!(request.status, RequestStatus::Pending);
        assert!(request.approved_by.is_none());
        assert!(request.fulfilled_date.is_none());
    }

    #[test]
    fn units_out_of_range_rejected() {
        for units in [0, 11, 100] {
            let result = complete_draft()
                .set_units_needed(units)
                .validate_and_finalise("req_1x".into(), "user_1x".into());
            assert!(result.is_err(), "units {units} should be rejected");
        }
    }

    #[test]
    fn blank_fields_rejected() {
        let result = complete_draft()
            .set_patient_name("   ")
            .validate_and_finalise("req_1x".into(), "user_1x".into());
        assert!(result.is_err());
    }

    #[test]
    fn transition_table() {
        use RequestStatus::*;

        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Fulfilled));
        assert!(Approved.can_transition_to(Expired));
        assert!(Approved.can_transition_to(Cancelled));

        assert!(!Pending.can_transition_to(Fulfilled));
        assert!(!Fulfilled.can_transition_to(Approved));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Expired.can_transition_to(Fulfilled));
    }
}
