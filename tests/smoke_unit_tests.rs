//! Smoke screen unit tests for blood bank ledger components
//!
//! These test are unit tests that span the codebase, testing behavior in
//! isolation from integration scenarios. These are intended as smoke-screen
//! and generally test the happy-path.
//!

use chrono::{Duration, Utc};
use blood_bank_ledger::{
    donation::DonationStatus,
    eligibility::{DONATION_INTERVAL_DAYS, is_eligible, next_eligible_date},
    inventory::{ExpiringBatch, InventoryRecord},
    request::{RequestDraft, RequestStatus},
    types::{BloodType, TimeStamp, Urgency},
    utils::new_uuid_to_bech32,
};

// UTILS MODULE TESTS
#[cfg(test)]
mod utils_tests {
    use super::*;

    /// Test that new_uuid_to_bech32 generates valid bech32-encoded strings
    /// with the correct human-readable prefix
    #[test]
    fn generates_valid_bech32_with_hrp() {
        let result = new_uuid_to_bech32("req_");
        assert!(result.is_ok());

        let encoded = result.unwrap();
        assert!(encoded.starts_with("req_1"));
        assert!(encoded.len() > 10); // UUID should produce substantial output
    }

    /// Test that the function handles empty strings appropriately
    #[test]
    fn handles_empty_hrp() {
        // Empty string should fail
        let result = new_uuid_to_bech32("");
        assert!(result.is_err());
    }

    /// Test that multiple calls generate unique identifiers
    #[test]
    fn generates_unique_ids() {
        let id1 = new_uuid_to_bech32("don_").unwrap();
        let id2 = new_uuid_to_bech32("don_").unwrap();
        let id3 = new_uuid_to_bech32("don_").unwrap();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    /// Test that the three record namespaces never collide
    #[test]
    fn different_hrps_produce_different_namespaces() {
        let request_id = new_uuid_to_bech32("req_").unwrap();
        let donation_id = new_uuid_to_bech32("don_").unwrap();
        let user_id = new_uuid_to_bech32("user_").unwrap();

        assert!(request_id.starts_with("req_"));
        assert!(donation_id.starts_with("don_"));
        assert!(user_id.starts_with("user_"));
    }
}

// TYPES MODULE TESTS
#[cfg(test)]
mod types_tests {
    use super::*;

    /// Test that every catalog entry parses back from its display code
    #[test]
    fn catalog_codes_round_trip() {
        for blood_type in BloodType::ALL {
            let code = blood_type.to_string();
            assert_eq!(code.parse::<BloodType>().unwrap(), blood_type);
        }
    }

    /// Test that the catalog holds exactly the eight ABO/Rh types
    #[test]
    fn catalog_has_eight_distinct_entries() {
        let codes: std::collections::HashSet<&str> =
            BloodType::ALL.iter().map(|bt| bt.code()).collect();
        assert_eq!(codes.len(), 8);
    }

    /// Test that urgency parses its wire vocabulary and nothing else
    #[test]
    fn urgency_parsing() {
        assert_eq!("critical".parse::<Urgency>().unwrap(), Urgency::Critical);
        assert_eq!("low".parse::<Urgency>().unwrap(), Urgency::Low);
        assert!("CRITICAL".parse::<Urgency>().is_err());
        assert!("urgent".parse::<Urgency>().is_err());
    }

    /// Test that TimeStamp CBOR encoding round-trips correctly
    #[test]
    fn timestamp_cbor_roundtrip() {
        let original = TimeStamp::new();

        let encoded = minicbor::to_vec(&original).unwrap();
        let decoded: TimeStamp<Utc> = minicbor::decode(&encoded).unwrap();

        assert_eq!(original, decoded);
    }
}

// ELIGIBILITY MODULE TESTS
#[cfg(test)]
mod eligibility_tests {
    use super::*;

    fn stamp_days_ago(days: i64) -> TimeStamp<Utc> {
        TimeStamp::from(Utc::now() - Duration::days(days))
    }

    /// A donor with no history is always eligible
    #[test]
    fn first_time_donor_is_eligible() {
        assert!(is_eligible(None, &TimeStamp::new()));
    }

    /// The 56-day boundary is inclusive
    #[test]
    fn exact_interval_is_eligible() {
        let last = stamp_days_ago(DONATION_INTERVAL_DAYS);
        assert!(is_eligible(Some(&last), &TimeStamp::new()));
    }

    /// One day short of the interval is not enough
    #[test]
    fn fifty_five_days_is_not_eligible() {
        let last = stamp_days_ago(55);
        assert!(!is_eligible(Some(&last), &TimeStamp::new()));
    }

    /// A donation well past the interval is clearly eligible
    #[test]
    fn long_past_donation_is_eligible() {
        let last = stamp_days_ago(400);
        assert!(is_eligible(Some(&last), &TimeStamp::new()));
    }

    /// The displayed next-eligible date is exactly 56 days after the last
    /// donation
    #[test]
    fn next_eligible_is_interval_after_last() {
        let last = stamp_days_ago(10);
        let next = next_eligible_date(&last);

        let gap = next.to_datetime_utc() - last.to_datetime_utc();
        assert_eq!(gap.num_days(), DONATION_INTERVAL_DAYS);
    }
}

// REQUEST MODULE TESTS
#[cfg(test)]
mod request_tests {
    use super::*;

    fn draft() -> RequestDraft {
        RequestDraft::new()
            .set_patient_name("Jo Bloggs")
            .set_blood_type(BloodType::APos)
            .set_units_needed(2)
            .set_urgency(Urgency::Medium)
            .set_hospital_name("St Mary's")
            .set_hospital_address("1 Hospital Way")
            .set_contact_person("Dr Reyes")
            .set_medical_reason("transfusion")
            .set_required_date(TimeStamp::new())
    }

    /// A fully populated draft finalises into a pending record carrying the
    /// requester id
    #[test]
    fn draft_finalises_with_owner() {
        let request = draft()
            .validate_and_finalise("req_1abc".into(), "user_1abc".into())
            .unwrap();

        assert_eq!(request.requester_id, "user_1abc");
        assert_eq!(request.status, RequestStatus::Pending);
    }

    /// Drafts missing any required field are rejected
    #[test]
    fn incomplete_draft_rejected() {
        let result = RequestDraft::new()
            .set_patient_name("Jo Bloggs")
            .validate_and_finalise("req_1abc".into(), "user_1abc".into());
        assert!(result.is_err());
    }

    /// Only pending and cancelled requests may be removed
    #[test]
    fn deletable_states() {
        let mut request = draft()
            .validate_and_finalise("req_1abc".into(), "user_1abc".into())
            .unwrap();
        assert!(request.is_deletable());

        request.status = RequestStatus::Cancelled;
        assert!(request.is_deletable());

        for status in [
            RequestStatus::Approved,
            RequestStatus::Fulfilled,
            RequestStatus::Expired,
        ] {
            request.status = status;
            assert!(!request.is_deletable());
        }
    }

    /// Fulfilment is only reachable through approval
    #[test]
    fn fulfilment_requires_approval_first() {
        assert!(!RequestStatus::Pending.can_transition_to(RequestStatus::Fulfilled));
        assert!(RequestStatus::Pending.can_transition_to(RequestStatus::Approved));
        assert!(RequestStatus::Approved.can_transition_to(RequestStatus::Fulfilled));
    }
}

// DONATION MODULE TESTS
#[cfg(test)]
mod donation_tests {
    use super::*;

    /// Scheduled is the single live state; everything else is terminal
    #[test]
    fn only_scheduled_is_live() {
        assert!(!DonationStatus::Scheduled.is_terminal());
        assert!(DonationStatus::Completed.is_terminal());
        assert!(DonationStatus::Cancelled.is_terminal());
        assert!(DonationStatus::Rejected.is_terminal());
    }

    /// Completion cannot be reached from a terminal state
    #[test]
    fn no_resurrection() {
        for terminal in [
            DonationStatus::Completed,
            DonationStatus::Cancelled,
            DonationStatus::Rejected,
        ] {
            assert!(!terminal.can_transition_to(DonationStatus::Completed));
            assert!(!terminal.can_transition_to(DonationStatus::Scheduled));
        }
    }
}

// INVENTORY MODULE TESTS
#[cfg(test)]
mod inventory_tests {
    use super::*;

    /// The low-stock flag is inclusive of the threshold itself
    #[test]
    fn low_stock_boundary() {
        let mut record = InventoryRecord::seeded(BloodType::ONeg);
        record.units_available = record.minimum_threshold;
        assert!(record.is_low_stock());

        record.units_available += 1;
        assert!(!record.is_low_stock());
    }

    /// Reserved units reduce what is allocatable without going negative
    #[test]
    fn allocation_accounts_for_reservations() {
        let mut record = InventoryRecord::seeded(BloodType::BPos);
        record.units_available = 10;
        record.reserved_units = 4;
        assert_eq!(record.available_for_allocation(), 6);

        record.reserved_units = 12;
        assert_eq!(record.available_for_allocation(), 0);
    }

    /// A record with no batches never raises an expiry alert
    #[test]
    fn no_batches_no_expiry() {
        let record = InventoryRecord::seeded(BloodType::ABPos);
        assert!(!record.has_batch_expiring_within(365, &TimeStamp::new()));
    }

    /// An already-expired batch is not "expiring soon"
    #[test]
    fn expired_batches_excluded() {
        let mut record = InventoryRecord::seeded(BloodType::ABPos);
        record.expiring_batches.push(ExpiringBatch {
            expiry_date: TimeStamp::from(Utc::now() - Duration::days(1)),
            units: 2,
        });
        assert!(!record.has_batch_expiring_within(30, &TimeStamp::new()));
    }
}
