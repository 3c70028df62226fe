//! Service layer API for blood bank workflow operations
use super::donation::{
    CompletionReport, DONATION_KEY_PREFIX, Donation, DonationStatus, MAX_UNITS_COLLECTED,
    MIN_UNITS_COLLECTED,
};
use super::eligibility;
use super::error::BankError;
use super::inventory::{InventoryLedger, InventoryPatch, InventoryRecord};
use super::request::{BloodRequest, REQUEST_KEY_PREFIX, RequestDraft, RequestStatus};
use super::types::{Actor, BloodType, Role, TimeStamp, Urgency};
use super::user::{USER_KEY_PREFIX, User};
use super::utils;
use chrono::Utc;
use sled::Batch;
use std::sync::Arc;

/// Collaborator interface for the email notifier. Invoked fire-and-forget
/// on request creation; a failure is logged and never blocks the request.
pub trait RequestNotifier: Send + Sync {
    fn request_created(&self, request: &BloodRequest) -> anyhow::Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub blood_type: Option<BloodType>,
    pub urgency: Option<Urgency>,
}

#[derive(Debug, Default, Clone)]
pub struct DonationFilter {
    pub status: Option<DonationStatus>,
    pub blood_type: Option<BloodType>,
}

/// Answer for the donor eligibility endpoint. `next_eligible` is populated
/// only when the rule currently rejects the donor.
#[derive(Debug, Clone, PartialEq)]
pub struct EligibilityStatus {
    pub eligible: bool,
    pub last_donation: Option<TimeStamp<Utc>>,
    pub next_eligible: Option<TimeStamp<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InventoryAlerts {
    pub low_stock: Vec<InventoryRecord>,
    pub expiring: Vec<InventoryRecord>,
}

pub struct BloodBank {
    instance: Arc<sled::Db>,
    ledger: InventoryLedger,
    notifier: Option<Arc<dyn RequestNotifier>>,
}

impl BloodBank {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        let ledger = InventoryLedger::new(instance.clone());
        Self {
            instance,
            ledger,
            notifier: None,
        }
    }

    pub fn with_notifier(instance: Arc<sled::Db>, notifier: Arc<dyn RequestNotifier>) -> Self {
        let mut bank = Self::new(instance);
        bank.notifier = Some(notifier);
        bank
    }

    /// Direct access to the stock ledger, shared with this service
    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    // ---- accounts -------------------------------------------------------

    /// Create an account record. Credential handling lives upstream; this
    /// only persists the profile the ledger needs.
    pub fn register_user(
        &self,
        name: &str,
        role: Role,
        blood_type: Option<BloodType>,
    ) -> anyhow::Result<User> {
        if name.trim().is_empty() {
            return Err(BankError::InvalidInput("name is not set".into()).into());
        }

        let id = utils::new_uuid_to_bech32(USER_KEY_PREFIX)?;
        let user = User::new(id, name.to_string(), role, blood_type);
        self.save(&user.id, &user)?;

        tracing::info!(user_id = %user.id, role = %role, "user registered");
        Ok(user)
    }

    pub fn get_user(&self, user_id: &str) -> anyhow::Result<User> {
        self.load(user_id, "user")
    }

    /// Eligibility and next-eligible-date for the calling donor
    pub fn donor_eligibility(&self, actor: &Actor) -> anyhow::Result<EligibilityStatus> {
        require_role(actor, Role::Donor)?;
        let user: User = self.load(&actor.user_id, "user")?;

        let now = TimeStamp::new();
        let eligible = eligibility::is_eligible(user.last_donation.as_ref(), &now);
        let next_eligible = match (&user.last_donation, eligible) {
            (Some(last), false) => Some(eligibility::next_eligible_date(last)),
            _ => None,
        };

        Ok(EligibilityStatus {
            eligible,
            last_donation: user.last_donation,
            next_eligible,
        })
    }

    // ---- blood requests -------------------------------------------------

    /// Submit a new blood request. Always starts pending; stock is not
    /// consulted at creation time.
    pub fn create_request(
        &self,
        actor: &Actor,
        draft: RequestDraft,
    ) -> anyhow::Result<BloodRequest> {
        require_role(actor, Role::Recipient)?;

        let id = utils::new_uuid_to_bech32(REQUEST_KEY_PREFIX)?;
        let request = draft.validate_and_finalise(id, actor.user_id.clone())?;
        self.save(&request.id, &request)?;

        tracing::info!(
            request_id = %request.id,
            blood_type = %request.blood_type,
            units = request.units_needed,
            urgency = %request.urgency,
            "blood request created"
        );

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.request_created(&request) {
                tracing::warn!(request_id = %request.id, error = %err, "request notification failed");
            }
        }

        Ok(request)
    }

    pub fn my_requests(&self, actor: &Actor) -> anyhow::Result<Vec<BloodRequest>> {
        require_role(actor, Role::Recipient)?;

        let mut requests: Vec<BloodRequest> = self.scan(REQUEST_KEY_PREFIX)?;
        requests.retain(|request| request.requester_id == actor.user_id);
        Ok(requests)
    }

    pub fn all_requests(
        &self,
        actor: &Actor,
        filter: &RequestFilter,
    ) -> anyhow::Result<Vec<BloodRequest>> {
        require_role(actor, Role::Admin)?;

        let mut requests: Vec<BloodRequest> = self.scan(REQUEST_KEY_PREFIX)?;
        requests.retain(|request| {
            filter.status.is_none_or(|status| request.status == status)
                && filter
                    .blood_type
                    .is_none_or(|bt| request.blood_type == bt)
                && filter.urgency.is_none_or(|urgency| request.urgency == urgency)
        });
        Ok(requests)
    }

    /// Transition a request through its state machine. Approval stamps the
    /// acting admin; fulfilment debits the ledger first and the whole
    /// transition fails with `InsufficientStock` when the balance is short,
    /// leaving the request untouched.
    pub fn update_request_status(
        &self,
        actor: &Actor,
        request_id: &str,
        target: RequestStatus,
        notes: Option<String>,
    ) -> anyhow::Result<BloodRequest> {
        require_role(actor, Role::Admin)?;
        let mut request: BloodRequest = self.load(request_id, "request")?;

        if !request.status.can_transition_to(target) {
            return Err(BankError::InvalidState(format!(
                "request cannot move from {} to {}",
                request.status, target
            ))
            .into());
        }

        match target {
            RequestStatus::Approved => {
                request.approved_by = Some(actor.user_id.clone());
                request.approved_date = Some(TimeStamp::new());
            }
            RequestStatus::Fulfilled => {
                // the conditional decrement happens inside the ledger; a
                // short balance aborts before the request is touched
                self.ledger.debit(request.blood_type, request.units_needed)?;
                request.fulfilled_date = Some(TimeStamp::new());
            }
            _ => {}
        }

        request.status = target;
        if notes.is_some() {
            request.notes = notes;
        }
        self.save(&request.id, &request)?;

        tracing::info!(request_id = %request.id, status = %target, "request status updated");
        Ok(request)
    }

    /// Remove a request while it is still pending or cancelled. Only the
    /// requester or an admin may delete.
    pub fn delete_request(&self, actor: &Actor, request_id: &str) -> anyhow::Result<()> {
        let request: BloodRequest = self.load(request_id, "request")?;

        if actor.role != Role::Admin && actor.user_id != request.requester_id {
            return Err(BankError::Forbidden(
                "only the requester or an admin may delete a request".into(),
            )
            .into());
        }
        if !request.is_deletable() {
            return Err(BankError::InvalidState(format!(
                "request in status {} cannot be deleted",
                request.status
            ))
            .into());
        }

        self.instance.remove(request.id.as_bytes())?;
        tracing::info!(request_id = %request.id, "request deleted");
        Ok(())
    }

    // ---- donations ------------------------------------------------------

    /// Schedule a donation. The eligibility rule must pass as of now; the
    /// blood type is copied from the donor's profile so it cannot disagree
    /// with it. Eligibility is not re-checked at completion.
    pub fn schedule_donation(
        &self,
        actor: &Actor,
        donation_date: TimeStamp<Utc>,
        location: &str,
    ) -> anyhow::Result<Donation> {
        require_role(actor, Role::Donor)?;
        let donor: User = self.load(&actor.user_id, "user")?;

        let now = TimeStamp::new();
        if let Some(last) = donor.last_donation.as_ref() {
            if !eligibility::is_eligible(Some(last), &now) {
                return Err(BankError::IneligibleDonor {
                    next_eligible: eligibility::next_eligible_date(last),
                }
                .into());
            }
        }

        let blood_type = donor.blood_type.ok_or_else(|| {
            BankError::InvalidInput("donor profile does not carry a blood type".into())
        })?;
        if location.trim().is_empty() {
            return Err(BankError::InvalidInput("location is not set".into()).into());
        }

        let id = utils::new_uuid_to_bech32(DONATION_KEY_PREFIX)?;
        let donation = Donation::scheduled(
            id,
            donor.id.clone(),
            donation_date,
            blood_type,
            location.to_string(),
        );
        self.save(&donation.id, &donation)?;

        tracing::info!(donation_id = %donation.id, donor_id = %donor.id, "donation scheduled");
        Ok(donation)
    }

    pub fn my_donations(&self, actor: &Actor) -> anyhow::Result<Vec<Donation>> {
        require_role(actor, Role::Donor)?;

        let mut donations: Vec<Donation> = self.scan(DONATION_KEY_PREFIX)?;
        donations.retain(|donation| donation.donor_id == actor.user_id);
        Ok(donations)
    }

    pub fn all_donations(
        &self,
        actor: &Actor,
        filter: &DonationFilter,
    ) -> anyhow::Result<Vec<Donation>> {
        require_role(actor, Role::Admin)?;

        let mut donations: Vec<Donation> = self.scan(DONATION_KEY_PREFIX)?;
        donations.retain(|donation| {
            filter.status.is_none_or(|status| donation.status == status)
                && filter
                    .blood_type
                    .is_none_or(|bt| donation.blood_type == bt)
        });
        Ok(donations)
    }

    /// Mark a scheduled donation completed. Credits the ledger by the
    /// collected units and resets the donor's eligibility clock; the donor
    /// and donation records are written in one batch. The staff-entered
    /// pre-screening verdict is recorded but not enforced.
    pub fn complete_donation(
        &self,
        actor: &Actor,
        donation_id: &str,
        report: CompletionReport,
    ) -> anyhow::Result<Donation> {
        require_role(actor, Role::Admin)?;
        let mut donation: Donation = self.load(donation_id, "donation")?;

        if !donation.status.can_transition_to(DonationStatus::Completed) {
            return Err(BankError::InvalidState(format!(
                "donation cannot move from {} to completed",
                donation.status
            ))
            .into());
        }
        if !(MIN_UNITS_COLLECTED..=MAX_UNITS_COLLECTED).contains(&report.units_collected) {
            return Err(BankError::InvalidInput(format!(
                "units collected must be between {MIN_UNITS_COLLECTED} and {MAX_UNITS_COLLECTED}, got {}",
                report.units_collected
            ))
            .into());
        }

        let mut donor: User = self.load(&donation.donor_id, "user")?;

        donation.status = DonationStatus::Completed;
        donation.units_collected = report.units_collected;
        donation.pre_screening = Some(report.pre_screening);
        donation.post_donation = report.post_donation;
        donation.staff_member = report.staff_member;
        if report.notes.is_some() {
            donation.notes = report.notes;
        }

        donor.last_donation = Some(donation.donation_date.clone());
        donor.donation_count += 1;

        // the stock counter goes through the ledger's CAS loop; the two
        // record writes share one batch
        self.ledger
            .credit(donation.blood_type, donation.units_collected, None)?;

        let mut batch = Batch::default();
        batch.insert(donation.id.as_bytes(), minicbor::to_vec(&donation)?);
        batch.insert(donor.id.as_bytes(), minicbor::to_vec(&donor)?);
        self.instance.apply_batch(batch)?;

        tracing::info!(
            donation_id = %donation.id,
            donor_id = %donor.id,
            units = donation.units_collected,
            "donation completed"
        );
        Ok(donation)
    }

    /// Cancel a scheduled donation. No ledger or donor side effects.
    pub fn cancel_donation(
        &self,
        actor: &Actor,
        donation_id: &str,
        staff_member: Option<String>,
        notes: Option<String>,
    ) -> anyhow::Result<Donation> {
        self.close_donation(actor, donation_id, DonationStatus::Cancelled, staff_member, notes)
    }

    /// Reject a scheduled donation. No ledger or donor side effects.
    pub fn reject_donation(
        &self,
        actor: &Actor,
        donation_id: &str,
        staff_member: Option<String>,
        notes: Option<String>,
    ) -> anyhow::Result<Donation> {
        self.close_donation(actor, donation_id, DonationStatus::Rejected, staff_member, notes)
    }

    fn close_donation(
        &self,
        actor: &Actor,
        donation_id: &str,
        target: DonationStatus,
        staff_member: Option<String>,
        notes: Option<String>,
    ) -> anyhow::Result<Donation> {
        require_role(actor, Role::Admin)?;
        let mut donation: Donation = self.load(donation_id, "donation")?;

        if !donation.status.can_transition_to(target) {
            return Err(BankError::InvalidState(format!(
                "donation cannot move from {} to {}",
                donation.status, target
            ))
            .into());
        }

        donation.status = target;
        donation.staff_member = staff_member;
        if notes.is_some() {
            donation.notes = notes;
        }
        self.save(&donation.id, &donation)?;

        tracing::info!(donation_id = %donation.id, status = %target, "donation closed");
        Ok(donation)
    }

    // ---- inventory ------------------------------------------------------

    /// All eight records, readable by any authenticated user. Seeds the
    /// ledger on first read.
    pub fn inventory(&self, _actor: &Actor) -> anyhow::Result<Vec<InventoryRecord>> {
        self.ledger.list()
    }

    pub fn set_inventory_fields(
        &self,
        actor: &Actor,
        blood_type: BloodType,
        patch: &InventoryPatch,
    ) -> anyhow::Result<InventoryRecord> {
        require_role(actor, Role::Admin)?;
        self.ledger.set_fields(blood_type, patch)
    }

    pub fn add_inventory_units(
        &self,
        actor: &Actor,
        blood_type: BloodType,
        units: u32,
        expiry_date: Option<TimeStamp<Utc>>,
    ) -> anyhow::Result<InventoryRecord> {
        require_role(actor, Role::Admin)?;
        if units == 0 {
            return Err(BankError::InvalidInput("units must be positive".into()).into());
        }
        self.ledger.credit(blood_type, units, expiry_date)
    }

    /// Low-stock records plus records with a batch expiring inside the
    /// given window
    pub fn inventory_alerts(
        &self,
        actor: &Actor,
        expiry_window_days: i64,
    ) -> anyhow::Result<InventoryAlerts> {
        require_role(actor, Role::Admin)?;

        Ok(InventoryAlerts {
            low_stock: self.ledger.list_low_stock()?,
            expiring: self.ledger.list_expiring_within(expiry_window_days)?,
        })
    }

    // ---- storage helpers ------------------------------------------------

    fn load<T>(&self, key: &str, what: &str) -> anyhow::Result<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let bytes = self
            .instance
            .get(key.as_bytes())?
            .ok_or_else(|| BankError::NotFound(format!("{what} {key}")))?;
        Ok(minicbor::decode(&bytes)?)
    }

    fn save<T>(&self, key: &str, value: &T) -> anyhow::Result<()>
    where
        T: minicbor::Encode<()>,
    {
        self.instance.insert(key.as_bytes(), minicbor::to_vec(value)?)?;
        Ok(())
    }

    fn scan<T>(&self, prefix: &str) -> anyhow::Result<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        let mut records = Vec::new();
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            records.push(minicbor::decode(&bytes)?);
        }
        Ok(records)
    }
}

fn require_role(actor: &Actor, role: Role) -> Result<(), BankError> {
    if actor.role != role {
        return Err(BankError::Forbidden(format!(
            "operation requires the {role} role"
        )));
    }
    Ok(())
}
