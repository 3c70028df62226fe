//! Per-blood-type stock ledger.
//!
//! All stock mutation goes through this one service object, through the
//! `credit`/`debit` primitives. Both are implemented as compare-and-swap
//! loops against the store, so the check-then-decrement on the contended
//! counter is atomic: two racing debits cannot jointly overdraw a record.
use super::error::BankError;
use super::types::{BloodType, TimeStamp};
use chrono::{Duration, Utc};
use sled::Batch;
use std::sync::Arc;

pub const DEFAULT_MINIMUM_THRESHOLD: u32 = 10;
pub const DEFAULT_MAX_CAPACITY: u32 = 100;

const INVENTORY_KEY_PREFIX: &str = "inv_";

fn inventory_key(blood_type: BloodType) -> String {
    format!("{INVENTORY_KEY_PREFIX}{}", blood_type.code())
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExpiringBatch {
    #[n(0)]
    pub expiry_date: TimeStamp<Utc>,
    #[n(1)]
    pub units: u32,
}

/// Current stock for one blood type. One record per catalog entry, seeded
/// lazily and never deleted.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecord {
    #[n(0)]
    pub blood_type: BloodType,
    #[n(1)]
    pub units_available: u32,
    #[n(2)]
    pub reserved_units: u32,
    #[n(3)]
    pub minimum_threshold: u32,
    #[n(4)]
    pub max_capacity: u32,
    #[n(5)]
    pub expiring_batches: Vec<ExpiringBatch>,
    #[n(6)]
    pub last_updated: TimeStamp<Utc>,
}

impl InventoryRecord {
    pub fn seeded(blood_type: BloodType) -> Self {
        Self {
            blood_type,
            units_available: 0,
            reserved_units: 0,
            minimum_threshold: DEFAULT_MINIMUM_THRESHOLD,
            max_capacity: DEFAULT_MAX_CAPACITY,
            expiring_batches: vec![],
            last_updated: TimeStamp::new(),
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.units_available <= self.minimum_threshold
    }

    pub fn available_for_allocation(&self) -> u32 {
        self.units_available.saturating_sub(self.reserved_units)
    }

    /// True when any batch expires within `(now, now + days]`
    pub fn has_batch_expiring_within(&self, days: i64, now: &TimeStamp<Utc>) -> bool {
        let now = now.to_datetime_utc();
        let horizon = now + Duration::days(days);
        self.expiring_batches.iter().any(|batch| {
            let expiry = batch.expiry_date.to_datetime_utc();
            expiry > now && expiry <= horizon
        })
    }
}

/// Admin overwrite of a field subset, for the direct-edit endpoint
#[derive(Debug, Default, Clone)]
pub struct InventoryPatch {
    pub units_available: Option<u32>,
    pub minimum_threshold: Option<u32>,
    pub max_capacity: Option<u32>,
}

pub struct InventoryLedger {
    instance: Arc<sled::Db>,
}

impl InventoryLedger {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self { instance }
    }

    /// Seed all eight records on first access. Concurrent seeding is
    /// harmless since every seeder writes the same defaults.
    fn seed_if_empty(&self) -> anyhow::Result<()> {
        if self
            .instance
            .scan_prefix(INVENTORY_KEY_PREFIX.as_bytes())
            .next()
            .is_some()
        {
            return Ok(());
        }

        let mut batch = Batch::default();
        for blood_type in BloodType::ALL {
            let record = InventoryRecord::seeded(blood_type);
            batch.insert(
                inventory_key(blood_type).as_bytes(),
                minicbor::to_vec(&record)?,
            );
        }
        self.instance.apply_batch(batch)?;
        tracing::info!("seeded inventory records for all eight blood types");

        Ok(())
    }

    pub fn get(&self, blood_type: BloodType) -> anyhow::Result<InventoryRecord> {
        self.seed_if_empty()?;

        let key = inventory_key(blood_type);
        let bytes = self
            .instance
            .get(key.as_bytes())?
            .ok_or_else(|| BankError::NotFound(key))?;

        Ok(minicbor::decode(&bytes)?)
    }

    /// All eight records in catalog order
    pub fn list(&self) -> anyhow::Result<Vec<InventoryRecord>> {
        self.seed_if_empty()?;

        BloodType::ALL.iter().map(|bt| self.get(*bt)).collect()
    }

    /// Credit `units` to a record, optionally tracking them as an expiring
    /// batch. Batches are never swept automatically; an admin retires them
    /// through `set_fields`.
    pub fn credit(
        &self,
        blood_type: BloodType,
        units: u32,
        expiry_date: Option<TimeStamp<Utc>>,
    ) -> anyhow::Result<InventoryRecord> {
        let record = self.update(blood_type, |record| {
            record.units_available += units;
            if let Some(expiry_date) = expiry_date.clone() {
                record.expiring_batches.push(ExpiringBatch {
                    expiry_date,
                    units,
                });
            }
            Ok(())
        })?;

        tracing::info!(
            blood_type = %blood_type,
            units,
            available = record.units_available,
            "inventory credited"
        );
        Ok(record)
    }

    /// Debit `units` from a record, failing with `InsufficientStock` when
    /// the balance does not cover it. The conditional decrement happens
    /// inside the CAS loop, so a concurrent debit that drains the record
    /// first causes this one to fail rather than overdraw.
    pub fn debit(&self, blood_type: BloodType, units: u32) -> anyhow::Result<InventoryRecord> {
        let record = self.update(blood_type, |record| {
            if record.units_available < units {
                return Err(BankError::InsufficientStock {
                    blood_type,
                    requested: units,
                    available: record.units_available,
                });
            }
            record.units_available -= units;
            Ok(())
        })?;

        tracing::info!(
            blood_type = %blood_type,
            units,
            available = record.units_available,
            "inventory debited"
        );
        Ok(record)
    }

    /// Direct overwrite of any subset of fields
    pub fn set_fields(
        &self,
        blood_type: BloodType,
        patch: &InventoryPatch,
    ) -> anyhow::Result<InventoryRecord> {
        self.update(blood_type, |record| {
            if let Some(units) = patch.units_available {
                record.units_available = units;
            }
            if let Some(threshold) = patch.minimum_threshold {
                record.minimum_threshold = threshold;
            }
            if let Some(capacity) = patch.max_capacity {
                record.max_capacity = capacity;
            }
            Ok(())
        })
    }

    pub fn list_low_stock(&self) -> anyhow::Result<Vec<InventoryRecord>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(InventoryRecord::is_low_stock)
            .collect())
    }

    pub fn list_expiring_within(&self, days: i64) -> anyhow::Result<Vec<InventoryRecord>> {
        let now = TimeStamp::new();
        Ok(self
            .list()?
            .into_iter()
            .filter(|record| record.has_batch_expiring_within(days, &now))
            .collect())
    }

    /// Read-modify-write through compare_and_swap, retrying on contention.
    /// The closure may veto the write by returning an error.
    fn update<F>(&self, blood_type: BloodType, mutate: F) -> anyhow::Result<InventoryRecord>
    where
        F: Fn(&mut InventoryRecord) -> Result<(), BankError>,
    {
        self.seed_if_empty()?;

        let key = inventory_key(blood_type);
        loop {
            let current = self
                .instance
                .get(key.as_bytes())?
                .ok_or_else(|| BankError::NotFound(key.clone()))?;

            let mut record: InventoryRecord = minicbor::decode(&current)?;
            mutate(&mut record)?;
            record.last_updated = TimeStamp::new();

            let proposed = minicbor::to_vec(&record)?;
            match self
                .instance
                .compare_and_swap(key.as_bytes(), Some(current), Some(proposed))?
            {
                Ok(()) => return Ok(record),
                // lost the race, reload and retry
                Err(_) => continue,
            }
        }
    }
}
