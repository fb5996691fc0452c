//! Insured vehicles

use serde::{Deserialize, Serialize};

use core_kernel::{UsageId, UserId, VehicleId};

/// A vehicle owned by a taker
///
/// Its usage class decides which rate-table rows price a policy on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub usage_id: UsageId,
    pub taker_id: UserId,
    pub license_plate: String,
}

impl Vehicle {
    pub fn new(usage_id: UsageId, taker_id: UserId, license_plate: impl Into<String>) -> Self {
        Self {
            id: VehicleId::new_v7(),
            usage_id,
            taker_id,
            license_plate: license_plate.into(),
        }
    }
}
