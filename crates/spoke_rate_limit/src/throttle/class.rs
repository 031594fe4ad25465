use std::fmt;

use serde::{Deserialize, Serialize};

/// The rate class a request is throttled under.
///
/// Variants are declared in priority order, highest first, and the derived
/// `Ord` follows that order. When several rules could match a request the
/// higher-priority class wins: a `POST /drivers` is `DriverCreation`, never
/// `Write`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateClass {
    /// `POST /drivers`
    DriverCreation,
    /// `POST /plans/:planId/stops:import` and `POST /unassignedStops:import`
    BatchImportStops,
    /// `POST /drivers:import`
    BatchImportDrivers,
    /// `POST /plans/:planId:optimize` and `POST /plans/:planId:reoptimize`
    PlanOptimization,
    /// Any other `POST`, `PATCH` or `DELETE`.
    Write,
    /// Any other `GET`.
    Read,
    /// Everything else. Never delayed.
    Unclassified,
}

impl RateClass {
    /// The classes that own a delay lane, in priority order.
    pub const THROTTLED: [RateClass; 6] = [
        RateClass::DriverCreation,
        RateClass::BatchImportStops,
        RateClass::BatchImportDrivers,
        RateClass::PlanOptimization,
        RateClass::Write,
        RateClass::Read,
    ];

    /// Stable label used in log fields and metric labels.
    pub const fn as_str(&self) -> &'static str {
        match self {
            RateClass::DriverCreation => "driver_creation",
            RateClass::BatchImportStops => "batch_import_stops",
            RateClass::BatchImportDrivers => "batch_import_drivers",
            RateClass::PlanOptimization => "plan_optimization",
            RateClass::Write => "write",
            RateClass::Read => "read",
            RateClass::Unclassified => "unclassified",
        }
    }

    pub const fn is_throttled(&self) -> bool {
        !matches!(self, RateClass::Unclassified)
    }

    /// Index of this class in [`RateClass::THROTTLED`].
    pub(crate) const fn lane(&self) -> Option<usize> {
        match self {
            RateClass::DriverCreation => Some(0),
            RateClass::BatchImportStops => Some(1),
            RateClass::BatchImportDrivers => Some(2),
            RateClass::PlanOptimization => Some(3),
            RateClass::Write => Some(4),
            RateClass::Read => Some(5),
            RateClass::Unclassified => None,
        }
    }
}

impl fmt::Display for RateClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
