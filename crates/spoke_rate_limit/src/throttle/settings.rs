use std::time::Duration;

use bon::Builder;
use serde::{Deserialize, Serialize};

use super::RateClass;

/// Minimum spacing between successive grants, per rate class.
///
/// Every field is optional in the builder and falls back to the published
/// limits of the Spoke API:
///
/// | Field | Default | Limit |
/// |-------|---------|-------|
/// | `driver_creation_delay` | 1000 ms | 1 request per second |
/// | `batch_import_stops_delay` | 6000 ms | 10 requests per minute |
/// | `batch_import_drivers_delay` | 30000 ms | 2 requests per minute |
/// | `plan_optimization_delay` | 20000 ms | 3 requests per minute |
/// | `write_request_delay` | 200 ms | 5 requests per second |
/// | `read_request_delay` | 100 ms | 10 requests per second |
///
/// A zero delay lets requests of that class through as soon as the ones
/// queued before them have been granted.
///
/// When deserialized, values are integer milliseconds under `*_delay_ms`
/// keys. Missing keys take the default and negative values clamp to zero.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use spoke_rate_limit::throttle::{DelaySettings, RateClass};
///
/// let settings = DelaySettings::builder()
///     .driver_creation_delay(Duration::from_millis(50))
///     .build();
///
/// assert_eq!(settings.delay_for(RateClass::DriverCreation), Some(Duration::from_millis(50)));
/// assert_eq!(settings.delay_for(RateClass::Read), Some(Duration::from_millis(100)));
/// assert_eq!(settings.delay_for(RateClass::Unclassified), None);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelaySettings {
    #[builder(default = default_driver_creation_delay())]
    #[serde(rename = "driver_creation_delay_ms", with = "millis")]
    pub(super) driver_creation_delay: Duration,

    #[builder(default = default_batch_import_stops_delay())]
    #[serde(rename = "batch_import_stops_delay_ms", with = "millis")]
    pub(super) batch_import_stops_delay: Duration,

    #[builder(default = default_batch_import_drivers_delay())]
    #[serde(rename = "batch_import_drivers_delay_ms", with = "millis")]
    pub(super) batch_import_drivers_delay: Duration,

    #[builder(default = default_plan_optimization_delay())]
    #[serde(rename = "plan_optimization_delay_ms", with = "millis")]
    pub(super) plan_optimization_delay: Duration,

    /// Fallback for writes no narrower rule claimed.
    #[builder(default = default_write_request_delay())]
    #[serde(rename = "write_request_delay_ms", with = "millis")]
    pub(super) write_request_delay: Duration,

    /// Fallback for reads.
    #[builder(default = default_read_request_delay())]
    #[serde(rename = "read_request_delay_ms", with = "millis")]
    pub(super) read_request_delay: Duration,
}

/// 1 request per second.
const fn default_driver_creation_delay() -> Duration {
    Duration::from_millis(1_000)
}

/// 10 requests per minute.
const fn default_batch_import_stops_delay() -> Duration {
    Duration::from_millis(60 * 1_000 / 10)
}

/// 2 requests per minute.
const fn default_batch_import_drivers_delay() -> Duration {
    Duration::from_millis(60 * 1_000 / 2)
}

/// 3 requests per minute.
const fn default_plan_optimization_delay() -> Duration {
    Duration::from_millis(60 * 1_000 / 3)
}

/// 5 requests per second.
const fn default_write_request_delay() -> Duration {
    Duration::from_millis(1_000 / 5)
}

/// 10 requests per second.
const fn default_read_request_delay() -> Duration {
    Duration::from_millis(1_000 / 10)
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            driver_creation_delay: default_driver_creation_delay(),
            batch_import_stops_delay: default_batch_import_stops_delay(),
            batch_import_drivers_delay: default_batch_import_drivers_delay(),
            plan_optimization_delay: default_plan_optimization_delay(),
            write_request_delay: default_write_request_delay(),
            read_request_delay: default_read_request_delay(),
        }
    }
}

impl DelaySettings {
    /// The configured delay for `class`, or `None` for [`RateClass::Unclassified`].
    pub const fn delay_for(&self, class: RateClass) -> Option<Duration> {
        match class {
            RateClass::DriverCreation => Some(self.driver_creation_delay),
            RateClass::BatchImportStops => Some(self.batch_import_stops_delay),
            RateClass::BatchImportDrivers => Some(self.batch_import_drivers_delay),
            RateClass::PlanOptimization => Some(self.plan_optimization_delay),
            RateClass::Write => Some(self.write_request_delay),
            RateClass::Read => Some(self.read_request_delay),
            RateClass::Unclassified => None,
        }
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis.max(0).unsigned_abs()))
    }
}
