//! Domain alignment for multi-signal reads
//!
//! Signals read in lock-step must share a domain unit and use linear domain
//! rules. Their tick resolutions are brought onto a common resolution whose
//! denominator is the LCM of the individual denominators, origins are turned
//! into common-tick offsets, and every signal's sample period must be an
//! exact integer multiple of the common period.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{DataDescriptor, DataRule, Ratio, lcm};

/// Synchronization progress of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
pub enum SyncState {
    #[default]
    Unsynchronized,
    /// Sync point not found yet; retried on the next call
    Synchronizing,
    Synchronized,
}

/// Placement of one signal on the common domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Alignment {
    /// Common ticks per own tick
    pub multiplier: i64,
    /// Common tick of the signal's own tick zero
    pub origin_offset: i64,
    /// Signal period divided by the common period
    pub divider: usize,
}

impl Alignment {
    pub(crate) fn to_common(&self, own: i64) -> i64 {
        own * self.multiplier + self.origin_offset
    }

    /// Smallest own tick at or after common tick `common`.
    pub(crate) fn to_own_ceil(&self, common: i64) -> i64 {
        (common - self.origin_offset).div_euclid(self.multiplier)
            + i64::from((common - self.origin_offset).rem_euclid(self.multiplier) != 0)
    }
}

/// Common domain of a set of signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommonDomain {
    /// Common ticks per second
    pub ticks_per_second: i64,
    /// Common ticks per common-rate sample
    pub period: i64,
    pub members: Vec<Alignment>,
    /// LCM of all dividers; read counts are floored to a multiple of it
    pub sample_multiple: usize,
}

impl CommonDomain {
    pub(crate) fn sample_rate(&self) -> f64 {
        self.ticks_per_second as f64 / self.period as f64
    }

    /// Round `common` up to the next whole domain unit (one second).
    pub(crate) fn ceil_to_unit(&self, common: i64) -> i64 {
        let unit = self.ticks_per_second;
        common.div_euclid(unit) * unit + if common.rem_euclid(unit) != 0 { unit } else { 0 }
    }
}

/// Compute the common domain of the given domain descriptors.
///
/// `required_rate`, in samples per domain unit, forces the common rate;
/// otherwise the fastest signal's rate is used. Returns a human readable
/// reason when the signals cannot be read in lock-step.
pub(crate) fn align(
    domains: &[&DataDescriptor],
    required_rate: Option<u64>,
) -> std::result::Result<CommonDomain, String> {
    if domains.is_empty() {
        return Err("no signals".to_string());
    }

    let unit = domains[0].unit.clone();
    let mut resolutions = Vec::with_capacity(domains.len());
    for (index, domain) in domains.iter().enumerate() {
        if domain.unit != unit {
            return Err(format!("signal {} has domain unit {:?}, expected {:?}", index, domain.unit, unit));
        }
        let DataRule::Linear { delta, .. } = domain.rule else {
            return Err(format!("signal {} does not use a linear domain rule", index));
        };
        let resolution = domain
            .tick_resolution
            .filter(Ratio::is_positive)
            .ok_or_else(|| format!("signal {} has no positive tick resolution", index))?;
        if delta <= 0 {
            return Err(format!("signal {} has non-increasing domain delta {}", index, delta));
        }
        resolutions.push((resolution, delta));
    }

    let mut den = resolutions
        .iter()
        .try_fold(1u64, |acc, (r, _)| lcm(acc, r.den as u64))
        .ok_or("common resolution overflows")?;
    if let Some(rate) = required_rate {
        if rate == 0 {
            return Err("required common sample rate must be positive".to_string());
        }
        den = lcm(den, rate).ok_or("common resolution overflows")?;
    }
    let ticks_per_second = i64::try_from(den).map_err(|_| "common resolution overflows")?;

    let multipliers: Vec<i64> = resolutions
        .iter()
        .map(|(r, _)| r.num * (ticks_per_second / r.den))
        .collect();
    let periods: Vec<i64> = resolutions.iter().zip(&multipliers).map(|((_, delta), m)| delta * m).collect();

    let period = match required_rate {
        Some(rate) => ticks_per_second / rate as i64,
        None => periods.iter().copied().min().unwrap_or(1),
    };

    let mut dividers = Vec::with_capacity(periods.len());
    for (index, signal_period) in periods.iter().enumerate() {
        if signal_period % period != 0 {
            return Err(format!(
                "signal {} rate {:.3} Hz is not an integer divisor of the common rate {:.3} Hz",
                index,
                ticks_per_second as f64 / *signal_period as f64,
                ticks_per_second as f64 / period as f64
            ));
        }
        dividers.push((signal_period / period) as usize);
    }

    let origins: Vec<Option<DateTime<Utc>>> = domains.iter().map(|d| d.origin_epoch()).collect();
    let earliest = origins.iter().flatten().min().copied();
    let members = multipliers
        .iter()
        .zip(&dividers)
        .zip(&origins)
        .map(|((multiplier, divider), origin)| Alignment {
            multiplier: *multiplier,
            origin_offset: match (origin, earliest) {
                (Some(origin), Some(earliest)) => origin_ticks(*origin - earliest, ticks_per_second),
                _ => 0,
            },
            divider: *divider,
        })
        .collect();

    let sample_multiple = dividers
        .iter()
        .try_fold(1u64, |acc, d| lcm(acc, *d as u64))
        .ok_or("divider LCM overflows")? as usize;

    Ok(CommonDomain { ticks_per_second, period, members, sample_multiple })
}

fn origin_ticks(offset: chrono::TimeDelta, ticks_per_second: i64) -> i64 {
    let nanos = offset.num_nanoseconds().map(i128::from).unwrap_or_else(|| {
        i128::from(offset.num_milliseconds()) * 1_000_000
    });
    (nanos * i128::from(ticks_per_second) / 1_000_000_000) as i64
}
