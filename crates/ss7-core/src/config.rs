//! Session configuration: switch type, point codes, timer durations,
//! link registration. Follows the teacher's
//! Input/Resolved split — an all-`Option` struct deserialized from TOML,
//! resolved once into a struct with concrete defaults applied.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use ss7_isup::timers::IsupTimers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchVariant {
    Itu,
    Ansi,
}

impl SwitchVariant {
    pub fn mtp2(self) -> ss7_mtp2::Variant {
        match self {
            SwitchVariant::Itu => ss7_mtp2::Variant::Itu,
            SwitchVariant::Ansi => ss7_mtp2::Variant::Ansi,
        }
    }

    pub fn mtp3(self) -> ss7_mtp3::routing_label::Variant {
        match self {
            SwitchVariant::Itu => ss7_mtp3::routing_label::Variant::Itu,
            SwitchVariant::Ansi => ss7_mtp3::routing_label::Variant::Ansi,
        }
    }

    pub fn isup(self) -> ss7_isup::timers::Variant {
        match self {
            SwitchVariant::Itu => ss7_isup::timers::Variant::Itu,
            SwitchVariant::Ansi => ss7_isup::timers::Variant::Ansi,
        }
    }

    /// Low 12 bits (ITU) or low 14 bits (ANSI) of the two-octet CIC field.
    pub fn cic_mask(self) -> u16 {
        match self {
            SwitchVariant::Itu => 0x0FFF,
            SwitchVariant::Ansi => 0x3FFF,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkIndicator {
    International,
    InternationalSpare,
    National,
    NationalSpare,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LinkConfigInput {
    pub slc: Option<u8>,
    pub adjacent_point_code: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlagsConfigInput {
    pub inr_if_no_calling: Option<bool>,
    pub isdn_access_indicator: Option<bool>,
}

/// Per-timer override table for the ISUP call-control timers. Each field
/// is milliseconds: absent means "use the switch-variant default",
/// negative means the same explicitly, and zero disables the timer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IsupTimerOverridesInput {
    pub t1: Option<i64>,
    pub t2_t6: Option<i64>,
    pub t5: Option<i64>,
    pub t7: Option<i64>,
    pub t8: Option<i64>,
    pub t12_t13: Option<i64>,
    pub t14_t15: Option<i64>,
    pub t16_t17: Option<i64>,
    pub t18_t19: Option<i64>,
    pub t20_t21: Option<i64>,
    pub t22_t23: Option<i64>,
    pub t27: Option<i64>,
    pub t33: Option<i64>,
    pub t35: Option<i64>,
    pub digit_timeout: Option<i64>,
}

fn resolve_timer(override_ms: Option<i64>, default: Duration) -> Option<Duration> {
    match override_ms {
        None => Some(default),
        Some(ms) if ms < 0 => Some(default),
        Some(0) => None,
        Some(ms) => Some(Duration::from_millis(ms as u64)),
    }
}

/// Resolved ISUP timer table: `None` means the timer is never armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsupTimerConfig {
    pub t1: Option<Duration>,
    pub t2_t6: Option<Duration>,
    pub t5: Option<Duration>,
    pub t7: Option<Duration>,
    pub t8: Option<Duration>,
    pub t12_t13: Option<Duration>,
    pub t14_t15: Option<Duration>,
    pub t16_t17: Option<Duration>,
    pub t18_t19: Option<Duration>,
    pub t20_t21: Option<Duration>,
    pub t22_t23: Option<Duration>,
    pub t27: Option<Duration>,
    pub t33: Option<Duration>,
    pub t35: Option<Duration>,
    pub digit_timeout: Option<Duration>,
}

impl IsupTimerOverridesInput {
    fn resolve(self, defaults: IsupTimers) -> IsupTimerConfig {
        IsupTimerConfig {
            t1: resolve_timer(self.t1, defaults.t1),
            t2_t6: resolve_timer(self.t2_t6, defaults.t2_t6),
            t5: resolve_timer(self.t5, defaults.t5),
            t7: resolve_timer(self.t7, defaults.t7),
            t8: resolve_timer(self.t8, defaults.t8),
            t12_t13: resolve_timer(self.t12_t13, defaults.t12_t13),
            t14_t15: resolve_timer(self.t14_t15, defaults.t14_t15),
            t16_t17: resolve_timer(self.t16_t17, defaults.t16_t17),
            t18_t19: resolve_timer(self.t18_t19, defaults.t18_t19),
            t20_t21: resolve_timer(self.t20_t21, defaults.t20_t21),
            t22_t23: resolve_timer(self.t22_t23, defaults.t22_t23),
            t27: resolve_timer(self.t27, defaults.t27),
            t33: resolve_timer(self.t33, defaults.t33),
            t35: resolve_timer(self.t35, defaults.t35),
            digit_timeout: resolve_timer(self.digit_timeout, defaults.digit_timeout),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StackConfigInput {
    pub switch_variant: Option<String>,
    pub own_point_code: Option<u32>,
    pub network_indicator: Option<String>,
    pub sls_shift: Option<u8>,
    pub links: Vec<LinkConfigInput>,
    pub flags: FlagsConfigInput,
    pub event_ring_capacity: Option<usize>,
    pub scheduler_capacity: Option<usize>,
    pub isup_timers: IsupTimerOverridesInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    pub inr_if_no_calling: bool,
    pub isdn_access_indicator: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Flags { inr_if_no_calling: true, isdn_access_indicator: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    pub slc: u8,
    pub adjacent_point_code: u32,
}

#[derive(Debug, Clone)]
pub struct StackConfig {
    pub switch_variant: SwitchVariant,
    pub own_point_code: u32,
    pub network_indicator: NetworkIndicator,
    pub sls_shift: u8,
    pub links: Vec<LinkConfig>,
    pub flags: Flags,
    pub event_ring_capacity: usize,
    pub scheduler_capacity: usize,
    pub isup_timers: IsupTimerConfig,
}

impl StackConfigInput {
    pub fn resolve(self) -> Result<StackConfig> {
        let switch_variant = match self.switch_variant.as_deref().unwrap_or("itu") {
            "itu" => SwitchVariant::Itu,
            "ansi" => SwitchVariant::Ansi,
            other => bail!("unknown switch_variant {:?} (expected \"itu\" or \"ansi\")", other),
        };
        let network_indicator = match self.network_indicator.as_deref().unwrap_or("national") {
            "international" => NetworkIndicator::International,
            "international-spare" => NetworkIndicator::InternationalSpare,
            "national" => NetworkIndicator::National,
            "national-spare" => NetworkIndicator::NationalSpare,
            other => bail!("unknown network_indicator {:?}", other),
        };
        let own_point_code = self.own_point_code.context("own_point_code is required")?;
        let isup_timer_defaults = IsupTimers::for_variant(switch_variant.isup());
        let isup_timers = self.isup_timers.resolve(isup_timer_defaults);

        let mut links = Vec::with_capacity(self.links.len());
        let mut seen_slcs = HashSet::new();
        for (idx, link) in self.links.into_iter().enumerate() {
            let slc = link.slc.unwrap_or(idx as u8);
            if !seen_slcs.insert(slc) {
                bail!("duplicate link slc {}", slc);
            }
            links.push(LinkConfig { slc, adjacent_point_code: link.adjacent_point_code });
        }

        Ok(StackConfig {
            switch_variant,
            own_point_code,
            network_indicator,
            sls_shift: self.sls_shift.unwrap_or(0),
            links,
            flags: Flags {
                inr_if_no_calling: self.flags.inr_if_no_calling.unwrap_or(true),
                isdn_access_indicator: self.flags.isdn_access_indicator.unwrap_or(false),
            },
            event_ring_capacity: self.event_ring_capacity.unwrap_or(16).max(1),
            scheduler_capacity: self.scheduler_capacity.unwrap_or(512).max(1),
            isup_timers,
        })
    }
}

impl StackConfig {
    pub fn from_toml_str(input: &str) -> Result<StackConfig> {
        let parsed: StackConfigInput = toml::from_str(input).context("invalid configuration TOML")?;
        parsed.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_minimal_config() {
        let cfg = StackConfig::from_toml_str(
            r#"
            own_point_code = 1234

            [[links]]
            adjacent_point_code = 5678
            "#,
        )
        .unwrap();
        assert_eq!(cfg.switch_variant, SwitchVariant::Itu);
        assert_eq!(cfg.own_point_code, 1234);
        assert_eq!(cfg.links.len(), 1);
        assert_eq!(cfg.links[0].slc, 0);
        assert_eq!(cfg.event_ring_capacity, 16);
        assert_eq!(cfg.isup_timers.t1, Some(Duration::from_secs(15)));
    }

    #[test]
    fn isup_timer_overrides_apply() {
        let cfg = StackConfig::from_toml_str(
            r#"
            own_point_code = 1

            [[links]]
            adjacent_point_code = 2

            [isup_timers]
            t1 = 500
            t8 = 0
            t35 = -1
            "#,
        )
        .unwrap();
        assert_eq!(cfg.isup_timers.t1, Some(Duration::from_millis(500)));
        assert_eq!(cfg.isup_timers.t8, None);
        assert_eq!(cfg.isup_timers.t35, Some(Duration::from_secs(15)));
    }

    #[test]
    fn missing_point_code_is_an_error() {
        assert!(StackConfig::from_toml_str("").is_err());
    }

    #[test]
    fn duplicate_slc_is_rejected() {
        let result = StackConfig::from_toml_str(
            r#"
            own_point_code = 1

            [[links]]
            slc = 0
            adjacent_point_code = 2

            [[links]]
            slc = 0
            adjacent_point_code = 3
            "#,
        );
        assert!(result.is_err());
    }
}
