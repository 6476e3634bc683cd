//! Per-call ISUP timer durations. Every timer is
//! per-call; a duration of `None` disables the timer and a duration of
//! `Default` takes the switch-variant default listed here.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Itu,
    Ansi,
}

/// A configured timer duration: `Disabled` (never armed), `Default`
/// (switch-variant default applies) or an explicit `Millis` override
/// (0 disables a timer, negative means default).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDuration {
    Disabled,
    Default,
    Millis(u64),
}

impl TimerDuration {
    pub fn resolve(self, default: Duration) -> Option<Duration> {
        match self {
            TimerDuration::Disabled => None,
            TimerDuration::Default => Some(default),
            TimerDuration::Millis(ms) => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for TimerDuration {
    fn default() -> Self {
        TimerDuration::Default
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsupTimers {
    pub t1: Duration,
    pub t2_t6: Duration,
    pub t5: Duration,
    pub t7: Duration,
    pub t8: Duration,
    pub t12_t13: Duration,
    pub t14_t15: Duration,
    pub t16_t17: Duration,
    pub t18_t19: Duration,
    pub t20_t21: Duration,
    pub t22_t23: Duration,
    pub t27: Duration,
    pub t33: Duration,
    pub t35: Duration,
    pub digit_timeout: Duration,
}

impl IsupTimers {
    pub fn for_variant(variant: Variant) -> IsupTimers {
        match variant {
            Variant::Itu => IsupTimers {
                t1: Duration::from_secs(15),
                t2_t6: Duration::from_secs(180),
                t5: Duration::from_secs(60),
                t7: Duration::from_secs(25),
                t8: Duration::from_secs(15),
                t12_t13: Duration::from_secs(15),
                t14_t15: Duration::from_secs(15),
                t16_t17: Duration::from_secs(15),
                t18_t19: Duration::from_secs(15),
                t20_t21: Duration::from_secs(15),
                t22_t23: Duration::from_secs(15),
                t27: Duration::from_secs(4),
                t33: Duration::from_secs(12),
                t35: Duration::from_secs(15),
                digit_timeout: Duration::from_secs(15),
            },
            Variant::Ansi => IsupTimers {
                t1: Duration::from_secs(15),
                t2_t6: Duration::from_secs(120),
                t5: Duration::from_secs(30),
                t7: Duration::from_secs(20),
                t8: Duration::from_secs(10),
                t12_t13: Duration::from_secs(15),
                t14_t15: Duration::from_secs(15),
                t16_t17: Duration::from_secs(15),
                t18_t19: Duration::from_secs(15),
                t20_t21: Duration::from_secs(15),
                t22_t23: Duration::from_secs(15),
                t27: Duration::from_secs(4),
                t33: Duration::from_secs(12),
                t35: Duration::from_secs(15),
                digit_timeout: Duration::from_secs(15),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_resolves() {
        assert_eq!(TimerDuration::Disabled.resolve(Duration::from_secs(1)), None);
    }

    #[test]
    fn default_resolves_to_given_default() {
        assert_eq!(
            TimerDuration::Default.resolve(Duration::from_secs(5)),
            Some(Duration::from_secs(5))
        );
    }

    #[test]
    fn explicit_override_wins() {
        assert_eq!(
            TimerDuration::Millis(250).resolve(Duration::from_secs(5)),
            Some(Duration::from_millis(250))
        );
    }
}
