//!
//! Configuration
//!
//! The scheduler's only environment-driven knob: `SLEEP_THRESHOLD`, how
//! long a worker spins and polls before it is eligible to park. Parsed
//! once at `init` time and reported as an error rather than silently
//! defaulted on malformed input, so a typo in deployment configuration is
//! visible at startup instead of producing a scheduler that never sleeps
//! or never spins.
//!

use std::time::Duration;

use naml_std_scheduler::SchedulerError;

pub const SLEEP_THRESHOLD_VAR: &str = "SLEEP_THRESHOLD";

/// `None` disables parking entirely (the literal `"infinite"`, matched
/// case-insensitively); `Some(d)` is the minimum fruitless-spin duration
/// before a worker may attempt to sleep. A numeric value is a raw count of
/// high-resolution monotonic units (nanoseconds), with no rescaling -
/// matching the environment variable's own definition, not a
/// milliseconds-for-readability convenience.
pub fn parse_sleep_threshold(raw: Option<&str>) -> Result<Option<Duration>, SchedulerError> {
    match raw {
        None => Ok(Some(naml_std_scheduler::scheduler::DEFAULT_SLEEP_THRESHOLD)),
        Some(value) if value.trim().eq_ignore_ascii_case("infinite") => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_nanos)
            .map(Some)
            .map_err(|_| SchedulerError::InvalidConfig { value: value.to_string() }),
    }
}

/// Reads [`SLEEP_THRESHOLD_VAR`] from the process environment and parses
/// it with [`parse_sleep_threshold`].
pub fn sleep_threshold_from_env() -> Result<Option<Duration>, SchedulerError> {
    parse_sleep_threshold(std::env::var(SLEEP_THRESHOLD_VAR).ok().as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_yields_default() {
        assert_eq!(
            parse_sleep_threshold(None).unwrap(),
            Some(naml_std_scheduler::scheduler::DEFAULT_SLEEP_THRESHOLD)
        );
    }

    #[test]
    fn infinite_disables_parking_scenario_s7() {
        assert_eq!(parse_sleep_threshold(Some("infinite")).unwrap(), None);
        assert_eq!(parse_sleep_threshold(Some("INFINITE")).unwrap(), None);
        assert_eq!(parse_sleep_threshold(Some("  Infinite ")).unwrap(), None);
    }

    #[test]
    fn numeric_value_parses_to_nanos_scenario_s7() {
        assert_eq!(
            parse_sleep_threshold(Some("250")).unwrap(),
            Some(Duration::from_nanos(250))
        );
    }

    #[test]
    fn garbage_value_is_invalid_config_scenario_s7() {
        let err = parse_sleep_threshold(Some("banana"));
        assert!(matches!(err, Err(SchedulerError::InvalidConfig { value }) if value == "banana"));
    }
}
