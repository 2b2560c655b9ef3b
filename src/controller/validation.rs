use crate::controller::intstr::is_valid_int_or_percent;
use crate::crd::daemonset::ExtendedDaemonSet;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::time::Duration;

/// Validate ExtendedDaemonSet specification
///
/// Validates runtime constraints that cannot be enforced via CRD schema. A failure
/// aborts the reconcile pass until the spec is corrected.
///
/// # Validation Rules
/// - The pod template must declare at least one container
/// - `minReadySeconds` must be >= 0
/// - Every int-or-percent field must be a non-negative integer or "0%".."100%"
/// - Every duration field must parse (e.g., "30s", "5m", "2h")
/// - `maxParallelPodCreation` must be > 0
/// - Canary anti-affinity keys cannot be empty strings
///
/// # Returns
/// * `Ok(())` - Validation passed
/// * `Err(String)` - Validation error message
pub fn validate_daemonset(eds: &ExtendedDaemonSet) -> Result<(), String> {
    let has_containers = eds
        .spec
        .template
        .spec
        .as_ref()
        .map(|s| !s.containers.is_empty())
        .unwrap_or(false);
    if !has_containers {
        return Err("spec.template.spec.containers must have at least one container".to_string());
    }

    if eds.spec.min_ready_seconds < 0 {
        return Err(format!(
            "spec.minReadySeconds must be >= 0, got {}",
            eds.spec.min_ready_seconds
        ));
    }

    let rolling = &eds.spec.strategy.rolling_update;
    check_int_or_percent(
        "spec.strategy.rollingUpdate.maxUnavailable",
        rolling.max_unavailable.as_ref(),
    )?;
    check_int_or_percent(
        "spec.strategy.rollingUpdate.maxPodSchedulerFailure",
        rolling.max_pod_scheduler_failure.as_ref(),
    )?;
    check_int_or_percent(
        "spec.strategy.rollingUpdate.slowStartAdditiveIncrease",
        rolling.slow_start_additive_increase.as_ref(),
    )?;
    check_duration(
        "spec.strategy.rollingUpdate.slowStartIntervalDuration",
        rolling.slow_start_interval_duration.as_deref(),
    )?;
    if let Some(max_creation) = rolling.max_parallel_pod_creation {
        if max_creation <= 0 {
            return Err(format!(
                "spec.strategy.rollingUpdate.maxParallelPodCreation must be > 0, got {}",
                max_creation
            ));
        }
    }

    check_duration(
        "spec.strategy.reconcileFrequency",
        eds.spec.strategy.reconcile_frequency.as_deref(),
    )?;

    if let Some(canary) = &eds.spec.strategy.canary {
        check_int_or_percent("spec.strategy.canary.replicas", canary.replicas.as_ref())?;
        check_duration("spec.strategy.canary.duration", canary.duration.as_deref())?;
        check_duration(
            "spec.strategy.canary.noRestartsDuration",
            canary.no_restarts_duration.as_deref(),
        )?;

        if let Some(i) = canary
            .node_anti_affinity_keys
            .iter()
            .position(|k| k.trim().is_empty())
        {
            return Err(format!(
                "spec.strategy.canary.nodeAntiAffinityKeys[{}] cannot be empty",
                i
            ));
        }

        if let Some(auto_pause) = &canary.auto_pause {
            if auto_pause.max_restarts.map(|r| r < 0).unwrap_or(false) {
                return Err("spec.strategy.canary.autoPause.maxRestarts must be >= 0".to_string());
            }
            check_duration(
                "spec.strategy.canary.autoPause.maxSlowStartDuration",
                auto_pause.max_slow_start_duration.as_deref(),
            )?;
        }

        if let Some(auto_fail) = &canary.auto_fail {
            if auto_fail.max_restarts.map(|r| r < 0).unwrap_or(false) {
                return Err("spec.strategy.canary.autoFail.maxRestarts must be >= 0".to_string());
            }
            check_duration(
                "spec.strategy.canary.autoFail.maxRestartsDuration",
                auto_fail.max_restarts_duration.as_deref(),
            )?;
            check_duration(
                "spec.strategy.canary.autoFail.canaryTimeout",
                auto_fail.canary_timeout.as_deref(),
            )?;
        }
    }

    Ok(())
}

fn check_int_or_percent(field: &str, value: Option<&IntOrString>) -> Result<(), String> {
    match value {
        Some(v) if !is_valid_int_or_percent(v) => Err(format!(
            "{} invalid format '{:?}': must be percentage (e.g., '10%') or absolute number (e.g., '1')",
            field, v
        )),
        _ => Ok(()),
    }
}

fn check_duration(field: &str, value: Option<&str>) -> Result<(), String> {
    match value {
        Some(v) if parse_duration(v).is_none() => Err(format!("{} invalid: {}", field, v)),
        _ => Ok(()),
    }
}

/// Longest accepted duration; longer values are most likely typos (e.g. "8760h")
const MAX_DURATION: Duration = Duration::from_secs(168 * 3600);

/// Parse a Go-style duration string like "5m", "1m30s" or "1h0m0s"
///
/// A sequence of `<integer><unit>` terms with units `h`, `m`, `s` and `ms`, as the
/// API server writes `metav1.Duration`. The total must be at least 1ms and at most
/// one week.
pub fn parse_duration(duration_str: &str) -> Option<Duration> {
    let mut rest = duration_str.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit())?;
        if digits == 0 {
            return None;
        }
        let number: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let term = match &rest[..unit_len] {
            "h" => Duration::from_secs(number.checked_mul(3600)?),
            "m" => Duration::from_secs(number.checked_mul(60)?),
            "s" => Duration::from_secs(number),
            "ms" => Duration::from_millis(number),
            _ => return None,
        };
        rest = &rest[unit_len..];

        total = total.checked_add(term)?;
        if total > MAX_DURATION {
            return None;
        }
    }

    (!total.is_zero()).then_some(total)
}

/// Parse an optional duration string into a signed chrono duration
///
/// Unset or malformed values yield None; malformed values are rejected earlier by
/// `validate_daemonset`.
pub fn parse_chrono_duration(duration_str: Option<&str>) -> Option<chrono::Duration> {
    duration_str
        .and_then(parse_duration)
        .and_then(|d| chrono::Duration::from_std(d).ok())
}
