// Lock metrics published through the `metrics` facade
// Nothing is recorded unless the application installs a recorder

use metrics::{counter, describe_counter};

pub const OBTAIN_ATTEMPTS: &str = "keylock_obtain_attempts_total";
pub const OBTAIN_TOTAL: &str = "keylock_obtain_total";
pub const RELEASE_TOTAL: &str = "keylock_release_total";
pub const REFRESH_TOTAL: &str = "keylock_refresh_total";

/// Register metric descriptions; call once at application startup.
pub fn describe_metrics() {
    describe_counter!(
        OBTAIN_ATTEMPTS,
        "Total number of conditional set attempts made while obtaining locks"
    );
    describe_counter!(
        OBTAIN_TOTAL,
        "Total number of obtain calls by outcome (obtained, not_obtained, cancelled, error)"
    );
    describe_counter!(
        RELEASE_TOTAL,
        "Total number of lock releases by outcome (released, already_gone, error)"
    );
    describe_counter!(
        REFRESH_TOTAL,
        "Total number of lock refreshes by outcome (refreshed, not_held, error)"
    );
}

pub(crate) fn record_attempt() {
    counter!(OBTAIN_ATTEMPTS).increment(1);
}

pub(crate) fn record_obtain(outcome: &'static str) {
    counter!(OBTAIN_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_release(outcome: &'static str) {
    counter!(RELEASE_TOTAL, "outcome" => outcome).increment(1);
}

pub(crate) fn record_refresh(outcome: &'static str) {
    counter!(REFRESH_TOTAL, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        describe_metrics();
        record_attempt();
        record_obtain("obtained");
        record_release("released");
        record_refresh("not_held");
    }
}
