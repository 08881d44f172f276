// Metrics for lock operations
// Counters are recorded through the `metrics` facade; install a recorder to export them

use metrics::{counter, describe_counter};

/// Result of one acquire attempt, used as the `outcome` label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Key was absent and this caller created it
    Created,
    /// Key held an expired deadline and this caller swapped it out
    Stolen,
    /// Key holds a deadline that has not passed
    Contended,
    /// Another caller won the swap on an expired deadline
    LostRace,
    /// A store round-trip failed
    Failed,
}

impl AcquireOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquireOutcome::Created => "created",
            AcquireOutcome::Stolen => "stolen",
            AcquireOutcome::Contended => "contended",
            AcquireOutcome::LostRace => "lost_race",
            AcquireOutcome::Failed => "failed",
        }
    }

    pub fn acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Created | AcquireOutcome::Stolen)
    }
}

impl std::fmt::Display for AcquireOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Register metric descriptions; call once at startup
pub fn init_metrics() {
    describe_counter!(
        "kvlock_acquire_total",
        "Total number of lock acquire attempts by outcome"
    );
    describe_counter!("kvlock_renew_total", "Total number of lock renewals");
    describe_counter!("kvlock_release_total", "Total number of lock releases");
    describe_counter!(
        "kvlock_store_errors_total",
        "Total number of failed store round-trips by command"
    );
}

pub fn record_acquire(outcome: AcquireOutcome) {
    counter!("kvlock_acquire_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_renew() {
    counter!("kvlock_renew_total").increment(1);
}

pub fn record_release() {
    counter!("kvlock_release_total").increment(1);
}

pub fn record_store_error(command: &'static str) {
    counter!("kvlock_store_errors_total", "command" => command).increment(1);
}
