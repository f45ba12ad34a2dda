//! Serialized command dispatch queue.
//!
//! Jobs are issued strictly in enqueue order with at most one in flight. The
//! transport can only say "the exchange completed" or "it failed", so each
//! in-flight job is resolved by whichever comes first of a load report, an
//! error report or its deadline. Later reports for the same job are ignored.
//!
//! `Sent` therefore means the request reached something that answered. It
//! does not confirm the lamp applied the command; the response is never
//! read.
//!
//! The dispatcher does no I/O itself. It returns [`DispatchAction`]s that the
//! dispatcher task turns into transport loads and UI updates, and it is woken
//! by [`Dispatcher::on_tick`] at [`Dispatcher::next_wakeup`].

use std::collections::VecDeque;

use crate::clock::Clock;
use crate::config::DispatchConfig;

use super::address::DeviceAddress;
use super::command::CommandJob;
use super::transport::LoadSignal;

/// Identifies one issuance; load reports carry it back.
pub type JobId = u64;

/// Why a job could not be issued or confirmed for configuration reasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    MissingDeviceAddress,
    TransportUnavailable(String),
}

impl std::fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingDeviceAddress => write!(f, "no device address configured"),
            ConfigurationError::TransportUnavailable(msg) => write!(f, "transport unavailable: {}", msg),
        }
    }
}

/// A command whose delivery could not be confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The transport reported a network-level error.
    NetworkError,
    /// Neither report arrived before the deadline.
    Timeout,
    Configuration(ConfigurationError),
}

impl std::fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportFailure::NetworkError => write!(f, "onerror"),
            TransportFailure::Timeout => write!(f, "timeout"),
            TransportFailure::Configuration(err) => write!(f, "{}", err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Failed(TransportFailure),
}

/// A job leaving the queue for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub job_id: JobId,
    pub url: String,
    pub label: String,
}

/// Final outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub job_id: JobId,
    pub label: String,
    pub outcome: DispatchOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchAction {
    Issue(Issue),
    Resolved(Resolution),
}

#[derive(Debug)]
struct InFlight {
    job_id: JobId,
    label: String,
    deadline_ms: u64,
}

#[derive(Debug)]
enum DispatchState {
    Idle,
    InFlight(InFlight),
}

/// FIFO dispatch queue with single-concurrency issuance.
pub struct Dispatcher<C: Clock> {
    clock: C,
    address: DeviceAddress,
    queue: VecDeque<CommandJob>,
    state: DispatchState,
    scheduled_drain_ms: Option<u64>,
    next_job_id: JobId,
    timeout_ms: u64,
    cooldown_ms: u64,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(clock: C, address: DeviceAddress, config: &DispatchConfig) -> Self {
        Self {
            clock,
            address,
            queue: VecDeque::new(),
            state: DispatchState::Idle,
            scheduled_drain_ms: None,
            next_job_id: 1,
            timeout_ms: config.timeout_ms,
            cooldown_ms: config.cooldown_ms,
        }
    }

    /// Use `address` for every job issued from now on.
    pub fn set_address(&mut self, address: DeviceAddress) {
        self.address = address;
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Number of jobs waiting behind the in-flight one.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> Option<JobId> {
        match &self.state {
            DispatchState::InFlight(job) => Some(job.job_id),
            DispatchState::Idle => None,
        }
    }

    /// Append a job and try to issue. Identical jobs are never merged.
    pub fn enqueue(&mut self, job: CommandJob) -> Option<DispatchAction> {
        self.queue.push_back(job);
        self.drain()
    }

    /// Issue the head job unless one is already in flight.
    pub fn drain(&mut self) -> Option<DispatchAction> {
        if self.in_flight().is_some() {
            return None;
        }
        let job = self.queue.pop_front()?;

        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let Some(url) = self.address.command_url(&job.target, self.clock.epoch_ms()) else {
            let failure = TransportFailure::Configuration(ConfigurationError::MissingDeviceAddress);
            return Some(self.finish(job_id, job.label, DispatchOutcome::Failed(failure)));
        };

        self.state = DispatchState::InFlight(InFlight {
            job_id,
            label: job.label.clone(),
            deadline_ms: self.clock.now_ms() + self.timeout_ms,
        });

        Some(DispatchAction::Issue(Issue {
            job_id,
            url,
            label: job.label,
        }))
    }

    /// Apply a transport report. Reports for anything but the in-flight job
    /// are stale and ignored; a report processed at or past the deadline
    /// loses to the timeout.
    pub fn on_signal(&mut self, job_id: JobId, signal: LoadSignal) -> Option<DispatchAction> {
        let deadline_ms = match &self.state {
            DispatchState::InFlight(job) if job.job_id == job_id => job.deadline_ms,
            _ => {
                log::debug!("Ignoring stale {:?} report for job {}", signal, job_id);
                return None;
            }
        };

        let outcome = if self.clock.now_ms() >= deadline_ms {
            DispatchOutcome::Failed(TransportFailure::Timeout)
        } else {
            match signal {
                LoadSignal::Loaded => DispatchOutcome::Sent,
                LoadSignal::Error => DispatchOutcome::Failed(TransportFailure::NetworkError),
            }
        };
        self.resolve_in_flight(outcome)
    }

    /// The transport refused the load outright; fail the in-flight job.
    pub fn on_issue_error(&mut self, job_id: JobId, reason: String) -> Option<DispatchAction> {
        if self.in_flight() != Some(job_id) {
            return None;
        }
        let failure = TransportFailure::Configuration(ConfigurationError::TransportUnavailable(reason));
        self.resolve_in_flight(DispatchOutcome::Failed(failure))
    }

    /// Fire whatever is due: the in-flight deadline or the scheduled drain.
    pub fn on_tick(&mut self) -> Option<DispatchAction> {
        let now = self.clock.now_ms();

        if let DispatchState::InFlight(job) = &self.state {
            if now >= job.deadline_ms {
                return self.resolve_in_flight(DispatchOutcome::Failed(TransportFailure::Timeout));
            }
        }

        match self.scheduled_drain_ms {
            Some(at) if now >= at => {
                self.scheduled_drain_ms = None;
                self.drain()
            }
            _ => None,
        }
    }

    /// Earliest monotonic time at which [`Self::on_tick`] has work to do.
    pub fn next_wakeup(&self) -> Option<u64> {
        let deadline = match &self.state {
            DispatchState::InFlight(job) => Some(job.deadline_ms),
            DispatchState::Idle => None,
        };
        match (deadline, self.scheduled_drain_ms) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn resolve_in_flight(&mut self, outcome: DispatchOutcome) -> Option<DispatchAction> {
        match std::mem::replace(&mut self.state, DispatchState::Idle) {
            DispatchState::InFlight(job) => Some(self.finish(job.job_id, job.label, outcome)),
            DispatchState::Idle => None,
        }
    }

    fn finish(&mut self, job_id: JobId, label: String, outcome: DispatchOutcome) -> DispatchAction {
        self.state = DispatchState::Idle;
        self.scheduled_drain_ms = Some(self.clock.now_ms() + self.cooldown_ms);
        DispatchAction::Resolved(Resolution { job_id, label, outcome })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::control::command::DeviceCommand;

    const EPOCH: i64 = 1_700_000_000_000;

    fn dispatcher() -> (Dispatcher<ManualClock>, ManualClock) {
        let clock = ManualClock::new(EPOCH);
        let dispatcher = Dispatcher::new(clock.clone(), DeviceAddress::normalize("192.168.100.7"), &DispatchConfig::default());
        (dispatcher, clock)
    }

    fn job(label: &str) -> CommandJob {
        CommandJob {
            target: format!("/api/{}", label.to_lowercase()),
            label: label.to_string(),
        }
    }

    fn expect_issue(action: Option<DispatchAction>) -> Issue {
        match action {
            Some(DispatchAction::Issue(issue)) => issue,
            other => panic!("expected issue, got {:?}", other),
        }
    }

    fn expect_resolution(action: Option<DispatchAction>) -> Resolution {
        match action {
            Some(DispatchAction::Resolved(resolution)) => resolution,
            other => panic!("expected resolution, got {:?}", other),
        }
    }

    /// Run the queue to completion, answering every issue with `Loaded` after
    /// `latency` ms, and record issue/resolve events in order.
    fn run_to_completion(dispatcher: &mut Dispatcher<ManualClock>, clock: &ManualClock, latency: u64) -> Vec<String> {
        let mut events = Vec::new();
        let mut outstanding: Option<JobId> = None;
        for _ in 0..10_000 {
            if let Some(id) = outstanding.take() {
                clock.advance(latency);
                let resolution = expect_resolution(dispatcher.on_signal(id, LoadSignal::Loaded));
                events.push(format!("done {}", resolution.label));
                continue;
            }
            let Some(at) = dispatcher.next_wakeup() else { break };
            clock.set(at.max(clock.now_ms()));
            if let Some(DispatchAction::Issue(issue)) = dispatcher.on_tick() {
                assert!(outstanding.is_none(), "two issuances outstanding");
                events.push(format!("issue {}", issue.label));
                outstanding = Some(issue.job_id);
            }
        }
        events
    }

    #[test]
    fn jobs_issue_in_fifo_order_without_overlap() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("A")));
        assert_eq!(dispatcher.enqueue(job("B")), None);
        assert_eq!(dispatcher.enqueue(job("C")), None);
        assert_eq!(dispatcher.pending(), 2);

        clock.advance(20);
        expect_resolution(dispatcher.on_signal(first.job_id, LoadSignal::Loaded));

        let mut events = vec![format!("issue {}", first.label), "done A".to_string()];
        events.extend(run_to_completion(&mut dispatcher, &clock, 20));
        assert_eq!(events, vec!["issue A", "done A", "issue B", "done B", "issue C", "done C"]);
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(dispatcher.in_flight(), None);
    }

    #[test]
    fn many_jobs_never_overlap() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("J0")));
        for i in 1..50 {
            assert_eq!(dispatcher.enqueue(job(&format!("J{}", i))), None);
        }
        clock.advance(5);
        expect_resolution(dispatcher.on_signal(first.job_id, LoadSignal::Loaded));
        let events = run_to_completion(&mut dispatcher, &clock, 5);
        let issued: Vec<_> = events.iter().filter(|e| e.starts_with("issue")).cloned().collect();
        let expected: Vec<_> = (1..50).map(|i| format!("issue J{}", i)).collect();
        assert_eq!(issued, expected);
    }

    #[test]
    fn identical_commands_are_not_coalesced() {
        let (mut dispatcher, _clock) = dispatcher();
        let power_on = DeviceCommand::Power { on: true }.to_job();
        expect_issue(dispatcher.enqueue(power_on.clone()));
        dispatcher.enqueue(power_on.clone());
        dispatcher.enqueue(power_on);
        assert_eq!(dispatcher.pending(), 2);
    }

    #[test]
    fn issue_url_carries_address_target_and_cache_buster() {
        let (mut dispatcher, clock) = dispatcher();
        clock.set(77);
        let issue = expect_issue(dispatcher.enqueue(DeviceCommand::Brightness(80).to_job()));
        assert_eq!(issue.url, format!("http://192.168.100.7/api/bri?v=80&_ts={}", EPOCH + 77));
        assert_eq!(issue.label, "BRI 80");
    }

    #[test]
    fn load_before_deadline_is_sent() {
        let (mut dispatcher, clock) = dispatcher();
        let issue = expect_issue(dispatcher.enqueue(job("A")));
        clock.advance(1499);
        let resolution = expect_resolution(dispatcher.on_signal(issue.job_id, LoadSignal::Loaded));
        assert_eq!(resolution.outcome, DispatchOutcome::Sent);
    }

    #[test]
    fn error_before_deadline_is_network_error() {
        let (mut dispatcher, clock) = dispatcher();
        let issue = expect_issue(dispatcher.enqueue(job("A")));
        clock.advance(10);
        let resolution = expect_resolution(dispatcher.on_signal(issue.job_id, LoadSignal::Error));
        assert_eq!(resolution.outcome, DispatchOutcome::Failed(TransportFailure::NetworkError));
        assert_eq!(TransportFailure::NetworkError.to_string(), "onerror");
    }

    #[test]
    fn silence_times_out_exactly_at_the_boundary() {
        let (mut dispatcher, clock) = dispatcher();
        expect_issue(dispatcher.enqueue(job("A")));
        assert_eq!(dispatcher.next_wakeup(), Some(1500));

        clock.set(1499);
        assert_eq!(dispatcher.on_tick(), None);

        clock.set(1500);
        let resolution = expect_resolution(dispatcher.on_tick());
        assert_eq!(resolution.outcome, DispatchOutcome::Failed(TransportFailure::Timeout));
        assert_eq!(TransportFailure::Timeout.to_string(), "timeout");
    }

    #[test]
    fn report_at_deadline_loses_to_timeout() {
        let (mut dispatcher, clock) = dispatcher();
        let issue = expect_issue(dispatcher.enqueue(job("A")));
        clock.set(1500);
        let resolution = expect_resolution(dispatcher.on_signal(issue.job_id, LoadSignal::Loaded));
        assert_eq!(resolution.outcome, DispatchOutcome::Failed(TransportFailure::Timeout));
    }

    #[test]
    fn later_reports_for_a_resolved_job_are_ignored() {
        let (mut dispatcher, clock) = dispatcher();
        let issue = expect_issue(dispatcher.enqueue(job("A")));
        clock.advance(100);
        expect_resolution(dispatcher.on_signal(issue.job_id, LoadSignal::Loaded));
        assert_eq!(dispatcher.on_signal(issue.job_id, LoadSignal::Error), None);
        assert_eq!(dispatcher.on_signal(issue.job_id, LoadSignal::Loaded), None);
    }

    #[test]
    fn late_load_of_timed_out_job_does_not_resolve_the_next_one() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("A")));
        dispatcher.enqueue(job("B"));

        clock.set(1500);
        expect_resolution(dispatcher.on_tick());
        clock.set(1560);
        let second = expect_issue(dispatcher.on_tick());
        assert_eq!(second.label, "B");

        clock.advance(10);
        assert_eq!(dispatcher.on_signal(first.job_id, LoadSignal::Loaded), None);
        assert_eq!(dispatcher.in_flight(), Some(second.job_id));
    }

    #[test]
    fn next_job_waits_for_the_cooldown() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("A")));
        dispatcher.enqueue(job("B"));

        clock.set(100);
        expect_resolution(dispatcher.on_signal(first.job_id, LoadSignal::Loaded));
        assert_eq!(dispatcher.next_wakeup(), Some(160));

        clock.set(159);
        assert_eq!(dispatcher.on_tick(), None);
        clock.set(160);
        assert_eq!(expect_issue(dispatcher.on_tick()).label, "B");
    }

    #[test]
    fn enqueue_during_cooldown_issues_immediately() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("A")));
        clock.set(100);
        expect_resolution(dispatcher.on_signal(first.job_id, LoadSignal::Loaded));

        clock.set(110);
        let second = expect_issue(dispatcher.enqueue(job("B")));
        clock.set(160);
        assert_eq!(dispatcher.on_tick(), None);
        assert_eq!(dispatcher.in_flight(), Some(second.job_id));
    }

    #[test]
    fn failed_job_is_dropped_and_queue_moves_on() {
        let (mut dispatcher, clock) = dispatcher();
        let first = expect_issue(dispatcher.enqueue(job("A")));
        dispatcher.enqueue(job("B"));
        clock.set(5);
        expect_resolution(dispatcher.on_signal(first.job_id, LoadSignal::Error));
        clock.set(65);
        assert_eq!(expect_issue(dispatcher.on_tick()).label, "B");
        assert_eq!(dispatcher.pending(), 0);
    }

    #[test]
    fn missing_address_fails_without_issuing() {
        let clock = ManualClock::new(EPOCH);
        let mut dispatcher = Dispatcher::new(clock.clone(), DeviceAddress::default(), &DispatchConfig::default());
        let resolution = expect_resolution(dispatcher.enqueue(job("A")));
        assert_eq!(
            resolution.outcome,
            DispatchOutcome::Failed(TransportFailure::Configuration(ConfigurationError::MissingDeviceAddress))
        );
        assert_eq!(dispatcher.in_flight(), None);

        dispatcher.set_address(DeviceAddress::normalize("10.0.0.2"));
        clock.set(10);
        let issue = expect_issue(dispatcher.enqueue(job("B")));
        assert_eq!(issue.url, format!("http://10.0.0.2/api/b?_ts={}", EPOCH + 10));
    }

    #[test]
    fn transport_refusal_fails_the_in_flight_job() {
        let (mut dispatcher, _clock) = dispatcher();
        let issue = expect_issue(dispatcher.enqueue(job("A")));
        let resolution = expect_resolution(dispatcher.on_issue_error(issue.job_id, "worker gone".into()));
        assert!(matches!(
            resolution.outcome,
            DispatchOutcome::Failed(TransportFailure::Configuration(ConfigurationError::TransportUnavailable(_)))
        ));
        assert_eq!(dispatcher.on_issue_error(issue.job_id, "again".into()), None);
    }
}
