//! Integration tests for metricwatch
//!
//! These tests verify end-to-end behavior of the monitor loop and the
//! file-based leader election against real time and a real filesystem.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::watch;

use metricwatch::config::Config;
use metricwatch::leadership::{
    ElectionOutcome, ElectorConfig, FileLeaseBackend, LeaderElector, LeaseRecord,
};
use metricwatch::{
    Action, ActionContext, ActionError, Dispatcher, LeadershipHandle, MissingValueMode,
    MonitorEngine, SampleError, Sampler, StateMachine, ThresholdLevel, ThresholdOperator,
    ThresholdPolicy, build_registry,
};

// =============================================================================
// Test doubles
// =============================================================================

#[derive(Debug, Default)]
struct CountingAction {
    calls: AtomicUsize,
}

impl CountingAction {
    fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Action for CountingAction {
    async fn execute(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "counting"
    }

    fn validate_config(&self) -> Result<(), ActionError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AlwaysFailingAction {
    calls: AtomicUsize,
}

#[async_trait]
impl Action for AlwaysFailingAction {
    async fn execute(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ActionError::Failed("receiver down".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }

    fn validate_config(&self) -> Result<(), ActionError> {
        Ok(())
    }
}

/// Always returns the same sampling outcome
struct SteadySampler {
    value: Option<f64>,
}

#[async_trait]
impl Sampler for SteadySampler {
    async fn sample(&self) -> Result<Option<f64>, SampleError> {
        Ok(self.value)
    }

    fn query(&self) -> &str {
        "steady"
    }
}

fn policy(
    soft: Option<(f64, Arc<CountingAction>, u64)>,
    hard: Option<(f64, Arc<CountingAction>, u64)>,
) -> ThresholdPolicy {
    let level = |(trigger, action, sustain_ms): (f64, Arc<CountingAction>, u64)| ThresholdLevel {
        trigger,
        sustain: Duration::from_millis(sustain_ms),
        cooldown: Duration::ZERO,
        action,
    };
    ThresholdPolicy {
        operator: ThresholdOperator::GreaterThan,
        soft: soft.map(level),
        hard: hard.map(level),
    }
}

fn engine(sampler: SteadySampler, policy: ThresholdPolicy, leader: bool, mode: MissingValueMode) -> MonitorEngine {
    let dispatcher = Dispatcher::new(LeadershipHandle::new(leader), "test_metric".to_string());
    MonitorEngine::new(
        Box::new(sampler),
        StateMachine::new(policy),
        dispatcher,
        Duration::from_millis(10),
        Duration::from_secs(1),
        mode,
    )
}

async fn run_for(engine: MonitorEngine, duration: Duration) {
    let (tx, rx) = watch::channel(false);
    let task = tokio::spawn(engine.run(rx));
    tokio::time::sleep(duration).await;
    tx.send(true).expect("engine dropped receiver");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("engine did not stop on shutdown")
        .expect("engine task panicked");
}

// =============================================================================
// Monitor loop end-to-end
// =============================================================================

#[tokio::test]
async fn test_sustained_violation_escalates_through_both_tiers() {
    let soft = Arc::new(CountingAction::default());
    let hard = Arc::new(CountingAction::default());

    let engine = engine(
        SteadySampler { value: Some(150.0) },
        policy(Some((80.0, soft.clone(), 30)), Some((100.0, hard.clone(), 30))),
        true,
        MissingValueMode::Zero,
    );

    run_for(engine, Duration::from_millis(400)).await;

    // Zero cooldown means exactly one firing per tier for a single episode
    assert_eq!(soft.count(), 1);
    assert_eq!(hard.count(), 1);
}

#[tokio::test]
async fn test_failed_action_retried_while_violation_persists() {
    let action = Arc::new(AlwaysFailingAction::default());

    let dispatcher = Dispatcher::new(LeadershipHandle::new(true), "test_metric".to_string());
    let policy = ThresholdPolicy {
        operator: ThresholdOperator::GreaterThan,
        soft: Some(ThresholdLevel {
            trigger: 80.0,
            sustain: Duration::from_millis(30),
            cooldown: Duration::ZERO,
            action: action.clone(),
        }),
        hard: None,
    };
    let engine = MonitorEngine::new(
        Box::new(SteadySampler { value: Some(90.0) }),
        StateMachine::new(policy),
        dispatcher,
        Duration::from_millis(10),
        Duration::from_secs(1),
        MissingValueMode::Zero,
    );

    run_for(engine, Duration::from_millis(400)).await;

    // With no success to arm a cooldown, each violated tick attempts again
    assert!(
        action.calls.load(Ordering::SeqCst) >= 2,
        "failing action should be retried while the violation persists, calls={}",
        action.calls.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn test_value_below_threshold_fires_nothing() {
    let soft = Arc::new(CountingAction::default());

    let engine = engine(
        SteadySampler { value: Some(10.0) },
        policy(Some((80.0, soft.clone(), 0)), None),
        true,
        MissingValueMode::Zero,
    );

    run_for(engine, Duration::from_millis(100)).await;

    assert_eq!(soft.count(), 0);
}

#[tokio::test]
async fn test_non_leader_replica_never_fires() {
    let soft = Arc::new(CountingAction::default());

    let engine = engine(
        SteadySampler { value: Some(150.0) },
        policy(Some((80.0, soft.clone(), 20)), None),
        false,
        MissingValueMode::Zero,
    );

    run_for(engine, Duration::from_millis(200)).await;

    assert_eq!(soft.count(), 0);
}

#[tokio::test]
async fn test_missing_data_with_zero_mode_stays_quiet() {
    let soft = Arc::new(CountingAction::default());

    let engine = engine(
        SteadySampler { value: None },
        policy(Some((80.0, soft.clone(), 0)), None),
        true,
        MissingValueMode::Zero,
    );

    run_for(engine, Duration::from_millis(100)).await;

    assert_eq!(soft.count(), 0);
}

#[tokio::test]
async fn test_missing_data_with_assume_breached_fires() {
    let soft = Arc::new(CountingAction::default());

    let engine = engine(
        SteadySampler { value: None },
        policy(Some((80.0, soft.clone(), 20)), None),
        true,
        MissingValueMode::AssumeBreached,
    );

    run_for(engine, Duration::from_millis(200)).await;

    assert_eq!(soft.count(), 1);
}

// =============================================================================
// Leader election over a shared file lease
// =============================================================================

fn fast_elector(dir: &TempDir, identity: &str, handle: LeadershipHandle) -> LeaderElector {
    let backend = FileLeaseBackend::new(dir.path().join("leader"));
    let config = ElectorConfig {
        lease_duration: Duration::from_millis(200),
        renew_deadline: Duration::from_millis(150),
        retry_period: Duration::from_millis(10),
        identity: identity.to_string(),
    };
    LeaderElector::new(Box::new(backend), config, handle)
}

#[tokio::test]
async fn test_exactly_one_replica_leads() {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let handle_a = LeadershipHandle::new(false);
    let handle_b = LeadershipHandle::new(false);
    let (tx_a, rx_a) = watch::channel(false);
    let (tx_b, rx_b) = watch::channel(false);

    let task_a = tokio::spawn(fast_elector(&dir, "replica-a", handle_a.clone()).run(rx_a));
    let task_b = tokio::spawn(fast_elector(&dir, "replica-b", handle_b.clone()).run(rx_b));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        handle_a.is_leader() ^ handle_b.is_leader(),
        "expected exactly one leader"
    );

    // Stop the current leader; the survivor takes over once the lease is
    // released
    let (leader_tx, survivor) = if handle_a.is_leader() {
        (tx_a, handle_b.clone())
    } else {
        (tx_b, handle_a.clone())
    };
    leader_tx.send(true).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(survivor.is_leader(), "survivor should take over the lease");

    task_a.abort();
    task_b.abort();
}

#[tokio::test]
async fn test_stolen_lease_fences_the_old_leader() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let lease_path = dir.path().join("leader");

    let handle = LeadershipHandle::new(false);
    let (_tx, rx) = watch::channel(false);
    let task = tokio::spawn(fast_elector(&dir, "replica-a", handle.clone()).run(rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(handle.is_leader());

    // Another process takes the lock out from under us
    let stolen = LeaseRecord {
        holder: "intruder".to_string(),
        renew_time: chrono::Utc::now(),
        lease_duration_secs: 600,
    };
    std::fs::write(&lease_path, serde_json::to_vec(&stolen).unwrap()).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("elector did not observe the stolen lease")
        .expect("elector task panicked");

    assert_eq!(outcome, ElectionOutcome::Fenced);
    assert!(!handle.is_leader());
}

// =============================================================================
// Configuration to policy, end to end
// =============================================================================

#[tokio::test]
async fn test_config_file_resolves_to_runnable_policy() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let config_path = dir.path().join("metricwatch.yml");
    std::fs::write(
        &config_path,
        r#"
metric:
  name: queue_depth
  endpoint: http://prom.test:9090

thresholds:
  operator: greater_than
  soft:
    value: 100
    action: log
    sustain-secs: 5
"#,
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).expect("Failed to load config");
    config.validate().expect("config should validate");

    let registry = build_registry(&config.required_actions(), &config.actions).unwrap();
    let policy = config.build_policy(&registry).unwrap();

    let soft = policy.soft.expect("soft tier configured");
    assert_eq!(soft.trigger, 100.0);
    assert_eq!(soft.sustain, Duration::from_secs(5));
    assert_eq!(soft.action.name(), "log");
}
