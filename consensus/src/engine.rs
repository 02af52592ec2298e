//! Main consensus engine implementation

use crate::inbox::VoteInbox;
use crate::vote::{RoundOutcome, Tally};
use binvote_core::{
    BinvoteError, BinvoteResult, ConsensusConfig, ProcessId, ProcessState, ProcessStatus,
    ReadinessGate, Round, Transport, Value,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Events emitted by the consensus engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsensusEvent {
    /// Round loop launched
    Started(ProcessId),
    /// Round ended without a decision
    RoundCompleted {
        process: ProcessId,
        round: Round,
        value: Value,
    },
    /// Value decided
    Decided {
        process: ProcessId,
        round: Round,
        value: Value,
    },
    /// Round cap hit while undecided
    RoundCapReached { process: ProcessId, round: Round },
    /// Process stopped
    Stopped(ProcessId),
}

/// Consensus engine of a single process.
///
/// Owns the process state and its vote inbox. The round loop runs as a
/// detached task launched by [`ConsensusEngine::start`]; progress is only
/// observable through [`ConsensusEngine::get_state`].
pub struct ConsensusEngine {
    id: ProcessId,
    faulty: bool,
    config: ConsensusConfig,
    state: RwLock<ProcessState>,
    inbox: VoteInbox,
    running: AtomicBool,
    transport: Arc<dyn Transport>,
    readiness: Arc<dyn ReadinessGate>,
    event_tx: Option<mpsc::Sender<ConsensusEvent>>,
}

impl ConsensusEngine {
    /// Create the engine of process `id`
    pub fn new(
        id: ProcessId,
        initial_value: Value,
        faulty: bool,
        config: ConsensusConfig,
        transport: Arc<dyn Transport>,
        readiness: Arc<dyn ReadinessGate>,
    ) -> BinvoteResult<Self> {
        config.validate()?;
        if id.index() >= config.node_count {
            return Err(BinvoteError::InvalidProcessId {
                id: id.index(),
                node_count: config.node_count,
            });
        }

        let state = if faulty {
            ProcessState::faulty()
        } else {
            ProcessState::initial(initial_value)
        };

        Ok(Self {
            id,
            faulty,
            config,
            state: RwLock::new(state),
            inbox: VoteInbox::new(),
            running: AtomicBool::new(false),
            transport,
            readiness,
            event_tx: None,
        })
    }

    /// Set event channel
    pub fn set_event_channel(&mut self, tx: mpsc::Sender<ConsensusEvent>) {
        self.event_tx = Some(tx);
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn is_faulty(&self) -> bool {
        self.faulty
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Whether the round loop task is alive
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the process state
    pub fn get_state(&self) -> ProcessState {
        *self.state.read()
    }

    pub fn status(&self) -> ProcessStatus {
        if self.faulty {
            ProcessStatus::Faulty
        } else {
            ProcessStatus::Live
        }
    }

    /// Votes waiting in the inbox for `round`
    pub fn pending_votes(&self, round: Round) -> usize {
        self.inbox.len(round)
    }

    /// Wait for the cluster, then launch the round loop.
    ///
    /// Returns as soon as the loop is spawned; it does not wait for a
    /// decision.
    pub async fn start(self: &Arc<Self>) -> BinvoteResult<()> {
        if self.state.read().killed {
            return Err(BinvoteError::ProcessStopped);
        }

        self.wait_for_cluster().await;

        if self.faulty {
            debug!("Process {} is faulty, not running consensus", self.id);
            return Ok(());
        }

        // stop() may have raced with the readiness wait
        if self.state.read().killed {
            return Err(BinvoteError::ProcessStopped);
        }

        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Process {} round loop already running", self.id);
            return Ok(());
        }

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            engine.run().await;
        });

        Ok(())
    }

    /// Kill the process. Idempotent.
    pub fn stop(&self) {
        let was_killed = {
            let mut state = self.state.write();
            let was_killed = state.killed;
            *state = ProcessState::killed();
            was_killed
        };
        self.inbox.clear();

        if !was_killed {
            info!("Process {} stopped", self.id);
            self.emit_event(ConsensusEvent::Stopped(self.id));
        }
    }

    /// Accept a vote from a peer.
    ///
    /// The vote is filed under this process's current round. Returns whether
    /// it was recorded; values other than 0 and 1 are accepted but ignored.
    pub fn receive_message(&self, from: ProcessId, value: Option<Value>) -> BinvoteResult<bool> {
        // Hold the read lock so the round cannot advance mid-record
        let state = self.state.read();
        if state.killed {
            return Err(BinvoteError::ProcessStopped);
        }
        if self.faulty {
            return Err(BinvoteError::ProcessFaulty);
        }

        // The loop will never read these again
        if state.is_decided() || state.round.is_some_and(|k| k >= self.config.round_cap) {
            debug!("Process {} finished, dropping vote from {}", self.id, from);
            return Ok(false);
        }

        let round = state.round.unwrap_or(0);
        match value {
            Some(value) if value.is_binary() => {
                debug!("Process {} got {} from {} in round {}", self.id, value, from, round);
                Ok(self.inbox.record(round, value))
            }
            _ => {
                debug!("Process {} ignoring non-binary value from {}", self.id, from);
                Ok(false)
            }
        }
    }

    async fn run(self: Arc<Self>) {
        info!(
            "Process {} starting consensus (N={}, F={})",
            self.id, self.config.node_count, self.config.fault_tolerance
        );
        self.emit_event(ConsensusEvent::Started(self.id));

        loop {
            let (round, value) = match self.next_round() {
                Some(next) => next,
                None => break,
            };

            if !self.broadcast_value(value).await {
                break;
            }
            self.wait_for_cluster().await;

            let votes = match self.collect_votes(round).await {
                Some(votes) => votes,
                None => break,
            };

            match self.conclude_round(round, &votes) {
                Some(RoundOutcome::Provisional(_)) => {}
                Some(RoundOutcome::Decided(value)) => {
                    // Peers still in this round count on our vote for their quorum
                    self.broadcast_value(value).await;
                    break;
                }
                None => break,
            }
        }

        self.inbox.clear();
        self.running.store(false, Ordering::SeqCst);
        debug!("Process {} round loop exited", self.id);
    }

    /// Broadcast `value` unless the process was stopped. Returns whether it
    /// was sent.
    async fn broadcast_value(&self, value: Value) -> bool {
        if self.state.read().killed {
            return false;
        }
        self.transport.broadcast(self.id, value).await;
        true
    }

    /// Round and value to broadcast next, or `None` when the loop must end
    fn next_round(&self) -> Option<(Round, Value)> {
        let state = self.state.read();
        if state.killed || state.is_decided() {
            return None;
        }

        let round = state.round?;
        if round >= self.config.round_cap {
            warn!(
                "Process {} reached the round cap ({}) without deciding",
                self.id, self.config.round_cap
            );
            self.emit_event(ConsensusEvent::RoundCapReached {
                process: self.id,
                round,
            });
            return None;
        }

        state.value.map(|value| (round, value))
    }

    /// Poll the inbox until the quorum for `round` is met.
    ///
    /// Returns `None` if the process is stopped while waiting.
    async fn collect_votes(&self, round: Round) -> Option<Vec<Value>> {
        if self.config.node_count == 1 {
            return Some(Vec::new());
        }

        let quorum = self.config.quorum();
        loop {
            if self.state.read().killed {
                return None;
            }

            let votes = self.inbox.read(round);
            if votes.len() >= quorum {
                return Some(votes);
            }

            sleep(self.config.quorum_poll_interval()).await;
        }
    }

    /// Apply the decision rule to `votes` plus our own value and move to the
    /// next round. Returns `None` if the process was stopped meanwhile.
    fn conclude_round(&self, round: Round, votes: &[Value]) -> Option<RoundOutcome> {
        let mut state = self.state.write();
        if state.killed {
            return None;
        }

        let mut tally = Tally::from_votes(votes);
        if let Some(own) = state.value {
            tally.add(own);
        }

        let outcome = tally.evaluate(self.config.fault_tolerance);
        state.round = Some(round + 1);
        state.value = Some(outcome.value());
        self.inbox.discard(round);

        match outcome {
            RoundOutcome::Decided(value) => {
                state.decided = Some(true);
                info!(
                    "Process {} decided {} in round {} ({} zeros, {} ones)",
                    self.id, value, round, tally.zeros, tally.ones
                );
                self.emit_event(ConsensusEvent::Decided {
                    process: self.id,
                    round,
                    value,
                });
            }
            RoundOutcome::Provisional(value) => {
                debug!(
                    "Process {} undecided in round {} ({} zeros, {} ones), adopting {}",
                    self.id, round, tally.zeros, tally.ones, value
                );
                self.emit_event(ConsensusEvent::RoundCompleted {
                    process: self.id,
                    round,
                    value,
                });
            }
        }

        Some(outcome)
    }

    async fn wait_for_cluster(&self) {
        while !self.readiness.is_cluster_ready().await {
            sleep(self.config.readiness_poll_interval()).await;
        }
    }

    fn emit_event(&self, event: ConsensusEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.try_send(event);
        }
    }
}

/// Shared consensus engine
pub type SharedConsensus = Arc<ConsensusEngine>;

/// Create consensus event channel
pub fn create_consensus_channel() -> (mpsc::Sender<ConsensusEvent>, mpsc::Receiver<ConsensusEvent>) {
    mpsc::channel(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::{OnceLock, Weak};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ProcessId, Value)>>,
    }

    impl RecordingTransport {
        fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn broadcast(&self, from: ProcessId, value: Value) {
            self.sent.lock().push((from, value));
        }
    }

    /// Answers every broadcast with the opposite value from process 1
    #[derive(Default)]
    struct ContrarianTransport {
        engine: OnceLock<Weak<ConsensusEngine>>,
    }

    #[async_trait]
    impl Transport for ContrarianTransport {
        async fn broadcast(&self, _from: ProcessId, value: Value) {
            let reply = match value {
                Value::Zero => Value::One,
                _ => Value::Zero,
            };
            if let Some(engine) = self.engine.get().and_then(Weak::upgrade) {
                let _ = engine.receive_message(ProcessId::new(1), Some(reply));
            }
        }
    }

    struct Gate(AtomicBool);

    impl Gate {
        fn open() -> Arc<Self> {
            Arc::new(Gate(AtomicBool::new(true)))
        }

        fn closed() -> Arc<Self> {
            Arc::new(Gate(AtomicBool::new(false)))
        }
    }

    #[async_trait]
    impl ReadinessGate for Gate {
        async fn is_cluster_ready(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn fast_config(node_count: usize, fault_tolerance: usize) -> ConsensusConfig {
        ConsensusConfig {
            readiness_poll_ms: 5,
            quorum_poll_ms: 5,
            ..ConsensusConfig::new(node_count, fault_tolerance)
        }
    }

    fn engine(
        id: usize,
        value: Value,
        faulty: bool,
        config: ConsensusConfig,
        transport: Arc<dyn Transport>,
    ) -> Arc<ConsensusEngine> {
        Arc::new(
            ConsensusEngine::new(ProcessId::new(id), value, faulty, config, transport, Gate::open())
                .unwrap(),
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not met in time");
    }

    #[test]
    fn test_invalid_process_id_rejected() {
        let result = ConsensusEngine::new(
            ProcessId::new(4),
            Value::One,
            false,
            ConsensusConfig::new(4, 1),
            Arc::new(RecordingTransport::default()),
            Gate::open(),
        );
        assert!(matches!(
            result,
            Err(BinvoteError::InvalidProcessId { id: 4, node_count: 4 })
        ));
    }

    #[tokio::test]
    async fn test_single_process_decides_own_value() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::Zero, false, fast_config(1, 0), transport);

        assert_eq!(engine.get_state(), ProcessState::initial(Value::Zero));
        engine.start().await.unwrap();
        wait_until(|| engine.get_state().is_decided()).await;

        let state = engine.get_state();
        assert_eq!(state.value, Some(Value::Zero));
        assert_eq!(state.round, Some(1));
    }

    #[tokio::test]
    async fn test_faulty_process_stays_inert() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(2, Value::One, true, fast_config(4, 1), transport.clone());

        assert_eq!(engine.status(), ProcessStatus::Faulty);
        assert_eq!(engine.get_state(), ProcessState::faulty());

        let result = engine.receive_message(ProcessId::new(0), Some(Value::One));
        assert!(matches!(result, Err(BinvoteError::ProcessFaulty)));
        assert_eq!(engine.get_state(), ProcessState::faulty());

        engine.start().await.unwrap();
        sleep(Duration::from_millis(30)).await;
        assert!(!engine.is_running());
        assert_eq!(transport.count(), 0);
        assert_eq!(engine.get_state(), ProcessState::faulty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (tx, mut rx) = create_consensus_channel();
        let mut inner = ConsensusEngine::new(
            ProcessId::new(0),
            Value::One,
            false,
            fast_config(3, 0),
            Arc::new(RecordingTransport::default()),
            Gate::open(),
        )
        .unwrap();
        inner.set_event_channel(tx);
        let engine = Arc::new(inner);

        engine.stop();
        let once = engine.get_state();
        engine.stop();

        assert_eq!(once, ProcessState::killed());
        assert_eq!(engine.get_state(), once);
        assert_eq!(rx.recv().await, Some(ConsensusEvent::Stopped(ProcessId::new(0))));
        assert!(rx.try_recv().is_err());

        assert!(matches!(engine.start().await, Err(BinvoteError::ProcessStopped)));
        assert!(matches!(
            engine.receive_message(ProcessId::new(1), Some(Value::One)),
            Err(BinvoteError::ProcessStopped)
        ));
    }

    #[tokio::test]
    async fn test_unanimous_peers_decide_in_first_round() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::One, false, fast_config(4, 1), transport.clone());

        for peer in 1..4 {
            assert!(engine.receive_message(ProcessId::new(peer), Some(Value::One)).unwrap());
        }

        engine.start().await.unwrap();
        wait_until(|| engine.get_state().is_decided()).await;

        let state = engine.get_state();
        assert_eq!(state.value, Some(Value::One));
        assert_eq!(state.round, Some(1));
        assert_eq!(engine.pending_votes(0), 0);

        wait_until(|| !engine.is_running()).await;
        // Round vote, then the decided value once more for slower peers
        assert_eq!(
            *transport.sent.lock(),
            vec![(ProcessId::new(0), Value::One), (ProcessId::new(0), Value::One)]
        );
    }

    #[tokio::test]
    async fn test_decided_value_is_broadcast_once_more() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::One, false, fast_config(4, 1), transport.clone());

        // Majority for 0 overrides our own 1
        for peer in 1..4 {
            engine.receive_message(ProcessId::new(peer), Some(Value::Zero)).unwrap();
        }

        engine.start().await.unwrap();
        wait_until(|| !engine.is_running() && engine.get_state().is_decided()).await;

        assert_eq!(
            *transport.sent.lock(),
            vec![(ProcessId::new(0), Value::One), (ProcessId::new(0), Value::Zero)]
        );
    }

    #[tokio::test]
    async fn test_votes_after_decision_are_dropped() {
        let engine = engine(
            0,
            Value::Zero,
            false,
            fast_config(1, 0),
            Arc::new(RecordingTransport::default()),
        );

        engine.start().await.unwrap();
        wait_until(|| !engine.is_running() && engine.get_state().is_decided()).await;

        for _ in 0..3 {
            assert!(!engine.receive_message(ProcessId::new(0), Some(Value::One)).unwrap());
        }
        assert_eq!(engine.pending_votes(1), 0);
        assert_eq!(engine.get_state().value, Some(Value::Zero));
    }

    #[tokio::test]
    async fn test_votes_after_round_cap_are_dropped() {
        let transport = Arc::new(ContrarianTransport::default());
        let config = ConsensusConfig {
            round_cap: 2,
            ..fast_config(3, 1)
        };
        let engine = Arc::new(
            ConsensusEngine::new(
                ProcessId::new(0),
                Value::Zero,
                false,
                config,
                transport.clone(),
                Gate::open(),
            )
            .unwrap(),
        );
        let _ = transport.engine.set(Arc::downgrade(&engine));

        engine.start().await.unwrap();
        wait_until(|| !engine.is_running() && engine.get_state().round == Some(2)).await;

        assert!(!engine.receive_message(ProcessId::new(1), Some(Value::One)).unwrap());
        assert_eq!(engine.pending_votes(2), 0);
    }

    #[tokio::test]
    async fn test_no_broadcast_once_stopped() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::One, false, fast_config(4, 1), transport.clone());

        assert!(engine.broadcast_value(Value::One).await);
        engine.stop();
        assert!(!engine.broadcast_value(Value::One).await);

        assert_eq!(transport.count(), 1);
    }

    #[tokio::test]
    async fn test_split_votes_adopt_provisional_one() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::Zero, false, fast_config(4, 1), transport.clone());

        engine.receive_message(ProcessId::new(1), Some(Value::Zero)).unwrap();
        engine.receive_message(ProcessId::new(2), Some(Value::One)).unwrap();
        engine.receive_message(ProcessId::new(3), Some(Value::One)).unwrap();

        engine.start().await.unwrap();
        wait_until(|| engine.get_state().round == Some(1)).await;

        let state = engine.get_state();
        assert_eq!(state.value, Some(Value::One));
        assert_eq!(state.decided, Some(false));

        // Round 2 broadcasts the provisional value
        wait_until(|| transport.count() == 2).await;
        assert_eq!(transport.sent.lock()[1], (ProcessId::new(0), Value::One));

        engine.stop();
        wait_until(|| !engine.is_running()).await;
    }

    #[tokio::test]
    async fn test_waits_for_readiness_before_running() {
        let transport = Arc::new(RecordingTransport::default());
        let gate = Gate::closed();
        let engine = Arc::new(
            ConsensusEngine::new(
                ProcessId::new(0),
                Value::One,
                false,
                fast_config(1, 0),
                transport.clone(),
                gate.clone(),
            )
            .unwrap(),
        );

        let starter = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.start().await })
        };

        sleep(Duration::from_millis(40)).await;
        assert!(!starter.is_finished());
        assert_eq!(transport.count(), 0);

        gate.0.store(true, Ordering::SeqCst);
        starter.await.unwrap().unwrap();
        wait_until(|| engine.get_state().is_decided()).await;
    }

    #[tokio::test]
    async fn test_stop_halts_running_loop() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::One, false, fast_config(4, 1), transport.clone());

        engine.start().await.unwrap();
        wait_until(|| transport.count() == 1).await;
        assert!(engine.is_running());

        engine.stop();
        wait_until(|| !engine.is_running()).await;

        // Late votes cannot revive the loop
        assert!(engine.receive_message(ProcessId::new(1), Some(Value::One)).is_err());
        sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.count(), 1);
        assert_eq!(engine.get_state(), ProcessState::killed());
    }

    #[tokio::test]
    async fn test_round_cap_stops_without_deciding() {
        let (tx, mut rx) = create_consensus_channel();
        let transport = Arc::new(ContrarianTransport::default());
        let config = ConsensusConfig {
            round_cap: 5,
            ..fast_config(3, 1)
        };

        let mut inner = ConsensusEngine::new(
            ProcessId::new(0),
            Value::Zero,
            false,
            config,
            transport.clone(),
            Gate::open(),
        )
        .unwrap();
        inner.set_event_channel(tx);
        let engine = Arc::new(inner);
        let _ = transport.engine.set(Arc::downgrade(&engine));

        engine.start().await.unwrap();
        wait_until(|| !engine.is_running() && engine.get_state().round == Some(5)).await;

        let state = engine.get_state();
        assert_eq!(state.decided, Some(false));
        assert!(!state.killed);

        let mut saw_cap = false;
        while let Ok(event) = rx.try_recv() {
            if let ConsensusEvent::RoundCapReached { round, .. } = event {
                assert_eq!(round, 5);
                saw_cap = true;
            }
            assert!(!matches!(event, ConsensusEvent::Decided { .. }));
        }
        assert!(saw_cap);
    }

    #[tokio::test]
    async fn test_non_binary_votes_ignored() {
        let engine = engine(
            0,
            Value::One,
            false,
            fast_config(4, 1),
            Arc::new(RecordingTransport::default()),
        );

        assert!(!engine.receive_message(ProcessId::new(1), Some(Value::Undetermined)).unwrap());
        assert!(!engine.receive_message(ProcessId::new(1), None).unwrap());
        assert_eq!(engine.pending_votes(0), 0);
    }

    #[tokio::test]
    async fn test_second_start_does_not_spawn_another_loop() {
        let transport = Arc::new(RecordingTransport::default());
        let engine = engine(0, Value::One, false, fast_config(4, 1), transport.clone());

        engine.start().await.unwrap();
        engine.start().await.unwrap();
        sleep(Duration::from_millis(30)).await;

        assert_eq!(transport.count(), 1);
        engine.stop();
    }
}
