//! The agent supervisor
//!
//! One supervisor owns one agent instance: it spawns the process, opens
//! the message channel, forwards semantic updates into the state store,
//! and drives the crash-restart state machine. A process exit and a
//! silent channel are the same failure: both land in `after_crash`.
//!
//! Desired state is last-writer-wins: a start issued while a restart is
//! pending cancels the wait and spawns immediately; a stop issued while
//! a restart is pending cancels the restart entirely.

use crate::agent::channel::MessageChannel;
use crate::agent::launcher::{AgentProcess, ProcessLauncher};
use crate::agent::types::{
    AgentDescriptor, AgentKind, Envelope, LifecycleState, MessageKind, TranscriptPayload,
};
use crate::error::{Error, Result};
use crate::state::{AgentStatus, StatePatch, StateStore, Transcript};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Duration, Instant};

const COMMAND_CHANNEL_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorCommand {
    Start,
    Stop,
}

/// Where the state machine goes next after a phase completes
enum Phase {
    Idle,
    Starting,
    RestartWait,
    Failed,
    Shutdown,
}

/// Handle for issuing desired-state commands to a supervisor task.
#[derive(Clone)]
pub struct SupervisorHandle {
    kind: AgentKind,
    cmd_tx: mpsc::Sender<SupervisorCommand>,
}

impl SupervisorHandle {
    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    /// Request the agent to run. Idempotent while Starting/Running;
    /// resets a Failed agent's restart budget.
    pub async fn start(&self) -> Result<()> {
        self.send(SupervisorCommand::Start).await
    }

    /// Request the agent to stop. No-op while not running; cancels a
    /// pending restart.
    pub async fn stop(&self) -> Result<()> {
        self.send(SupervisorCommand::Stop).await
    }

    async fn send(&self, cmd: SupervisorCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::Internal(format!("Supervisor for {} is gone", self.kind)))
    }
}

/// Supervision actor for one agent kind.
pub struct Supervisor {
    descriptor: AgentDescriptor,
    launcher: Arc<dyn ProcessLauncher>,
    store: Arc<StateStore>,
    cmd_rx: mpsc::Receiver<SupervisorCommand>,
    restart_count: u32,
    /// Wall-clock last sign of life, surfaced in status
    last_alive: Option<i64>,
    /// Monotonic last sign of life, drives the gap timeout
    last_seen: Instant,
}

impl Supervisor {
    /// Spawn the supervisor task for `descriptor` and return its handle.
    pub fn spawn(
        descriptor: AgentDescriptor,
        launcher: Arc<dyn ProcessLauncher>,
        store: Arc<StateStore>,
    ) -> SupervisorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let kind = descriptor.kind;
        let supervisor = Supervisor {
            descriptor,
            launcher,
            store,
            cmd_rx,
            restart_count: 0,
            last_alive: None,
            last_seen: Instant::now(),
        };
        tokio::spawn(supervisor.run());
        SupervisorHandle { kind, cmd_tx }
    }

    async fn run(mut self) {
        self.publish(LifecycleState::Idle).await;
        let mut phase = Phase::Idle;
        loop {
            phase = match phase {
                Phase::Idle => match self.cmd_rx.recv().await {
                    Some(SupervisorCommand::Start) => Phase::Starting,
                    Some(SupervisorCommand::Stop) => Phase::Idle,
                    None => Phase::Shutdown,
                },

                Phase::Failed => match self.cmd_rx.recv().await {
                    Some(SupervisorCommand::Start) => {
                        self.restart_count = 0;
                        Phase::Starting
                    }
                    Some(SupervisorCommand::Stop) => Phase::Failed,
                    None => Phase::Shutdown,
                },

                Phase::Starting => {
                    self.publish(LifecycleState::Starting).await;
                    match self.spawn_instance().await {
                        Ok((process, channel)) => self.supervise(process, channel).await,
                        Err(e) => {
                            tracing::warn!(
                                kind = %self.descriptor.kind,
                                error = %e,
                                "Agent spawn failed"
                            );
                            self.after_crash().await
                        }
                    }
                }

                Phase::RestartWait => {
                    self.publish(LifecycleState::Restarting).await;
                    let delay = Duration::from_millis(self.descriptor.policy.restart_delay_ms);
                    tokio::select! {
                        _ = sleep(delay) => Phase::Starting,
                        cmd = self.cmd_rx.recv() => match cmd {
                            // Last writer wins: skip the remaining delay.
                            Some(SupervisorCommand::Start) => Phase::Starting,
                            Some(SupervisorCommand::Stop) => {
                                self.restart_count = 0;
                                self.last_alive = None;
                                self.publish(LifecycleState::Idle).await;
                                Phase::Idle
                            }
                            None => Phase::Shutdown,
                        },
                    }
                }

                Phase::Shutdown => break,
            };
        }
        tracing::debug!(kind = %self.descriptor.kind, "Supervisor task exiting");
    }

    /// Spawn the process and, for agents with a data channel, connect to
    /// it. A channel that never comes up counts as a spawn failure.
    async fn spawn_instance(
        &mut self,
    ) -> Result<(Box<dyn AgentProcess>, Option<MessageChannel>)> {
        let mut process = self.launcher.spawn(&self.descriptor).await?;
        let channel = match self.descriptor.port {
            Some(port) => match MessageChannel::connect(port).await {
                Ok(channel) => Some(channel),
                Err(e) => {
                    process.kill().await;
                    return Err(e);
                }
            },
            None => None,
        };
        Ok((process, channel))
    }

    /// Run the agent until it stops, crashes, or goes silent.
    async fn supervise(
        &mut self,
        mut process: Box<dyn AgentProcess>,
        mut channel: Option<MessageChannel>,
    ) -> Phase {
        let instance_id = uuid::Uuid::new_v4();
        let expects_messages = self.descriptor.port.is_some();
        let gap = Duration::from_millis(self.descriptor.policy.inter_message_gap_ms);
        self.mark_alive();
        self.publish(LifecycleState::Running).await;
        tracing::info!(
            kind = %self.descriptor.kind,
            %instance_id,
            pid = ?process.pid(),
            "Agent running"
        );

        loop {
            let gap_deadline = self.last_seen + gap;
            let channel_open = channel.is_some();
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SupervisorCommand::Start) => {
                        tracing::debug!(
                            kind = %self.descriptor.kind,
                            "Agent already running; start ignored"
                        );
                    }
                    Some(SupervisorCommand::Stop) => {
                        self.publish(LifecycleState::Stopping).await;
                        if let Some(ch) = channel.as_mut() {
                            ch.close().await;
                        }
                        process.kill().await;
                        self.restart_count = 0;
                        self.last_alive = None;
                        self.publish(LifecycleState::Idle).await;
                        tracing::info!(kind = %self.descriptor.kind, "Agent stopped");
                        return Phase::Idle;
                    }
                    None => {
                        process.kill().await;
                        return Phase::Shutdown;
                    }
                },

                code = process.wait() => {
                    tracing::warn!(
                        kind = %self.descriptor.kind,
                        %instance_id,
                        exit_code = ?code,
                        "Agent process exited unexpectedly"
                    );
                    if let Some(ch) = channel.as_mut() {
                        ch.close().await;
                    }
                    return self.after_crash().await;
                }

                message = recv_from(&mut channel), if channel_open => match message {
                    Some(envelope) => {
                        self.mark_alive();
                        self.handle_envelope(envelope).await;
                    }
                    None => {
                        // Transport dropped; no retry. The gap timeout
                        // below confirms the silence and crashes us.
                        tracing::warn!(
                            kind = %self.descriptor.kind,
                            "Agent channel dropped"
                        );
                        channel = None;
                    }
                },

                _ = sleep_until(gap_deadline), if expects_messages => {
                    tracing::warn!(
                        kind = %self.descriptor.kind,
                        "Treating as crash: {}",
                        Error::ChannelTimeout(
                            self.descriptor.kind.to_string(),
                            self.descriptor.policy.inter_message_gap_ms,
                        )
                    );
                    if let Some(ch) = channel.as_mut() {
                        ch.close().await;
                    }
                    process.kill().await;
                    return self.after_crash().await;
                }
            }
        }
    }

    /// Shared crash path for process exits, gap timeouts, and spawn
    /// failures. Decides between another restart and terminal Failed.
    async fn after_crash(&mut self) -> Phase {
        let max = self.descriptor.policy.max_restart_count;
        if self.restart_count >= max {
            tracing::error!(
                kind = %self.descriptor.kind,
                restarts = self.restart_count,
                "{}",
                Error::MaxRestartsExceeded(self.descriptor.kind.to_string(), max)
            );
            self.publish(LifecycleState::Failed).await;
            Phase::Failed
        } else {
            self.restart_count += 1;
            tracing::info!(
                kind = %self.descriptor.kind,
                attempt = self.restart_count,
                max,
                delay_ms = self.descriptor.policy.restart_delay_ms,
                "Agent will restart"
            );
            Phase::RestartWait
        }
    }

    async fn handle_envelope(&mut self, envelope: Envelope) {
        match envelope.kind {
            MessageKind::Heartbeat => {
                tracing::trace!(kind = %self.descriptor.kind, seq = envelope.seq, "Heartbeat");
            }
            MessageKind::Transcript => {
                let Some(speaker) = self.descriptor.kind.speaker() else {
                    tracing::debug!(
                        kind = %self.descriptor.kind,
                        "Transcript from non-transcribing agent ignored"
                    );
                    return;
                };
                match serde_json::from_value::<TranscriptPayload>(envelope.payload) {
                    Ok(payload) => {
                        let entry = Transcript {
                            timestamp: payload.timestamp.unwrap_or_else(now_millis),
                            text: payload.text,
                            speaker,
                            is_final: payload.is_final,
                        };
                        // The store drops non-final fragments.
                        self.store.add_transcript(entry).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            kind = %self.descriptor.kind,
                            error = %e,
                            "Malformed transcript payload"
                        );
                    }
                }
            }
            MessageKind::Status => {
                tracing::debug!(
                    kind = %self.descriptor.kind,
                    payload = %envelope.payload,
                    "Agent status"
                );
            }
            MessageKind::Error => {
                tracing::warn!(
                    kind = %self.descriptor.kind,
                    payload = %envelope.payload,
                    "Agent reported error"
                );
            }
        }
    }

    fn mark_alive(&mut self) {
        self.last_seen = Instant::now();
        self.last_alive = Some(now_millis());
    }

    async fn publish(&self, state: LifecycleState) {
        let status = AgentStatus {
            state,
            restart_count: self.restart_count,
            last_alive: self.last_alive,
        };
        self.store
            .update(StatePatch::agent(self.descriptor.kind, status))
            .await;
    }
}

async fn recv_from(channel: &mut Option<MessageChannel>) -> Option<Envelope> {
    match channel.as_mut() {
        Some(ch) => ch.recv().await,
        None => std::future::pending().await,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RestartPolicy;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::Notify;

    #[derive(Debug, Clone, Copy)]
    enum Script {
        ExitAfter(u64),
        RunUntilKilled,
        FailSpawn,
    }

    struct MockProcess {
        exit_at: Option<Instant>,
        killed: bool,
        kill_signal: Arc<Notify>,
    }

    #[async_trait]
    impl AgentProcess for MockProcess {
        fn pid(&self) -> Option<u32> {
            Some(1)
        }

        async fn wait(&mut self) -> Option<i32> {
            if self.killed {
                return None;
            }
            match self.exit_at {
                Some(deadline) => {
                    sleep_until(deadline).await;
                    Some(1)
                }
                None => {
                    self.kill_signal.notified().await;
                    None
                }
            }
        }

        async fn kill(&mut self) {
            self.killed = true;
            self.kill_signal.notify_one();
        }
    }

    struct MockLauncher {
        scripts: Mutex<VecDeque<Script>>,
        fallback: Script,
        spawn_attempts: AtomicUsize,
    }

    impl MockLauncher {
        fn new(scripts: Vec<Script>, fallback: Script) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                fallback,
                spawn_attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.spawn_attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProcessLauncher for MockLauncher {
        async fn spawn(&self, _descriptor: &AgentDescriptor) -> Result<Box<dyn AgentProcess>> {
            self.spawn_attempts.fetch_add(1, Ordering::SeqCst);
            let script = self
                .scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(self.fallback);
            match script {
                Script::FailSpawn => Err(Error::Spawn("scripted spawn failure".to_string())),
                Script::ExitAfter(ms) => Ok(Box::new(MockProcess {
                    exit_at: Some(Instant::now() + Duration::from_millis(ms)),
                    killed: false,
                    kill_signal: Arc::new(Notify::new()),
                })),
                Script::RunUntilKilled => Ok(Box::new(MockProcess {
                    exit_at: None,
                    killed: false,
                    kill_signal: Arc::new(Notify::new()),
                })),
            }
        }
    }

    fn descriptor(kind: AgentKind, port: Option<u16>, max: u32) -> AgentDescriptor {
        AgentDescriptor {
            kind,
            port,
            policy: RestartPolicy {
                max_restart_count: max,
                restart_delay_ms: 2000,
                inter_message_gap_ms: 5000,
            },
            args: Vec::new(),
        }
    }

    async fn wait_for_state(
        store: &StateStore,
        kind: AgentKind,
        want: LifecycleState,
    ) -> AgentStatus {
        for _ in 0..2000u32 {
            if let Some(status) = store.get().await.agents.get(&kind) {
                if status.state == want {
                    return *status;
                }
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("agent {} never reached {:?}", kind, want);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_budget_exhaustion_reaches_failed() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(vec![Script::ExitAfter(50); 6], Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::Vcam, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();

        // Six unexpected exits: five restarts, then terminal Failed.
        let status = wait_for_state(&store, AgentKind::Vcam, LifecycleState::Failed).await;
        assert_eq!(status.restart_count, 5);
        assert_eq!(launcher.attempts(), 6);

        // Failed is terminal: no spawn attempt without an explicit start.
        sleep(Duration::from_secs(30)).await;
        assert_eq!(launcher.attempts(), 6);

        // An explicit start resets the budget and spawns again.
        handle.start().await.unwrap();
        let status = wait_for_state(&store, AgentKind::Vcam, LifecycleState::Running).await;
        assert_eq!(status.restart_count, 0);
        assert_eq!(launcher.attempts(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_spawns_one_process() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(Vec::new(), Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::Vcam, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();
        handle.start().await.unwrap();

        wait_for_state(&store, AgentKind::Vcam, LifecycleState::Running).await;
        sleep(Duration::from_secs(1)).await;
        assert_eq!(launcher.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_restart_counter() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(
            vec![Script::ExitAfter(50), Script::ExitAfter(50)],
            Script::RunUntilKilled,
        );
        let handle = Supervisor::spawn(
            descriptor(AgentKind::AsrSelf, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();

        // Two crashes, then the fallback keeps it running.
        loop {
            let status = wait_for_state(&store, AgentKind::AsrSelf, LifecycleState::Running).await;
            if status.restart_count == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        handle.stop().await.unwrap();
        let status = wait_for_state(&store, AgentKind::AsrSelf, LifecycleState::Idle).await;
        assert_eq!(status.restart_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_restart() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(vec![Script::ExitAfter(50)], Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::Vcam, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();
        wait_for_state(&store, AgentKind::Vcam, LifecycleState::Restarting).await;

        handle.stop().await.unwrap();
        wait_for_state(&store, AgentKind::Vcam, LifecycleState::Idle).await;

        // The pending restart never fires.
        sleep(Duration::from_secs(10)).await;
        assert_eq!(launcher.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_during_restart_wait_spawns_immediately() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(vec![Script::ExitAfter(50)], Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::Vcam, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();
        wait_for_state(&store, AgentKind::Vcam, LifecycleState::Restarting).await;

        handle.start().await.unwrap();
        let status = wait_for_state(&store, AgentKind::Vcam, LifecycleState::Running).await;
        // The crash still counts; only stop or Failed+start resets.
        assert_eq!(status.restart_count, 1);
        assert_eq!(launcher.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawn_failures_retry_under_restart_policy() {
        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(vec![Script::FailSpawn; 6], Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::AudioControl, None, 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();

        let status =
            wait_for_state(&store, AgentKind::AudioControl, LifecycleState::Failed).await;
        assert_eq!(status.restart_count, 5);
        assert_eq!(launcher.attempts(), 6);
    }

    #[tokio::test]
    async fn test_silent_channel_is_a_crash() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            // Accept, say hello once, then go silent (socket stays open).
            while let Ok((mut stream, _)) = listener.accept().await {
                let line = serde_json::to_string(&Envelope::heartbeat(1)).unwrap();
                let _ = stream.write_all(line.as_bytes()).await;
                let _ = stream.write_all(b"\n").await;
                tokio::spawn(async move {
                    // Hold the socket so the drop is a silence, not a close.
                    sleep(Duration::from_secs(60)).await;
                    drop(stream);
                });
            }
        });

        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(Vec::new(), Script::RunUntilKilled);
        let mut desc = descriptor(AgentKind::Vcam, Some(port), 0);
        desc.policy.inter_message_gap_ms = 200;
        let handle = Supervisor::spawn(desc, launcher.clone(), store.clone());

        handle.start().await.unwrap();
        let status = wait_for_state(&store, AgentKind::Vcam, LifecycleState::Failed).await;
        assert_eq!(status.restart_count, 0);
        assert_eq!(launcher.attempts(), 1);
    }

    #[tokio::test]
    async fn test_final_transcripts_flow_into_state() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let messages = [
                Envelope::new(
                    MessageKind::Transcript,
                    1,
                    serde_json::json!({"text": "hello", "is_final": true, "timestamp": 100}),
                ),
                Envelope::new(
                    MessageKind::Transcript,
                    2,
                    serde_json::json!({"text": "partial...", "is_final": false}),
                ),
                Envelope::new(
                    MessageKind::Transcript,
                    3,
                    serde_json::json!({"text": "world", "is_final": true, "timestamp": 200}),
                ),
            ];
            for env in &messages {
                let line = serde_json::to_string(env).unwrap();
                stream.write_all(line.as_bytes()).await.unwrap();
                stream.write_all(b"\n").await.unwrap();
            }
            // Keep the channel alive until the supervisor is stopped.
            sleep(Duration::from_secs(60)).await;
            drop(stream);
        });

        let store = Arc::new(StateStore::new());
        let launcher = MockLauncher::new(Vec::new(), Script::RunUntilKilled);
        let handle = Supervisor::spawn(
            descriptor(AgentKind::AsrOther, Some(port), 5),
            launcher.clone(),
            store.clone(),
        );

        handle.start().await.unwrap();

        let mut transcripts = Vec::new();
        for _ in 0..300u32 {
            transcripts = store.get().await.transcripts;
            if transcripts.len() == 2 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }

        let texts: Vec<&str> = transcripts.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world"]);
        assert!(transcripts.iter().all(|t| t.is_final));
        assert!(transcripts
            .iter()
            .all(|t| t.speaker == crate::state::Speaker::Other));

        handle.stop().await.unwrap();
        wait_for_state(&store, AgentKind::AsrOther, LifecycleState::Idle).await;
    }
}
