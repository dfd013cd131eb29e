//! A single in-process agent.
//!
//! Each [`LocalAgent`] owns a worker task that pulls inputs off a queue and
//! runs its template against them one at a time. Everything the agent does is
//! published on its [`EventEmitter`]; subscribers attach through
//! [`AgentHandle::events`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use agentlink_core::{AgentError, AgentEvent, AgentEventStream, AgentHandle, AgentInput, SystemLevel};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::emitter::EventEmitter;
use crate::template::AgentTemplate;

/// Inputs an agent will queue before `handle_input` refuses more.
const INPUT_QUEUE: usize = 64;

/// Human requests awaiting an answer, keyed by sequence.
#[derive(Default)]
struct PendingRequests {
    next: AtomicU64,
    waiting: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
}

impl PendingRequests {
    fn open(&self) -> (u64, oneshot::Receiver<Value>) {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        let _ = self.waiting.lock().insert(sequence, tx);
        (sequence, rx)
    }

    fn take(&self, sequence: u64) -> Option<oneshot::Sender<Value>> {
        self.waiting.lock().remove(&sequence)
    }

    fn len(&self) -> usize {
        self.waiting.lock().len()
    }

    fn clear(&self) {
        self.waiting.lock().clear();
    }
}

/// What a template sees of its agent while handling input.
pub struct AgentContext {
    agent_id: String,
    emitter: Arc<EventEmitter>,
    pending: Arc<PendingRequests>,
    stopping: CancellationToken,
}

impl AgentContext {
    /// Id of the agent running this template.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Publish an event to every subscriber.
    pub fn emit(&self, event: AgentEvent) {
        let _ = self.emitter.emit(event);
    }

    /// Emit a `human.request` and wait for the matching response.
    ///
    /// Fails with [`AgentError::Exited`] if the agent shuts down first.
    pub async fn request_human(&self, request: Value) -> Result<Value, AgentError> {
        let (sequence, rx) = self.pending.open();
        debug!(agent_id = %self.agent_id, sequence, "awaiting human response");
        self.emit(AgentEvent::HumanRequest { request, sequence });
        tokio::select! {
            biased;
            () = self.stopping.cancelled() => Err(AgentError::Exited(self.agent_id.clone())),
            answer = rx => answer.map_err(|_| AgentError::Exited(self.agent_id.clone())),
        }
    }
}

/// An agent running in this process.
pub struct LocalAgent {
    id: String,
    name: String,
    agent_type: String,
    created_seq: u64,
    emitter: Arc<EventEmitter>,
    pending: Arc<PendingRequests>,
    inputs: mpsc::Sender<AgentInput>,
    stopping: CancellationToken,
    closed: CancellationToken,
    exited: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LocalAgent {
    /// Create the agent and start its worker. Must run inside a tokio runtime.
    pub fn start(
        id: String,
        name: String,
        template: Arc<dyn AgentTemplate>,
        created_seq: u64,
        event_buffer: usize,
    ) -> Arc<Self> {
        let emitter = Arc::new(EventEmitter::with_capacity(event_buffer));
        let pending = Arc::new(PendingRequests::default());
        let stopping = CancellationToken::new();
        let (inputs, rx) = mpsc::channel(INPUT_QUEUE);

        let ctx = AgentContext {
            agent_id: id.clone(),
            emitter: Arc::clone(&emitter),
            pending: Arc::clone(&pending),
            stopping: stopping.clone(),
        };
        let agent_type = template.agent_type().to_owned();
        let worker = tokio::spawn(run_worker(template, ctx, rx, stopping.clone()));

        Arc::new(Self {
            id,
            name,
            agent_type,
            created_seq,
            emitter,
            pending,
            inputs,
            stopping,
            closed: CancellationToken::new(),
            exited: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Creation order within the owning team.
    pub fn created_seq(&self) -> u64 {
        self.created_seq
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Number of live event subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.emitter.subscriber_count()
    }

    /// Number of human requests still awaiting an answer.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Stop the worker, emit `state.exit`, then end every event stream.
    ///
    /// Idempotent.
    pub async fn shutdown(&self) {
        if self.exited.swap(true, Ordering::AcqRel) {
            return;
        }
        self.stopping.cancel();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(agent_id = %self.id, error = %e, "agent worker panicked");
            }
        }
        self.pending.clear();
        let _ = self.emitter.emit(AgentEvent::StateExit {});
        self.closed.cancel();
        info!(agent_id = %self.id, name = %self.name, "agent exited");
    }
}

async fn run_worker(
    template: Arc<dyn AgentTemplate>,
    ctx: AgentContext,
    mut inputs: mpsc::Receiver<AgentInput>,
    stopping: CancellationToken,
) {
    loop {
        let input = tokio::select! {
            biased;
            () = stopping.cancelled() => break,
            next = inputs.recv() => match next {
                Some(input) => input,
                None => break,
            },
        };

        ctx.emit(AgentEvent::InputReceived {
            message: input.message.clone(),
        });
        ctx.emit(AgentEvent::StateBusy {
            message: "Working".into(),
        });

        let outcome = tokio::select! {
            biased;
            () = stopping.cancelled() => {
                ctx.emit(AgentEvent::StateAborted {
                    reason: "agent is shutting down".into(),
                });
                break;
            }
            outcome = template.on_input(&ctx, input) => outcome,
        };

        if let Err(e) = outcome {
            warn!(agent_id = %ctx.agent_id, error = %e, "template failed");
            ctx.emit(AgentEvent::OutputSystem {
                message: e.to_string(),
                level: SystemLevel::Error,
            });
        }
        ctx.emit(AgentEvent::StateNotBusy {});
        ctx.emit(AgentEvent::StateIdle {});
    }
    debug!(agent_id = %ctx.agent_id, "agent worker stopped");
}

#[async_trait]
impl AgentHandle for LocalAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn agent_type(&self) -> &str {
        &self.agent_type
    }

    fn events(&self, cancel: CancellationToken) -> AgentEventStream {
        self.emitter.stream(cancel, self.closed.clone())
    }

    async fn handle_input(&self, input: AgentInput) -> Result<(), AgentError> {
        if self.is_exited() {
            return Err(AgentError::Exited(self.id.clone()));
        }
        // Never wait for queue space: the caller may be the only one able to
        // answer the human request the worker is blocked on.
        self.inputs.try_send(input).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!(agent_id = %self.id, "input queue full, rejecting input");
                AgentError::failed(format!("Agent {} input queue is full", self.id))
            }
            mpsc::error::TrySendError::Closed(_) => AgentError::Exited(self.id.clone()),
        })
    }

    fn send_human_response(&self, sequence: u64, response: Value) -> Result<(), AgentError> {
        if self.is_exited() {
            return Err(AgentError::Exited(self.id.clone()));
        }
        let waiter = self
            .pending
            .take(sequence)
            .ok_or(AgentError::UnknownHumanRequest(sequence))?;
        let _ = self.emitter.emit(AgentEvent::HumanResponse {
            response_to: sequence,
            response: response.clone(),
        });
        waiter
            .send(response)
            .map_err(|_| AgentError::UnknownHumanRequest(sequence))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::json;

    use super::*;
    use crate::template::{ApprovalTemplate, ChatTemplate};

    struct FailingTemplate;

    #[async_trait]
    impl AgentTemplate for FailingTemplate {
        fn agent_type(&self) -> &str {
            "failing"
        }

        async fn on_input(&self, _ctx: &AgentContext, _input: AgentInput) -> Result<(), AgentError> {
            Err(AgentError::failed("model unavailable"))
        }
    }

    fn start(template: Arc<dyn AgentTemplate>) -> Arc<LocalAgent> {
        LocalAgent::start("a1".into(), "test-1".into(), template, 1, 64)
    }

    async fn next_type(stream: &mut AgentEventStream) -> String {
        tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended")
            .expect("stream error")
            .event_type
    }

    #[tokio::test]
    async fn chat_input_produces_full_cycle() {
        let agent = start(Arc::new(ChatTemplate));
        let mut events = agent.events(CancellationToken::new());

        agent
            .handle_input(AgentInput {
                message: "hi".into(),
            })
            .await
            .unwrap();

        assert_eq!(next_type(&mut events).await, "input.received");
        assert_eq!(next_type(&mut events).await, "state.busy");
        assert_eq!(next_type(&mut events).await, "output.chat");
        assert_eq!(next_type(&mut events).await, "state.notBusy");
        assert_eq!(next_type(&mut events).await, "state.idle");
    }

    #[tokio::test]
    async fn template_error_becomes_system_output() {
        let agent = start(Arc::new(FailingTemplate));
        let mut events = agent.events(CancellationToken::new());

        agent
            .handle_input(AgentInput {
                message: "x".into(),
            })
            .await
            .unwrap();

        assert_eq!(next_type(&mut events).await, "input.received");
        assert_eq!(next_type(&mut events).await, "state.busy");
        let system = events.next().await.unwrap().unwrap();
        assert_eq!(system.event_type, "output.system");
        assert_eq!(system.data["message"], "model unavailable");
        assert_eq!(system.data["level"], "error");
        assert_eq!(next_type(&mut events).await, "state.notBusy");
    }

    #[tokio::test]
    async fn approval_round_trip() {
        let agent = start(Arc::new(ApprovalTemplate));
        let mut events = agent.events(CancellationToken::new());

        agent
            .handle_input(AgentInput {
                message: "deploy".into(),
            })
            .await
            .unwrap();

        assert_eq!(next_type(&mut events).await, "input.received");
        assert_eq!(next_type(&mut events).await, "state.busy");
        let request = events.next().await.unwrap().unwrap();
        assert_eq!(request.event_type, "human.request");
        let sequence = request.data["sequence"].as_u64().unwrap();
        assert_eq!(agent.pending_requests(), 1);

        agent.send_human_response(sequence, json!("approve")).unwrap();

        let response = events.next().await.unwrap().unwrap();
        assert_eq!(response.event_type, "human.response");
        assert_eq!(response.data["responseTo"], sequence);
        let chat = events.next().await.unwrap().unwrap();
        assert_eq!(chat.data["content"], "Approved: deploy");
        assert_eq!(agent.pending_requests(), 0);
    }

    #[tokio::test]
    async fn unknown_human_request_is_rejected() {
        let agent = start(Arc::new(ChatTemplate));
        let err = agent.send_human_response(42, json!("yes")).unwrap_err();
        assert!(matches!(err, AgentError::UnknownHumanRequest(42)));
    }

    #[tokio::test]
    async fn shutdown_emits_exit_and_ends_streams() {
        let agent = start(Arc::new(ChatTemplate));
        let mut events = agent.events(CancellationToken::new());

        agent.shutdown().await;
        agent.shutdown().await;

        assert_eq!(next_type(&mut events).await, "state.exit");
        assert!(events.next().await.is_none());
        assert!(agent.is_exited());
    }

    #[tokio::test]
    async fn input_after_shutdown_fails() {
        let agent = start(Arc::new(ChatTemplate));
        agent.shutdown().await;
        let err = agent
            .handle_input(AgentInput {
                message: "late".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Exited(id) if id == "a1"));
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_approval() {
        let agent = start(Arc::new(ApprovalTemplate));
        let mut events = agent.events(CancellationToken::new());
        agent
            .handle_input(AgentInput {
                message: "wait".into(),
            })
            .await
            .unwrap();

        assert_eq!(next_type(&mut events).await, "input.received");
        assert_eq!(next_type(&mut events).await, "state.busy");
        assert_eq!(next_type(&mut events).await, "human.request");

        agent.shutdown().await;

        assert_eq!(next_type(&mut events).await, "state.aborted");
        assert_eq!(next_type(&mut events).await, "state.exit");
        assert!(events.next().await.is_none());
        assert_eq!(agent.pending_requests(), 0);
    }

    #[tokio::test]
    async fn full_input_queue_rejects_instead_of_waiting() {
        let agent = start(Arc::new(ApprovalTemplate));
        let mut events = agent.events(CancellationToken::new());

        let mut rejected = 0;
        for i in 0..INPUT_QUEUE + 6 {
            let result = tokio::time::timeout(
                Duration::from_millis(200),
                agent.handle_input(AgentInput {
                    message: format!("job {i}"),
                }),
            )
            .await
            .expect("handle_input waited for queue space");
            if let Err(e) = result {
                assert_eq!(e.to_string(), "Agent a1 input queue is full");
                rejected += 1;
            }
        }
        assert!(rejected >= 5);

        // The first job is still waiting on a human, and can be answered.
        assert_eq!(next_type(&mut events).await, "input.received");
        assert_eq!(next_type(&mut events).await, "state.busy");
        let request = events.next().await.unwrap().unwrap();
        assert_eq!(request.event_type, "human.request");
        assert_eq!(agent.pending_requests(), 1);
        let sequence = request.data["sequence"].as_u64().unwrap();
        agent.send_human_response(sequence, json!("approve")).unwrap();
        assert_eq!(agent.pending_requests(), 0);
    }
}
