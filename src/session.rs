//! Per-connection session context
//!
//! A session owns every stateful component for one client connection and
//! runs them on a single event path:
//!
//! ```text
//! input ──► WakeGate ──► InterruptDetector ──► ConversationRecorder ──► SessionStateMachine ──► downstream
//!              │                                                               ▲
//!              └───────────── activation changes (wake/expiry/interrupt) ──────┘
//!
//! TimerService ──► downstream (announcements)
//! ```

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::Result;
use crate::config::Config;
use crate::events::{self, Event, EventReceiver, EventSender};
use crate::interrupt::InterruptDetector;
use crate::recorder::{ConversationLog, ConversationRecorder};
use crate::state::{SessionState, SessionStateMachine, StatePublisher};
use crate::timers::TimerService;
use crate::tools::{ToolDispatcher, tool_definitions};
use crate::voice::{ActivationChange, ActivationState, WakeGate, WakeScorer};

/// Everything one connected client needs
pub struct SessionContext {
    id: Uuid,
    gate: WakeGate,
    activations: mpsc::UnboundedReceiver<ActivationChange>,
    interrupt: InterruptDetector,
    timers: TimerService,
    tools: ToolDispatcher,
    control_tx: EventSender,
    control: EventReceiver,
    greeting: Option<String>,
    state: SessionStateMachine,
    recorder: ConversationRecorder,
    downstream: EventSender,
    closed: bool,
}

impl SessionContext {
    /// Build a session sending its output to `downstream`
    ///
    /// # Errors
    ///
    /// Returns error if the wake or interrupt configuration is invalid
    pub fn new(
        config: &Config,
        scorer: Box<dyn WakeScorer>,
        publisher: StatePublisher,
        downstream: EventSender,
    ) -> Result<Self> {
        let id = Uuid::new_v4();
        let (gate, activations) = WakeGate::new(&config.wake, scorer)?;
        let interrupt = InterruptDetector::new(&config.interrupt_phrases)?;

        // Timers first, then the dispatcher that calls into them
        let timers = TimerService::new(downstream.clone());
        let (control_tx, control) = events::channel();
        let tools = ToolDispatcher::new(timers.clone(), control_tx.clone());

        let state = SessionStateMachine::new(&config.state, gate.activation(), publisher);
        let recorder = ConversationRecorder::new(gate.activation(), ConversationLog::new());

        tracing::info!(session_id = %id, room = state.identity().room(), "session created");

        Ok(Self {
            id,
            gate,
            activations,
            interrupt,
            timers,
            tools,
            control_tx,
            control,
            greeting: config.greeting.clone(),
            state,
            recorder,
            downstream,
            closed: false,
        })
    }

    /// Process one event, then any activation changes and mute requests it
    /// caused
    ///
    /// Changes that happened before the event (keepalive expiry) are applied
    /// first.
    pub async fn handle(&mut self, event: Event) {
        let ends = matches!(event, Event::SessionEnd);
        self.drain_pending().await;
        self.process(event).await;
        self.drain_pending().await;
        if ends {
            self.teardown().await;
        }
    }

    /// Run until `SessionEnd` or the input closes, then tear down
    pub async fn run(&mut self, mut input: EventReceiver) {
        while !self.closed {
            tokio::select! {
                biased;
                Some(change) = self.activations.recv() => self.on_activation(&change),
                Some(event) = self.control.recv() => self.process(event).await,
                event = input.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        tracing::info!(session_id = %self.id, "input closed");
                        break;
                    }
                },
            }
        }
        self.teardown().await;
    }

    async fn process(&mut self, event: Event) {
        if self.closed {
            tracing::debug!(kind = event.kind(), "session closed, dropping event");
            return;
        }

        match event {
            Event::Mute { muted } => {
                self.apply_mute(muted);
                return;
            }
            Event::ToolCall { name, arguments } => {
                let result = self.tools.call(&name, &arguments).await;
                self.forward(Event::ToolResult { name, result });
                return;
            }
            _ => {}
        }

        if !self.gate.admit(&event) {
            tracing::trace!(kind = event.kind(), state = %self.gate.state(), "event gated");
            return;
        }

        if let Event::Transcription { text } = &event
            && self.interrupt.intercept(text, &mut self.gate, &self.downstream)
        {
            return;
        }

        self.recorder.observe(&event);
        self.state.observe(&event);

        let starting = matches!(event, Event::SessionStart);
        self.forward(event);
        if starting {
            self.forward(Event::ToolConfig {
                tools: tool_definitions(),
            });
            if let Some(text) = self.greeting.clone() {
                self.forward(Event::Greeting { text });
            }
        }
    }

    async fn drain_pending(&mut self) {
        loop {
            if let Ok(change) = self.activations.try_recv() {
                self.on_activation(&change);
            } else if let Ok(event) = self.control.try_recv() {
                self.process(event).await;
            } else {
                break;
            }
        }
    }

    fn on_activation(&mut self, change: &ActivationChange) {
        if self.closed {
            return;
        }
        tracing::debug!(session_id = %self.id, ?change, "activation changed");
        self.state.on_activation(change);
    }

    fn apply_mute(&mut self, muted: bool) {
        let changed = self.gate.set_muted(muted);
        // Unmuting a gate that was never muted leaves the state alone
        if muted || changed {
            self.state.on_mute(muted);
        }
    }

    fn forward(&self, event: Event) {
        if self.downstream.send(event).is_err() {
            tracing::warn!(session_id = %self.id, "downstream closed, dropping event");
        }
    }

    /// Cancel timers and keepalive, force `Offline` and flush publications
    ///
    /// Safe to call more than once.
    pub async fn teardown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let cancelled = self.timers.cancel_all().await;
        self.gate.shutdown();
        self.state.end_session();
        self.state.shutdown().await;

        tracing::info!(
            session_id = %self.id,
            cancelled_timers = cancelled,
            turns = self.recorder.log().len(),
            "session closed"
        );
    }

    /// Sender for out-of-band commands such as mute switch toggles
    ///
    /// Events sent here are applied on the session's event path.
    #[must_use]
    pub fn control(&self) -> EventSender {
        self.control_tx.clone()
    }

    /// Session identifier
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Current session state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    /// Current activation state of the wake gate
    #[must_use]
    pub fn activation(&self) -> ActivationState {
        self.gate.state()
    }

    /// Whether user input currently passes the gate
    #[must_use]
    pub fn is_awake(&self) -> bool {
        self.gate.is_awake()
    }

    /// Whether the wake gate's keepalive is pending
    #[must_use]
    pub fn keepalive_armed(&self) -> bool {
        self.gate.keepalive_armed()
    }

    /// The session's timers
    #[must_use]
    pub const fn timers(&self) -> &TimerService {
        &self.timers
    }

    /// Conversation captured so far
    #[must_use]
    pub fn conversation(&self) -> ConversationLog {
        self.recorder.log().clone()
    }

    /// Watch session state changes
    #[must_use]
    pub fn subscribe_state(&self) -> tokio::sync::watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Whether the session has been torn down
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("id", &self.id)
            .field("gate", &self.gate)
            .field("state", &self.state.current())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
