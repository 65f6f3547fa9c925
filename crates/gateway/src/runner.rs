//! Inbound event pump. Reads events from a gateway session, hands each one to
//! the [`EventDispatcher`], and reopens the session when the platform drops
//! it. Interactions are answered through `ChatGateway::reply`, so there is no
//! per-event acknowledgement on this side.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{EventContext, EventDispatcher, GatewayEnvelope, GatewayEvent, HandlerResult};

/// Close codes after which the platform will refuse the same session again:
/// bad token, invalid shard, sharding required, bad API version, invalid or
/// disallowed intents.
const NON_RECOVERABLE_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway session could not be opened: {0}")]
    Connect(String),
    #[error("gateway session lost: {0}")]
    SessionLost(String),
    #[error("gateway refused the session (close code {code}): {reason}")]
    Refused { code: u16, reason: String },
}

impl TransportError {
    /// Maps a websocket close frame to a transport error.
    pub fn from_close_code(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if NON_RECOVERABLE_CLOSE_CODES.contains(&code) {
            Self::Refused { code, reason }
        } else {
            Self::SessionLost(format!("closed with code {code}: {reason}"))
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Refused { .. })
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("gateway runner stopped: {0}")]
    Fatal(#[source] TransportError),
}

/// Backoff between session attempts. The failure streak resets whenever a
/// session delivers at least one event before dropping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_consecutive_failures: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_consecutive_failures: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn delay_after(&self, failures: u32) -> Duration {
        let doublings = failures.saturating_sub(1).min(16);
        let delay_ms = self.base_delay_ms.saturating_mul(1_u64 << doublings).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound side of the chat platform: a stream of button clicks and guild
/// messages. Outbound calls go through `ChatGateway` instead.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn open_session(&self) -> Result<(), TransportError>;
    /// `Ok(None)` means the platform ended the stream cleanly.
    async fn next_event(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn close_session(&self);
}

/// Transport with no inbound events; the stream ends as soon as it opens.
#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn open_session(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn close_session(&self) {}
}

/// Tally of what the runner saw across all sessions.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub sessions: u32,
    pub processed: u64,
    pub rejected: u64,
    pub ignored: u64,
    pub failed: u64,
}

impl RunSummary {
    fn delivered(&self) -> u64 {
        self.processed + self.rejected + self.ignored + self.failed
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy }
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Pumps sessions until the stream ends or retries run out. Only a
    /// refused session is an error; a dispatch failure never stops the loop.
    pub async fn start(&self) -> Result<RunSummary, RunnerError> {
        let mut summary = RunSummary::default();
        let mut failures = 0_u32;

        loop {
            summary.sessions += 1;
            let delivered_before = summary.delivered();

            let transport_error = match self.run_session(&mut summary).await {
                Ok(()) => {
                    info!(
                        event_name = "ingress.gateway.stream_ended",
                        sessions = summary.sessions,
                        processed = summary.processed,
                        "gateway stream ended"
                    );
                    return Ok(summary);
                }
                Err(transport_error) => transport_error,
            };

            if !transport_error.is_retryable() {
                error!(
                    event_name = "ingress.gateway.session_refused",
                    error = %transport_error,
                    "gateway refused the session; not reconnecting"
                );
                return Err(RunnerError::Fatal(transport_error));
            }

            if summary.delivered() > delivered_before {
                failures = 0;
            }
            failures += 1;

            if failures > self.reconnect_policy.max_consecutive_failures {
                warn!(
                    event_name = "ingress.gateway.retries_exhausted",
                    failures,
                    error = %transport_error,
                    "gateway unreachable; giving up on inbound events"
                );
                return Ok(summary);
            }

            let delay = self.reconnect_policy.delay_after(failures);
            warn!(
                event_name = "ingress.gateway.reconnecting",
                failures,
                delay_ms = delay.as_millis() as u64,
                error = %transport_error,
                "gateway session failed; reconnecting"
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn run_session(&self, summary: &mut RunSummary) -> Result<(), TransportError> {
        self.transport.open_session().await?;
        info!(
            event_name = "ingress.gateway.session_opened",
            session = summary.sessions,
            "gateway session opened"
        );

        loop {
            match self.transport.next_event().await {
                Ok(Some(envelope)) => self.deliver(&envelope, summary).await,
                Ok(None) => {
                    self.transport.close_session().await;
                    return Ok(());
                }
                Err(transport_error) => {
                    self.transport.close_session().await;
                    return Err(transport_error);
                }
            }
        }
    }

    async fn deliver(&self, envelope: &GatewayEnvelope, summary: &mut RunSummary) {
        let (actor_id, channel_id) = actor_and_channel(envelope);
        let actor_id = actor_id.unwrap_or("unknown");
        let channel_id = channel_id.unwrap_or("unknown");
        let context = EventContext { correlation_id: envelope.envelope_id.clone() };

        match self.dispatcher.dispatch(envelope, &context).await {
            Ok(HandlerResult::Processed) => {
                summary.processed += 1;
                info!(
                    event_name = "ingress.gateway.dispatched",
                    outcome = "processed",
                    event_type = ?envelope.event.event_type(),
                    correlation_id = %envelope.envelope_id,
                    actor_id,
                    channel_id,
                    "gateway event handled"
                );
            }
            Ok(HandlerResult::Rejected) => {
                summary.rejected += 1;
                info!(
                    event_name = "ingress.gateway.dispatched",
                    outcome = "rejected",
                    event_type = ?envelope.event.event_type(),
                    correlation_id = %envelope.envelope_id,
                    actor_id,
                    channel_id,
                    "gateway event refused"
                );
            }
            Ok(HandlerResult::Ignored) => {
                summary.ignored += 1;
                debug!(
                    event_name = "ingress.gateway.dispatched",
                    outcome = "ignored",
                    event_type = ?envelope.event.event_type(),
                    correlation_id = %envelope.envelope_id,
                    "gateway event ignored"
                );
            }
            Err(dispatch_error) => {
                summary.failed += 1;
                warn!(
                    event_name = "ingress.gateway.dispatch_failed",
                    event_type = ?envelope.event.event_type(),
                    correlation_id = %envelope.envelope_id,
                    actor_id,
                    channel_id,
                    error = %dispatch_error,
                    "gateway event failed; continuing"
                );
            }
        }
    }
}

fn actor_and_channel(envelope: &GatewayEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        GatewayEvent::ButtonInteraction(event) => {
            (Some(event.actor_id.as_str()), Some(event.channel_id.as_str()))
        }
        GatewayEvent::Message(event) => {
            (Some(event.author_id.as_str()), Some(event.channel_id.as_str()))
        }
        GatewayEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use ticketdesk_core::errors::ApplicationError;

    use super::{
        actor_and_channel, GatewayRunner, GatewayTransport, ReconnectPolicy, RunSummary,
        RunnerError, TransportError,
    };
    use crate::events::{
        ButtonInteractionEvent, EventContext, EventDispatcher, EventHandler, EventHandlerError,
        GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult, MessageEvent,
    };

    enum Session {
        Refused(TransportError),
        Stream(Vec<Step>),
    }

    enum Step {
        Event(GatewayEnvelope),
        Lost(TransportError),
    }

    #[derive(Default)]
    struct ScriptState {
        sessions: VecDeque<Session>,
        current: VecDeque<Step>,
        opens: usize,
        closes: usize,
    }

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptState>,
    }

    impl ScriptedTransport {
        fn new(sessions: Vec<Session>) -> Arc<Self> {
            Arc::new(Self {
                state: Mutex::new(ScriptState {
                    sessions: sessions.into(),
                    ..ScriptState::default()
                }),
            })
        }

        fn state(&self) -> std::sync::MutexGuard<'_, ScriptState> {
            self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn opens(&self) -> usize {
            self.state().opens
        }

        fn closes(&self) -> usize {
            self.state().closes
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn open_session(&self) -> Result<(), TransportError> {
            let mut state = self.state();
            state.opens += 1;
            match state.sessions.pop_front() {
                Some(Session::Refused(error)) => Err(error),
                Some(Session::Stream(steps)) => {
                    state.current = steps.into();
                    Ok(())
                }
                None => Ok(()),
            }
        }

        async fn next_event(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            match self.state().current.pop_front() {
                Some(Step::Event(envelope)) => Ok(Some(envelope)),
                Some(Step::Lost(error)) => Err(error),
                None => Ok(None),
            }
        }

        async fn close_session(&self) {
            self.state().closes += 1;
        }
    }

    /// Answers by button id: `ok` is processed, `no` is rejected, anything
    /// else fails.
    struct ButtonOutcomes;

    #[async_trait]
    impl EventHandler for ButtonOutcomes {
        fn event_type(&self) -> GatewayEventType {
            GatewayEventType::ButtonInteraction
        }

        async fn handle(
            &self,
            envelope: &GatewayEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            let GatewayEvent::ButtonInteraction(event) = &envelope.event else {
                return Ok(HandlerResult::Ignored);
            };
            match event.custom_id.as_str() {
                "ok" => Ok(HandlerResult::Processed),
                "no" => Ok(HandlerResult::Rejected),
                _ => Err(ApplicationError::Gateway("missing access".to_owned()).into()),
            }
        }
    }

    fn dispatcher() -> EventDispatcher {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(ButtonOutcomes);
        dispatcher
    }

    fn click(custom_id: &str) -> Step {
        Step::Event(GatewayEnvelope {
            envelope_id: format!("env-{custom_id}"),
            event: GatewayEvent::ButtonInteraction(ButtonInteractionEvent {
                interaction_id: "I1".to_owned(),
                interaction_token: "tok".to_owned(),
                custom_id: custom_id.to_owned(),
                actor_id: "U1".to_owned(),
                actor_name: "alice".to_owned(),
                channel_id: "C1".to_owned(),
                channel_name: None,
                guild_id: "G1".to_owned(),
            }),
        })
    }

    fn chatter() -> Step {
        Step::Event(GatewayEnvelope {
            envelope_id: "env-msg".to_owned(),
            event: GatewayEvent::Message(MessageEvent {
                author_id: "U2".to_owned(),
                author_is_admin: false,
                author_is_bot: false,
                content: "hello".to_owned(),
                channel_id: "C2".to_owned(),
                guild_id: "G1".to_owned(),
            }),
        })
    }

    fn lost() -> Step {
        Step::Lost(TransportError::from_close_code(1006, "abnormal closure"))
    }

    fn immediate(max_consecutive_failures: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_consecutive_failures, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn tallies_each_dispatch_outcome_and_keeps_going_after_failures() {
        let transport = ScriptedTransport::new(vec![Session::Stream(vec![
            click("ok"),
            click("boom"),
            click("no"),
            chatter(),
            click("ok"),
        ])]);
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(3));

        let summary = runner.start().await.expect("stream ends cleanly");

        assert_eq!(
            summary,
            RunSummary { sessions: 1, processed: 2, rejected: 1, ignored: 1, failed: 1 }
        );
        assert_eq!(transport.closes(), 1);
    }

    #[tokio::test]
    async fn reopens_after_connect_failure() {
        let transport = ScriptedTransport::new(vec![
            Session::Refused(TransportError::Connect("dns lookup failed".to_owned())),
            Session::Stream(vec![click("ok")]),
        ]);
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(2));

        let summary = runner.start().await.expect("recovers");

        assert_eq!(transport.opens(), 2);
        assert_eq!(summary.sessions, 2);
        assert_eq!(summary.processed, 1);
    }

    #[tokio::test]
    async fn reopens_after_session_drops_mid_stream() {
        let transport = ScriptedTransport::new(vec![
            Session::Stream(vec![click("ok"), lost()]),
            Session::Stream(vec![click("ok")]),
        ]);
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(1));

        let summary = runner.start().await.expect("recovers");

        assert_eq!(summary.processed, 2);
        assert_eq!(transport.opens(), 2);
        assert_eq!(transport.closes(), 2, "dropped sessions are closed too");
    }

    #[tokio::test]
    async fn refused_credentials_stop_without_retrying() {
        let transport = ScriptedTransport::new(vec![
            Session::Refused(TransportError::from_close_code(4004, "Authentication failed.")),
            Session::Stream(vec![click("ok")]),
        ]);
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(5));

        let error = runner.start().await.expect_err("fatal");

        assert!(matches!(error, RunnerError::Fatal(TransportError::Refused { code: 4004, .. })));
        assert_eq!(transport.opens(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_consecutive_failures_without_erroring() {
        let transport = ScriptedTransport::new(
            (0..5)
                .map(|attempt| Session::Refused(TransportError::Connect(format!("fail-{attempt}"))))
                .collect(),
        );
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(2));

        let summary = runner.start().await.expect("degrades quietly");

        assert_eq!(transport.opens(), 3);
        assert_eq!(summary.delivered(), 0);
    }

    #[tokio::test]
    async fn a_productive_session_resets_the_failure_streak() {
        let transport = ScriptedTransport::new(vec![
            Session::Stream(vec![click("ok"), lost()]),
            Session::Stream(vec![click("ok"), lost()]),
            Session::Stream(vec![click("ok")]),
        ]);
        let runner = GatewayRunner::new(transport.clone(), dispatcher(), immediate(1));

        let summary = runner.start().await.expect("recovers every time");

        assert_eq!(summary.sessions, 3);
        assert_eq!(summary.processed, 3);
    }

    #[test]
    fn close_codes_split_into_retryable_and_refused() {
        assert!(TransportError::from_close_code(1001, "going away").is_retryable());
        assert!(TransportError::from_close_code(4000, "unknown error").is_retryable());
        assert!(TransportError::from_close_code(4009, "session timed out").is_retryable());
        assert!(!TransportError::from_close_code(4004, "bad token").is_retryable());
        assert!(!TransportError::from_close_code(4014, "disallowed intents").is_retryable());
        assert!(TransportError::Connect("refused".to_owned()).is_retryable());
    }

    #[test]
    fn delay_doubles_per_failure_and_caps() {
        let policy =
            ReconnectPolicy { max_consecutive_failures: 5, base_delay_ms: 250, max_delay_ms: 1_000 };

        assert_eq!(policy.delay_after(1), Duration::from_millis(250));
        assert_eq!(policy.delay_after(2), Duration::from_millis(500));
        assert_eq!(policy.delay_after(3), Duration::from_millis(1_000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(1_000));
    }

    #[test]
    fn unsupported_events_carry_no_actor_or_channel() {
        let envelope = GatewayEnvelope {
            envelope_id: "env-typing".to_owned(),
            event: GatewayEvent::Unsupported { event_type: "typing_start".to_owned() },
        };

        assert_eq!(actor_and_channel(&envelope), (None, None));
    }
}
