//! Protocol dispatcher and the monitor facade
//!
//! [`ProtocolDispatcher`] sits on top of one [`LineTransport`]. Inbound lines
//! are classified on the reader thread: neighbour reports go into the
//! [`TopologyTracker`], feedback goes into the [`FeedbackLog`], and both end
//! up as [`WsnEvent`]s fanned out to every subscriber. Each subscriber gets
//! its own bounded crossbeam channel and delivery never blocks the reader:
//! a subscriber that falls behind loses events, never state. Outbound, it turns
//! deploy and cancel requests into frames and sends each frame under one
//! writer lock.
//!
//! [`WsnMonitor`] adds the [`PredicateRegistry`] on top, so callers work
//! with predicate ids instead of raw artifacts.
//!
//! # Example
//!
//! ```ignore
//! use predvis_rs::monitor::{WsnEvent, WsnMonitor};
//!
//! let monitor = WsnMonitor::from_config(&config, connector, pipeline);
//! monitor.connect()?;
//!
//! let id = monitor.registry().create_from_file("hop", "hop.pred");
//! monitor.deploy_predicate(id)?;
//!
//! for event in monitor.events().iter() {
//!     if let WsnEvent::Feedback { predicate_id, feedback } = event {
//!         println!("{}: {}", predicate_id, feedback.result);
//!     }
//! }
//! ```

use crate::backend::{Connector, LineHandler, LineTransport};
use crate::config::AppConfig;
use crate::error::{PredVisError, Result, ResultExt};
use crate::feedback::{FeedbackLog, PredicateFeedback, PredicateStatus};
use crate::predicate::{PredicatePipeline, PredicateRegistry};
use crate::protocol::{cancel_frame, classify, deploy_frame, InboundMessage};
use crate::topology::{TopologyHistory, TopologyListener, TopologyTracker};
use crate::types::{NodeId, PredicateId, VariableDetails};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};

/// What the monitor reports to its consumer
#[derive(Debug, Clone)]
pub enum WsnEvent {
    /// Cumulative topology after a change
    TopologyUpdated(Arc<TopologyHistory>),
    /// A predicate evaluation reported by a mote
    Feedback {
        predicate_id: PredicateId,
        feedback: PredicateFeedback,
    },
    /// The sink closed the stream
    LinkClosed,
    /// The link failed
    LinkLost(String),
}

impl WsnEvent {
    fn kind(&self) -> &'static str {
        match self {
            WsnEvent::TopologyUpdated(_) => "topology update",
            WsnEvent::Feedback { .. } => "feedback",
            WsnEvent::LinkClosed => "link closed",
            WsnEvent::LinkLost(_) => "link lost",
        }
    }
}

/// Fan-out of monitor events to the current subscribers
struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<Sender<WsnEvent>>>,
}

impl EventBus {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self) -> Receiver<WsnEvent> {
        let (tx, rx) = bounded(self.capacity);
        crate::lock(&self.subscribers).push(tx);
        rx
    }

    /// Never blocks. Full subscribers miss the event, dropped ones are pruned.
    fn publish(&self, event: WsnEvent) {
        crate::lock(&self.subscribers).retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Event subscriber is lagging, dropped a {} event", event.kind());
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }

    fn subscriber_count(&self) -> usize {
        crate::lock(&self.subscribers).len()
    }
}

/// Forwards tracker notifications to the event bus
struct TopologyForwarder {
    events: Arc<EventBus>,
}

impl TopologyListener for TopologyForwarder {
    fn topology_updated(&self, history: &Arc<TopologyHistory>) {
        self.events
            .publish(WsnEvent::TopologyUpdated(Arc::clone(history)));
    }
}

/// Runs on the reader thread. A malformed line is logged and dropped.
struct InboundRouter {
    tracker: Arc<TopologyTracker>,
    feedback: Arc<Mutex<FeedbackLog>>,
    events: Arc<EventBus>,
}

impl LineHandler for InboundRouter {
    fn on_line(&self, line: &str) {
        match classify(line) {
            Ok(InboundMessage::Neighbours(report)) => {
                self.tracker.update(report.round, &report.pairs);
            }
            Ok(InboundMessage::Feedback(feedback)) => {
                tracing::debug!(
                    "Feedback for predicate {} from {}: {}",
                    feedback.predicate_id,
                    feedback.from,
                    feedback.result
                );
                crate::lock(&self.feedback).record(feedback.clone());
                self.events.publish(WsnEvent::Feedback {
                    predicate_id: feedback.predicate_id,
                    feedback,
                });
            }
            Ok(InboundMessage::Ignored) => {
                tracing::trace!("mote: {}", line);
            }
            Err(e) => {
                tracing::warn!("Dropping line '{}': {}", line, e);
            }
        }
    }

    fn on_closed(&self) {
        tracing::info!("Link closed");
        self.events.publish(WsnEvent::LinkClosed);
    }

    fn on_lost(&self, error: PredVisError) {
        tracing::error!("Link lost: {}", error);
        self.events.publish(WsnEvent::LinkLost(error.to_string()));
    }
}

/// Routes inbound messages and frames outbound commands for one link
pub struct ProtocolDispatcher {
    transport: LineTransport,
    tracker: Arc<TopologyTracker>,
    feedback: Arc<Mutex<FeedbackLog>>,
    events: Arc<EventBus>,
}

impl ProtocolDispatcher {
    /// `capacity` bounds each subscriber's queue
    pub fn new(transport: LineTransport, tracker: Arc<TopologyTracker>, capacity: usize) -> Self {
        let events = Arc::new(EventBus::new(capacity));
        tracker.add_listener(Arc::new(TopologyForwarder {
            events: events.clone(),
        }));
        Self {
            transport,
            tracker,
            feedback: Arc::new(Mutex::new(FeedbackLog::new())),
            events,
        }
    }

    pub fn connect(&self) -> Result<()> {
        let router = InboundRouter {
            tracker: self.tracker.clone(),
            feedback: self.feedback.clone(),
            events: self.events.clone(),
        };
        self.transport.connect(Arc::new(router))
    }

    pub fn close(&self) {
        self.transport.close();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    /// Subscribe to monitor events published from now on.
    ///
    /// Every call returns an independent receiver. Dropping it unsubscribes.
    /// A receiver that is not drained fills up and then misses events; the
    /// topology, feedback and status queries stay current regardless.
    pub fn events(&self) -> Receiver<WsnEvent> {
        self.events.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.subscriber_count()
    }

    pub fn tracker(&self) -> &Arc<TopologyTracker> {
        &self.tracker
    }

    pub fn feedback(&self) -> &Arc<Mutex<FeedbackLog>> {
        &self.feedback
    }

    /// Send a deploy frame
    pub fn deploy_predicate(
        &self,
        id: PredicateId,
        target: &NodeId,
        bytecode: &[u8],
        variables: &[VariableDetails],
    ) -> Result<()> {
        let frame = deploy_frame(id, target, bytecode, variables, self.transport.buffer_size());
        tracing::info!(
            "Deploying predicate {} to {} ({} lines)",
            id,
            target,
            frame.len()
        );
        self.transport.send_all(&frame)
    }

    /// Send a cancel frame
    pub fn cancel_predicate(&self, id: PredicateId, target: &NodeId) -> Result<()> {
        tracing::info!("Cancelling predicate {} on {}", id, target);
        self.transport.send_all(&cancel_frame(id, target))
    }
}

/// Predicates, topology and feedback for one sink link
pub struct WsnMonitor {
    dispatcher: ProtocolDispatcher,
    registry: PredicateRegistry,
}

impl WsnMonitor {
    pub fn new(dispatcher: ProtocolDispatcher, registry: PredicateRegistry) -> Self {
        Self {
            dispatcher,
            registry,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        connector: Box<dyn Connector>,
        pipeline: PredicatePipeline,
    ) -> Self {
        let transport = LineTransport::from_config(connector, &config.link);
        let tracker = Arc::new(TopologyTracker::with_retention(config.topology.max_rounds));
        let dispatcher = ProtocolDispatcher::new(transport, tracker, config.link.event_capacity);
        Self::new(dispatcher, PredicateRegistry::new(pipeline))
    }

    pub fn connect(&self) -> Result<()> {
        self.dispatcher.connect()
    }

    pub fn close(&self) {
        self.dispatcher.close();
    }

    pub fn is_connected(&self) -> bool {
        self.dispatcher.is_connected()
    }

    pub fn events(&self) -> Receiver<WsnEvent> {
        self.dispatcher.events()
    }

    pub fn dispatcher(&self) -> &ProtocolDispatcher {
        &self.dispatcher
    }

    pub fn registry(&self) -> &PredicateRegistry {
        &self.registry
    }

    pub fn topology(&self) -> Arc<TopologyHistory> {
        self.dispatcher.tracker().snapshot()
    }

    /// Build if needed, send to the target mote and mark monitored
    pub fn deploy_predicate(&self, id: PredicateId) -> Result<()> {
        let artifacts = self.registry.ensure_built(id)?;
        self.dispatcher
            .deploy_predicate(id, &artifacts.target, &artifacts.bytecode, &artifacts.variables)
            .with_context(|| format!("Failed to deploy predicate {}", id))?;
        self.registry.set_monitored(id, true)
    }

    /// Remove from the target mote and mark unmonitored
    pub fn cancel_predicate(&self, id: PredicateId) -> Result<()> {
        let predicate = self.registry.get(id)?;
        let artifacts = predicate.artifacts().ok_or_else(|| {
            PredVisError::Precondition(format!("predicate {} was never built", id))
        })?;
        self.dispatcher
            .cancel_predicate(id, &artifacts.target)
            .with_context(|| format!("Failed to cancel predicate {}", id))?;
        self.registry.set_monitored(id, false)
    }

    pub fn set_script(&self, id: PredicateId, script: impl Into<String>) -> Result<()> {
        self.registry.set_script(id, script)
    }

    pub fn set_assembly(&self, id: PredicateId, assembly: impl Into<String>) -> Result<()> {
        self.registry.set_assembly(id, assembly)
    }

    /// Forget a predicate, cancelling it first if it is deployed and the link is up
    pub fn remove_predicate(&self, id: PredicateId) -> Result<()> {
        let predicate = self.registry.get(id)?;
        if predicate.is_monitored() && self.is_connected() {
            if let Err(e) = self.cancel_predicate(id) {
                tracing::warn!("Removing predicate {} without cancelling: {}", id, e);
            }
        }
        self.registry.remove(id)?;
        crate::lock(self.dispatcher.feedback()).clear(id);
        Ok(())
    }

    pub fn status(&self, id: PredicateId) -> Result<PredicateStatus> {
        let monitored = self.registry.get(id)?.is_monitored();
        Ok(crate::lock(self.dispatcher.feedback()).status(id, monitored))
    }

    /// Every feedback report for a predicate, oldest first
    pub fn feedback_history(&self, id: PredicateId) -> Vec<PredicateFeedback> {
        crate::lock(self.dispatcher.feedback()).history(id).to_vec()
    }
}
