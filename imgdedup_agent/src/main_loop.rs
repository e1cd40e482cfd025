use crate::channel::{Channel, ChannelEvent, ConnectionState, StateChange};
use crate::config::AgentConfig;
use crate::dom::GalleryDom;
use crate::error::{AgentError, TransportError};
use crate::negotiator::{
    outcome_notice, HandshakeState, NegotiationEvent, NegotiationStep, VersionNegotiator,
};
use crate::notify::{Notifier, ToastLevel};
use crate::protocol::{ActionKind, DuplicateReport, ServerMessage, VERSION_REQUEST};
use crate::reconciler::{request_duplicate_check, ApplyOutcome, Reconciler};
use crate::router::{MessageRouter, Routed, Subscription};
use crate::threshold::ThresholdControl;
use crate::wait::{wait_until, CancelToken};
use tracing::{debug, error, info, warn};

const OFFLINE_NOTICE: &str =
    "Not connected to the local service. Start the server, then reload this page.";
const LOST_NOTICE: &str =
    "Lost connection to the local service. Restart the server, then reload this page.";
const PENDING_NOTICE: &str =
    "Still checking the local service version. Try again in a moment.";

/// Things the user does with the injected controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    EntryInput(String),
    SliderInput(i64),
    FindDuplicates,
    ResetOrder,
}

struct AgentSubscriptions {
    version: Subscription,
    toast: Subscription,
    results: Subscription,
}

/// Everything one page load needs, passed around explicitly instead of living
/// in globals. The channel must exist before anything subscribes, so it is
/// handed in at construction.
pub struct Agent {
    config: AgentConfig,
    channel: Channel,
    router: MessageRouter,
    negotiator: VersionNegotiator,
    reconciler: Reconciler,
    threshold: ThresholdControl,
    subs: AgentSubscriptions,

    next_request_id: u64,
    latest_request_id: Option<u64>,
    results_applied: u64,
}

impl Agent {
    pub fn new(config: AgentConfig, channel: Channel) -> Self {
        let mut router = MessageRouter::new();
        let subs = AgentSubscriptions {
            version: router.subscribe(ActionKind::VersionResult),
            toast: router.subscribe(ActionKind::Toast),
            results: router.subscribe(ActionKind::FindDuplicateImagesResult),
        };
        Self {
            negotiator: VersionNegotiator::new(config.client_version),
            reconciler: Reconciler::new(config.page_url.clone()),
            threshold: ThresholdControl::new(config.default_threshold_percent()),
            config,
            channel,
            router,
            subs,
            next_request_id: 1,
            latest_request_id: None,
            results_applied: 0,
        }
    }

    pub fn connect(config: AgentConfig) -> Result<Self, AgentError> {
        let channel = Channel::open(&config.ws_url)?;
        Ok(Self::new(config, channel))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel {
        &mut self.channel
    }

    /// For other features that want to listen on the same connection.
    pub fn router_mut(&mut self) -> &mut MessageRouter {
        &mut self.router
    }

    pub fn handshake(&self) -> HandshakeState {
        self.negotiator.state()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn threshold(&self) -> &ThresholdControl {
        &self.threshold
    }

    /// Duplicate reports applied so far, stale ones excluded.
    pub fn results_applied(&self) -> u64 {
        self.results_applied
    }

    /// One turn of the event loop: everything the socket delivered since the
    /// last tick is handled in arrival order. Never fails; problems are logged
    /// or shown to the user.
    pub fn tick(&mut self, dom: &dyn GalleryDom, notifier: &dyn Notifier) {
        for event in self.channel.poll() {
            match event {
                ChannelEvent::StateChanged(change) => self.on_state_change(change, notifier),
                ChannelEvent::Message(frame) => {
                    self.on_frame(&frame, dom, notifier);
                    self.drain_subscriptions(dom, notifier);
                }
            }
        }
    }

    pub fn handle_ui(&mut self, dom: &dyn GalleryDom, notifier: &dyn Notifier, event: UiEvent) {
        let result = match event {
            UiEvent::EntryInput(text) => {
                self.threshold.set_from_entry(&text);
                self.render_controls(dom)
            }
            UiEvent::SliderInput(position) => {
                self.threshold.set_from_slider(position);
                self.render_controls(dom)
            }
            UiEvent::FindDuplicates => self.find_duplicates(dom).map(|_| ()),
            UiEvent::ResetOrder => {
                if self.reconciler.is_sorted() {
                    self.reconciler.reset_to_original(dom)
                } else {
                    Ok(())
                }
            }
        };
        if let Err(e) = result {
            report_error(&e, notifier);
        }
    }

    /// Puts the threshold widgets and the trigger into the page header.
    pub fn mount_controls(&self, dom: &dyn GalleryDom) -> Result<(), AgentError> {
        if !dom.has_header() {
            return Err(AgentError::DomPreconditionMissing("header container".to_string()));
        }
        self.render_controls(dom)
    }

    /// Captures the unsorted page and sends it off. Returns the number of
    /// images in the request. Nothing goes out before the version check has
    /// an outcome.
    pub fn find_duplicates(&mut self, dom: &dyn GalleryDom) -> Result<usize, AgentError> {
        if !self.channel.is_open() {
            return Err(AgentError::RequestRejectedOffline);
        }
        if !self.negotiator.is_settled() {
            return Err(AgentError::HandshakePending);
        }
        let catalog = self.reconciler.prepare_request(dom)?;
        if catalog.is_empty() {
            return Err(AgentError::DomPreconditionMissing(
                "no images with a resolvable filename".to_string(),
            ));
        }

        let request_id = self.next_request_id;
        request_duplicate_check(
            &self.channel,
            &catalog,
            self.config.image_type,
            self.threshold.threshold(),
            Some(request_id),
        )?;
        self.next_request_id += 1;
        self.latest_request_id = Some(request_id);
        Ok(catalog.len())
    }

    /// Ticks until the channel leaves `Connecting`.
    pub fn wait_until_open(
        &mut self,
        dom: &dyn GalleryDom,
        notifier: &dyn Notifier,
        cancel: &CancelToken,
    ) -> Result<(), AgentError> {
        let policy = self.config.wait;
        wait_until(policy, cancel, || {
            self.tick(dom, notifier);
            self.channel.state() != ConnectionState::Connecting
        })?;
        if self.channel.is_open() {
            Ok(())
        } else {
            Err(TransportError::NotOpen(self.channel.state()).into())
        }
    }

    /// Ticks until the handshake settles or the channel closes.
    pub fn wait_until_settled(
        &mut self,
        dom: &dyn GalleryDom,
        notifier: &dyn Notifier,
        cancel: &CancelToken,
    ) -> Result<HandshakeState, AgentError> {
        let policy = self.config.wait;
        wait_until(policy, cancel, || {
            self.tick(dom, notifier);
            self.negotiator.is_settled() || self.channel.state() == ConnectionState::Closed
        })?;
        if self.negotiator.is_settled() {
            Ok(self.negotiator.state())
        } else {
            Err(TransportError::NotOpen(self.channel.state()).into())
        }
    }

    /// Waits for the page to render its image list.
    pub fn wait_for_gallery(
        &self,
        dom: &dyn GalleryDom,
        cancel: &CancelToken,
    ) -> Result<(), AgentError> {
        wait_until(self.config.wait, cancel, || dom.list_items().is_some())?;
        Ok(())
    }

    /// Drops the agent's own subscriptions and closes the channel.
    pub fn shutdown(mut self) {
        let ids = [self.subs.version.id(), self.subs.toast.id(), self.subs.results.id()];
        for id in ids {
            self.router.unsubscribe(id);
        }
        match self.channel.close() {
            Some(change) => info!(from = ?change.from, "channel closed on shutdown"),
            None => debug!("channel was already closed"),
        }
    }

    fn on_state_change(&mut self, change: StateChange, notifier: &dyn Notifier) {
        if change.is_lost() {
            notifier.toast(ToastLevel::Warning, LOST_NOTICE);
        } else if change.to == ConnectionState::Closed {
            error!(url = %self.channel.url(), "could not reach the local service");
        }
    }

    fn on_frame(&mut self, frame: &str, dom: &dyn GalleryDom, notifier: &dyn Notifier) {
        match self.router.dispatch(frame) {
            Routed::ServiceConnected => {
                self.negotiate(NegotiationEvent::ServiceConnected, notifier)
            }
            Routed::Reload => {
                info!("service asked for a page reload");
                dom.reload();
            }
            Routed::Delivered { action, subscribers } => {
                debug!(%action, subscribers, "frame delivered");
            }
            Routed::Discarded(reason) => debug!(?reason, "frame discarded"),
        }
    }

    fn negotiate(&mut self, event: NegotiationEvent, notifier: &dyn Notifier) {
        match self.negotiator.handle(event) {
            NegotiationStep::SendVersionRequest => {
                if let Err(e) = self.channel.send(VERSION_REQUEST) {
                    error!("could not request service version: {e}");
                }
            }
            NegotiationStep::Settled { outcome, remote } => {
                if let Some((level, msg)) =
                    outcome_notice(outcome, self.negotiator.local_version(), &remote)
                {
                    notifier.toast(level, &msg);
                }
            }
            NegotiationStep::Ignored => {}
        }
    }

    fn drain_subscriptions(&mut self, dom: &dyn GalleryDom, notifier: &dyn Notifier) {
        for msg in self.subs.version.drain() {
            if let ServerMessage::VersionResult(token) = msg {
                self.negotiate(NegotiationEvent::VersionReported(token), notifier);
            }
        }
        for msg in self.subs.toast.drain() {
            if let ServerMessage::Toast(html) = msg {
                if self.negotiator.allows_service_toasts() {
                    notifier.toast(ToastLevel::Info, &html);
                } else {
                    debug!(toast = %html, "service toast before handshake, not shown");
                }
            }
        }
        for msg in self.subs.results.drain() {
            if let ServerMessage::FindDuplicateImagesResult(report) = msg {
                self.on_report(&report, dom, notifier);
            }
        }
    }

    fn on_report(
        &mut self,
        report: &DuplicateReport,
        dom: &dyn GalleryDom,
        notifier: &dyn Notifier,
    ) {
        if let (Some(got), Some(latest)) = (report.request_id, self.latest_request_id) {
            if got != latest {
                warn!(got, latest, "stale duplicate report discarded");
                return;
            }
        }
        match self.reconciler.apply_report(dom, report) {
            Ok(ApplyOutcome::Unchanged) | Ok(ApplyOutcome::Reset) => {
                self.results_applied += 1;
                notifier.toast(ToastLevel::Info, "No duplicate images found.");
            }
            Ok(ApplyOutcome::Highlighted { duplicates }) => {
                self.results_applied += 1;
                let msg = format!(
                    "Found {duplicates} duplicate images. \
                     They are highlighted and moved to the top."
                );
                notifier.toast(ToastLevel::Success, &msg);
            }
            Err(e) => report_error(&e, notifier),
        }
    }

    fn render_controls(&self, dom: &dyn GalleryDom) -> Result<(), AgentError> {
        dom.render_controls(self.threshold.widgets())
            .map_err(AgentError::DomPreconditionMissing)
    }
}

fn report_error(e: &AgentError, notifier: &dyn Notifier) {
    match e {
        AgentError::RequestRejectedOffline => {
            warn!("{e}");
            notifier.toast(ToastLevel::Error, OFFLINE_NOTICE);
        }
        AgentError::HandshakePending => {
            warn!("{e}");
            notifier.toast(ToastLevel::Warning, PENDING_NOTICE);
        }
        AgentError::DomPreconditionMissing(what) => warn!(%what, "page element missing, skipped"),
        other => {
            error!("{other}");
            notifier.toast(ToastLevel::Error, &other.to_string());
        }
    }
}
