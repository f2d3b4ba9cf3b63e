//! The tracker: one-time initialization, navigation context, event and
//! identity dispatch, and automatic pageviews for client-side navigation.
//!
//! All state is owned by a [`Tracker`] handle rather than page globals. The
//! handle is cheap to clone; clones share the same state.
//!
//! Every event, pageviews included, is dropped while the tracking gate is
//! closed. The gate opens at `init` when the page hostname is on the domain
//! allowlist and can later be flipped with [`Tracker::set_tracking_enabled`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use toolbird_core::{
    EventData, EventPayload, IdentityData, IdentityPayload, TrackerConfig, TrackerError,
    TrackerOptions, TrackerResult, PAGEVIEW,
};

use crate::browser::BrowserContext;
use crate::navigation::{HistoryMethod, NavigationListener};
use crate::normalize::{encode, parse_url};
use crate::transport::{BeaconRequest, Transport};

/// Delay between a client-side navigation and its pageview, giving the new
/// page time to settle its DOM and title.
pub const PAGEVIEW_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Default)]
struct TrackerState {
    config: Option<TrackerConfig>,
    current_url: Option<String>,
    current_referrer: Option<String>,
}

struct TrackerInner {
    browser: Option<Arc<dyn BrowserContext>>,
    transport: Arc<dyn Transport>,
    state: Mutex<TrackerState>,
    identified: AtomicBool,
}

/// Client-side analytics tracker.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    /// Tracker for a page described by `browser`.
    pub fn new(browser: Arc<dyn BrowserContext>, transport: Arc<dyn Transport>) -> Self {
        Self::build(Some(browser), transport)
    }

    /// Tracker with no page behind it (server-side rendering). Every
    /// operation is a no-op.
    pub fn headless(transport: Arc<dyn Transport>) -> Self {
        Self::build(None, transport)
    }

    fn build(browser: Option<Arc<dyn BrowserContext>>, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                browser,
                transport,
                state: Mutex::new(TrackerState::default()),
                identified: AtomicBool::new(false),
            }),
        }
    }

    /// Configure the tracker from `options`. Runs at most once: later calls,
    /// and calls on a page that already has a global tracker, do nothing.
    /// With auto-tracking on, sends the initial pageview and hooks history.
    pub fn init(&self, options: &TrackerOptions) {
        let Some(browser) = self.inner.browser.as_ref() else {
            debug!("no browser context, tracker stays inert");
            return;
        };
        if browser.has_global_tracker() {
            debug!("page already has a global tracker, skipping init");
            return;
        }

        // Page globals are read before locking; a context may call back
        // into this tracker.
        let hostname = browser.hostname();
        let href = browser.href();
        let referrer = browser.referrer();

        let auto_track = {
            let mut state = self.inner.state.lock();
            if state.config.is_some() {
                debug!("tracker already initialized");
                return;
            }

            let config = TrackerConfig::from_options(options, &hostname);
            state.current_url = Some(parse_url(&href, config.exclude_query));
            state.current_referrer =
                (!referrer.is_empty() && referrer != hostname).then_some(referrer);

            info!(
                endpoint = %config.endpoint,
                hostname = %hostname,
                tracking_enabled = config.tracking_enabled,
                auto_track = config.auto_track,
                "tracker initialized"
            );

            let auto_track = config.auto_track;
            state.config = Some(config);
            auto_track
        };

        if auto_track {
            self.track(Some(PAGEVIEW), None);
            self.start_auto_track(browser.as_ref());
        }
    }

    /// Send a named event (default `"pageview"`) with optional data.
    pub fn track(&self, name: Option<&str>, data: Option<EventData>) {
        let Some(browser) = self.inner.browser.as_ref() else {
            return;
        };
        let name = name.unwrap_or(PAGEVIEW);
        let screen = browser.screen().to_string();
        let language = browser.language();

        let (url, payload) = {
            let state = self.inner.state.lock();
            let Some(config) = state.config.as_ref() else {
                return;
            };
            if !config.tracking_enabled {
                debug!(event = name, "tracking is disabled, event dropped");
                return;
            }

            let payload = EventPayload {
                url: encode(state.current_url.as_deref()),
                referrer: encode(state.current_referrer.as_deref()),
                screen,
                language,
                name: name.to_string(),
                data,
            };
            (config.event_url(), payload)
        };

        self.send(url, &payload);
    }

    pub fn pageview(&self) {
        self.track(None, None);
    }

    /// Associate later activity with `user_id`. Only the first call after
    /// init (or after [`Tracker::reset`]) is sent.
    pub fn identify(&self, user_id: &str, data: Option<IdentityData>) {
        if self.inner.browser.is_none() {
            return;
        }

        let url = {
            let state = self.inner.state.lock();
            match state.config.as_ref() {
                Some(config) if config.tracking_enabled => config.identify_url(),
                _ => return,
            }
        };

        if self.inner.identified.swap(true, Ordering::SeqCst) {
            debug!(user_id, "user already identified");
            return;
        }

        self.send(
            url,
            &IdentityPayload {
                user_id: user_id.to_string(),
                data,
            },
        );
    }

    /// Forget the identified user so `identify` can send again.
    pub fn reset(&self) {
        self.inner.identified.store(false, Ordering::SeqCst);
    }

    /// Open or close the tracking gate. Ignored before init.
    pub fn set_tracking_enabled(&self, enabled: bool) {
        let mut state = self.inner.state.lock();
        if let Some(config) = state.config.as_mut() {
            config.tracking_enabled = enabled;
            info!(tracking_enabled = enabled, "tracking gate updated");
        }
    }

    /// Record a client-side navigation to `url`. Returns true when the
    /// normalized URL changed and a pageview was scheduled.
    ///
    /// Installed history hooks call this; hosts that observe navigation some
    /// other way can call it directly.
    pub fn handle_navigation(&self, url: Option<&str>) -> bool {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return false;
        };

        let changed = {
            let mut state = self.inner.state.lock();
            let Some(config) = state.config.as_ref() else {
                return false;
            };
            let next = parse_url(url, config.exclude_query);
            let previous = state.current_url.take();
            let changed = previous.as_deref() != Some(next.as_str());
            state.current_referrer = previous;
            state.current_url = Some(next);
            changed
        };

        if changed {
            self.schedule_pageview();
        }
        changed
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.state.lock().config.is_some()
    }

    pub fn tracking_enabled(&self) -> bool {
        self.inner
            .state
            .lock()
            .config
            .as_ref()
            .is_some_and(|c| c.tracking_enabled)
    }

    pub fn is_identified(&self) -> bool {
        self.inner.identified.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Option<TrackerConfig> {
        self.inner.state.lock().config.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.inner.state.lock().current_url.clone()
    }

    pub fn current_referrer(&self) -> Option<String> {
        self.inner.state.lock().current_referrer.clone()
    }

    fn start_auto_track(&self, browser: &dyn BrowserContext) {
        let tracker: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        let listener: NavigationListener =
            Arc::new(move |method: HistoryMethod, url: Option<&str>| {
                if let Some(inner) = tracker.upgrade() {
                    debug!(method = method.as_str(), url, "history navigation");
                    Tracker { inner }.handle_navigation(url);
                }
            });
        browser.install_history_hooks(listener);
    }

    fn schedule_pageview(&self) {
        match Handle::try_current() {
            Ok(handle) => {
                let tracker = self.clone();
                handle.spawn(async move {
                    tokio::time::sleep(PAGEVIEW_DELAY).await;
                    tracker.pageview();
                });
            }
            Err(_) => {
                let err = TrackerError::NoRuntime("deferred pageview".to_string());
                warn!(error = %err, "pageview dropped");
            }
        }
    }

    fn send<T: Serialize>(&self, url: String, payload: &T) {
        match beacon(url, payload) {
            Ok(request) => {
                debug!(url = %request.url, "dispatching beacon");
                self.inner.transport.dispatch(request);
            }
            Err(e) => warn!(error = %e, "failed to serialize beacon"),
        }
    }
}

fn beacon<T: Serialize>(url: String, payload: &T) -> TrackerResult<BeaconRequest> {
    Ok(BeaconRequest {
        url,
        body: serde_json::to_value(payload)?,
    })
}
