//! Toolbird web SDK: a client-side analytics beacon. Records pageviews and
//! custom events with page context (URL, referrer, screen, locale), posts
//! them to a collection endpoint, and follows client-side navigation.
//!
//! # Modules
//!
//! - [`tracker`]: The [`Tracker`] handle: init, track, identify, gate
//! - [`normalize`]: URL reduction and URI encoding for payload fields
//! - [`browser`]: Page globals behind [`BrowserContext`], plus an in-process page model
//! - [`navigation`]: History hooks for single-page-application routing
//! - [`transport`]: Fire-and-forget beacon delivery

pub mod browser;
pub mod navigation;
pub mod normalize;
pub mod tracker;
pub mod transport;

pub use browser::{BrowserContext, ScreenSize, SimulatedBrowser};
pub use navigation::{hook_history, HistoryMethod, NavigationListener};
pub use tracker::{Tracker, PAGEVIEW_DELAY};
pub use transport::{BeaconRequest, CaptureTransport, HttpTransport, Transport};

pub use toolbird_core::{
    EventData, EventValue, IdentityData, TrackerConfig, TrackerError, TrackerOptions,
};
