//! Browser context: the page globals the tracker reads (location, referrer,
//! screen, locale) and the history functions it wraps.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use url::Url;

use crate::navigation::{hook_history, HistoryMethod, NavigationListener};

/// Physical screen dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

impl ScreenSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl fmt::Display for ScreenSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Everything the tracker needs from the hosting page.
pub trait BrowserContext: Send + Sync {
    /// `location.hostname`
    fn hostname(&self) -> String;

    /// `location.href`
    fn href(&self) -> String;

    /// `document.referrer`, empty when there is none.
    fn referrer(&self) -> String;

    fn screen(&self) -> ScreenSize;

    /// `navigator.language`
    fn language(&self) -> String;

    /// Whether the page already carries a global tracker handle, e.g. from a
    /// duplicate script include.
    fn has_global_tracker(&self) -> bool {
        false
    }

    /// Route every `pushState`/`replaceState` call through `listener` before
    /// the page's own implementation runs.
    fn install_history_hooks(&self, listener: NavigationListener);
}

type HistoryFn = Arc<dyn Fn(Option<&str>) + Send + Sync>;

#[derive(Debug)]
struct PageState {
    href: String,
    referrer: String,
    entries: Vec<String>,
}

/// In-process page model: a location, a referrer and a history stack whose
/// `push_state`/`replace_state` can be hooked like the real ones.
pub struct SimulatedBrowser {
    page: Arc<Mutex<PageState>>,
    screen: ScreenSize,
    language: String,
    global_tracker: bool,
    push_state: Mutex<HistoryFn>,
    replace_state: Mutex<HistoryFn>,
    hooks_installed: Mutex<usize>,
}

impl SimulatedBrowser {
    pub fn new(href: impl Into<String>) -> Self {
        let href = href.into();
        let page = Arc::new(Mutex::new(PageState {
            href: href.clone(),
            referrer: String::new(),
            entries: vec![href],
        }));

        Self {
            push_state: Mutex::new(native_history(page.clone(), HistoryMethod::PushState)),
            replace_state: Mutex::new(native_history(page.clone(), HistoryMethod::ReplaceState)),
            page,
            screen: ScreenSize::new(1920, 1080),
            language: "en-US".to_string(),
            global_tracker: false,
            hooks_installed: Mutex::new(0),
        }
    }

    pub fn with_referrer(self, referrer: impl Into<String>) -> Self {
        self.page.lock().referrer = referrer.into();
        self
    }

    pub fn with_screen(mut self, width: u32, height: u32) -> Self {
        self.screen = ScreenSize::new(width, height);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_global_tracker(mut self, present: bool) -> Self {
        self.global_tracker = present;
        self
    }

    /// `history.pushState(state, "", url)`
    pub fn push_state(&self, url: Option<&str>) {
        let f = self.push_state.lock().clone();
        f(url);
    }

    /// `history.replaceState(state, "", url)`
    pub fn replace_state(&self, url: Option<&str>) {
        let f = self.replace_state.lock().clone();
        f(url);
    }

    /// History entries, oldest first.
    pub fn history(&self) -> Vec<String> {
        self.page.lock().entries.clone()
    }

    /// How many times history hooks have been installed.
    pub fn hooks_installed(&self) -> usize {
        *self.hooks_installed.lock()
    }
}

/// The page's own history behaviour: resolve the URL against the current
/// location, then push or replace the entry.
fn native_history(page: Arc<Mutex<PageState>>, method: HistoryMethod) -> HistoryFn {
    Arc::new(move |url: Option<&str>| {
        let mut page = page.lock();
        let Some(url) = url else {
            return;
        };
        let target = Url::parse(&page.href)
            .and_then(|base| base.join(url))
            .map(String::from)
            .unwrap_or_else(|_| url.to_string());

        match method {
            HistoryMethod::PushState => page.entries.push(target.clone()),
            HistoryMethod::ReplaceState => {
                if let Some(last) = page.entries.last_mut() {
                    *last = target.clone();
                }
            }
        }
        page.href = target;
    })
}

impl BrowserContext for SimulatedBrowser {
    fn hostname(&self) -> String {
        Url::parse(&self.page.lock().href)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default()
    }

    fn href(&self) -> String {
        self.page.lock().href.clone()
    }

    fn referrer(&self) -> String {
        self.page.lock().referrer.clone()
    }

    fn screen(&self) -> ScreenSize {
        self.screen
    }

    fn language(&self) -> String {
        self.language.clone()
    }

    fn has_global_tracker(&self) -> bool {
        self.global_tracker
    }

    fn install_history_hooks(&self, listener: NavigationListener) {
        for (method, slot) in [
            (HistoryMethod::PushState, &self.push_state),
            (HistoryMethod::ReplaceState, &self.replace_state),
        ] {
            let mut current = slot.lock();
            let original = current.clone();
            let hooked = hook_history(method, move |url| original(url), listener.clone());
            *current = Arc::new(hooked);
        }
        *self.hooks_installed.lock() += 1;
        debug!("history hooks installed");
    }
}
