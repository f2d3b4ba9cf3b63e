//! History interception for single-page-application navigation.
//!
//! Client-side routers change the visible URL through `pushState` and
//! `replaceState`. [`hook_history`] wraps either one so a listener sees the
//! target URL before the original runs.

use std::sync::Arc;

/// The two history entry points a router calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMethod {
    PushState,
    ReplaceState,
}

impl HistoryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryMethod::PushState => "pushState",
            HistoryMethod::ReplaceState => "replaceState",
        }
    }
}

/// Callback notified with the target URL of each history call.
pub type NavigationListener = Arc<dyn Fn(HistoryMethod, Option<&str>) + Send + Sync>;

/// Compose `listener` in front of `original`. The returned function behaves
/// exactly like `original`, including its return value.
pub fn hook_history<F, R>(
    method: HistoryMethod,
    original: F,
    listener: NavigationListener,
) -> impl Fn(Option<&str>) -> R
where
    F: Fn(Option<&str>) -> R,
{
    move |url: Option<&str>| {
        listener(method, url);
        original(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_listener_runs_before_original() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));

        let listener_log = log.clone();
        let listener: NavigationListener =
            Arc::new(move |method: HistoryMethod, url: Option<&str>| {
                listener_log
                    .lock()
                    .push(format!("{}:{}", method.as_str(), url.unwrap_or("-")));
            });

        let original_log = log.clone();
        let original = move |url: Option<&str>| {
            original_log.lock().push(format!("original:{}", url.unwrap_or("-")));
            url.map(str::len)
        };

        let hooked = hook_history(HistoryMethod::PushState, original, listener);
        assert_eq!(hooked(Some("/about")), Some(6));
        assert_eq!(hooked(None), None);

        assert_eq!(
            *log.lock(),
            vec![
                "pushState:/about".to_string(),
                "original:/about".to_string(),
                "pushState:-".to_string(),
                "original:-".to_string(),
            ]
        );
    }

    #[test]
    fn test_hooks_compose() {
        let calls = Arc::new(Mutex::new(0usize));
        let counter = calls.clone();
        let listener: NavigationListener = Arc::new(move |_: HistoryMethod, _: Option<&str>| {
            *counter.lock() += 1
        });

        let once = hook_history(HistoryMethod::ReplaceState, |_| "done", listener.clone());
        let twice = hook_history(HistoryMethod::ReplaceState, once, listener);

        assert_eq!(twice(Some("/x")), "done");
        assert_eq!(*calls.lock(), 2);
    }
}
