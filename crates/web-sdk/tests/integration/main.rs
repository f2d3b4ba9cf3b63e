//! End-to-end tracker flows against a simulated page, with beacons captured
//! in memory or by a local HTTP collector.

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use toolbird_web_sdk::{
        CaptureTransport, EventData, HttpTransport, IdentityData, SimulatedBrowser, Tracker,
        TrackerOptions, PAGEVIEW_DELAY,
    };

    fn storefront() -> Arc<SimulatedBrowser> {
        Arc::new(
            SimulatedBrowser::new("https://shop.example.com/?utm_source=newsletter")
                .with_referrer("https://mail.example.net/inbox")
                .with_screen(1440, 900)
                .with_language("fr-FR"),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_session() {
        let browser = storefront();
        let transport = Arc::new(CaptureTransport::new());
        let tracker = Tracker::new(browser.clone(), transport.clone());

        tracker.init(
            &TrackerOptions::new()
                .with_host("https://collect.example.com/v1")
                .with_domains(["shop.example.com", "www.example.com"])
                .with_exclude_query(true),
        );

        // Router navigates twice quickly, then settles.
        browser.push_state(Some("/catalog/shoes?sort=price"));
        browser.push_state(Some("/catalog/shoes?sort=rating"));
        tokio::time::sleep(PAGEVIEW_DELAY * 2).await;

        browser.push_state(Some("/catalog/shoes/trail runner"));
        tokio::time::sleep(PAGEVIEW_DELAY * 2).await;

        let mut data = EventData::new();
        data.insert("sku".into(), "TR-42".into());
        data.insert("price".into(), 129.5.into());
        data.insert(
            "added_at".into(),
            Utc.with_ymd_and_hms(2024, 3, 9, 8, 0, 0).unwrap().into(),
        );
        tracker.track(Some("add_to_cart"), Some(data));

        tracker.identify(
            "cust-881",
            Some(
                IdentityData::new()
                    .with_email("claire@example.fr")
                    .with_name("Claire")
                    .with_avatar("https://cdn.example.com/a/881.png"),
            ),
        );
        tracker.identify("cust-882", None);

        let requests = transport.requests();
        let urls: Vec<_> = requests
            .iter()
            .map(|r| r.body["url"].as_str().unwrap_or_default().to_string())
            .collect();

        assert_eq!(transport.count_path("/event"), 4);
        assert_eq!(transport.count_path("/identify"), 1);
        assert_eq!(
            urls[..4],
            [
                "/".to_string(),
                "/catalog/shoes".to_string(),
                "/catalog/shoes/trail%20runner".to_string(),
                "/catalog/shoes/trail%20runner".to_string(),
            ]
        );

        let initial = &requests[0].body;
        assert_eq!(initial["referrer"], "https://mail.example.net/inbox");
        assert_eq!(initial["screen"], "1440x900");
        assert_eq!(initial["language"], "fr-FR");

        let cart = &requests[3].body;
        assert_eq!(cart["name"], "add_to_cart");
        assert_eq!(cart["referrer"], "/catalog/shoes");
        assert_eq!(cart["data"]["price"], 129.5);
        assert_eq!(cart["data"]["added_at"], "2024-03-09T08:00:00Z");

        let identity = &requests[4];
        assert_eq!(identity.url, "https://collect.example.com/v1/identify");
        assert_eq!(identity.body["userId"], "cust-881");
        assert_eq!(identity.body["data"]["avatar"], "https://cdn.example.com/a/881.png");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_gate_suppresses_navigation_pageviews() {
        let browser = storefront();
        let transport = Arc::new(CaptureTransport::new());
        let tracker = Tracker::new(browser.clone(), transport.clone());

        tracker.init(&TrackerOptions::new().with_domain("shop.example.com"));
        tracker.set_tracking_enabled(false);

        browser.push_state(Some("/checkout"));
        tokio::time::sleep(PAGEVIEW_DELAY * 2).await;

        assert_eq!(transport.count(), 1);
        assert_eq!(tracker.current_url().as_deref(), Some("/checkout"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trackers_on_one_page_keep_separate_state() {
        let browser = storefront();
        let first = Arc::new(CaptureTransport::new());
        let second = Arc::new(CaptureTransport::new());

        let a = Tracker::new(browser.clone(), first.clone());
        let b = Tracker::new(browser.clone(), second.clone());
        a.init(&TrackerOptions::new().with_domain("shop.example.com"));
        b.init(&TrackerOptions::new().with_domain("other.example.com"));

        browser.push_state(Some("/help"));
        tokio::time::sleep(PAGEVIEW_DELAY * 2).await;

        assert_eq!(first.count(), 2);
        assert_eq!(second.count(), 0);
        assert_eq!(b.current_url().as_deref(), Some("/help"));
        assert_eq!(browser.hooks_installed(), 2);
    }

    struct CollectedRequest {
        request_line: String,
        headers: Vec<(String, String)>,
        body: serde_json::Value,
    }

    impl CollectedRequest {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }
    }

    /// Bare HTTP/1.1 collector on a loopback port. Every request is forwarded
    /// to the returned channel and answered with `204 No Content`.
    async fn spawn_collector() -> (SocketAddr, mpsc::UnboundedReceiver<CollectedRequest>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let tx = tx.clone();
                tokio::spawn(async move {
                    let (read, mut write) = stream.into_split();
                    let mut reader = BufReader::new(read);
                    // Keep-alive: several requests may share a connection.
                    while let Some(request) = read_request(&mut reader).await {
                        if tx.send(request).is_err() {
                            return;
                        }
                        let response = b"HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n";
                        if write.write_all(response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (addr, rx)
    }

    async fn read_request<R: AsyncBufRead + Unpin>(reader: &mut R) -> Option<CollectedRequest> {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await.ok()? == 0 {
            return None;
        }

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await.ok()?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':')?;
            headers.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }

        let length = headers
            .iter()
            .find(|(n, _)| n == "content-length")
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0; length];
        reader.read_exact(&mut body).await.ok()?;

        Some(CollectedRequest {
            request_line: request_line.trim_end().to_string(),
            headers,
            body: serde_json::from_slice(&body).ok()?,
        })
    }

    #[tokio::test]
    async fn test_http_transport_posts_json_to_collector() {
        let (addr, mut collected) = spawn_collector().await;
        let browser = Arc::new(SimulatedBrowser::new("https://example.com/a%20b?x=1"));
        let transport = Arc::new(HttpTransport::new().unwrap());
        let tracker = Tracker::new(browser, transport.clone());

        // Trailing slash on the host must not double up in the path.
        tracker.init(
            &TrackerOptions::new()
                .with_host(format!("http://{addr}/v1/"))
                .with_domain("example.com"),
        );
        tracker.identify("u-7", Some(IdentityData::new().with_email("dev@example.com")));
        transport.drain().await;
        assert_eq!(transport.in_flight(), 0);

        let mut requests = vec![
            collected.recv().await.unwrap(),
            collected.recv().await.unwrap(),
        ];
        requests.sort_by(|a, b| a.request_line.cmp(&b.request_line));

        let event = &requests[0];
        assert_eq!(event.request_line, "POST /v1/event HTTP/1.1");
        assert_eq!(event.header("content-type"), Some("application/json"));
        assert_eq!(
            event.body,
            json!({
                "url": "/a b?x=1",
                "screen": "1920x1080",
                "language": "en-US",
                "name": "pageview",
            })
        );

        let identity = &requests[1];
        assert_eq!(identity.request_line, "POST /v1/identify HTTP/1.1");
        assert_eq!(identity.header("content-type"), Some("application/json"));
        assert_eq!(
            identity.body,
            json!({
                "userId": "u-7",
                "data": { "email": "dev@example.com" },
            })
        );
    }
}
