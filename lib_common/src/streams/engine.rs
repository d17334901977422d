//! # Polling Engine
//!
//! Drives any `Stream` through the request, paginate, throttle and bookmark
//! cycle. The engine knows nothing about payload shapes; it only reacts to
//! status codes and to what the stream tells it about each page.
//!
//! ## Workflow:
//! 1.  **Build Request**: asks the stream for the query of the next page, using
//!     the latest data page as cursor source.
//! 2.  **Execute**: issues a GET with `limit_count` and the stream's parameters.
//! 3.  **Branch on Status**:
//!     -   `429`: sleeps the throttle interval and re-sends the same request.
//!         There is no retry cap.
//!     -   `204` / `400`: ends the loop without an error.
//!     -   Anything else is a data page.
//! 4.  **Process Page**: sleeps the throttle interval, then enriches, transforms,
//!     filters and emits each record. The watermark observes every record's
//!     bookmark, including records that were filtered out.
//! 5.  **Continue** while the stream reports more data.
//!
//! Transport errors are not retried; they abort `sync`.

use std::io::Write;
use std::time::Duration;

use crate::errors::TapError;
use crate::retrieve::{ApiClient, ApiResponse, RetrieveError};
use crate::singer::metrics::{Counter, Timer};
use crate::singer::{transform_record, Message, MessageWriter, StreamMetadata};
use crate::utils::datetime::now_extracted;

use super::bookmark::{record_bookmark, SeenIds, Watermark};
use super::{Page, Stream};

/// Fixed pause after every data page and before every rate-limit retry.
pub const RATE_THROTTLE: Duration = Duration::from_millis(300);

/// Why the polling loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// The stream reported no further pages.
    #[default]
    NoMoreData,
    /// The server answered `204 No Content`.
    NoContent,
    /// The server answered `400 Bad Request`.
    BadRequest,
}

/// Counters of one `sync` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Data pages processed. Rate-limited and terminal responses are not counted.
    pub pages_fetched: u64,
    /// RECORD messages written.
    pub records_emitted: u64,
    /// Records dropped by the bookmark filter.
    pub records_filtered: u64,
    /// `429` responses received.
    pub rate_limit_retries: u64,
    /// How the loop ended.
    pub stop_reason: StopReason,
}

/// Generic pagination loop shared by every stream.
pub struct PollingEngine {
    client: ApiClient,
    throttle: Duration,
}

impl PollingEngine {
    /// An engine using `client` and the default throttle.
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            throttle: RATE_THROTTLE,
        }
    }

    /// Replaces the throttle interval.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// The underlying HTTP client.
    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Pages through `stream`, writing a RECORD for every admitted record.
    ///
    /// `watermark` must already be seeded; its `max` is raised as records are
    /// observed. Nothing is written to state here, the caller persists
    /// `watermark.next_bookmark()` once this returns `Ok`.
    ///
    /// # Errors
    /// Transport failures, records that cannot be coerced to the schema, and
    /// write failures on the output all abort the loop.
    pub async fn sync<S, W>(
        &self,
        stream: &S,
        watermark: &mut Watermark,
        seen: &mut SeenIds,
        metadata: &StreamMetadata,
        writer: &mut MessageWriter<W>,
    ) -> Result<SyncSummary, TapError>
    where
        S: Stream + ?Sized,
        W: Write,
    {
        let stream_id = stream.tap_stream_id();
        let mut summary = SyncSummary::default();
        let mut counter = Counter::record_count(stream.endpoint());
        let mut latest_page: Option<Page> = None;

        loop {
            // --- Phase 1: Build Request ---
            let mut query = vec![("limit_count".to_string(), stream.limit().to_string())];
            query.extend(stream.build_request_params(latest_page.as_ref(), watermark));

            // --- Phase 2: Execute, retrying rate limits ---
            let response = loop {
                let response = self.fetch(stream.endpoint(), &query).await?;
                if response.status != 429 {
                    break response;
                }
                summary.rate_limit_retries += 1;
                log::warn!(
                    "Rate limited on {}, retrying in {:?} (attempt {})",
                    stream.endpoint(),
                    self.throttle,
                    summary.rate_limit_retries
                );
                tokio::time::sleep(self.throttle).await;
            };

            // --- Phase 3: Terminal statuses ---
            match response.status {
                204 => {
                    log::info!("No content returned for {}, stopping", stream_id);
                    summary.stop_reason = StopReason::NoContent;
                    break;
                }
                400 => {
                    log::warn!(
                        "Bad request for {}, stopping: {}",
                        stream_id,
                        response.error_body.as_deref().unwrap_or_default()
                    );
                    summary.stop_reason = StopReason::BadRequest;
                    break;
                }
                status if !response.success => {
                    log::warn!("Unexpected status {} for {}, treating it as a data page", status, stream_id);
                }
                _ => {}
            }

            // --- Phase 4: Process Page ---
            let page = Page::from(response);
            summary.pages_fetched += 1;
            let has_more = stream.has_more_data(&page);
            tokio::time::sleep(self.throttle).await;

            for raw in stream.extract_records(&page) {
                let mut enriched = stream.enrich(raw, seen);

                // An unreadable bookmark is kept verbatim and bypasses coercion.
                let mut unreadable = None;
                let bookmark = match stream.bookmark_field() {
                    Some(field) => match record_bookmark(&enriched, field) {
                        Ok(value) => value,
                        Err(e) => {
                            log::warn!("Ignoring unreadable {} on {} record: {}", field, stream_id, e);
                            unreadable = enriched.remove_entry(field);
                            None
                        }
                    },
                    None => None,
                };

                let mut record = transform_record(enriched, stream.schema(), metadata).map_err(|source| {
                    TapError::Transform {
                        stream: stream_id.to_string(),
                        source,
                    }
                })?;
                if let Some((field, value)) = unreadable {
                    if metadata.is_field_selected(&field) {
                        record.insert(field, value);
                    }
                }

                if watermark.admits(bookmark) {
                    writer.write_message(&Message::Record {
                        stream: stream_id.to_string(),
                        record,
                        time_extracted: Some(now_extracted()),
                    })?;
                    counter.increment();
                } else {
                    summary.records_filtered += 1;
                }

                if let Some(value) = bookmark {
                    watermark.observe(value);
                }
            }

            latest_page = Some(page);

            // --- Phase 5: Continue? ---
            if !has_more {
                summary.stop_reason = StopReason::NoMoreData;
                break;
            }
        }

        summary.records_emitted = counter.finish();
        log::info!(
            "Finished {}: {} pages, {} records emitted, {} filtered, {} rate-limit retries",
            stream_id,
            summary.pages_fetched,
            summary.records_emitted,
            summary.records_filtered,
            summary.rate_limit_retries
        );
        Ok(summary)
    }

    /// One timed GET.
    async fn fetch(&self, endpoint: &str, query: &[(String, String)]) -> Result<ApiResponse, RetrieveError> {
        let url = self
            .client
            .endpoint_url(endpoint)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| endpoint.to_string());
        log::info!("Firing request at {} with params: {:?}", url, query);

        let timer = Timer::http_request(endpoint);
        match self.client.get(endpoint, query).await {
            Ok(response) => {
                timer.finish(Some(response.status));
                Ok(response)
            }
            Err(e) => {
                timer.finish(None);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::singer::catalog::build_metadata;
    use crate::singer::messages::parse_messages;
    use crate::streams::CallsStream;
    use crate::testing;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        engine: PollingEngine,
        stream: CallsStream,
        metadata: StreamMetadata,
    }

    fn harness(server: &MockServer) -> Harness {
        let client = ApiClient::new(&server.uri(), Some("secret-key".into()), "tap-test/1.0", None).unwrap();
        let stream = CallsStream::new().unwrap();
        let metadata = StreamMetadata::from_entries(&build_metadata(
            "calls",
            stream.schema(),
            &stream.key_properties(),
        ));
        Harness {
            engine: PollingEngine::new(client).with_throttle(Duration::ZERO),
            stream,
            metadata,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn call(cdr_id: i64, start_time: &str) -> Value {
        json!({
            "cdr_id": cdr_id,
            "call_id": format!("call-{}", cdr_id),
            "start_time": start_time,
            "user": {"user_id": 7}
        })
    }

    impl Harness {
        async fn run(&self, watermark: &mut Watermark) -> (Result<SyncSummary, TapError>, Vec<Message>) {
            let mut writer = MessageWriter::new(Vec::new());
            let mut seen = SeenIds::new();
            let result = self
                .engine
                .sync(&self.stream, watermark, &mut seen, &self.metadata, &mut writer)
                .await;
            let messages = parse_messages(&writer.into_inner()).unwrap();
            (result, messages)
        }
    }

    fn record_ids(messages: &[Message]) -> Vec<i64> {
        messages
            .iter()
            .filter_map(|m| match m {
                Message::Record { record, .. } => record["cdr_id"].as_i64(),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn single_page_sends_headers_and_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(header("Authorization", "secret-key"))
            .and(header("User-Agent", "tap-test/1.0"))
            .and(query_param("limit_count", "1000"))
            .and(query_param("start_date", "2024-01-01T00:00:00+00:00"))
            .and(query_param_is_missing("last_id_returned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [call(1, "2024-01-02T08:00:00+00:00")],
                "call_list_count": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.records_emitted, 1);
        assert_eq!(summary.stop_reason, StopReason::NoMoreData);
        match &messages[0] {
            Message::Record { stream, record, time_extracted } => {
                assert_eq!(stream, "calls");
                assert_eq!(record["user_id"], json!(7));
                assert_eq!(record["start_time"], json!("2024-01-02T08:00:00.000000Z"));
                assert!(time_extracted.is_some());
            }
            other => panic!("unexpected message {:?}", other),
        }
        assert_eq!(wm.next_bookmark().as_deref(), Some("2024-01-02T08:00:01+00:00"));
    }

    #[tokio::test]
    async fn rate_limit_retries_identical_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param_is_missing("last_id_returned"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param_is_missing("last_id_returned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [call(5, "2024-01-03T00:00:00+00:00")],
                "call_list_count": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.rate_limit_retries, 2);
        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(record_ids(&messages), vec![5]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.url.query() == requests[0].url.query()));
    }

    #[tokio::test]
    async fn cursor_comes_from_last_record_of_previous_page() {
        testing::capture_logs();
        let server = MockServer::builder().start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param_is_missing("last_id_returned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [
                    call(41, "2024-01-02T00:00:00+00:00"),
                    {"cdr_id": "42", "call_id": "call-42", "start_time": "2024-01-03T00:00:00+00:00"}
                ],
                "call_list_count": 1500
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param("last_id_returned", "42"))
            .and(query_param("start_date", "2024-01-01T00:00:00+00:00"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [call(43, "2024-01-04T00:00:00+00:00")],
                "call_list_count": 500
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.pages_fetched, 2);
        assert_eq!(summary.records_emitted, 3);
        assert_eq!(messages.len(), 3);
        assert_eq!(wm.max(), Some(day(4)));

        let fired = testing::lines_containing(&format!("Firing request at {}/calls with params", server.uri()));
        assert_eq!(fired.len(), 2);
        assert!(fired[0].contains(r#"("limit_count", "1000")"#));
        assert!(!fired[0].contains("last_id_returned"));
        assert!(fired[1].contains(r#"("last_id_returned", "42")"#));
    }

    #[tokio::test]
    async fn filter_drops_older_records_and_max_tracks_newest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [
                    call(1, "2024-01-10T00:00:00+00:00"),
                    call(2, "2024-01-05T00:00:00+00:00"),
                    {"cdr_id": 3, "call_id": "call-3", "start_time": null}
                ],
                "call_list_count": 3
            })))
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(10)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(record_ids(&messages), vec![1, 3]);
        assert_eq!(summary.records_filtered, 1);
        assert_eq!(wm.max(), Some(day(10)));

        let mut wm = Watermark::new(Some(day(20)));
        let (result, messages) = h.run(&mut wm).await;
        assert_eq!(result.unwrap().records_filtered, 2);
        assert_eq!(record_ids(&messages), vec![3]);
        assert_eq!(wm.initial(), Some(day(20)));
        assert_eq!(wm.max(), Some(day(20)));

        let mut wm = Watermark::new(Some(day(6)));
        let (result, _) = h.run(&mut wm).await;
        result.unwrap();
        assert_eq!(wm.max(), Some(day(10)));
    }

    #[tokio::test]
    async fn no_content_stops_and_keeps_watermark() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(3)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.stop_reason, StopReason::NoContent);
        assert_eq!(summary.pages_fetched, 0);
        assert!(messages.is_empty());
        assert_eq!(wm.next_bookmark().as_deref(), Some("2024-01-03T00:00:01+00:00"));
    }

    #[tokio::test]
    async fn bad_request_after_a_page_keeps_progress() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param_is_missing("last_id_returned"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [call(9, "2024-01-08T00:00:00+00:00")],
                "call_list_count": 1000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .and(query_param("last_id_returned", "9"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad cursor"))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.stop_reason, StopReason::BadRequest);
        assert_eq!(record_ids(&messages), vec![9]);
        assert_eq!(wm.max(), Some(day(8)));
    }

    #[tokio::test]
    async fn null_call_list_is_an_empty_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": null,
                "call_list_count": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.records_emitted, 0);
        assert!(messages.is_empty());
        assert_eq!(wm.max(), Some(day(1)));
    }

    #[tokio::test]
    async fn server_error_is_a_page_without_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.pages_fetched, 1);
        assert_eq!(summary.stop_reason, StopReason::NoMoreData);
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn transport_error_propagates() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = ApiClient::new(&format!("http://127.0.0.1:{}", port), None, "tap-test/1.0", None).unwrap();
        let engine = PollingEngine::new(client).with_throttle(Duration::ZERO);
        let stream = CallsStream::new().unwrap();
        let mut wm = Watermark::new(Some(day(1)));
        let mut writer = MessageWriter::new(Vec::new());

        let result = engine
            .sync(&stream, &mut wm, &mut SeenIds::new(), &StreamMetadata::default(), &mut writer)
            .await;

        assert!(matches!(result, Err(TapError::Retrieve(RetrieveError::Network(_)))));
        assert!(writer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn unreadable_bookmark_is_kept_and_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [
                    {"cdr_id": 1, "call_id": "a", "start_time": "not-a-date"},
                    call(2, "2024-01-03T00:00:00+00:00"),
                    {"cdr_id": 3, "call_id": "c", "start_time": 12345}
                ],
                "call_list_count": 3
            })))
            .mount(&server)
            .await;

        let h = harness(&server);
        let mut wm = Watermark::new(Some(day(1)));
        let (result, messages) = h.run(&mut wm).await;
        let summary = result.unwrap();

        assert_eq!(summary.records_emitted, 3);
        assert_eq!(record_ids(&messages), vec![1, 2, 3]);
        let start_times: Vec<Value> = messages
            .iter()
            .filter_map(|m| match m {
                Message::Record { record, .. } => Some(record["start_time"].clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            start_times,
            vec![json!("not-a-date"), json!("2024-01-03T00:00:00.000000Z"), json!(12345)]
        );
        assert_eq!(wm.max(), Some(day(3)));
    }

    #[tokio::test]
    async fn default_throttle_spaces_retries_and_pages() {
        assert_eq!(RATE_THROTTLE, Duration::from_millis(300));

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calls"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "call_list": [],
                "call_list_count": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri(), None, "tap-test/1.0", None).unwrap();
        let engine = PollingEngine::new(client);
        let stream = CallsStream::new().unwrap();
        let mut wm = Watermark::new(Some(day(1)));
        let mut writer = MessageWriter::new(Vec::new());

        let started = std::time::Instant::now();
        let summary = engine
            .sync(&stream, &mut wm, &mut SeenIds::new(), &StreamMetadata::default(), &mut writer)
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert_eq!(summary.rate_limit_retries, 2);
        assert_eq!(summary.pages_fetched, 1);
        // Two pauses before the retries and one after the data page.
        assert!(elapsed >= RATE_THROTTLE * 3, "finished in {:?}", elapsed);
    }
}
