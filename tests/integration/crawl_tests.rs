//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the advisor portal and run the
//! full listing -> detail -> validation -> export cycle end-to-end.

use bafa_harvest::config::{Config, RetryConfig};
use bafa_harvest::crawler::{run_harvest, Coordinator};
use bafa_harvest::output::read_export;
use bafa_harvest::{FetchError, HarvestError};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::tempdir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const LISTING_PATH: &str = "/bafa-portal/audit-suche/showErgebnis";
const DETAIL_PATH: &str = "/bafa-portal/audit-suche/detail";

/// Creates a fast test configuration pointing at the mock portal
fn create_test_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::default();
    config.source.base_url = server.uri();
    config.crawler.request_delay_ms = 0;
    config.crawler.request_timeout_secs = 5;
    config.crawler.max_concurrent_requests = 4;
    config.retry = RetryConfig {
        max_attempts: 3,
        backoff_floor_ms: 1,
        backoff_ceiling_ms: 5,
    };
    config.output.output_dir = dir.join("output");
    config.output.log_dir = dir.join("logs");
    config
}

/// Renders a listing page; each row is (id, name), with an empty name allowed
fn listing_html(rows: &[(u32, &str)], has_next: bool) -> String {
    let rows: String = rows
        .iter()
        .map(|(id, name)| {
            format!(
                r#"<tr><td>{name}</td><td>Firma {id}</td><td>Ort {id}</td>
                <td><a href="detail?id={id}">Details</a></td></tr>"#
            )
        })
        .collect();
    let next = if has_next {
        r#"<a class="next" href="showErgebnis?page=next">weiter</a>"#
    } else {
        ""
    };

    format!(
        r#"<html><body>
        <table class="ergebnisListe">
            <tr><th>Name</th><th>Firma</th><th>Ort</th><th></th></tr>
            {rows}
        </table>
        {next}
        </body></html>"#
    )
}

fn detail_html(postal_and_city: &str, with_email: bool) -> String {
    let email = if with_email {
        r#"<p>E-Mail: <img src="/bafa-portal/m2i?nr=4711"></p>"#
    } else {
        ""
    };
    format!(
        r#"<html><body><div class="bereich">
        <p>Berater</p>
        <p>Hauptstraße 1</p>
        <p>{postal_and_city}</p>
        <p>Tel.: 030 1234</p>
        {email}
        </div></body></html>"#
    )
}

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

async fn mount_listing(server: &MockServer, page: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", page.to_string()))
        .respond_with(html(body))
        .mount(server)
        .await;
}

async fn mount_detail(server: &MockServer, id: u32, body: String) {
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .and(query_param("id", id.to_string()))
        .respond_with(html(body))
        .mount(server)
        .await;
}

/// Answers every request after a fixed delay and remembers when each arrived
struct TimedResponder {
    body: String,
    delay: Duration,
    arrivals: Arc<Mutex<Vec<Instant>>>,
}

impl Respond for TimedResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.arrivals.lock().unwrap().push(Instant::now());
        html(self.body.clone()).set_delay(self.delay)
    }
}

/// Any detail request answers with a valid Berlin entry
async fn mount_any_detail(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(html(detail_html("10115 Berlin", false)))
        .mount(server)
        .await;
}

async fn never_requested_listing(server: &MockServer, page: u32) {
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", page.to_string()))
        .respond_with(html(listing_html(&[(99, "Zu Weit")], false)))
        .expect(0)
        .mount(server)
        .await;
}

fn bfee_ids(records: &[bafa_harvest::AdvisorRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.bfee_id.clone().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn test_full_harvest_follows_pagination() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (2, "B"), (3, "C")], true)).await;
    mount_listing(&server, 1, listing_html(&[(4, "D"), (5, "E")], false)).await;
    never_requested_listing(&server, 2).await;

    mount_detail(&server, 1, detail_html("10115 Berlin", true)).await;
    mount_detail(&server, 2, detail_html("10117 Berlin", false)).await;
    mount_detail(&server, 3, detail_html("50667 Köln", true)).await;
    mount_detail(&server, 4, detail_html("20095 Hamburg", false)).await;
    mount_detail(&server, 5, detail_html("50668 Köln", false)).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["1", "2", "3", "4", "5"]);
    assert_eq!(outcome.report.candidates, 5);
    assert_eq!(outcome.report.accepted, 5);
    assert_eq!(outcome.report.distinct_cities, 3);
    assert_eq!(outcome.report.with_email, 2);
    assert!(outcome.report.is_complete());
    assert!(outcome.error_log.is_none());

    let first = &outcome.records[0];
    assert_eq!(first.name, "A");
    assert_eq!(first.company.as_deref(), Some("Firma 1"));
    assert_eq!(first.street.as_deref(), Some("Hauptstraße 1"));
    assert_eq!(first.postal_code.as_deref(), Some("10115"));
    assert_eq!(first.city.as_deref(), Some("Berlin"));
    assert_eq!(first.phone.as_deref(), Some("030 1234"));
    assert!(first.email_present);
    assert_eq!(first.email_image_id.as_deref(), Some("4711"));
    assert_eq!(
        first.detail_url,
        format!("{}{}?id=1", server.uri(), DETAIL_PATH)
    );
}

#[tokio::test]
async fn test_export_matches_accepted_records() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (2, "B")], false)).await;
    mount_detail(&server, 1, detail_html("10115 Berlin", true)).await;
    mount_detail(&server, 2, detail_html("80331 München", false)).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert!(outcome.export_path.starts_with(dir.path().join("output")));
    let file_name = outcome.export_path.file_name().unwrap().to_string_lossy();
    assert!(file_name.starts_with("bafa_advisors_full_"));
    assert!(file_name.ends_with(".csv"));

    let exported = read_export(&outcome.export_path).unwrap();
    assert_eq!(exported, outcome.records);
    assert!(outcome.workbook_path.exists());
    assert_eq!(
        outcome.workbook_path.file_stem(),
        outcome.export_path.file_stem()
    );
}

#[tokio::test]
async fn test_mode_stops_at_entry_limit() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    let rows: Vec<(u32, &str)> = (1..=7).map(|id| (id, "Berater")).collect();
    mount_listing(&server, 0, listing_html(&rows, true)).await;
    never_requested_listing(&server, 1).await;

    for id in 1..=5 {
        mount_detail(&server, id, detail_html("10115 Berlin", false)).await;
    }
    for id in 6..=7 {
        Mock::given(method("GET"))
            .and(path(DETAIL_PATH))
            .and(query_param("id", id.to_string()))
            .respond_with(html(detail_html("10115 Berlin", false)))
            .expect(0)
            .mount(&server)
            .await;
    }

    let mut config = create_test_config(&server, dir.path());
    config.crawler.test_mode = true;

    let outcome = run_harvest(config).await.unwrap();

    assert_eq!(outcome.records.len(), 5);
    assert_eq!(outcome.report.accepted, 5);
    assert_eq!(outcome.report.candidates, 5);
    assert!(outcome.report.is_complete());
    assert!(outcome
        .export_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("bafa_advisors_test_"));
}

#[tokio::test]
async fn test_mode_keeps_going_past_rejections() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(
        &server,
        0,
        listing_html(&[(1, "A"), (2, ""), (3, "C"), (4, " ")], true),
    )
    .await;
    mount_listing(
        &server,
        1,
        listing_html(&[(5, "E"), (6, "F"), (7, "G"), (8, "H")], true),
    )
    .await;
    never_requested_listing(&server, 2).await;
    mount_any_detail(&server).await;

    let mut config = create_test_config(&server, dir.path());
    config.crawler.test_mode = true;

    let outcome = run_harvest(config).await.unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["1", "3", "5", "6", "7"]);
    assert_eq!(outcome.report.accepted, 5);
    assert_eq!(outcome.report.rejected, 2);
    assert_eq!(
        outcome.report.rejection_reasons.get("missing required field"),
        Some(&2)
    );
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_transient_detail_errors_are_retried() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A")], false)).await;

    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(html(detail_html("10115 Berlin", false)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.report.accepted, 1);
    assert_eq!(outcome.report.failed, 0);
    assert!(outcome.error_log.is_none());
}

#[tokio::test]
async fn test_exhausted_detail_is_counted_as_failure() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (2, "B")], false)).await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .and(query_param("id", "1"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    mount_detail(&server, 2, detail_html("10115 Berlin", false)).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["2"]);
    assert_eq!(outcome.report.failed, 1);
    assert_eq!(outcome.report.accepted, 1);
    assert!(outcome.report.is_complete());

    let error_log = outcome.error_log.expect("error log written");
    let text = std::fs::read_to_string(error_log).unwrap();
    assert!(text.contains("id=1"));
}

#[tokio::test]
async fn test_missing_detail_page_is_not_retried() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A")], false)).await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.report.failed, 1);
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_records_keep_listing_order_under_concurrency() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(
        &server,
        0,
        listing_html(&[(1, "A"), (2, "B"), (3, "C"), (4, "D")], false),
    )
    .await;
    for (id, delay_ms) in [(1, 300), (2, 200), (3, 100), (4, 0)] {
        Mock::given(method("GET"))
            .and(path(DETAIL_PATH))
            .and(query_param("id", id.to_string()))
            .respond_with(
                html(detail_html("10115 Berlin", false))
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
    }

    let records = Coordinator::new(create_test_config(&server, dir.path()))
        .unwrap()
        .crawl()
        .await
        .unwrap();

    assert_eq!(bfee_ids(&records), vec!["1", "2", "3", "4"]);
}

#[tokio::test]
async fn test_duplicate_detail_url_is_rejected() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (1, "A again")], false)).await;
    mount_any_detail(&server).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].name, "A");
    assert_eq!(
        outcome.report.rejection_reasons.get("duplicate detail URL"),
        Some(&1)
    );
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_empty_page_marker_ends_pagination() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A")], true)).await;
    mount_listing(
        &server,
        1,
        r#"<html><body><div class="keineErgebnisse">Keine Ergebnisse gefunden</div></body></html>"#
            .to_string(),
    )
    .await;
    never_requested_listing(&server, 2).await;
    mount_any_detail(&server).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.report.page_failures, 0);
}

#[tokio::test]
async fn test_failed_later_page_keeps_collected_records() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (2, "B")], true)).await;
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;
    never_requested_listing(&server, 2).await;
    mount_any_detail(&server).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert_eq!(outcome.report.page_failures, 1);
    assert!(outcome.error_log.is_some());
    assert_eq!(read_export(&outcome.export_path).unwrap().len(), 2);
}

#[tokio::test]
async fn test_unrecognized_first_page_aborts_run() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(
        &server,
        0,
        "<html><body><h1>Wartungsarbeiten</h1></body></html>".to_string(),
    )
    .await;

    let config = create_test_config(&server, dir.path());
    let output_dir = config.output.output_dir.clone();

    let result = run_harvest(config).await;

    match result {
        Err(HarvestError::FirstPage { source, .. }) => {
            assert!(matches!(*source, HarvestError::Extract(_)))
        }
        other => panic!("expected first page failure, got {:?}", other.map(|o| o.records)),
    }
    assert!(!output_dir.exists());
}

#[tokio::test]
async fn test_unreachable_first_page_aborts_run() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let result = run_harvest(create_test_config(&server, dir.path())).await;

    match result {
        Err(HarvestError::FirstPage { source, .. }) => assert!(matches!(
            *source,
            HarvestError::Fetch(FetchError::Status { status: 403, .. })
        )),
        other => panic!("expected first page failure, got {:?}", other.map(|o| o.records)),
    }
}

#[tokio::test]
async fn test_start_page_is_respected() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    never_requested_listing(&server, 0).await;
    mount_listing(&server, 3, listing_html(&[(30, "Drei")], false)).await;
    mount_any_detail(&server).await;

    let mut config = create_test_config(&server, dir.path());
    config.crawler.start_page = 3;

    let outcome = run_harvest(config).await.unwrap();
    assert_eq!(bfee_ids(&outcome.records), vec!["30"]);
}

#[tokio::test]
async fn test_concurrent_detail_fetches_stay_within_bound() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let delay = Duration::from_millis(300);
    let arrivals = Arc::new(Mutex::new(Vec::new()));

    let rows: Vec<(u32, &str)> = (1..=6).map(|id| (id, "Berater")).collect();
    mount_listing(&server, 0, listing_html(&rows, false)).await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .respond_with(TimedResponder {
            body: detail_html("10115 Berlin", false),
            delay,
            arrivals: Arc::clone(&arrivals),
        })
        .expect(6)
        .mount(&server)
        .await;

    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_concurrent_requests = 2;

    let started = Instant::now();
    let outcome = run_harvest(config).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.report.accepted, 6);
    // Three rounds of two fetches each
    assert!(elapsed >= delay * 3, "finished after {:?}", elapsed);

    // No request may start while two others are still being answered
    let arrivals = arrivals.lock().unwrap().clone();
    for (i, arrival) in arrivals.iter().enumerate() {
        let in_flight = arrivals[..i]
            .iter()
            .filter(|earlier| arrival.duration_since(**earlier) < delay)
            .count();
        assert!(in_flight < 2, "request {} overlapped {} others", i, in_flight);
    }
}

#[tokio::test]
async fn test_detail_page_without_contact_block_is_a_failure() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A"), (2, "B")], false)).await;
    Mock::given(method("GET"))
        .and(path(DETAIL_PATH))
        .and(query_param("id", "1"))
        .respond_with(html(
            "<html><body><h1>Sitzung abgelaufen</h1></body></html>".to_string(),
        ))
        .expect(1)
        .mount(&server)
        .await;
    mount_detail(&server, 2, detail_html("10115 Berlin", false)).await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["2"]);
    assert_eq!(outcome.report.failed, 1);
    assert_eq!(outcome.report.rejected, 0);
    assert!(outcome.report.is_complete());
    assert!(outcome.error_log.is_some());
}

#[tokio::test]
async fn test_listing_postal_code_kept_when_detail_has_no_address() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(
        &server,
        0,
        r#"<html><body><table class="ergebnisListe">
            <tr><td>Anna Alt</td><td>Alt Energie</td><td>10115 Berlin</td>
                <td><a href="detail?id=1">Details</a></td></tr>
        </table></body></html>"#
            .to_string(),
    )
    .await;
    mount_detail(
        &server,
        1,
        r#"<html><body><div class="bereich"><p>Anna Alt</p><p>Tel.: 030 1234</p></div></body></html>"#
            .to_string(),
    )
    .await;

    let outcome = run_harvest(create_test_config(&server, dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].postal_code.as_deref(), Some("10115"));
    assert_eq!(outcome.records[0].city.as_deref(), Some("Berlin"));
    assert_eq!(outcome.records[0].phone.as_deref(), Some("030 1234"));
}

#[tokio::test]
async fn test_unrelated_weiter_link_does_not_paginate() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(html(format!(
            "{}<a href=\"/bafa-portal/info\">Weitere Informationen</a>",
            listing_html(&[(1, "A")], false)
        )))
        .expect(1)
        .mount(&server)
        .await;
    mount_any_detail(&server).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        run_harvest(create_test_config(&server, dir.path())),
    )
    .await
    .expect("harvest terminates")
    .unwrap();

    assert_eq!(outcome.records.len(), 1);
}

#[tokio::test]
async fn test_portal_ignoring_page_parameter_stops_after_repeat() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    // Every page index answers with the same first page and a next link
    Mock::given(method("GET"))
        .and(path(LISTING_PATH))
        .respond_with(html(listing_html(&[(1, "A"), (2, "B")], true)))
        .expect(2)
        .mount(&server)
        .await;
    mount_any_detail(&server).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        run_harvest(create_test_config(&server, dir.path())),
    )
    .await
    .expect("harvest terminates")
    .unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["1", "2"]);
    assert_eq!(outcome.report.candidates, 2);
    assert_eq!(outcome.report.rejected, 0);
    assert!(outcome.report.is_complete());
}

#[tokio::test]
async fn test_page_ceiling_limits_listing_requests() {
    let server = MockServer::start().await;
    let dir = tempdir().unwrap();

    mount_listing(&server, 0, listing_html(&[(1, "A")], true)).await;
    mount_listing(&server, 1, listing_html(&[(2, "B")], true)).await;
    never_requested_listing(&server, 2).await;
    mount_any_detail(&server).await;

    let mut config = create_test_config(&server, dir.path());
    config.crawler.max_pages = 2;

    let outcome = run_harvest(config).await.unwrap();

    assert_eq!(bfee_ids(&outcome.records), vec!["1", "2"]);
    assert_eq!(outcome.report.page_failures, 0);
}
