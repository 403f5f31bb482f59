use grotto_agent::batcher::{collect_reports, DeliveryReport};
use grotto_agent::config::AgentConfig;
use grotto_agent::context::AgentContext;
use grotto_agent::pipeline;
use grotto_agent::sender::{LibratoSender, MetricSink};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer, stat_path: &Path) -> AgentContext {
    let raw = serde_json::json!({
        "Librato": {
            "Email": "ops@example.com",
            "Token": "s3cret",
            "Url": format!("{}/v1/metrics", server.uri()),
            "PeriodSeconds": 1,
            "TimeoutSeconds": 2
        },
        "Cpu": {
            "PeriodSeconds": 1,
            "StatPath": stat_path.to_string_lossy()
        }
    });
    let config = AgentConfig::from_json(&raw.to_string()).unwrap();
    AgentContext::new(config, "test-host")
}

async fn run_two_samples(
    ctx: &AgentContext,
    stat_path: &Path,
) -> mpsc::UnboundedReceiver<DeliveryReport> {
    let sink: Arc<dyn MetricSink> = Arc::new(LibratoSender::from_config(&ctx.config).unwrap());
    let (report_tx, report_rx) = mpsc::unbounded_channel();
    let shutdown = CancellationToken::new();
    let running = pipeline::start(ctx, sink, Some(report_tx), shutdown.clone());

    // First sample establishes the baseline; advance the counters before the second.
    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::write(stat_path, "cpu 200 20 80 500 0 0 0 0 0 0\ncpu0 60 0 0 60\n").unwrap();
    tokio::time::sleep(Duration::from_millis(2500)).await;

    shutdown.cancel();
    running.join().await;
    report_rx
}

#[tokio::test]
async fn samples_are_batched_and_posted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let stat_path = dir.path().join("stat");
    std::fs::write(&stat_path, "cpu 100 10 50 300 0 0 0 0 0 0\ncpu0 50 0 0 50\nintr 1 2 3\n")
        .unwrap();

    let ctx = context(&server, &stat_path);
    let reports = run_two_samples(&ctx, &stat_path).await;

    let mut gauges = Vec::new();
    for request in server.received_requests().await.unwrap() {
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        gauges.extend(body["gauges"].as_array().unwrap().iter().cloned());
    }

    let names: BTreeSet<&str> = gauges.iter().filter_map(|g| g["name"].as_str()).collect();
    let expected: BTreeSet<&str> = [
        "cpu-user",
        "cpu-nice",
        "cpu-system",
        "cpu-idle",
        "cpu-usage",
        "cpu0-user",
        "cpu0-nice",
        "cpu0-system",
        "cpu0-idle",
        "cpu0-usage",
    ]
    .into_iter()
    .collect();
    assert_eq!(names, expected);
    assert_eq!(gauges.len(), 10);
    assert!(gauges.iter().all(|g| g["source"] == "test-host"));

    let user = gauges.iter().find(|g| g["name"] == "cpu-user").unwrap();
    assert!((user["value"].as_f64().unwrap() - 100.0 / 340.0).abs() < 1e-9);

    let tally = collect_reports(reports).await;
    assert_eq!(tally.failed_payloads, 0);
    assert_eq!(tally.delivered_metrics, 10);
}

#[tokio::test]
async fn failing_delivery_does_not_stall_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let stat_path = dir.path().join("stat");
    std::fs::write(&stat_path, "cpu 100 10 50 300 0 0 0 0 0 0\ncpu0 50 0 0 50\n").unwrap();

    let ctx = context(&server, &stat_path);
    let reports = run_two_samples(&ctx, &stat_path).await;

    let tally = collect_reports(reports).await;
    assert_eq!(tally.delivered_payloads, 0);
    // One flush per elapsed window, each attempted despite earlier failures.
    assert!(tally.failed_payloads >= 2, "tally: {tally:?}");
    assert_eq!(tally.dropped_metrics, 10);
    assert!(server.received_requests().await.unwrap().len() as u64 >= tally.failed_payloads);
}
