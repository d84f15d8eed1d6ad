mod common;

use clap::Parser;
use common::{success, Reads, RecordingProvider};
use counter_exporter::collector::composite::{ChildCollector, Composite};
use counter_exporter::collector::Collector;
use counter_exporter::collectors;
use counter_exporter::config::Config;
use counter_exporter::encoding::text::encode;
use counter_exporter::error::ConfigError;
use counter_exporter::fixture::{FixtureSource, Unavailable};
use counter_exporter::query::QueryAdapter;
use counter_exporter::registry::{BuildContext, Registry};
use counter_exporter::scrape::Scraper;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn build_a(_: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(Reads::new("a", &["x", "y"])))
}

fn build_b(_: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(Reads::new("b", &["y", "z"])))
}

fn build_slow(_: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(
        Reads::new("slow", &["x"]).slow(Duration::from_millis(500)),
    ))
}

fn build_free(_: &BuildContext<'_>) -> Result<Box<dyn Collector>, ConfigError> {
    Ok(Box::new(Reads::new("free", &[])))
}

fn registry() -> Registry {
    let mut registry = Registry::default();
    registry.register("a", build_a, ["x", "y"]).unwrap();
    registry.register("b", build_b, ["y", "z"]).unwrap();
    registry.register("slow", build_slow, ["x"]).unwrap();
    registry.register("free", build_free, Vec::<String>::new()).unwrap();
    registry
}

fn scraper(enabled: &[&str], provider: Arc<RecordingProvider>) -> Scraper {
    let registry = registry();
    let enabled = registry.resolve_enabled(enabled).unwrap();
    let config = Config::default();
    let query: Arc<dyn QueryAdapter> = Arc::new(Unavailable);
    let ctx = BuildContext {
        config: &config,
        query: &query,
    };
    Scraper::from_registry(&registry, &enabled, &ctx, provider).unwrap()
}

#[tokio::test]
async fn dependency_union_is_fetched_once() {
    let provider = Arc::new(RecordingProvider::new(&["x", "y", "z"]));
    let scraper = scraper(&["a", "b"], provider.clone());

    let report = scraper.scrape(None).await.unwrap();

    let expected: BTreeSet<String> = ["x", "y", "z"].iter().map(|s| s.to_string()).collect();
    assert_eq!(vec![expected], provider.calls());
    assert_eq!(Some(1.0), success(&report, "windows", "a"));
    assert_eq!(Some(1.0), success(&report, "windows", "b"));
}

#[tokio::test]
async fn missing_object_fails_only_its_dependents() {
    let provider = Arc::new(RecordingProvider::new(&["x", "y"]));
    let scraper = scraper(&["a", "b"], provider);

    let report = scraper.scrape(None).await.unwrap();

    assert_eq!(Some(1.0), success(&report, "windows", "a"));
    assert_eq!(Some(0.0), success(&report, "windows", "b"));
    assert_eq!(
        2,
        report
            .samples
            .iter()
            .filter(|s| s.name() == "test_a_value")
            .count()
    );
    assert!(report.samples.iter().all(|s| s.name() != "test_b_value"));
    assert!(report.outcome("b").unwrap().error.is_some());
}

#[tokio::test]
async fn concurrent_scrapes_are_independent() {
    let provider = Arc::new(RecordingProvider::new(&["x", "y", "z"]));
    let scraper = Arc::new(scraper(&["a", "b"], provider.clone()));

    let (first, second) = tokio::join!(scraper.scrape(None), scraper.scrape(None));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(2, provider.calls().len());
    for report in [&first, &second] {
        let values: BTreeSet<u64> = report
            .samples
            .iter()
            .filter(|s| s.name().starts_with("test_"))
            .map(|s| s.value() as u64)
            .collect();
        assert_eq!(1, values.len(), "mixed snapshots in one scrape");
        assert_eq!(8, report.samples.len());
    }
    let value = |r: &counter_exporter::scrape::ScrapeReport| {
        r.samples
            .iter()
            .find(|s| s.name() == "test_a_value")
            .map(|s| s.value())
    };
    assert_ne!(value(&first), value(&second));
}

#[tokio::test]
async fn slow_collector_times_out_alone() {
    let provider = Arc::new(RecordingProvider::new(&["x", "y"]));
    let scraper = scraper(&["a", "slow"], provider);

    let report = scraper
        .scrape(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert_eq!(Some(1.0), success(&report, "windows", "a"));
    assert_eq!(Some(0.0), success(&report, "windows", "slow"));
    assert!(report
        .outcome("slow")
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn slow_fetch_fails_dependents_only() {
    let provider = Arc::new(RecordingProvider::new(&["x", "y"]).slow(Duration::from_millis(500)));
    let scraper = scraper(&["a", "free"], provider);

    let started = Instant::now();
    let report = scraper
        .scrape(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(Some(0.0), success(&report, "windows", "a"));
    assert_eq!(Some(1.0), success(&report, "windows", "free"));
    assert!(report
        .outcome("a")
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .contains("counter fetch timed out"));
}

#[tokio::test]
async fn timed_out_collector_is_not_restarted_while_running() {
    let slow = Arc::new(Reads::new("slow", &[]).slow(Duration::from_millis(600)));
    let scraper = Scraper::new(
        "windows",
        vec![("slow".to_string(), slow.clone() as Arc<dyn Collector>)],
        BTreeSet::new(),
        Arc::new(RecordingProvider::new(&[])),
    );
    let timeout = Some(Duration::from_millis(50));
    let error = |report: &counter_exporter::scrape::ScrapeReport| {
        report.outcome("slow").unwrap().error.clone().unwrap()
    };

    let first = scraper.scrape(timeout).await.unwrap();
    assert!(error(&first).contains("timed out"));
    for _ in 0..2 {
        let report = scraper.scrape(timeout).await.unwrap();
        assert_eq!(Some(0.0), success(&report, "windows", "slow"));
        assert!(error(&report).contains("still in progress"));
    }
    assert_eq!(1, slow.calls());

    // The first run has returned by now.
    tokio::time::sleep(Duration::from_millis(800)).await;
    scraper.scrape(timeout).await.unwrap();
    assert_eq!(2, slow.calls());
}

#[tokio::test]
async fn slow_child_keeps_sibling_output() {
    let children: Vec<Box<dyn ChildCollector>> = vec![
        Box::new(Reads::new("fast", &["x"])),
        Box::new(Reads::new("stuck", &["x"]).slow(Duration::from_secs(1))),
    ];
    let group = Arc::new(Composite::new("windows", "group", children));
    let scraper = Scraper::new(
        "windows",
        vec![("group".to_string(), group as Arc<dyn Collector>)],
        ["x".to_string()].into_iter().collect(),
        Arc::new(RecordingProvider::new(&["x"])),
    );

    let report = scraper
        .scrape(Some(Duration::from_millis(100)))
        .await
        .unwrap();

    let child = |name: &str| {
        report
            .samples
            .iter()
            .find(|s| {
                s.name() == "windows_group_collector_success" && s.label("collector") == Some(name)
            })
            .map(|s| s.value())
    };
    assert_eq!(Some(0.0), success(&report, "windows", "group"));
    assert_eq!(Some(1.0), child("fast"));
    assert_eq!(Some(0.0), child("stuck"));
    assert!(report.samples.iter().any(|s| s.name() == "test_fast_value"));
    assert!(report.samples.iter().all(|s| s.name() != "test_stuck_value"));
}

#[tokio::test]
async fn no_source_still_serves_meta_metrics() {
    let registry = registry();
    let enabled = registry.resolve_enabled(&["a"]).unwrap();
    let config = Config::default();
    let query: Arc<dyn QueryAdapter> = Arc::new(Unavailable);
    let ctx = BuildContext {
        config: &config,
        query: &query,
    };
    let scraper = Scraper::from_registry(&registry, &enabled, &ctx, Arc::new(Unavailable)).unwrap();

    let report = scraper.scrape(None).await.unwrap();

    assert_eq!(Some(0.0), success(&report, "windows", "a"));
    assert_eq!(2, report.samples.len());
}

const FIXTURE: &str = r#"{
    "objects": {
        "DFS Replication Connections": [
            { "instance": "srv2", "counters": { "Total Bytes Received": 1024 } }
        ],
        "DFS Replication Service Volumes": [
            { "instance": "C:", "counters": { "Database Commits": 7 } }
        ]
    },
    "failing": { "DFS Replicated Folders": "access denied" },
    "queries": {
        "Win32_PerfRawData_Tcpip_NetworkInterface": [
            { "Name": "Ethernet0", "BytesReceivedPerSec": 42 },
            { "Name": "Loopback", "BytesReceivedPerSec": 1 }
        ],
        "MSStorageDriver_ATAPISmartData": [
            {
                "InstanceName": "IDE\\Disk0",
                "Active": true,
                "SelfTestStatus": 0,
                "TotalTime": 600,
                "SmartCapability": 3,
                "VendorSpecific": [0, 0, 0, 194, 0, 0, 100, 100, 45, 0, 0, 0]
            }
        ],
        "MSStorageDriver_FailurePredictStatus": [
            { "InstanceName": "IDE\\Disk0", "PredictFailure": false }
        ],
        "HCS_ComputeSystem": [
            { "Id": "4f1d", "Type": "Container" }
        ],
        "HCS_ContainerStatistics": [
            {
                "Id": "4f1d",
                "MemoryUsageCommitBytes": 4096,
                "MemoryUsageCommitPeakBytes": 8192,
                "MemoryUsagePrivateWorkingSetBytes": 2048,
                "TotalRuntime100ns": 30000000,
                "RuntimeUser100ns": 20000000,
                "RuntimeKernel100ns": 10000000
            }
        ],
        "HCS_ContainerNetworkStatistics": [
            {
                "ContainerId": "4f1d",
                "EndpointId": "e1",
                "BytesReceived": 512,
                "BytesSent": 256,
                "PacketsReceived": 4,
                "PacketsSent": 2,
                "DroppedPacketsIncoming": 0,
                "DroppedPacketsOutgoing": 0
            }
        ]
    }
}"#;

#[tokio::test]
async fn builtin_collectors_from_fixture() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(FIXTURE.as_bytes()).unwrap();

    let config = Config::parse_from([
        "counter-exporter",
        "--collector.net.nic-blacklist",
        "^Loopback$",
    ]);
    let source = Arc::new(FixtureSource::open(file.path()).unwrap());
    let query: Arc<dyn QueryAdapter> = source.clone();
    let registry = collectors::builtin(&config).unwrap();
    let enabled = registry
        .resolve_enabled(&config.enabled_collectors())
        .unwrap();
    let ctx = BuildContext {
        config: &config,
        query: &query,
    };
    let scraper = Scraper::from_registry(&registry, &enabled, &ctx, source).unwrap();

    let report = scraper.scrape(None).await.unwrap();
    let mut text = String::new();
    encode(&mut text, &report.samples).unwrap();

    for line in [
        "windows_net_bytes_received_total{nic=\"Ethernet0\"} 42\n",
        "windows_dfsr_connection_bytes_received_total{name=\"srv2\"} 1024\n",
        "windows_dfsr_volume_database_commits_total{name=\"C:\"} 7\n",
        "windows_dfsr_collector_success{collector=\"connection\"} 1\n",
        "windows_dfsr_collector_success{collector=\"folder\"} 0\n",
        "windows_dfsr_collector_success{collector=\"volume\"} 1\n",
        "windows_smart_temperature_celsius{volume=\"IDE\\\\Disk0\"} 45\n",
        "windows_exporter_collector_success{collector=\"net\"} 1\n",
        "windows_exporter_collector_success{collector=\"dfsr\"} 0\n",
        "windows_exporter_collector_success{collector=\"smart\"} 1\n",
        "windows_container_cpu_usage_seconds_total{container_id=\"docker://4f1d\"} 3\n",
        "windows_container_network_receive_bytes_total{container_id=\"docker://4f1d\",interface=\"e1\"} 512\n",
        "windows_exporter_collector_success{collector=\"container\"} 1\n",
        "# TYPE windows_net_bytes_received_total counter\n",
    ] {
        assert!(text.contains(line), "missing {line:?} in\n{text}");
    }
    assert!(!text.contains("Loopback"));
    assert_eq!(
        1,
        text.matches("windows_dfsr_connection_bytes_received_total{")
            .count()
    );
}
