//! # Integration Tests
//!
//! 跨 crate 的集成测试。
//!
//! 覆盖：
//! - 示例配置快照
//! - 假上游 -> manager -> store -> processor 全链路
//! - 对在线上游的热重启
//! - 处理器重启后的至少一次投递

#[cfg(test)]
mod contract_tests {
    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{StoreKind, TransformKind};

    const SAMPLE: &str = include_str!("../../../configs/relay.toml");

    #[test]
    fn sample_config_loads() {
        let blueprint = ConfigLoader::load_from_str(SAMPLE, ConfigFormat::Toml).unwrap();

        assert_eq!(blueprint.version, contracts::ConfigVersion::V1);
        assert_eq!(blueprint.upstream.path, "/1/statuses/filter.json");
        assert!(blueprint.upstream.authorization().is_some());
        assert_eq!(blueprint.manager.parameters["track"], "rust,tokio");
        assert_eq!(blueprint.processors.len(), 2);
        assert_eq!(blueprint.processors[0].transform, TransformKind::Status);
        assert_eq!(blueprint.processors[1].transform, TransformKind::None);
        assert_eq!(blueprint.store.kind, StoreKind::Redis);
        assert_eq!(
            blueprint.store.url.as_deref(),
            Some("redis://127.0.0.1:6379/0")
        );

        let keys = blueprint.store_keys();
        assert_eq!(keys.data(), "relay.data");
        assert_eq!(keys.ready("archive"), "relay.data.archive");
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use bytes::Bytes;
    use contracts::{
        BackoffConfig, ListStore, ManagerConfig, ProcessorConfig, StoreKeys, TransformKind,
        UpstreamConfig,
    };
    use dispatcher::{BatchPoster, BatchQueueProcessor, DispatcherError, StepOutcome};
    use ingestion::LengthDelimitedFramer;
    use manager::{seed_parameters, ConsumerManager, StoreDataSink, StoreParameters};
    use observability::ListDepthTracker;
    use store::MemoryStore;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::watch;

    type TestManager =
        ConsumerManager<StoreParameters<MemoryStore>, StoreDataSink<MemoryStore>, LengthDelimitedFramer>;

    /// Records every batch; fails the first `failures` posts with status 503
    #[derive(Clone, Default)]
    struct RecordingPoster {
        batches: Arc<Mutex<Vec<Vec<Bytes>>>>,
        failures: Arc<AtomicUsize>,
    }

    impl RecordingPoster {
        fn failing(failures: usize) -> Self {
            let poster = Self::default();
            poster.failures.store(failures, Ordering::SeqCst);
            poster
        }

        fn batches(&self) -> Vec<Vec<Bytes>> {
            self.batches.lock().unwrap().clone()
        }
    }

    impl BatchPoster for RecordingPoster {
        async fn post(&self, items: &[Bytes]) -> dispatcher::Result<()> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(DispatcherError::Status(503));
            }
            self.batches.lock().unwrap().push(items.to_vec());
            Ok(())
        }
    }

    /// Fake feed: answers every request with a held-open chunked stream
    struct FakeUpstream {
        port: u16,
        requests: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicUsize>,
    }

    impl FakeUpstream {
        async fn start(items: Vec<&'static str>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(AtomicUsize::new(0));

            let mut response =
                b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
            for item in &items {
                let framed = format!("{}\r\n{}\r\n", item.len(), item);
                response.extend_from_slice(format!("{:x}\r\n", framed.len()).as_bytes());
                response.extend_from_slice(framed.as_bytes());
                response.extend_from_slice(b"\r\n");
            }

            let (seen, gone) = (requests.clone(), closed.clone());
            tokio::spawn(async move {
                loop {
                    let Ok((mut socket, _)) = listener.accept().await else {
                        return;
                    };
                    let (seen, gone, response) = (seen.clone(), gone.clone(), response.clone());
                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        seen.lock().unwrap().push(request);
                        if socket.write_all(&response).await.is_err() {
                            return;
                        }
                        let mut buf = [0u8; 256];
                        while matches!(socket.read(&mut buf).await, Ok(n) if n > 0) {}
                        gone.fetch_add(1, Ordering::SeqCst);
                    });
                }
            });

            Self {
                port,
                requests,
                closed,
            }
        }

        fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    /// Reads until the form body has arrived
    async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        let _ = tokio::time::timeout(Duration::from_millis(500), async {
            loop {
                match socket.read(&mut buf).await {
                    Ok(n) if n > 0 => request.extend_from_slice(&buf[..n]),
                    _ => return,
                }
                let text = String::from_utf8_lossy(&request);
                if let Some((head, body)) = text.split_once("\r\n\r\n") {
                    let expected = head
                        .lines()
                        .find_map(|l| l.strip_prefix("Content-Length: "))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if body.len() >= expected {
                        return;
                    }
                }
            }
        })
        .await;
        String::from_utf8_lossy(&request).into_owned()
    }

    fn upstream(port: u16) -> UpstreamConfig {
        UpstreamConfig {
            host: "127.0.0.1".into(),
            port,
            path: "/1/statuses/filter.json".into(),
            username: None,
            password: None,
            headers: BTreeMap::new(),
            timeout_secs: 5.0,
            tcp_backoff: BackoffConfig::new(0.01, 0.05),
            http_backoff: BackoffConfig::new(0.01, 0.05),
            max_item_bytes: 1024,
        }
    }

    fn processor_config(num_items: usize, transform: TransformKind) -> ProcessorConfig {
        ProcessorConfig {
            ready_list_id: "ready".into(),
            num_items,
            url: "http://127.0.0.1:9/unused".into(),
            username: None,
            password: None,
            headers: BTreeMap::new(),
            backoff: BackoffConfig::new(2.0, 3600.0),
            transform,
            field_name: "items".into(),
            timeout_secs: 5.0,
        }
    }

    async fn manager_for(
        store: &MemoryStore,
        keys: &StoreKeys,
        port: u16,
        track: &str,
    ) -> TestManager {
        let initial = BTreeMap::from([("track".to_string(), track.to_string())]);
        seed_parameters(store, keys, &initial).await.unwrap();

        let config = ManagerConfig {
            num_workers: 4,
            exit_backoff: BackoffConfig::new(0.05, 0.2),
            parameters: initial.clone(),
            start_on_launch: true,
        };
        ConsumerManager::new(
            upstream(port),
            &config,
            StoreParameters::new(store.clone(), keys.clone(), initial.into_keys()),
            StoreDataSink::new(store.clone(), keys),
            LengthDelimitedFramer::new(1024),
        )
    }

    async fn eventually<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !check().await {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Fake upstream -> ConsumerManager -> MemoryStore -> BatchQueueProcessor
    #[tokio::test]
    async fn test_e2e_feed_to_downstream_batch() {
        let items: Vec<&'static str> = vec![
            r#"{"id":1}"#, r#"{"id":2}"#, r#"{"id":3}"#, r#"{"id":4}"#, r#"{"id":5}"#,
            r#"{"id":6}"#, r#"{"id":7}"#, r#"{"id":8}"#, r#"{"id":9}"#, r#"{"id":10}"#,
        ];
        let feed = FakeUpstream::start(items.clone()).await;
        let store = MemoryStore::new();
        let keys = StoreKeys::new("relay.");

        let manager = manager_for(&store, &keys, feed.port, "rust").await;
        let poster = RecordingPoster::default();
        let processor = BatchQueueProcessor::new(
            store.clone(),
            poster.clone(),
            &keys,
            &processor_config(10, TransformKind::None),
        );
        let processor_metrics = Arc::clone(processor.metrics());
        let (stop_tx, stop_rx) = watch::channel(false);
        let processor_task = tokio::spawn(processor.run(stop_rx));

        let id = manager.start_a_consumer().await.unwrap();

        eventually(|| {
            let poster = poster.clone();
            async move { !poster.batches().is_empty() }
        })
        .await;

        let batches = poster.batches();
        assert_eq!(batches.len(), 1);
        let posted: Vec<&[u8]> = batches[0].iter().map(|b| &b[..]).collect();
        let expected: Vec<&[u8]> = items.iter().map(|i| i.as_bytes()).collect();
        assert_eq!(posted, expected);

        // batch committed: nothing left anywhere
        assert_eq!(store.llen(&keys.data()).await.unwrap(), 0);
        assert_eq!(store.llen(&keys.ready("ready")).await.unwrap(), 0);
        assert_eq!(processor_metrics.snapshot().items_posted, 10);

        assert_eq!(manager.active_consumer_id().await, Some(id));
        let requests = feed.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("POST /1/statuses/filter.json HTTP/1.1\r\n"));
        assert!(requests[0].ends_with("track=rust"));
        assert_eq!(manager.metrics().snapshot().items_received, 10);

        stop_tx.send_replace(true);
        processor_task.await.unwrap();
        manager.shutdown().await;
    }

    /// A second consumer with new parameters replaces the first only once connected
    #[tokio::test]
    async fn test_e2e_hot_restart_switches_parameters() {
        let feed = FakeUpstream::start(vec![r#"{"id":1}"#]).await;
        let store = MemoryStore::new();
        let keys = StoreKeys::new("relay.");
        let manager = manager_for(&store, &keys, feed.port, "rust").await;

        let first = manager.start_a_consumer().await.unwrap();
        eventually(|| {
            let manager = manager.clone();
            let first = first.clone();
            async move { manager.active_consumer_id().await == Some(first) }
        })
        .await;

        store
            .set(&keys.param("track"), Bytes::from_static(b"tokio"))
            .await
            .unwrap();
        let second = manager.start_a_consumer().await.unwrap();
        assert_ne!(first, second);

        eventually(|| {
            let manager = manager.clone();
            let second = second.clone();
            async move {
                manager.active_consumer_id().await == Some(second.clone())
                    && manager.consumer_ids().await == vec![second]
            }
        })
        .await;

        // the loser released its socket
        eventually(|| {
            let closed = feed.closed.clone();
            async move { closed.load(Ordering::SeqCst) >= 1 }
        })
        .await;

        let requests = feed.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].ends_with("track=rust"));
        assert!(requests[1].ends_with("track=tokio"));

        // each connection delivered its item; the killed one did not Exit
        eventually(|| {
            let store = store.clone();
            let key = keys.data();
            async move { store.llen(&key).await.unwrap() == 2 }
        })
        .await;
        assert_eq!(manager.metrics().snapshot().exits, 0);

        manager.shutdown().await;
    }

    /// A failed POST leaves the ready list for the next processor instance
    #[tokio::test]
    async fn test_e2e_failed_batch_survives_processor_restart() {
        let store = MemoryStore::new();
        let keys = StoreKeys::new("relay.");
        let sink = StoreDataSink::new(store.clone(), &keys);
        for i in 0..3 {
            contracts::DataSink::handle(&sink, Bytes::from(format!("item-{i}")))
                .await
                .unwrap();
        }

        let config = processor_config(3, TransformKind::None);
        let failing = RecordingPoster::failing(1);
        let mut first = BatchQueueProcessor::new(store.clone(), failing.clone(), &keys, &config);
        assert_eq!(
            first.step().await.unwrap(),
            StepOutcome::Retry(Duration::from_secs(4))
        );
        drop(first);

        assert_eq!(store.llen(&keys.ready("ready")).await.unwrap(), 3);

        let poster = RecordingPoster::default();
        let mut second = BatchQueueProcessor::new(store.clone(), poster.clone(), &keys, &config);
        assert_eq!(second.step().await.unwrap(), StepOutcome::Posted(3));

        let batches = poster.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(&batches[0][0][..], b"item-0");
        assert_eq!(&batches[0][2][..], b"item-2");
        assert_eq!(store.llen(&keys.ready("ready")).await.unwrap(), 0);
        assert!(failing.batches().is_empty());
    }

    /// Status transform reduces statuses, keeps notices, drops noise
    #[tokio::test]
    async fn test_e2e_status_transform_batch() {
        let store = MemoryStore::new();
        let keys = StoreKeys::new("relay.");
        let sink = StoreDataSink::new(store.clone(), &keys);
        let items = [
            r#"{"id":7,"in_reply_to_status_id":null,"text":"hi","lang":"en","user":{"id":3,"screen_name":"amy","followers_count":9}}"#,
            r#"{"delete":{"status":{"id":5}}}"#,
            "not json",
        ];
        for item in items {
            contracts::DataSink::handle(&sink, Bytes::from_static(item.as_bytes()))
                .await
                .unwrap();
        }

        let poster = RecordingPoster::default();
        let mut processor = BatchQueueProcessor::new(
            store.clone(),
            poster.clone(),
            &keys,
            &processor_config(3, TransformKind::Status),
        );
        assert_eq!(processor.step().await.unwrap(), StepOutcome::Posted(2));

        let batch = poster.batches().remove(0);
        let status: serde_json::Value = serde_json::from_slice(&batch[0]).unwrap();
        assert_eq!(status["id"], 7);
        assert_eq!(status["user"], serde_json::json!({"id": 3, "screen_name": "amy"}));
        assert!(status.get("lang").is_none());
        assert_eq!(&batch[1][..], items[1].as_bytes());
        assert_eq!(processor.metrics().snapshot().items_dropped, 1);
    }

    /// Depth sampling sees the backlog build up and drain
    #[tokio::test]
    async fn test_list_depth_tracking() {
        let store = MemoryStore::new();
        let keys = StoreKeys::new("relay.");
        let mut depths = ListDepthTracker::new();

        for i in 0..4 {
            store
                .rpush(&keys.data(), Bytes::from(format!("{i}")))
                .await
                .unwrap();
            depths.update(&keys.data(), store.llen(&keys.data()).await.unwrap());
        }
        store.delete(&keys.data()).await.unwrap();
        depths.update(&keys.data(), store.llen(&keys.data()).await.unwrap());

        let summary = depths.summary(&keys.data());
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, 0.0);
        assert_eq!(summary.max, 4.0);
    }
}
