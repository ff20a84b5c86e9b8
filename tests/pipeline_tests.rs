// Pipeline tests: datagrams in through a server, sealed aggregates out through a sink

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use bytes::Bytes;
use common::{
    ChannelSink, ChannelSource, assert_close, drain, manual_config, request_line,
    wait_for_dispatched,
};
use esm_filter::ingest::UdpSource;
use esm_filter::models::Key;
use esm_filter::server::Server;
use esm_filter::sink::UdpLineSink;
use tokio::net::UdpSocket;

#[tokio::test]
async fn identical_failures_aggregate_into_one_key() {
    let (source, datagrams) = ChannelSource::new(32);
    let (sink, mut published) = ChannelSink::new();
    let handle = Server::new(source, sink, manual_config()).start();
    let stats = handle.stats();

    let line = "requests,host=h1,server_name=s1,path=/ping,status_code=503 response_time=0.001";
    for _ in 0..10 {
        datagrams.send(Bytes::from_static(line.as_bytes())).await.unwrap();
    }
    wait_for_dispatched(&stats, 10).await;
    handle.close().await.unwrap();

    let windows = drain(&mut published);
    assert_eq!(windows.len(), 1);
    let key = Key::new("requests", "h1", "s1", "/ping");
    assert_eq!(key.to_string(), "requests,h1,s1,/ping");
    let aggregate = windows[0].get(&key).expect("aggregate for key");
    assert_eq!(aggregate.total_requests, 10);
    assert_eq!(aggregate.total_failures, 10);
    assert_eq!(aggregate.status_code_histogram, BTreeMap::from([(503, 10)]));
    assert_close(aggregate.total_response_time, 0.01);
    assert_eq!(stats.snapshot().datagrams_received, 10);
}

#[tokio::test]
async fn mixed_statuses_count_failures_and_histogram() {
    let (source, datagrams) = ChannelSource::new(32);
    let (sink, mut published) = ChannelSink::new();
    let handle = Server::new(source, sink, manual_config()).start();
    let stats = handle.stats();

    for status in [200, 200, 500, 200, 200, 500, 200, 200, 500, 200] {
        let line = request_line("h1", "/ping", status, 0.002);
        datagrams.send(Bytes::from(line)).await.unwrap();
    }
    wait_for_dispatched(&stats, 10).await;
    handle.close().await.unwrap();

    let windows = drain(&mut published);
    let aggregate = windows[0]
        .get(&Key::new("requests", "h1", "s1", "/ping"))
        .unwrap();
    assert_eq!(aggregate.total_requests, 10);
    assert_eq!(aggregate.total_failures, 3);
    assert_eq!(aggregate.total_successes(), 7);
    assert_eq!(
        aggregate.status_code_histogram,
        BTreeMap::from([(200, 7), (500, 3)])
    );
    assert_close(aggregate.total_response_time, 0.02);
}

#[tokio::test]
async fn distinct_keys_are_independent() {
    let (source, datagrams) = ChannelSource::new(32);
    let (sink, mut published) = ChannelSink::new();
    let handle = Server::new(source, sink, manual_config()).start();
    let stats = handle.stats();

    let batch = [
        request_line("h1", "/a", 200, 0.1),
        request_line("h2", "/a", 404, 0.3),
        request_line("h1", "/a", 200, 0.1),
    ]
    .join("\n");
    datagrams.send(Bytes::from(batch)).await.unwrap();
    wait_for_dispatched(&stats, 3).await;
    handle.close().await.unwrap();

    let windows = drain(&mut published);
    let window = &windows[0];
    assert_eq!(window.aggregates().len(), 2);
    let h1 = window.get(&Key::new("requests", "h1", "s1", "/a")).unwrap();
    assert_eq!(h1.total_requests, 2);
    assert_eq!(h1.total_failures, 0);
    assert_close(h1.mean_response_time(), 0.1);
    let h2 = window.get(&Key::new("requests", "h2", "s1", "/a")).unwrap();
    assert_eq!(h2.total_requests, 1);
    assert_eq!(h2.total_failures, 1);
}

#[tokio::test]
async fn malformed_datagram_does_not_affect_others() {
    let (source, datagrams) = ChannelSource::new(32);
    let (sink, mut published) = ChannelSink::new();
    let handle = Server::new(source, sink, manual_config()).start();
    let stats = handle.stats();

    datagrams
        .send(Bytes::from(request_line("h1", "/ok", 200, 0.1)))
        .await
        .unwrap();
    datagrams
        .send(Bytes::from_static(b"requests,host=h1 response_time=\"unterminated"))
        .await
        .unwrap();
    datagrams
        .send(Bytes::from_static(&[0xff, 0xfe, 0x00]))
        .await
        .unwrap();
    datagrams
        .send(Bytes::from(request_line("h1", "/ok", 200, 0.1)))
        .await
        .unwrap();
    wait_for_dispatched(&stats, 2).await;
    handle.close().await.unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.datagrams_received, 4);
    assert_eq!(snapshot.decode_errors, 2);
    let windows = drain(&mut published);
    let aggregate = windows[0]
        .get(&Key::new("requests", "h1", "s1", "/ok"))
        .unwrap();
    assert_eq!(aggregate.total_requests, 2);
}

#[tokio::test]
async fn close_without_traffic_publishes_one_empty_window() {
    let (source, _datagrams) = ChannelSource::new(1);
    let (sink, mut published) = ChannelSink::new();
    let handle = Server::new(source, sink, manual_config()).start();
    handle.close().await.unwrap();

    let windows = drain(&mut published);
    assert_eq!(windows.len(), 1);
    assert!(windows[0].is_empty());
}

#[tokio::test]
async fn udp_round_trip_emits_line_protocol() {
    let downstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let downstream_addr = downstream.local_addr().unwrap().to_string();

    let source = UdpSource::bind("127.0.0.1:0", 65_536).await.unwrap();
    let listen_addr = source.local_addr().unwrap();
    let sink = UdpLineSink::connect(&downstream_addr, 1400).await.unwrap();
    let handle = Server::new(source, sink, manual_config()).start();
    let stats = handle.stats();

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let payload = format!(
        "{}\n{}",
        request_line("h1", "/ping", 200, 0.25),
        request_line("h1", "/ping", 503, 0.75)
    );
    client.send_to(payload.as_bytes(), listen_addr).await.unwrap();
    wait_for_dispatched(&stats, 2).await;
    handle.close().await.unwrap();

    let mut buf = vec![0u8; 2048];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), downstream.recv_from(&mut buf))
        .await
        .expect("downstream datagram")
        .unwrap();
    let text = std::str::from_utf8(&buf[..len]).unwrap();
    assert!(text.starts_with("requests,host=h1,path=/ping,server_name=s1 "));
    assert!(text.contains("total_requests=2i"));
    assert!(text.contains("total_failures=1i"));
    assert!(text.contains("total_response_time=1,"));
    assert!(text.contains("mean_response_time=0.5"));
    assert!(text.contains("status_200=1i"));
    assert!(text.contains("status_503=1i"));
}
