use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use cd11_frame::{ChannelSubframe, Cd11Frame, FrameBody, FrameFactory};
use cd11_station::{
    connect_to_broker, ConnectionBroker, ReceiverConfig, StationConfig, StationDataReceiver,
    StationLink,
};
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn loopback() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

/// Handshakes are logged just after the broker closes the socket.
async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn station_is_redirected_and_its_data_becomes_a_record() {
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    // Bind the data listener first so its port can be routed.
    let data_listener = TcpListener::bind(loopback())
        .await
        .expect("data listener should bind");
    let data_port = data_listener.local_addr().expect("data addr").port();

    let mut config = ReceiverConfig {
        stations: vec![StationConfig::new("AAA").with_data_port(data_port)],
        ..ReceiverConfig::default()
    };
    config.broker.responder_type = "IDC".into();
    config.validate().expect("config should be valid");

    let receiver = StationDataReceiver::new(
        config.stations[0].clone(),
        config.receiver.clone(),
        data_port,
        tx,
    );
    let receiver_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { receiver.run(data_listener, cancel).await })
    };

    let broker = ConnectionBroker::new(&config).with_bind_addr(loopback());
    let broker_listener = broker.bind().await.expect("broker should bind");
    let broker_addr = broker_listener.local_addr().expect("broker addr");
    let broker_task = {
        let broker = broker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { broker.run(broker_listener, cancel).await })
    };

    let t0 = Utc.with_ymd_and_hms(2019, 7, 4, 10, 0, 0).unwrap();
    let subframes: Vec<ChannelSubframe> = ["BHZ", "BHN", "BHE", "LHZ"]
        .iter()
        .enumerate()
        .map(|(i, chan)| {
            let start = t0 + ChronoDuration::milliseconds(250 * i as i64);
            let payload = vec![i as u8; 8 + i * 4];
            ChannelSubframe::new("AAA", *chan, "00", start, 10_000, 400, payload)
        })
        .collect();
    let expected: Vec<_> = subframes
        .iter()
        .map(|s| (s.channel_id(), s.timestamp, s.end_time()))
        .collect();

    let station = tokio::task::spawn_blocking(move || {
        let factory = FrameFactory::new().with_frame_creator("AAA");
        let response =
            connect_to_broker(broker_addr, &factory, "AAA", "IDC", Duration::from_secs(2))
                .expect("broker should answer");
        assert_eq!(response.port, data_port);
        assert_eq!(response.service_type, "TCP");

        let data_addr = SocketAddr::from((response.ip_address, response.port));
        let mut link =
            StationLink::connect(data_addr, Duration::from_secs(2)).expect("data connect");
        link.send(&factory.data(subframes, 1).expect("data frame"))
            .expect("data send");
        link
    });
    let mut link = station.await.expect("station thread");

    let record = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("record should arrive")
        .expect("sink open");
    assert_eq!(record.station_name, "AAA");
    assert_eq!(record.sequence_number, 1);
    assert_eq!(record.channel_names.len(), 4);
    for (summary, (name, start, end)) in record.waveform_summaries.iter().zip(&expected) {
        assert_eq!(&summary.channel_name, name);
        assert_eq!(summary.start_time, *start);
        assert_eq!(summary.end_time, *end);
    }
    assert_eq!(record.crc_valid, Some(true));
    wait_until(|| broker.connection_log().stats().valid == 1).await;
    assert_eq!(broker.connection_log().stats().valid, 1);

    cancel.cancel();
    broker_task.await.expect("broker join").expect("broker result");
    receiver_task.await.expect("receiver join").expect("receiver result");

    let farewell = tokio::task::spawn_blocking(move || link.recv(Duration::from_secs(2)))
        .await
        .expect("station thread")
        .expect("farewell frame");
    match Cd11Frame::decode(&farewell).expect("decodable").body {
        FrameBody::Alert(alert) => assert_eq!(alert.message, "Shutting down."),
        other => panic!("expected alert, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_station_gets_no_response() {
    let config = ReceiverConfig {
        stations: vec![StationConfig::new("AAA").with_data_port(8155)],
        ..ReceiverConfig::default()
    };
    let broker = ConnectionBroker::new(&config).with_bind_addr(loopback());
    let listener = broker.bind().await.expect("broker should bind");
    let addr = listener.local_addr().expect("broker addr");
    let cancel = CancellationToken::new();
    let task = {
        let broker = broker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { broker.run(listener, cancel).await })
    };

    let result = tokio::task::spawn_blocking(move || {
        connect_to_broker(addr, &FrameFactory::new(), "BBB", "IDC", Duration::from_secs(2))
    })
    .await
    .expect("station thread");
    assert!(result.is_err());
    wait_until(|| broker.connection_log().stats().total == 1).await;

    cancel.cancel();
    task.await.expect("broker join").expect("broker result");
    let entries = broker.connection_log().entries();
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].accepted);
}
