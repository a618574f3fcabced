//! Upstream Client Integration Tests
//!
//! Tests the venue client against a scripted local WebSocket server:
//! connection lifecycle, event normalization, reconnection, and live
//! subscription changes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use binance_stream_hub::infrastructure::binance::{KeepaliveConfig, ReconnectConfig};
use binance_stream_hub::{
    BinanceClient, BinanceClientConfig, BinanceClientError, NormalizedEvent, UpstreamEvent,
};

fn fast_config(url: String, max_attempts: u32) -> BinanceClientConfig {
    BinanceClientConfig {
        url,
        symbols: vec!["BTCUSDT".to_string()],
        kline_interval: "1m".to_string(),
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            max_attempts,
            ..ReconnectConfig::default()
        },
        keepalive: KeepaliveConfig::default(),
    }
}

fn ticker_json(price: &str) -> String {
    format!(
        concat!(
            r#"{{"stream":"btcusdt@ticker","data":{{"e":"24hrTicker","E":1699999999999,"#,
            r#""s":"BTCUSDT","c":"{price}","o":"41000","h":"43000","l":"40500","#,
            r#""v":"1234.5","P":"2.44"}}}}"#
        ),
        price = price
    )
}

async fn next_event(rx: &mut mpsc::Receiver<UpstreamEvent>) -> UpstreamEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for upstream event")
        .expect("event channel closed")
}

#[tokio::test]
async fn streams_normalized_events_after_connecting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(ticker_json("42000.5").into()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let client = Arc::new(BinanceClient::new(
        fast_config(format!("ws://{addr}"), 3),
        event_tx,
        cancel.clone(),
    ));
    let run = tokio::spawn(Arc::clone(&client).run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Connected
    ));

    match next_event(&mut event_rx).await {
        UpstreamEvent::Event(NormalizedEvent::Ticker { symbol, data, .. }) => {
            assert_eq!(symbol, "BTCUSDT");
            assert_eq!(data.price, "42000.5".parse::<Decimal>().unwrap());
            assert_eq!(data.percent_change, "2.44".parse::<Decimal>().unwrap());
        }
        other => panic!("expected ticker event, got {other:?}"),
    }

    cancel.cancel();
    let _ = run.await;
}

#[tokio::test]
async fn reconnects_after_the_venue_drops_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        // First connection sends one event and closes.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(ticker_json("42000").into()))
            .await
            .unwrap();
        ws.close(None).await.unwrap();

        // Second connection stays up.
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(Message::Text(ticker_json("43000").into()))
            .await
            .unwrap();
        while ws.next().await.is_some() {}
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let client = Arc::new(BinanceClient::new(
        fast_config(format!("ws://{addr}"), 5),
        event_tx,
        cancel.clone(),
    ));
    let run = tokio::spawn(Arc::clone(&client).run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Connected
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Event(_)
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Disconnected
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Reconnecting { attempt: 1 }
    ));
    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Connected
    ));

    match next_event(&mut event_rx).await {
        UpstreamEvent::Event(NormalizedEvent::Ticker { data, .. }) => {
            assert_eq!(data.price, Decimal::from(43000));
        }
        other => panic!("expected ticker event, got {other:?}"),
    }

    cancel.cancel();
    let _ = run.await;
}

#[tokio::test]
async fn gives_up_after_the_reconnect_budget_is_exhausted() {
    // Bind and immediately drop so every connect is refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let client = Arc::new(BinanceClient::new(
        fast_config(format!("ws://{addr}"), 2),
        event_tx,
        cancel,
    ));
    let run = tokio::spawn(Arc::clone(&client).run());

    let unavailable_seen = timeout(Duration::from_secs(5), async {
        loop {
            match event_rx.recv().await {
                Some(UpstreamEvent::Unavailable) => return true,
                Some(_) => {}
                None => return false,
            }
        }
    })
    .await
    .expect("timed out waiting for terminal state");
    assert!(unavailable_seen);

    let result = timeout(Duration::from_secs(5), run)
        .await
        .expect("client task never finished")
        .unwrap();
    assert!(matches!(
        result,
        Err(BinanceClientError::MaxReconnectAttemptsExceeded)
    ));
}

#[tokio::test]
async fn live_subscribe_is_sent_to_the_venue() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (venue_tx, mut venue_rx) = mpsc::channel::<String>(16);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                let _ = venue_tx.send(text.to_string()).await;
            }
        }
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let client = Arc::new(BinanceClient::new(
        fast_config(format!("ws://{addr}"), 3),
        event_tx,
        cancel.clone(),
    ));
    let handle = client.handle();
    let run = tokio::spawn(Arc::clone(&client).run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        UpstreamEvent::Connected
    ));

    handle.subscribe(" ethusdt ").await.unwrap();

    let request = timeout(Duration::from_secs(5), venue_rx.recv())
        .await
        .expect("timed out waiting for subscribe request")
        .expect("venue channel closed");
    let json: serde_json::Value = serde_json::from_str(&request).unwrap();

    assert_eq!(json["method"], "SUBSCRIBE");
    let params: Vec<&str> = json["params"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(params.contains(&"ethusdt@ticker"));
    assert!(params.contains(&"ethusdt@kline_1m"));
    assert!(params.contains(&"ethusdt@trade"));
    assert!(json["id"].is_u64());

    cancel.cancel();
    let _ = run.await;
}
