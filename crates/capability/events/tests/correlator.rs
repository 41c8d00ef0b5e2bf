use gateway_events::{
    Correlator, EmailAction, EmailNotifier, EventHub, EventSink, GatewayEvent,
    NotifierPresence, RemoteEmailNotifier, RequestError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn response_is_relayed_unmodified() {
    let hub = EventHub::new(16);
    let correlator = Arc::new(Correlator::new());
    let presence = Arc::new(NotifierPresence::new());
    let notifier = RemoteEmailNotifier::new(
        Arc::new(hub.clone()),
        correlator.clone(),
        presence.clone(),
        Duration::from_secs(5),
    );
    let _registration = presence.register();

    let mut receiver = hub.subscribe();
    let responder = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            if let Ok(GatewayEvent::EmailRequest(request)) = receiver.recv().await {
                assert_eq!(request.action, EmailAction::TestEmailConnection);
                assert_eq!(request.payload["host"], "smtp.example.com");
                correlator.resolve(
                    &request.correlation_id,
                    json!({"success": false, "error": "auth failed"}),
                );
            }
        })
    };

    let result = notifier
        .request(
            EmailAction::TestEmailConnection,
            json!({"host": "smtp.example.com"}),
        )
        .await
        .expect("response");
    assert_eq!(result, json!({"success": false, "error": "auth failed"}));
    responder.await.expect("responder");
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_is_forgotten() {
    let correlator = Correlator::new();
    let mut issued = None;
    let result = correlator
        .request(Duration::from_secs(20), |id| {
            issued = Some(id.to_string());
            Ok(())
        })
        .await;
    assert_eq!(result, Err(RequestError::Timeout(Duration::from_secs(20))));
    assert_eq!(correlator.pending_count(), 0);

    // 迟到的应答被丢弃
    let late = issued.expect("correlation id");
    assert!(!correlator.resolve(&late, json!({"success": true})));
}

#[tokio::test]
async fn send_failure_is_returned() {
    let correlator = Correlator::new();
    let result = correlator
        .request(Duration::from_secs(1), |_| {
            Err(RequestError::Unavailable("no notifier".to_string()))
        })
        .await;
    assert_eq!(
        result,
        Err(RequestError::Unavailable("no notifier".to_string()))
    );
    assert_eq!(correlator.pending_count(), 0);
}

#[tokio::test]
async fn hub_without_subscribers_never_blocks() {
    let hub = EventHub::new(1);
    for _ in 0..10 {
        hub.publish(GatewayEvent::HistoryStatsChanged(domain::LoggerStats::empty(
            "h1",
        )));
    }
    assert_eq!(hub.subscriber_count(), 0);
}

#[tokio::test]
async fn plain_subscribers_do_not_count_as_notifier() {
    let hub = EventHub::new(16);
    let presence = Arc::new(NotifierPresence::new());
    let notifier = RemoteEmailNotifier::new(
        Arc::new(hub.clone()),
        Arc::new(Correlator::new()),
        presence.clone(),
        Duration::from_secs(20),
    );
    let mut ui = hub.subscribe();

    let result = notifier
        .request(EmailAction::SendTestEmail, json!({"to": "ops@example.com"}))
        .await;
    assert!(matches!(result, Err(RequestError::Unavailable(_))));
    assert!(ui.try_recv().is_err());

    let registration = presence.register();
    assert_eq!(presence.connected(), 1);
    drop(registration);
    assert_eq!(presence.connected(), 0);
}
