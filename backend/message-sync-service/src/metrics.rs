use actix_web::{http::header::ContentType, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, TextEncoder};

pub static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "message_sync_messages_sent_total",
            "Messages sequenced and stored",
        ),
        &["conversation_type"],
    )
    .expect("failed to create message_sync_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register message_sync_messages_sent_total");
    counter
});

pub static MESSAGE_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "message_sync_message_transitions_total",
            "Message status transitions (recalled, deleted)",
        ),
        &["status"],
    )
    .expect("failed to create message_sync_message_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register message_sync_message_transitions_total");
    counter
});

pub static NOTIFICATIONS_PUBLISHED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "message_sync_notifications_published_total",
            "Notification publish attempts by target class and outcome",
        ),
        &["target", "outcome"],
    )
    .expect("failed to create message_sync_notifications_published_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register message_sync_notifications_published_total");
    counter
});

pub static OUTBOUND_FRAMES_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "message_sync_outbound_frames_dropped_total",
        "Frames dropped because a connection's outbound queue was full",
    )
    .expect("failed to create message_sync_outbound_frames_dropped_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register message_sync_outbound_frames_dropped_total");
    counter
});

pub static LIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "message_sync_live_connections",
        "Registered websocket connections on this instance",
    )
    .expect("failed to create message_sync_live_connections");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register message_sync_live_connections");
    gauge
});

pub static SYNC_DOMAIN_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "message_sync_domain_failures_total",
            "Sync sections omitted because a collaborating domain failed",
        ),
        &["domain"],
    )
    .expect("failed to create message_sync_domain_failures_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register message_sync_domain_failures_total");
    counter
});

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body(buffer)
}
