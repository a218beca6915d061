use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use liyaqa_core::event_bus::{make_event, noop_sink, EventSink, EventType};
use liyaqa_core::{LiyaqaError, LiyaqaResult};

use crate::executor::new_pixel;
use crate::store::MarketingStore;
use crate::types::{MessageLog, MessageStatus, TrackingPixel, TrackingType};

/// Records delivery receipts, opens, and clicks against message logs.
#[derive(Clone)]
pub struct TrackingService {
    store: MarketingStore,
    event_sink: Arc<dyn EventSink>,
}

impl TrackingService {
    pub fn new(store: MarketingStore) -> Self {
        Self {
            store,
            event_sink: noop_sink(),
        }
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Registers a click-through link for a message and returns its token.
    pub fn create_click_link(&self, message_log_id: Uuid, target_url: &str) -> LiyaqaResult<TrackingPixel> {
        self.store
            .message_log(message_log_id)
            .ok_or_else(|| LiyaqaError::not_found("MessageLog", message_log_id))?;
        let parsed = url::Url::parse(target_url)
            .map_err(|e| LiyaqaError::Validation(format!("Invalid target URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LiyaqaError::Validation(
                "Target URL must use http or https".into(),
            ));
        }
        let pixel = new_pixel(
            message_log_id,
            TrackingType::Click,
            Some(parsed.to_string()),
            Utc::now(),
        );
        self.store.pixels.insert(pixel.token.clone(), pixel.clone());
        Ok(pixel)
    }

    pub fn record_open(&self, token: &str) -> LiyaqaResult<MessageLog> {
        self.record_open_at(token, Utc::now())
    }

    pub fn record_open_at(&self, token: &str, now: DateTime<Utc>) -> LiyaqaResult<MessageLog> {
        let log_id = self.hit(token, TrackingType::Open)?.message_log_id;
        let log = self.advance(log_id, MessageStatus::Opened, now)?;
        metrics::counter!("marketing.messages.opened").increment(1);
        self.emit(EventType::MessageOpened, &log);
        Ok(log)
    }

    /// Records a click and returns the URL to redirect to.
    pub fn record_click(&self, token: &str) -> LiyaqaResult<String> {
        self.record_click_at(token, Utc::now())
    }

    pub fn record_click_at(&self, token: &str, now: DateTime<Utc>) -> LiyaqaResult<String> {
        let pixel = self.hit(token, TrackingType::Click)?;
        let log = self.advance(pixel.message_log_id, MessageStatus::Clicked, now)?;
        metrics::counter!("marketing.messages.clicked").increment(1);
        self.emit(EventType::MessageClicked, &log);
        pixel
            .target_url
            .ok_or_else(|| LiyaqaError::NotFound(format!("No target URL for token {token}")))
    }

    pub fn mark_delivered(&self, message_log_id: Uuid) -> LiyaqaResult<MessageLog> {
        self.advance(message_log_id, MessageStatus::Delivered, Utc::now())
    }

    pub fn mark_failed(&self, message_log_id: Uuid, reason: &str) -> LiyaqaResult<MessageLog> {
        let mut entry = self
            .store
            .message_logs
            .get_mut(&message_log_id)
            .ok_or_else(|| LiyaqaError::not_found("MessageLog", message_log_id))?;
        entry.mark_failed(reason, Utc::now());
        info!(message_log_id = %message_log_id, reason, "Message marked failed");
        Ok(entry.clone())
    }

    fn hit(&self, token: &str, expected: TrackingType) -> LiyaqaResult<TrackingPixel> {
        let mut pixel = self
            .store
            .pixels
            .get_mut(token)
            .filter(|p| p.tracking_type == expected)
            .ok_or_else(|| LiyaqaError::not_found("Tracking token", token))?;
        pixel.hits += 1;
        debug!(token, hits = pixel.hits, "Tracking hit");
        Ok(pixel.clone())
    }

    fn advance(&self, message_log_id: Uuid, to: MessageStatus, now: DateTime<Utc>) -> LiyaqaResult<MessageLog> {
        let mut entry = self
            .store
            .message_logs
            .get_mut(&message_log_id)
            .ok_or_else(|| LiyaqaError::not_found("MessageLog", message_log_id))?;
        entry.advance(to, now);
        Ok(entry.clone())
    }

    fn emit(&self, event_type: EventType, log: &MessageLog) {
        let tenant = self.store.campaign(log.campaign_id).map(|c| c.tenant_id);
        self.event_sink.emit(make_event(
            event_type,
            tenant,
            log.id,
            serde_json::json!({ "campaign_id": log.campaign_id, "member_id": log.member_id }),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MarketingChannel;
    use chrono::Duration;

    fn seed_log(store: &MarketingStore, status: MessageStatus) -> MessageLog {
        let now = Utc::now();
        let mut log = MessageLog {
            id: Uuid::new_v4(),
            campaign_id: Uuid::new_v4(),
            step_id: Uuid::new_v4(),
            enrollment_id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            channel: MarketingChannel::Email,
            status: MessageStatus::Pending,
            notification_id: None,
            sent_at: None,
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            failed_at: None,
            error_message: None,
            created_at: now,
        };
        if status == MessageStatus::Sent {
            log.mark_sent(None, now);
        }
        store.message_logs.insert(log.id, log.clone());
        log
    }

    fn open_pixel(store: &MarketingStore, log: &MessageLog) -> String {
        let pixel = new_pixel(log.id, TrackingType::Open, None, Utc::now());
        store.pixels.insert(pixel.token.clone(), pixel.clone());
        pixel.token
    }

    #[test]
    fn test_open_sets_timestamps_once() {
        let store = MarketingStore::new();
        let tracking = TrackingService::new(store.clone());
        let log = seed_log(&store, MessageStatus::Sent);
        let token = open_pixel(&store, &log);

        let t1 = Utc::now();
        let opened = tracking.record_open_at(&token, t1).unwrap();
        assert_eq!(opened.status, MessageStatus::Opened);
        assert_eq!(opened.opened_at, Some(t1));
        assert_eq!(opened.delivered_at, Some(t1));

        let again = tracking
            .record_open_at(&token, t1 + Duration::hours(1))
            .unwrap();
        assert_eq!(again.opened_at, Some(t1));
        assert_eq!(store.pixels.get(&token).unwrap().hits, 2);
    }

    #[test]
    fn test_click_redirects_and_never_regresses() {
        let store = MarketingStore::new();
        let tracking = TrackingService::new(store.clone());
        let log = seed_log(&store, MessageStatus::Sent);
        let link = tracking
            .create_click_link(log.id, "https://liyaqa.example/offer")
            .unwrap();

        let target = tracking.record_click(&link.token).unwrap();
        assert_eq!(target, "https://liyaqa.example/offer");
        assert_eq!(
            store.message_log(log.id).unwrap().status,
            MessageStatus::Clicked
        );

        let delivered = tracking.mark_delivered(log.id).unwrap();
        assert_eq!(delivered.status, MessageStatus::Clicked);
    }

    #[test]
    fn test_wrong_token_type_not_found() {
        let store = MarketingStore::new();
        let tracking = TrackingService::new(store.clone());
        let log = seed_log(&store, MessageStatus::Sent);
        let token = open_pixel(&store, &log);
        assert!(matches!(
            tracking.record_click(&token).unwrap_err(),
            LiyaqaError::NotFound(_)
        ));
        assert!(tracking.record_open("missing").is_err());
    }

    #[test]
    fn test_click_link_requires_http_url() {
        let store = MarketingStore::new();
        let tracking = TrackingService::new(store.clone());
        let log = seed_log(&store, MessageStatus::Sent);
        assert!(tracking.create_click_link(log.id, "not a url").is_err());
        assert!(tracking
            .create_click_link(log.id, "javascript:alert(1)")
            .is_err());
    }

    #[test]
    fn test_failed_message_stays_failed() {
        let store = MarketingStore::new();
        let tracking = TrackingService::new(store.clone());
        let log = seed_log(&store, MessageStatus::Sent);
        tracking.mark_failed(log.id, "bounced").unwrap();
        let after = tracking.mark_delivered(log.id).unwrap();
        assert_eq!(after.status, MessageStatus::Failed);
        assert_eq!(after.error_message.as_deref(), Some("bounced"));
    }
}
