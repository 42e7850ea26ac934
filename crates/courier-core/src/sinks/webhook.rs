//! Webhook sink: one JSON POST per attempt.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::redirect;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::config::WebhookSettings;
use crate::domain::{ConnectionContext, EventId, EventKind, NotificationEvent, WebhookAuth, WebhookDestination};
use crate::error::CourierError;
use crate::ports::Clock;
use crate::queue::{Deliver, DeliveryQueue};
use crate::redact::redact;
use crate::resolve::resolve_webhook;

/// Payload of the notification queue.
///
/// The body is serialized and redacted once, at enqueue time.
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub event_id: EventId,
    pub kind: EventKind,
    pub body: Value,
    pub destination: WebhookDestination,
}

#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(settings: &WebhookSettings) -> Result<Self, CourierError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("courier/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.timeout())
            .redirect(redirect::Policy::limited(settings.max_redirects))
            .build()?;
        Ok(Self { http })
    }

    /// POST `body` to the destination. Anything but 2xx is an error.
    pub async fn post(
        &self,
        destination: &WebhookDestination,
        body: &Value,
    ) -> Result<reqwest::StatusCode, CourierError> {
        let mut request = self.http.post(&destination.url).json(body);
        request = match &destination.auth {
            WebhookAuth::None => request,
            WebhookAuth::Bearer { token } => request.bearer_auth(token),
            WebhookAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };

        let status = request.send().await?.status();
        if !status.is_success() {
            return Err(CourierError::HttpStatus(status));
        }
        Ok(status)
    }
}

/// `Deliver` impl for the notification queue.
pub struct WebhookSink {
    client: WebhookClient,
}

impl WebhookSink {
    pub fn new(client: WebhookClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Deliver<NotificationJob> for WebhookSink {
    async fn deliver(&self, job: &NotificationJob) -> Result<(), CourierError> {
        let status = self.client.post(&job.destination, &job.body).await?;
        debug!(event = %job.event_id, kind = %job.kind, status = status.as_u16(), "notification delivered");
        Ok(())
    }

    async fn abandoned(&self, job: &NotificationJob, reason: &str) {
        error!(
            event = %job.event_id,
            kind = %job.kind,
            url = %job.destination.url,
            error = reason,
            "notification dropped"
        );
    }
}

/// Builds events and puts them on the notification queue.
#[derive(Clone)]
pub struct Notifier {
    queue: DeliveryQueue<NotificationJob>,
    settings: Arc<WebhookSettings>,
    clock: Arc<dyn Clock>,
}

impl Notifier {
    pub fn new(
        queue: DeliveryQueue<NotificationJob>,
        settings: WebhookSettings,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queue,
            settings: Arc::new(settings),
            clock,
        }
    }

    pub fn queue(&self) -> &DeliveryQueue<NotificationJob> {
        &self.queue
    }

    /// Enqueue one event.
    ///
    /// Returns `Ok(None)` when the kind is filtered out by configuration.
    pub async fn notify(
        &self,
        kind: EventKind,
        session_id: &str,
        context: &ConnectionContext,
        extra: Map<String, Value>,
    ) -> Result<Option<EventId>, CourierError> {
        if !self.settings.wants(kind) {
            debug!(kind = %kind, session = session_id, "event kind filtered out");
            return Ok(None);
        }

        let destination = resolve_webhook(&self.settings)?;
        let event = NotificationEvent::new(kind, session_id, context.clone(), self.clock.now())
            .with_extra(extra);
        let mut body = event.to_body();
        redact(&mut body);

        let job = NotificationJob {
            event_id: event.id,
            kind,
            body,
            destination,
        };
        let task = self.queue.enqueue(job).await;
        debug!(event = %event.id, kind = %kind, task = %task, session = session_id, "notification enqueued");
        Ok(Some(event.id))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;
    use crate::ports::FixedClock;
    use crate::queue::RetryPolicy;
    use crate::testing::{Receiver, spawn_receiver};

    fn settings(url: &str) -> WebhookSettings {
        WebhookSettings {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    fn destination(url: &str, auth: WebhookAuth) -> WebhookDestination {
        WebhookDestination {
            url: url.to_string(),
            auth,
        }
    }

    #[tokio::test]
    async fn non_2xx_is_a_failed_attempt() {
        let receiver = Receiver::new(1);
        let url = spawn_receiver(receiver.clone()).await;
        let client = WebhookClient::new(&settings(&url)).unwrap();
        let dest = destination(&url, WebhookAuth::None);

        let err = client.post(&dest, &json!({"a": 1})).await.unwrap_err();
        assert!(matches!(err, CourierError::HttpStatus(s) if s.as_u16() == 503));

        let status = client.post(&dest, &json!({"a": 1})).await.unwrap();
        assert_eq!(status.as_u16(), 204);
        assert_eq!(receiver.calls(), 2);
    }

    #[tokio::test]
    async fn bearer_and_basic_credentials_are_attached() {
        let receiver = Receiver::new(0);
        let url = spawn_receiver(receiver.clone()).await;
        let client = WebhookClient::new(&settings(&url)).unwrap();

        let bearer = destination(&url, WebhookAuth::Bearer { token: "t0k3n".into() });
        client.post(&bearer, &json!({})).await.unwrap();
        let basic = destination(
            &url,
            WebhookAuth::Basic {
                username: "alice".into(),
                password: "pw".into(),
            },
        );
        client.post(&basic, &json!({})).await.unwrap();
        client.post(&destination(&url, WebhookAuth::None), &json!({})).await.unwrap();

        let got: Vec<_> = receiver
            .accepted()
            .await
            .into_iter()
            .map(|r| r.authorization)
            .collect();
        assert_eq!(
            got,
            vec![
                Some("Bearer t0k3n".to_string()),
                // base64("alice:pw")
                Some("Basic YWxpY2U6cHc=".to_string()),
                None,
            ]
        );
    }

    #[tokio::test]
    async fn redirects_are_bounded() {
        let receiver = Receiver::new(0);
        let url = spawn_receiver(receiver.clone()).await;
        let moved = url.replace("/hook", "/moved");

        let follows = WebhookClient::new(&settings(&url)).unwrap();
        follows
            .post(&destination(&moved, WebhookAuth::None), &json!({}))
            .await
            .unwrap();
        assert_eq!(receiver.calls(), 1);

        let strict = WebhookClient::new(&WebhookSettings {
            max_redirects: 0,
            ..settings(&url)
        })
        .unwrap();
        let err = strict
            .post(&destination(&moved, WebhookAuth::None), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Http(_)));
        assert_eq!(receiver.calls(), 1);
    }

    fn notifier(settings: WebhookSettings) -> Notifier {
        let client = WebhookClient::new(&settings).unwrap();
        let queue = DeliveryQueue::<NotificationJob>::new(
            "notifications",
            RetryPolicy {
                base_delay: std::time::Duration::from_millis(10),
                poll_interval: std::time::Duration::from_millis(5),
                ..RetryPolicy::notifications()
            },
            Arc::new(WebhookSink::new(client)),
        );
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        Notifier::new(queue, settings, Arc::new(FixedClock::new(at)))
    }

    #[tokio::test]
    async fn notify_posts_redacted_event() {
        let receiver = Receiver::new(1);
        let url = spawn_receiver(receiver.clone()).await;
        let notifier = notifier(settings(&url));
        let ctx = ConnectionContext::new()
            .with_meta("userId", "u1")
            .with_meta("password", "hunter2");

        let id = notifier
            .notify(EventKind::SessionStarted, "s-1", &ctx, Map::new())
            .await
            .unwrap()
            .unwrap();
        notifier.queue().drain().await;

        let got = receiver.accepted().await;
        assert_eq!(got.len(), 1);
        assert_eq!(receiver.calls(), 2);
        let body = &got[0].body;
        assert_eq!(body["eventId"], json!(id.to_string()));
        assert_eq!(body["event"], json!("session.started"));
        assert_eq!(body["sessionId"], json!("s-1"));
        assert_eq!(body["timestamp"], json!("2024-05-01T08:30:00.000Z"));
        assert_eq!(body["connection"], json!({"userId": "u1", "password": "[REDACTED]"}));
    }

    #[tokio::test]
    async fn filtered_kind_is_not_enqueued() {
        let notifier = notifier(WebhookSettings {
            events: vec![EventKind::RecordingDelivered],
            ..settings("http://127.0.0.1:9/hook")
        });

        let id = notifier
            .notify(EventKind::SessionStarted, "s-1", &ConnectionContext::new(), Map::new())
            .await
            .unwrap();

        assert!(id.is_none());
        assert_eq!(notifier.queue().status().await.pending, 0);
        assert!(!notifier.queue().status().await.draining);
    }

    #[tokio::test]
    async fn missing_url_is_returned_not_enqueued() {
        let notifier = notifier(WebhookSettings::default());

        let err = notifier
            .notify(EventKind::SessionEnded, "s-1", &ConnectionContext::new(), Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CourierError::NoDestinationConfigured(_)));
        assert!(notifier.queue().status().await.is_idle());
    }
}
