//! The resilient chat webhook client.

use std::sync::Arc;
use std::time::SystemTime;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    AttemptError, AttemptReport, HealthReport, HttpClient, HttpError, HttpRequest, RetryError,
    RetryScheduler, SendOptions, WebhookConfig, WebhookError,
};
use crate::breaker::{BreakerConfig, BreakerSnapshot, CircuitBreaker};
use crate::metrics::{
    Alert, DashboardData, MetricsAggregator, MetricsSnapshot, PerformanceRecord, SubscriptionId,
};
use crate::payload::{
    InboundResponse, OutboundPayload, ValidationErrors, format_timestamp, generate_request_id,
    validate_inbound, validate_outbound,
};
use crate::time::{Clock, Sleeper, SystemClock, TokioSleeper};

/// Correlation header carrying the request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A 2xx response with a schema-valid body.
#[derive(Debug)]
struct Delivered {
    status: http::StatusCode,
    response: InboundResponse,
}

/// Chat webhook client with validation, circuit breaking, retries and metrics.
///
/// One instance is meant to be shared (behind `Arc` if needed) by every
/// caller: the breaker and the metrics aggregator it owns are what make
/// concurrent sends aware of each other.
///
/// # Type Parameters
///
/// - `H`: The HTTP client implementation
/// - `S`: The sleeper used between retries (defaults to [`TokioSleeper`])
///
/// # Example
///
/// ```no_run
/// use chat_webhook::webhook::{ChatWebhook, ReqwestClient, SendOptions, WebhookConfig};
/// use url::Url;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = WebhookConfig::new(Url::parse("https://n8n.example.com/webhook/chat")?)
///     .with_secret("s3cret");
/// let webhook = ChatWebhook::new(ReqwestClient::new(), config);
///
/// let reply = webhook
///     .send_message(
///         "Hello",
///         "3f2b8c1e-9d4a-4f6b-8e2a-1c5d7e9f0a3b",
///         SendOptions::new(),
///     )
///     .await?;
/// println!("{}", reply.response);
/// # Ok(())
/// # }
/// ```
pub struct ChatWebhook<H, S = TokioSleeper> {
    client: H,
    scheduler: RetryScheduler<S>,
    config: WebhookConfig,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<MetricsAggregator>,
}

impl<H, S> std::fmt::Debug for ChatWebhook<H, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWebhook")
            .field("config", &self.config)
            .field("breaker", &self.breaker)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl<H> ChatWebhook<H, TokioSleeper> {
    /// Creates a client using the system clock and tokio timers.
    #[must_use]
    pub fn new(client: H, config: WebhookConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            client,
            scheduler: RetryScheduler::new(),
            breaker: Arc::new(CircuitBreaker::with_clock(config.breaker, clock.clone())),
            metrics: Arc::new(MetricsAggregator::with_clock(
                config.metrics.clone(),
                clock.clone(),
            )),
            config,
            clock,
        }
    }
}

impl<H, S> ChatWebhook<H, S> {
    /// Sets a custom sleeper for retry delays.
    #[must_use]
    pub fn with_sleeper<S2: Sleeper>(self, sleeper: S2) -> ChatWebhook<H, S2> {
        ChatWebhook {
            client: self.client,
            scheduler: RetryScheduler::with_sleeper(sleeper),
            config: self.config,
            clock: self.clock,
            breaker: self.breaker,
            metrics: self.metrics,
        }
    }

    /// Replaces the clock used for timestamps, the breaker and metrics.
    ///
    /// The breaker and aggregator are recreated, so call this before
    /// sending anything.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.breaker = Arc::new(CircuitBreaker::with_clock(
            self.config.breaker,
            clock.clone(),
        ));
        self.metrics = Arc::new(MetricsAggregator::with_clock(
            self.config.metrics.clone(),
            clock.clone(),
        ));
        self.clock = clock;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &WebhookConfig {
        &self.config
    }

    /// Returns the underlying HTTP client.
    #[must_use]
    pub const fn client(&self) -> &H {
        &self.client
    }

    /// Returns the current aggregated metrics.
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the dashboard view of the metrics.
    #[must_use]
    pub fn dashboard_data(&self) -> DashboardData {
        self.metrics.dashboard_data()
    }

    /// Returns the breaker's configuration.
    #[must_use]
    pub fn circuit_breaker_config(&self) -> BreakerConfig {
        self.breaker.config()
    }

    /// Returns the breaker's current state.
    #[must_use]
    pub fn circuit_breaker_state(&self) -> BreakerSnapshot {
        self.breaker.state()
    }

    /// Forces the breaker closed.
    pub fn reset_circuit_breaker(&self) {
        self.breaker.reset();
    }

    /// Drops every recorded metric.
    pub fn clear_metrics(&self) {
        self.metrics.clear();
    }

    /// Registers a callback invoked for every fired alert.
    pub fn subscribe_alerts<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Alert) + Send + Sync + 'static,
    {
        self.metrics.subscribe_alerts(callback)
    }

    /// Removes an alert subscription. Returns false if it was not registered.
    pub fn unsubscribe_alerts(&self, id: SubscriptionId) -> bool {
        self.metrics.unsubscribe_alerts(id)
    }

    /// Adds the headers common to sends and probes.
    fn authorize(&self, request: HttpRequest) -> Result<HttpRequest, ValidationErrors> {
        let Some(secret) = &self.config.secret else {
            return Ok(request);
        };
        let value = http::HeaderValue::try_from(format!("Bearer {secret}"))
            .map_err(|_| ValidationErrors::single("secret", "is not a valid header value"))?;
        Ok(request.with_header(http::header::AUTHORIZATION, value))
    }

    fn build_payload(
        &self,
        message: &str,
        user_id: &str,
        options: &SendOptions,
        now: SystemTime,
    ) -> OutboundPayload {
        let mut payload = OutboundPayload::new(
            message,
            user_id,
            format_timestamp(now),
            generate_request_id(now),
            self.config.client_version.as_str(),
        );
        if let Some(id) = &options.conversation_id {
            payload = payload.with_conversation_id(id.as_str());
        }
        if let Some(metadata) = &options.metadata {
            payload = payload.with_metadata(metadata.clone());
        }
        payload
    }

    fn build_request(&self, payload: &OutboundPayload) -> Result<HttpRequest, ValidationErrors> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| ValidationErrors::single("payload", e.to_string()))?;
        let request_id = http::HeaderValue::try_from(payload.request_id.as_str())
            .map_err(|_| ValidationErrors::single("requestId", "is not a valid header value"))?;

        let request = HttpRequest::post(self.config.url.clone())
            .with_json_body(body)
            .with_header(http::HeaderName::from_static(REQUEST_ID_HEADER), request_id);
        self.authorize(request)
    }

    fn observe(&self, report: &AttemptReport<'_, Delivered, AttemptError>, request_id: &str) {
        if !self.config.monitoring_enabled {
            return;
        }
        let now = self.clock.now();
        let record = match report.outcome {
            Ok(delivered) => PerformanceRecord::success(now, report.duration)
                .with_status(delivered.status.as_u16()),
            Err(error) => {
                let record = PerformanceRecord::failure(now, report.duration, error.kind());
                match error.status() {
                    Some(status) => record.with_status(status.as_u16()),
                    None => record,
                }
            }
        };
        self.metrics.record_attempt(
            record
                .with_attempt(report.attempt)
                .with_request_id(request_id),
        );
    }
}

impl<H: HttpClient, S: Sleeper> ChatWebhook<H, S> {
    /// Sends one chat message and returns the workflow's reply.
    ///
    /// The request ID is generated here and reused by every retry. The
    /// breaker sees one outcome per call, however many attempts it took;
    /// metrics see every attempt. A valid reply with `success: false` is
    /// returned as `Ok`.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::Validation`] if the payload or the reply breaks its schema
    /// - [`WebhookError::CircuitOpen`] if the breaker rejects the send
    /// - [`WebhookError::Network`], [`WebhookError::Timeout`] or
    ///   [`WebhookError::Http`] when the final attempt failed
    /// - [`WebhookError::Cancelled`] if the options' token fired
    pub async fn send_message(
        &self,
        message: &str,
        user_id: &str,
        options: SendOptions,
    ) -> Result<InboundResponse, WebhookError> {
        let now = self.clock.now();
        let payload = self.build_payload(message, user_id, &options, now);

        let request = match validate_outbound(&payload).and_then(|()| self.build_request(&payload))
        {
            Ok(request) => request,
            Err(errors) => {
                tracing::debug!(request_id = %payload.request_id, "Payload rejected: {errors}");
                if self.config.monitoring_enabled {
                    self.metrics.record_validation_failure();
                }
                return Err(WebhookError::Validation(errors));
            }
        };

        let Some(permit) = self.breaker.try_acquire() else {
            let error = self.breaker.open_error();
            tracing::warn!(request_id = %payload.request_id, "Send rejected: {error}");
            if self.config.monitoring_enabled {
                self.metrics.record_circuit_rejection();
            }
            return Err(WebhookError::CircuitOpen(error));
        };

        let cancel = options.cancel.unwrap_or_else(CancellationToken::new);
        let request_id = payload.request_id.as_str();
        let result = self
            .scheduler
            .execute(
                &self.config.retry,
                &cancel,
                |attempt| self.attempt(request.clone(), request_id, attempt),
                |report| self.observe(report, request_id),
            )
            .await;

        match result {
            Ok(delivered) => {
                permit.succeed();
                tracing::debug!(request_id, "Send succeeded");
                Ok(delivered.response)
            }
            Err(RetryError::Cancelled { attempts }) => {
                drop(permit);
                tracing::debug!(request_id, attempts, "Send cancelled");
                Err(WebhookError::Cancelled { attempts })
            }
            Err(
                RetryError::Exhausted {
                    attempts,
                    last_error: error,
                }
                | RetryError::Aborted { attempts, error },
            ) => {
                permit.fail();
                Err(WebhookError::from_attempt(
                    error,
                    attempts,
                    self.config.timeout,
                ))
            }
        }
    }

    async fn attempt(
        &self,
        request: HttpRequest,
        request_id: &str,
        attempt: u32,
    ) -> Result<Delivered, AttemptError> {
        tracing::debug!(request_id, attempt, "Posting to webhook");

        let response =
            match tokio::time::timeout(self.config.timeout, self.client.request(request)).await {
                Ok(response) => response?,
                Err(_) => return Err(HttpError::Timeout.into()),
            };

        if !response.is_success() {
            return Err(AttemptError::Status {
                status: response.status,
                body: response.body_text().map(ToString::to_string),
            });
        }

        let reply = validate_inbound(&response.body).map_err(AttemptError::InvalidResponse)?;
        Ok(Delivered {
            status: response.status,
            response: reply,
        })
    }

    /// Probes the endpoint and classifies its health.
    ///
    /// Sends `GET` to the health URL under the probe timeout. A 2xx within
    /// the latency budget is healthy, a slow 2xx is degraded, anything
    /// else is unhealthy. Never fails, and leaves the breaker and the
    /// metrics untouched.
    pub async fn health_check(&self) -> HealthReport {
        let health = &self.config.health;
        let started = Instant::now();

        let request = match self.authorize(HttpRequest::get(self.config.health_url().clone())) {
            Ok(request) => request,
            Err(errors) => {
                return HealthReport::failed(
                    started.elapsed(),
                    self.clock.now(),
                    None,
                    errors.to_string(),
                );
            }
        };

        let result = tokio::time::timeout(health.timeout, self.client.request(request)).await;
        let latency = started.elapsed();
        let checked_at = self.clock.now();

        let report = match result {
            Err(_) => HealthReport::failed(
                latency,
                checked_at,
                None,
                format!("probe timed out after {:?}", health.timeout),
            ),
            Ok(Err(e)) => HealthReport::failed(latency, checked_at, None, e.to_string()),
            Ok(Ok(response)) if !response.is_success() => HealthReport::failed(
                latency,
                checked_at,
                Some(response.status.as_u16()),
                format!("unexpected status {}", response.status),
            ),
            Ok(Ok(response)) => HealthReport::answered(
                response.status.as_u16(),
                latency,
                health.latency_budget,
                checked_at,
            ),
        };

        tracing::debug!(status = %report.status, latency = ?report.latency, "Health probe finished");
        report
    }
}
