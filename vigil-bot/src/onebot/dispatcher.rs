use super::dialect::Dialect;
use super::digest::render_digest;
use super::envelope::BotDestination;
use super::outcome::{judge, Verdict};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use vigil_common::{Clock, IntelligenceItem, SystemClock};
use vigil_http::{Auth, HttpClient, HttpError, RequestOpts};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("OneBot API URL is not configured")]
    MissingEndpoint,
    #[error("no OneBot destination configured: set a group id or a user id")]
    NoDestination,
    #[error("invalid OneBot API URL `{endpoint}`: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: HttpError,
    },
    #[error("failed to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to reach OneBot: {0}")]
    Transport(#[source] HttpError),
    #[error("HTTP error {status}, response: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("OneBot error: {message} (retcode: {retcode})")]
    Remote { retcode: i64, message: String },
}

impl DispatchError {
    /// Errors raised before any request is made.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            DispatchError::MissingEndpoint
                | DispatchError::NoDestination
                | DispatchError::InvalidEndpoint { .. }
        )
    }
}

/// Everything the dispatcher needs, fixed at construction.
#[derive(Clone)]
pub struct OneBotSettings {
    pub endpoint: String,
    pub access_token: Option<String>,
    /// Ids that are absent or not positive count as unconfigured.
    pub group_id: Option<i64>,
    pub user_id: Option<i64>,
    pub timeout: Duration,
}

impl std::fmt::Debug for OneBotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneBotSettings")
            .field("endpoint", &self.endpoint)
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("group_id", &self.group_id)
            .field("user_id", &self.user_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OneBotSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: None,
            group_id: None,
            user_id: None,
            timeout: Duration::from_secs(10),
        }
    }

    /// Configured destinations, group first.
    pub fn destinations(&self) -> Vec<BotDestination> {
        let mut out = Vec::with_capacity(2);
        if let Some(id) = self.group_id.filter(|id| *id > 0) {
            out.push(BotDestination::Group(id));
        }
        if let Some(id) = self.user_id.filter(|id| *id > 0) {
            out.push(BotDestination::PrivateUser(id));
        }
        out
    }

    fn token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Result of one destination's attempt.
#[derive(Debug)]
pub struct Delivery {
    pub destination: BotDestination,
    pub result: Result<(), DispatchError>,
}

/// One entry per attempted destination, in attempt order.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub deliveries: Vec<Delivery>,
}

impl DeliveryReport {
    pub fn succeeded(&self) -> usize {
        self.deliveries.iter().filter(|d| d.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.succeeded()
    }

    /// Collapse to a single result; when several destinations failed the last one wins.
    pub fn into_result(self) -> Result<(), DispatchError> {
        let mut last = Ok(());
        for delivery in self.deliveries {
            if let Err(e) = delivery.result {
                last = Err(e);
            }
        }
        last
    }
}

pub struct OneBotDispatcher {
    settings: OneBotSettings,
    clock: Arc<dyn Clock>,
}

impl OneBotDispatcher {
    pub fn new(settings: OneBotSettings) -> Self {
        Self {
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OneBotSettings {
        &self.settings
    }

    /// Render once and send to every configured destination.
    ///
    /// Configuration problems fail before any request. Per-destination failures
    /// are reported, never short-circuited.
    pub async fn deliver(
        &self,
        items: &[IntelligenceItem],
        label: &str,
    ) -> Result<DeliveryReport, DispatchError> {
        let endpoint = self.settings.endpoint.trim();
        if endpoint.is_empty() {
            return Err(DispatchError::MissingEndpoint);
        }
        let destinations = self.settings.destinations();
        if destinations.is_empty() {
            return Err(DispatchError::NoDestination);
        }
        let http = HttpClient::new(endpoint)
            .map_err(|source| DispatchError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })?
            .with_timeout(self.settings.timeout)
            .with_retries(0);

        let text = render_digest(items, label, self.clock.now());
        let dialect = Dialect::for_endpoint(endpoint);
        tracing::info!(
            items = items.len(),
            chars = text.chars().count(),
            destinations = destinations.len(),
            ?dialect,
            "onebot.send.start"
        );

        let mut report = DeliveryReport::default();
        for destination in destinations {
            let result = self
                .send_one(&http, dialect, endpoint, destination, &text)
                .await;
            match &result {
                Ok(()) => tracing::info!(%destination, "onebot.send.ok"),
                Err(e) => tracing::warn!(%destination, error = %e, "onebot.send.failed"),
            }
            report.deliveries.push(Delivery {
                destination,
                result,
            });
        }
        Ok(report)
    }

    /// [`deliver`](Self::deliver), collapsed to one result.
    pub async fn send(&self, items: &[IntelligenceItem], label: &str) -> Result<(), DispatchError> {
        self.deliver(items, label).await?.into_result()
    }

    async fn send_one(
        &self,
        http: &HttpClient,
        dialect: Dialect,
        endpoint: &str,
        destination: BotDestination,
        text: &str,
    ) -> Result<(), DispatchError> {
        let wire = dialect.encode(endpoint, &destination.envelope(text))?;
        let opts = RequestOpts {
            auth: self.settings.token().map(Auth::Bearer),
            allow_absolute: true,
            ..Default::default()
        };
        let resp = http
            .post_raw(&wire.url, wire.body, opts)
            .await
            .map_err(DispatchError::Transport)?;

        let status = resp.status.as_u16();
        match judge(status, &resp.body) {
            Verdict::Accepted(_) | Verdict::BareOk => Ok(()),
            Verdict::Rejected(outcome) => Err(DispatchError::Remote {
                retcode: outcome.retcode,
                message: outcome.message,
            }),
            Verdict::HttpFailure { status } => Err(DispatchError::HttpStatus {
                status,
                body: resp.text().into_owned(),
            }),
        }
    }
}
