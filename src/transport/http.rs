//! reqwest-backed transport

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use parking_lot::RwLock;
use reqwest::{Client, Method, StatusCode, Version};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Instrument, Span, debug, warn};

use crate::config::Config;
use crate::context::Key;
use crate::descriptor::InitContext;
use crate::error::{CallError, DescriptorError};
use crate::handlers::{Handler, Interceptor, Phase};
use crate::invoker::Invocation;
use crate::markers::keys::{BODY, HEADERS, HTTP_METHOD, URL};
use crate::markers::priority;

/// Connection settings of a client; clients with equal settings are shared
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for HttpConfig {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.client.connect_timeout.as_duration(),
            max_redirects: config.client.max_redirects,
            user_agent: config.client.user_agent.clone(),
        }
    }
}

impl HttpConfig {
    pub fn build_client(&self) -> Result<Client, DescriptorError> {
        Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(self.max_redirects))
            .build()
            .map_err(|e| DescriptorError::Transport(e.to_string()))
    }
}

/// What came back from the wire
#[derive(Debug)]
struct Exchange {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
}

type Pending = oneshot::Receiver<Result<Exchange, CallError>>;

const PENDING: Key<Pending> = Key::new("callbox.transport.pending");

/// Client chosen for a method when its descriptor is built
const CLIENT: Key<Client> = Key::new("callbox.transport.client");

/// Sends requests with [`reqwest::Client`]s shared per connection settings.
///
/// Invoke starts the exchange on a tokio task; After waits for it under the
/// call timeout. A timed-out exchange keeps running in the background and
/// its result is dropped.
pub struct ReqwestTransport {
    preset: Option<Client>,
    clients: RwLock<HashMap<HttpConfig, Client>>,
}

impl ReqwestTransport {
    /// A transport that sends everything through `client`, ignoring the
    /// connection settings in configuration
    pub fn with_client(client: Client) -> Self {
        Self {
            preset: Some(client),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// The client for `settings`, built on first use
    fn client_for(&self, settings: HttpConfig) -> Result<Client, DescriptorError> {
        if let Some(client) = &self.preset {
            return Ok(client.clone());
        }
        if let Some(client) = self.clients.read().get(&settings) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write();
        if let Some(client) = clients.get(&settings) {
            return Ok(client.clone());
        }
        debug!(settings = ?settings, "building http client");
        let client = settings.build_client()?;
        clients.insert(settings, client.clone());
        Ok(client)
    }

    fn client(inv: &Invocation<'_>) -> Result<Client, CallError> {
        inv.config()
            .get(&CLIENT)
            .cloned()
            .ok_or_else(|| CallError::Transport("http client not initialised".into()))
    }

    fn build_request(&self, inv: &Invocation<'_>) -> Result<reqwest::Request, CallError> {
        let url = inv.request.get(&URL).cloned().ok_or_else(|| {
            CallError::Encode(format!("{} has no request url", inv.descriptor().id()))
        })?;
        let method = inv.config().get(&HTTP_METHOD).cloned().unwrap_or(Method::GET);

        let mut request = Self::client(inv)?.request(method, url);
        if let Some(headers) = inv.request.get(&HEADERS) {
            request = request.headers(headers.clone());
        }
        if let Some(body) = inv.request.get(&BODY) {
            request = request.body(body.clone());
        }
        request
            .build()
            .map_err(|e| CallError::Encode(format!("invalid request: {}", e)))
    }
}

async fn exchange(client: Client, request: reqwest::Request) -> Result<Exchange, CallError> {
    let method = request.method().clone();
    let url = request.url().clone();
    debug!(%method, %url, "sending request");

    let response = client.execute(request).await.map_err(|e| {
        if e.is_timeout() {
            CallError::Transport(format!("request timed out: {}", e))
        } else if e.is_redirect() {
            CallError::Transport("too many redirects".into())
        } else {
            CallError::Transport(e.to_string())
        }
    })?;

    let status = response.status();
    let version = response.version();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| CallError::Transport(format!("failed to read body: {}", e)))?;

    debug!(%method, %url, status = status.as_u16(), size = body.len(), "response received");
    Ok(Exchange {
        status,
        version,
        headers,
        body,
    })
}

#[async_trait]
impl Interceptor for ReqwestTransport {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn phases(&self) -> &'static [Phase] {
        &[Phase::Invoke, Phase::After]
    }

    fn priority(&self) -> i32 {
        priority::TRANSPORT
    }

    fn init(&self, ctx: &mut InitContext<'_>) -> Result<(), DescriptorError> {
        let client = self.client_for(HttpConfig::from(ctx.settings()))?;
        ctx.config_mut().put(&CLIENT, client);
        ctx.register();
        Ok(())
    }

    async fn invoke(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        inv.response.reset_exchange();
        inv.response.remove(&PENDING);

        let request = match self.build_request(inv) {
            Ok(request) => request,
            Err(err) => {
                warn!(error = %err, "could not build request");
                inv.response.add_fatal_cause(err.clone());
                return Err(err);
            }
        };

        let client = Self::client(inv)?;
        let (tx, rx) = oneshot::channel();
        tokio::spawn(
            async move {
                // The receiver is gone once the call has timed out
                let _ = tx.send(exchange(client, request).await);
            }
            .instrument(Span::current()),
        );
        inv.response.put(&PENDING, rx);
        Ok(())
    }

    async fn after(&self, inv: &mut Invocation<'_>) -> Result<(), CallError> {
        let Some(pending) = inv.response.remove(&PENDING) else {
            return Ok(());
        };

        let timeout = inv.timeout();
        match tokio::time::timeout(timeout, pending).await {
            Ok(Ok(Ok(exchange))) => {
                inv.response.status = Some(exchange.status);
                inv.response.version = Some(exchange.version);
                inv.response.headers = exchange.headers;
                inv.response.body = Some(exchange.body);
            }
            Ok(Ok(Err(err))) => {
                debug!(error = %err, "exchange failed");
                inv.response.set_cause(err);
            }
            Ok(Err(_)) => {
                inv.response
                    .set_cause(CallError::Transport("exchange ended without a result".into()));
            }
            Err(_) => {
                warn!(timeout = ?timeout, attempt = inv.attempt(), "exchange timed out");
                inv.response.set_cause(CallError::Timeout(timeout));
            }
        }
        Ok(())
    }
}

impl Handler for ReqwestTransport {
    const NAME: &'static str = "callbox.transport.reqwest";
    const LABELS: &'static [&'static str] = &["reqwest", "async", "http"];
    const PRIMARY: bool = true;

    fn construct() -> Result<Self, String> {
        Ok(Self {
            preset: None,
            clients: RwLock::new(HashMap::new()),
        })
    }
}
