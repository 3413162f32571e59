//! Client side of the legacy HTTP+SSE MCP transport.
//!
//! The server opens with an `endpoint` event naming where to POST requests;
//! responses and notifications arrive as `message` events on the same stream.

use std::future::Future;

use futures::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Url;
use reqwest_eventsource::retry::Never;
use reqwest_eventsource::{Event, EventSource};
use rmcp::service::{RoleClient, RxJsonRpcMessage, TxJsonRpcMessage};
use rmcp::transport::Transport;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const INBOUND_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SseTransportError {
    #[error("invalid SSE url: {0}")]
    InvalidUrl(String),

    #[error("SSE stream error: {0}")]
    Stream(String),

    #[error("SSE stream closed before an endpoint event arrived")]
    NoEndpoint,

    #[error("posting message failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SSE transport closed")]
    Closed,
}

/// An rmcp client transport over a legacy SSE endpoint.
///
/// Every configured header is sent on the event-stream GET and on each POST.
pub struct SseClientTransport {
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    inbound: mpsc::Receiver<RxJsonRpcMessage<RoleClient>>,
    shutdown: CancellationToken,
}

impl SseClientTransport {
    /// Open the event stream and wait for the server to announce its message endpoint.
    pub async fn connect(url: &str, headers: HeaderMap) -> Result<Self, SseTransportError> {
        let base = Url::parse(url).map_err(|e| SseTransportError::InvalidUrl(format!("{url}: {e}")))?;
        let client = reqwest::Client::new();

        let request = client.get(base.clone()).headers(headers.clone());
        let mut events =
            EventSource::new(request).map_err(|e| SseTransportError::Stream(e.to_string()))?;
        events.set_retry_policy(Box::new(Never));

        let endpoint = loop {
            match events.next().await {
                Some(Ok(Event::Open)) => {}
                Some(Ok(Event::Message(message))) if message.event == "endpoint" => {
                    match base.join(message.data.trim()) {
                        Ok(endpoint) => break endpoint,
                        Err(e) => {
                            events.close();
                            return Err(SseTransportError::InvalidUrl(format!(
                                "endpoint {:?}: {e}",
                                message.data
                            )));
                        }
                    }
                }
                Some(Ok(Event::Message(message))) => {
                    debug!(event = %message.event, "ignoring SSE event before endpoint");
                }
                Some(Err(e)) => {
                    events.close();
                    return Err(SseTransportError::Stream(e.to_string()));
                }
                None => return Err(SseTransportError::NoEndpoint),
            }
        };
        debug!(url = %base, endpoint = %endpoint, "SSE endpoint discovered");

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let shutdown = CancellationToken::new();
        tokio::spawn(read_events(events, tx, shutdown.clone()));

        Ok(Self {
            client,
            endpoint,
            headers,
            inbound: rx,
            shutdown,
        })
    }

    /// The URL outbound messages are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

async fn read_events(
    mut events: EventSource,
    inbound: mpsc::Sender<RxJsonRpcMessage<RoleClient>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = events.next() => next,
        };
        match next {
            Some(Ok(Event::Message(message)))
                if message.event == "message" || message.event.is_empty() =>
            {
                match serde_json::from_str::<RxJsonRpcMessage<RoleClient>>(&message.data) {
                    Ok(parsed) => {
                        if inbound.send(parsed).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => warn!(%error, "ignoring unparseable SSE message"),
                }
            }
            Some(Ok(_)) => {}
            Some(Err(reqwest_eventsource::Error::StreamEnded)) | None => break,
            Some(Err(error)) => {
                warn!(%error, "SSE stream failed");
                break;
            }
        }
    }
    events.close();
}

impl Transport<RoleClient> for SseClientTransport {
    type Error = SseTransportError;

    fn send(
        &mut self,
        item: TxJsonRpcMessage<RoleClient>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'static {
        let closed = self.shutdown.is_cancelled();
        let request = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(&item);
        async move {
            if closed {
                return Err(SseTransportError::Closed);
            }
            request.send().await?.error_for_status()?;
            Ok(())
        }
    }

    async fn receive(&mut self) -> Option<RxJsonRpcMessage<RoleClient>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.shutdown.cancel();
        Ok(())
    }
}

impl Drop for SseClientTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_rejects_invalid_url() {
        let err = SseClientTransport::connect("not a url", HeaderMap::new())
            .await
            .err()
            .expect("invalid url should fail");
        assert!(matches!(err, SseTransportError::InvalidUrl(message) if message.contains("not a url")));
    }
}
