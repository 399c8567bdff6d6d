use futures::future::BoxFuture;
use serde_json::Value;

use leadflow_core::config::HttpMethod;
use leadflow_core::traits::Transport;
use leadflow_core::types::{CallFailure, ProviderRequest};

/// Default transport: JSON over HTTPS via reqwest.
///
/// The credential travels as a query parameter named by the tool's
/// `credential_param`. GET requests carry params in the query string, POST
/// requests carry them in the query string too and send `body` as JSON.
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("leadflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ProviderRequest) -> BoxFuture<'_, Result<Value, CallFailure>> {
        Box::pin(async move {
            if request.endpoint.is_empty() {
                return Err(CallFailure::Transport(format!(
                    "no endpoint configured for {}",
                    request.provider
                )));
            }

            let mut query = request.params.clone();
            query.push((request.credential_param.clone(), request.credential.clone()));

            let builder = match request.method {
                HttpMethod::Get => self.http.get(&request.endpoint),
                HttpMethod::Post => {
                    let b = self.http.post(&request.endpoint);
                    match &request.body {
                        Some(body) => b.json(body),
                        None => b.json(&serde_json::json!({})),
                    }
                }
            };

            let resp = builder
                .query(&query)
                .send()
                .await
                .map_err(|e| CallFailure::Transport(e.without_url().to_string()))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(CallFailure::Status(status.as_u16()));
            }

            resp.json::<Value>()
                .await
                .map_err(|e| CallFailure::Parse(e.without_url().to_string()))
        })
    }
}
