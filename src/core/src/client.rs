use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use toolgate_protocol::{
    ApprovalCommand, ApprovalResponse, ExecutionRecord, ExecutionUpdate, NewExecution,
};
use url::Url;

use crate::approval::{classify, ApprovalTransport, TransportError};
use crate::config::ClientConfig;
use crate::server::ErrorBody;
use crate::storage::{ExecutionStore, StoreError};
use crate::toolgate_config::normalize_base_url;

/// HTTP client for a toolgate gateway.
///
/// Serves as both the execution store and the approval transport of a view.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
}

impl HttpGateway {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, String> {
        let base = normalize_base_url(base_url)?;
        let base = Url::parse(&base).map_err(|e| format!("invalid base_url: {e}"))?;
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| format!("failed to build http client: {e}"))?;
        Ok(Self { client, base })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, String> {
        Self::new(&config.base_url, config.request_timeout)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send_json<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response, TransportError> {
        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().await.map_err(TransportError::from_reqwest)
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, StoreError> {
    resp.json::<T>()
        .await
        .map_err(|e| StoreError::Transport(TransportError::from_reqwest(e)))
}

/// Map a non-success execution endpoint reply onto the store error it encodes.
async fn store_error(resp: reqwest::Response, tool_call_id: &str) -> StoreError {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorBody>(&text).ok();
    match (status, body) {
        (StatusCode::NOT_FOUND, _) => StoreError::NotFound(tool_call_id.to_string()),
        (
            StatusCode::CONFLICT,
            Some(ErrorBody {
                status: Some(current),
                ..
            }),
        ) => StoreError::AlreadyProcessed { status: current },
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Some(ErrorBody {
                from: Some(from),
                to: Some(to),
                ..
            }),
        ) => StoreError::InvalidTransition { from, to },
        (status, body) => {
            let message = body.map(|b| b.error).unwrap_or(text);
            let kind = classify(None, Some(status.as_u16()), Some(&message));
            StoreError::Transport(TransportError::new(kind, message))
        }
    }
}

impl ExecutionStore for HttpGateway {
    fn get<'a>(
        &'a self,
        tool_call_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ExecutionRecord>, StoreError>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tool-executions", tool_call_id]);
            let resp = self.send_json::<()>(Method::GET, url, None).await?;
            if resp.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !resp.status().is_success() {
                return Err(store_error(resp, tool_call_id).await);
            }
            decode(resp).await.map(Some)
        })
    }

    fn create<'a>(
        &'a self,
        new: &'a NewExecution,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tool-executions"]);
            let resp = self.send_json(Method::POST, url, Some(new)).await?;
            if !resp.status().is_success() {
                return Err(store_error(resp, &new.tool_call_id).await);
            }
            decode(resp).await
        })
    }

    fn update<'a>(
        &'a self,
        update: &'a ExecutionUpdate,
    ) -> BoxFuture<'a, Result<ExecutionRecord, StoreError>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tool-executions", &update.tool_call_id]);
            let resp = self.send_json(Method::PATCH, url, Some(update)).await?;
            if !resp.status().is_success() {
                return Err(store_error(resp, &update.tool_call_id).await);
            }
            decode(resp).await
        })
    }

    fn list_for_chat<'a>(
        &'a self,
        chat_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<ExecutionRecord>, StoreError>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "chats", chat_id, "tool-executions"]);
            let resp = self.send_json::<()>(Method::GET, url, None).await?;
            if !resp.status().is_success() {
                return Err(store_error(resp, chat_id).await);
            }
            decode(resp).await
        })
    }
}

impl ApprovalTransport for HttpGateway {
    fn send<'a>(
        &'a self,
        command: &'a ApprovalCommand,
    ) -> BoxFuture<'a, Result<ApprovalResponse, TransportError>> {
        Box::pin(async move {
            let url = self.endpoint(&["api", "tool-approval"]);
            let resp = self.send_json(Method::POST, url, Some(command)).await?;
            let status = resp.status();
            let text = resp.text().await.map_err(TransportError::from_reqwest)?;

            match serde_json::from_str::<ApprovalResponse>(&text) {
                Ok(response) if response.success || response.is_already_processed() => {
                    Ok(response)
                }
                Ok(response) => Err(TransportError::from_response(
                    &response,
                    Some(status.as_u16()),
                )),
                Err(_) if status.is_success() => Err(TransportError::new(
                    classify(None, None, Some(&text)),
                    format!("undecodable approval response: {text}"),
                )),
                Err(_) => {
                    let kind = classify(None, Some(status.as_u16()), Some(&text));
                    Err(TransportError::new(kind, format!("{status}: {text}")))
                }
            }
        })
    }
}
