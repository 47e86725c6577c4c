use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::info;

use crate::messaging::{MessagingFactory, RequestEnvelope, Result, RpcClient};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoResponse {
    pub text: String,
}

pub fn echo_answer(text: &str) -> String {
    format!("Response to {}", text)
}

fn respond(payload: &[u8]) -> anyhow::Result<Vec<u8>> {
    let request: EchoRequest =
        serde_json::from_slice(payload).context("Malformed echo request")?;
    info!("Answering echo request '{}'", request.text);

    let response = EchoResponse {
        text: echo_answer(&request.text),
    };
    Ok(serde_json::to_vec(&response)?)
}

/// Answers echo requests arriving on a request queue.
pub struct EchoResponder {
    queue_name: String,
    handle: JoinHandle<Result<()>>,
}

impl EchoResponder {
    pub async fn start(factory: &MessagingFactory, queue_name: &str) -> Result<Self> {
        let receiver = factory.message_receiver(queue_name).await?;
        let handle = receiver.spawn(|envelope: RequestEnvelope| async move {
            respond(&envelope.message).map(Some)
        });

        info!(queue = %queue_name, "Echo responder started");
        Ok(Self {
            queue_name: queue_name.to_string(),
            handle,
        })
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

impl Drop for EchoResponder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Client side of the echo exchange.
pub struct EchoService {
    client: RpcClient,
}

impl EchoService {
    pub async fn new(
        factory: &MessagingFactory,
        queue_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: factory.rpc_client(queue_name, timeout).await?,
        })
    }

    pub async fn echo(&self, text: &str) -> Result<String> {
        let request = serde_json::to_vec(&EchoRequest {
            text: text.to_string(),
        })?;

        let response = self.client.call(request).await?;
        let response: EchoResponse = serde_json::from_slice(&response)?;
        Ok(response.text)
    }
}
