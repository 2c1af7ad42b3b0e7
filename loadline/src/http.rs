use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::Client;

use crate::{
    metric::{FailureKind, Outcome},
    target::Target,
};

/// One client for the whole run. Its connection pool is shared by every
/// worker.
pub fn client(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(request_timeout)
        .connect_timeout(request_timeout)
        .build()
}

/// POST the target's payload and drain the response body, so transfer time is
/// part of the measured latency.
pub async fn issue(client: &Client, target: &Target) -> Outcome {
    let mut response = match client
        .post(target.endpoint.clone())
        .json(&target.payload)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::trace!(endpoint = %target.endpoint, "request failed: {e}");
            return Outcome::Failed(classify(&e));
        }
    };

    let status = response.status().as_u16();
    loop {
        match response.chunk().await {
            Ok(Some(_)) => {}
            Ok(None) => return Outcome::Status(status),
            Err(e) => {
                tracing::trace!(endpoint = %target.endpoint, status, "body failed: {e}");
                return Outcome::Failed(if e.is_timeout() {
                    FailureKind::Timeout
                } else {
                    FailureKind::Body
                });
            }
        }
    }
}

/// Worker action issuing every request through `client`.
pub fn action(
    client: Client,
) -> impl Fn(Arc<Target>) -> BoxFuture<'static, Outcome> + Send + Sync + Clone + 'static {
    move |target: Arc<Target>| {
        let client = client.clone();
        Box::pin(async move { issue(&client, &target).await })
    }
}

fn classify(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_connect() {
        FailureKind::Connect
    } else if e.is_body() || e.is_decode() {
        FailureKind::Body
    } else {
        FailureKind::Other
    }
}
