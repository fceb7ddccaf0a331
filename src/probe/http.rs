use crate::pipeline::completion::{completion, Completion, CompletionSignal};
use crate::pipeline::request::HttpProbeCmd;
use crate::toolkit::HttpProbe;
use anyhow::{Context, Result};
use reqwest::{Client, Method};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Requests sent per command and target before giving up
pub const PROBE_ATTEMPTS: usize = 3;

const RETRY_DELAY: Duration = Duration::from_secs(1);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends the probe commands to every published port, then fires its completion
pub struct ReqwestHttpProbe {
    client: Client,
    targets: Vec<String>,
    commands: Vec<HttpProbeCmd>,
    retry_delay: Duration,
    done: Option<Completion>,
    signal: Option<CompletionSignal>,
    task: Option<JoinHandle<()>>,
}

impl ReqwestHttpProbe {
    pub fn with_targets(targets: Vec<String>, commands: Vec<HttpProbeCmd>) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(true)
            .build()
            .context("Failed to create HTTP client")?;
        let (done, signal) = completion();

        Ok(Self {
            client,
            targets,
            commands,
            retry_delay: RETRY_DELAY,
            done: Some(done),
            signal: Some(signal),
            task: None,
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl HttpProbe for ReqwestHttpProbe {
    fn start(&mut self) {
        let Some(done) = self.done.take() else {
            debug!("HTTP probe already started");
            return;
        };

        if self.targets.is_empty() {
            warn!("HTTP probe has no published ports to call");
            done.fire();
            return;
        }

        let client = self.client.clone();
        let targets = self.targets.clone();
        let commands = self.commands.clone();
        let delay = self.retry_delay;

        self.task = Some(tokio::spawn(async move {
            for command in &commands {
                for target in &targets {
                    call(&client, target, command, delay).await;
                }
            }
            done.fire();
        }));
    }

    fn done_signal(&mut self) -> Option<CompletionSignal> {
        self.signal.take()
    }
}

impl Drop for ReqwestHttpProbe {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn call(client: &Client, target: &str, command: &HttpProbeCmd, delay: Duration) {
    let url = probe_url(target, command);
    let method = match Method::from_bytes(command.method.as_bytes()) {
        Ok(method) => method,
        Err(e) => {
            warn!("HTTP probe skipped {}: invalid method: {}", command, e);
            return;
        }
    };

    for attempt in 1..=PROBE_ATTEMPTS {
        match client.request(method.clone(), &url).send().await {
            Ok(response) => {
                info!(
                    "HTTP probe {} {} => {}",
                    method,
                    url,
                    response.status().as_u16()
                );
                return;
            }
            Err(e) => {
                debug!(attempt, "HTTP probe {} {} failed: {}", method, url, e);
            }
        }
        if attempt < PROBE_ATTEMPTS {
            tokio::time::sleep(delay).await;
        }
    }

    warn!(
        "HTTP probe {} {} failed after {} attempts",
        method, url, PROBE_ATTEMPTS
    );
}

/// Joins a `http://host:port` target with a command's protocol and resource
pub fn probe_url(target: &str, command: &HttpProbeCmd) -> String {
    let authority = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target)
        .trim_end_matches('/');
    format!("{}://{}{}", command.protocol, authority, command.resource)
}
