use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, trace};

use crate::command::Command;
use crate::control::Device;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    DEFAULT_PORT, READ_PATH, WRITE_PATH, WriteRequest, parse_system, parse_write_response,
};
use crate::types::System;
use crate::{Error, Result};

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

pub struct MyPlaceClientBuilder {
    host: String,
    port: u16,
    read_timeout: Duration,
    retry_delay: Duration,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl MyPlaceClientBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            log_mode: None,
            log_path: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Upper bound on how long `read` keeps retrying mid-update payloads.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<MyPlaceClient> {
        let http = reqwest::Client::builder().build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(Mutex::new(MessageLogger::new(mode, &path)?)),
            _ => None,
        };

        Ok(MyPlaceClient {
            http,
            base_url: format!("http://{}:{}", self.host, self.port),
            read_timeout: self.read_timeout,
            retry_delay: self.retry_delay,
            logger,
        })
    }
}

/// HTTP client for the MyPlace touch panel.
pub struct MyPlaceClient {
    http: reqwest::Client,
    base_url: String,
    read_timeout: Duration,
    retry_delay: Duration,
    logger: Option<Mutex<MessageLogger>>,
}

impl MyPlaceClient {
    pub fn builder(host: impl Into<String>) -> MyPlaceClientBuilder {
        MyPlaceClientBuilder::new(host)
    }

    /// Read the whole system, waiting out the empty payloads the panel serves
    /// for a few seconds after each accepted write.
    pub async fn read(&self) -> Result<System> {
        match tokio::time::timeout(self.read_timeout, self.read_until_ready()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        }
    }

    async fn read_until_ready(&self) -> Result<System> {
        loop {
            let system = self.read_once().await?;
            if !system.is_mid_update() {
                return Ok(system);
            }
            trace!("read: device is mid-update, retrying");
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    async fn read_once(&self) -> Result<System> {
        let url = format!("{}{READ_PATH}", self.base_url);
        self.log(|logger| logger.log_request("GET", READ_PATH));

        let body = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        self.log(|logger| {
            let body_json = serde_json::from_str(&body).unwrap_or(Value::Null);
            logger.log_read(&body_json);
        });

        parse_system(&body)
    }

    /// Merge `commands` into one request and send it.
    pub async fn write(&self, commands: &[Command]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let request = WriteRequest::from_commands(commands);
        let json = request.to_json()?;
        debug!(count = commands.len(), body = %json, "writing commands");

        self.log(|logger| {
            let descriptions: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
            let body_json = serde_json::from_str(&json).unwrap_or(Value::Null);
            logger.log_write(&descriptions, &body_json);
        });

        let url = format!("{}{WRITE_PATH}", self.base_url);
        let body = self
            .http
            .get(&url)
            .query(&[("json", json.as_str())])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_write_response(&body)
    }

    fn log(&self, f: impl FnOnce(&mut MessageLogger)) {
        if let Some(logger) = &self.logger
            && let Ok(mut logger) = logger.lock()
        {
            f(&mut logger);
        }
    }
}

impl Device for MyPlaceClient {
    async fn read(&self) -> Result<System> {
        MyPlaceClient::read(self).await
    }

    async fn write(&self, commands: &[Command]) -> Result<()> {
        MyPlaceClient::write(self, commands).await
    }
}
