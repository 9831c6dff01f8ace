// mod.rs — Subcommands and the daemon HTTP client they share.

pub mod adjust;
pub mod requests;
pub mod schedule;
pub mod watch;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

const ROLE_HEADER: &str = "x-role";
const ACTOR_HEADER: &str = "x-actor";

/// Thin JSON client for the daemon's HTTP API.
pub struct Daemon {
    client: reqwest::Client,
    base: String,
    role: Option<String>,
    actor: Option<String>,
    pub raw_json: bool,
}

impl Daemon {
    pub fn new(base: &str, raw_json: bool) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("building HTTP client")?;
        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            role: None,
            actor: None,
            raw_json,
        })
    }

    /// Send `X-Role` and `X-Actor` with every request. Blank values are dropped.
    pub fn with_identity(mut self, role: Option<String>, actor: Option<String>) -> Self {
        self.role = role.filter(|r| !r.trim().is_empty());
        self.actor = actor.filter(|a| !a.trim().is_empty());
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(role) = &self.role {
            builder = builder.header(ROLE_HEADER, role);
        }
        if let Some(actor) = &self.actor {
            builder = builder.header(ACTOR_HEADER, actor);
        }
        builder
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let response = self
            .request(reqwest::Method::GET, path)
            .send()
            .await
            .with_context(|| format!("GET {}{}", self.base, path))?;
        decode(response).await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let response = self
            .request(reqwest::Method::POST, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {}{}", self.base, path))?;
        decode(response).await
    }

    pub async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<T> {
        let response = self
            .request(reqwest::Method::PUT, path)
            .json(body)
            .send()
            .await
            .with_context(|| format!("PUT {}{}", self.base, path))?;
        decode(response).await
    }

    /// Print the value as pretty JSON when `--json` was given. Returns
    /// whether it did, so callers can skip their table output.
    pub fn print_raw(&self, value: &impl Serialize) -> anyhow::Result<bool> {
        if self.raw_json {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(self.raw_json)
    }
}

/// Decode a daemon reply, turning `{ ok: false, reason, message }` into an error.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> anyhow::Result<T> {
    let status = response.status();
    tracing::debug!(url = %response.url(), status = status.as_u16(), "daemon replied");
    let body: Value = response.json().await.context("daemon sent a non-JSON reply")?;
    if !status.is_success() || body.get("ok") == Some(&Value::Bool(false)) {
        let reason = body["reason"].as_str().unwrap_or("error");
        let message = body["message"].as_str().unwrap_or("");
        return Err(anyhow!("{} ({}): {}", reason, status.as_u16(), message));
    }
    Ok(serde_json::from_value(body)?)
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
