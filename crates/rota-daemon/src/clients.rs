//! HTTP implementations of the external collaborators.
//!
//! Each client POSTs the JSON request body to its configured URL and decodes
//! the JSON reply. Transport failures and non-2xx replies become
//! [`ChangeSetError::Collaborator`].

use std::time::Duration;

use async_trait::async_trait;
use rota_changeset::{
    Candidate, ChangeSetError, OptimizeRequest, OptimizeResponse, Optimizer, ParseRequest,
    ParseResponse, RankRequest, RuleParser, Shift, SuggestionRanker,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A JSON-over-HTTP endpoint.
#[derive(Debug, Clone)]
pub struct JsonEndpoint {
    client: reqwest::Client,
    url: String,
}

impl JsonEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChangeSetError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChangeSetError::Collaborator(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<Req: Serialize + ?Sized, Resp: DeserializeOwned>(
        &self,
        body: &Req,
    ) -> Result<Resp, ChangeSetError> {
        let response = self
            .client
            .post(&self.url)
            .json(body)
            .send()
            .await
            .map_err(|e| ChangeSetError::Collaborator(format!("{}: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %self.url, status = status.as_u16(), "collaborator returned error status");
            return Err(ChangeSetError::Collaborator(format!(
                "{} returned HTTP {}",
                self.url,
                status.as_u16()
            )));
        }
        response
            .json::<Resp>()
            .await
            .map_err(|e| ChangeSetError::Collaborator(format!("{}: bad response: {}", self.url, e)))
    }
}

pub struct HttpOptimizer(pub JsonEndpoint);

#[async_trait]
impl Optimizer for HttpOptimizer {
    async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizeResponse, ChangeSetError> {
        self.0.call(request).await
    }
}

pub struct HttpRuleParser(pub JsonEndpoint);

#[async_trait]
impl RuleParser for HttpRuleParser {
    async fn parse(&self, request: &ParseRequest) -> Result<ParseResponse, ChangeSetError> {
        self.0.call(request).await
    }
}

/// Wire body for the remote ranker: the rank request plus the schedule it
/// should rank against.
#[derive(Serialize)]
struct RankCall<'a> {
    #[serde(flatten)]
    request: &'a RankRequest,
    shifts: &'a [Shift],
}

#[derive(Deserialize)]
struct RankReply {
    candidates: Vec<Candidate>,
}

pub struct HttpRanker(pub JsonEndpoint);

#[async_trait]
impl SuggestionRanker for HttpRanker {
    async fn rank(
        &self,
        request: &RankRequest,
        current: &[Shift],
    ) -> Result<Vec<Candidate>, ChangeSetError> {
        let reply: RankReply = self
            .0
            .call(&RankCall {
                request,
                shifts: current,
            })
            .await?;
        Ok(reply.candidates)
    }
}
