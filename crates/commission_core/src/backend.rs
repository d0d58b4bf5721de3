//! The persistence collaborator the session talks to, and its HTTP adapter.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::{ExistingCommissionRecord, OpportunityId},
    error::{ApiError, ApiException},
    protocol::{
        CommissionSubmissionRow, OpportunityContext, SubmitCommissionsRequest,
        SubmitCommissionsResponse,
    },
};
use tracing::debug;
use url::Url;

#[async_trait]
pub trait CommissionBackend: Send + Sync {
    async fn fetch_opportunity_context(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<OpportunityContext>;
    async fn fetch_existing_commissions(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<ExistingCommissionRecord>>;
    async fn delete_existing_commissions(&self, opportunity_id: &OpportunityId) -> Result<()>;
    async fn submit_commissions(
        &self,
        opportunity_id: &OpportunityId,
        cells: Vec<CommissionSubmissionRow>,
    ) -> Result<SubmitCommissionsResponse>;
}

pub struct MissingCommissionBackend;

#[async_trait]
impl CommissionBackend for MissingCommissionBackend {
    async fn fetch_opportunity_context(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<OpportunityContext> {
        Err(anyhow!(
            "commission backend unavailable for opportunity {opportunity_id}"
        ))
    }

    async fn fetch_existing_commissions(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<ExistingCommissionRecord>> {
        Err(anyhow!(
            "commission backend unavailable for opportunity {opportunity_id}"
        ))
    }

    async fn delete_existing_commissions(&self, opportunity_id: &OpportunityId) -> Result<()> {
        Err(anyhow!(
            "commission backend unavailable for opportunity {opportunity_id}"
        ))
    }

    async fn submit_commissions(
        &self,
        opportunity_id: &OpportunityId,
        _cells: Vec<CommissionSubmissionRow>,
    ) -> Result<SubmitCommissionsResponse> {
        Err(anyhow!(
            "commission backend unavailable for opportunity {opportunity_id}"
        ))
    }
}

/// JSON-over-HTTP backend rooted at `base_url`.
pub struct HttpCommissionBackend {
    http: Client,
    base_url: Url,
}

impl HttpCommissionBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("invalid backend url '{base_url}'"))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    fn endpoint(&self, opportunity_id: &OpportunityId, leaf: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("backend url '{}' cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["opportunities", opportunity_id.as_str(), leaf]);
        Ok(url)
    }
}

async fn check_status(res: Response, what: &str) -> Result<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => Err(anyhow::Error::new(ApiException::from(api_error))
            .context(format!("{what} failed with status {status}"))),
        Err(_) if body.trim().is_empty() => Err(anyhow!("{what} failed with status {status}")),
        Err(_) => Err(anyhow!("{what} failed with status {status}: {}", body.trim())),
    }
}

#[async_trait]
impl CommissionBackend for HttpCommissionBackend {
    async fn fetch_opportunity_context(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<OpportunityContext> {
        let url = self.endpoint(opportunity_id, "context")?;
        debug!(%url, "fetching opportunity context");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach commission backend")?;
        let res = check_status(res, "fetch opportunity context").await?;
        res.json()
            .await
            .context("malformed opportunity context response")
    }

    async fn fetch_existing_commissions(
        &self,
        opportunity_id: &OpportunityId,
    ) -> Result<Vec<ExistingCommissionRecord>> {
        let url = self.endpoint(opportunity_id, "commissions")?;
        debug!(%url, "fetching existing commissions");
        let res = self
            .http
            .get(url)
            .send()
            .await
            .context("failed to reach commission backend")?;
        let res = check_status(res, "fetch existing commissions").await?;
        res.json()
            .await
            .context("malformed existing commissions response")
    }

    async fn delete_existing_commissions(&self, opportunity_id: &OpportunityId) -> Result<()> {
        let url = self.endpoint(opportunity_id, "commissions")?;
        debug!(%url, "deleting existing commissions");
        let res = self
            .http
            .delete(url)
            .send()
            .await
            .context("failed to reach commission backend")?;
        check_status(res, "delete existing commissions").await?;
        Ok(())
    }

    async fn submit_commissions(
        &self,
        opportunity_id: &OpportunityId,
        cells: Vec<CommissionSubmissionRow>,
    ) -> Result<SubmitCommissionsResponse> {
        let url = self.endpoint(opportunity_id, "commissions")?;
        debug!(%url, rows = cells.len(), "submitting commissions");
        let res = self
            .http
            .post(url)
            .json(&SubmitCommissionsRequest { cells })
            .send()
            .await
            .context("failed to reach commission backend")?;
        let res = check_status(res, "submit commissions").await?;
        res.json().await.context("malformed submission response")
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
