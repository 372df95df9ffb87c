//! Cloud Scheduler control, used to stop the periodic trigger after a successful rotation.

use super::http::{ensure_success, join_url};
use super::token::AccessTokenProvider;
use crate::errors::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use tracing::{info, instrument};

const JOB: &str = "scheduler_job";

/// Pauses the job that periodically triggers rotations.
#[async_trait]
pub trait SchedulerControl: Send + Sync {
    async fn pause_job(&self) -> Result<()>;
}

/// Cloud Scheduler REST client bound to one job.
pub struct CloudSchedulerClient {
    client: Client,
    base_url: String,
    job_path: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl std::fmt::Debug for CloudSchedulerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudSchedulerClient")
            .field("base_url", &self.base_url)
            .field("job_path", &self.job_path)
            .finish()
    }
}

impl CloudSchedulerClient {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        project_id: &str,
        region: &str,
        job_id: &str,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            job_path: format!("projects/{}/locations/{}/jobs/{}", project_id, region, job_id),
            tokens,
        }
    }

    pub fn job_path(&self) -> &str {
        &self.job_path
    }
}

#[async_trait]
impl SchedulerControl for CloudSchedulerClient {
    #[instrument(skip(self), fields(job = %self.job_path))]
    async fn pause_job(&self) -> Result<()> {
        let url = join_url(&self.base_url, &format!("{}:pause", self.job_path));
        let token = self.tokens.access_token().await?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({}))
            .send()
            .await?;
        ensure_success(response, JOB, &self.job_path).await?;

        info!(job = %self.job_path, "Paused rotation trigger");
        Ok(())
    }
}
