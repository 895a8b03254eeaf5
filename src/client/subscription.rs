//! Event subscription registrations on Marathon

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::Result;
use super::request::Pipeline;

pub const SUBSCRIPTIONS_PATH: &str = "/v2/eventSubscriptions";

/// Callback URLs Marathon currently posts events to
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subscriptions {
    pub callback_urls: Vec<String>,
}

impl Subscriptions {
    pub fn contains(&self, callback_url: &str) -> bool {
        self.callback_urls.iter().any(|url| url == callback_url)
    }
}

fn subscription_path(callback_url: &str) -> String {
    format!("{}?callbackUrl={}", SUBSCRIPTIONS_PATH, callback_url)
}

pub async fn list(pipeline: &Pipeline) -> Result<Subscriptions> {
    pipeline.get(SUBSCRIPTIONS_PATH).await
}

/// Register `callback_url` unless Marathon already knows it
pub async fn register(pipeline: &Pipeline, callback_url: &str) -> Result<()> {
    if list(pipeline).await?.contains(callback_url) {
        info!("Callback {} is already subscribed", callback_url);
        return Ok(());
    }

    pipeline
        .request_unit::<()>(Method::POST, &subscription_path(callback_url), None)
        .await?;
    info!("Subscribed {} to the Marathon event bus", callback_url);
    Ok(())
}

pub async fn deregister(pipeline: &Pipeline, callback_url: &str) -> Result<()> {
    pipeline
        .request_unit::<()>(Method::DELETE, &subscription_path(callback_url), None)
        .await?;
    info!("Unsubscribed {} from the Marathon event bus", callback_url);
    Ok(())
}
