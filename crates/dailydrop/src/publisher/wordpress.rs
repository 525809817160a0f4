//! WordPress REST API publisher.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::section::{self, SectionUpdate};
use super::{PublishError, PublishReceipt, PublishRequest, Publisher};
use crate::http_client::USER_AGENT;

/// One publication target site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSiteConfig {
    /// Site root, e.g. `https://example.com`.
    pub base_url: String,
    pub username: String,
    /// Environment variable holding the application password.
    pub password_env: String,
}

impl TargetSiteConfig {
    fn post_url(&self, post_id: i64) -> String {
        format!(
            "{}/wp-json/wp/v2/posts/{}",
            self.base_url.trim_end_matches('/'),
            post_id
        )
    }
}

#[derive(Debug, Deserialize)]
struct WpPost {
    #[serde(default)]
    content: WpContent,
    #[serde(default)]
    link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WpContent {
    #[serde(default)]
    raw: Option<String>,
    #[serde(default)]
    rendered: Option<String>,
}

#[derive(Serialize)]
struct WpUpdate<'a> {
    content: &'a str,
}

/// Publishes dated sections into WordPress posts.
#[derive(Clone)]
pub struct WordPressPublisher {
    client: Client,
    sites: BTreeMap<String, TargetSiteConfig>,
}

impl WordPressPublisher {
    pub fn new(
        sites: BTreeMap<String, TargetSiteConfig>,
        timeout: Duration,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| PublishError::Request {
                target: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client, sites })
    }

    pub fn sites(&self) -> &BTreeMap<String, TargetSiteConfig> {
        &self.sites
    }

    fn site(&self, target: &str) -> Result<&TargetSiteConfig, PublishError> {
        self.sites
            .get(target)
            .ok_or_else(|| PublishError::UnknownTarget(target.to_string()))
    }

    fn password(target: &str, site: &TargetSiteConfig) -> Result<String, PublishError> {
        std::env::var(&site.password_env)
            .ok()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| PublishError::MissingCredentials {
                target: target.to_string(),
                variable: site.password_env.clone(),
            })
    }

    async fn check(
        response: reqwest::Response,
        target: &str,
        post_id: i64,
    ) -> Result<WpPost, PublishError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(target, post_id, status, body));
        }
        response
            .json::<WpPost>()
            .await
            .map_err(|e| PublishError::InvalidResponse {
                target: target.to_string(),
                message: e.to_string(),
            })
    }
}

fn status_error(target: &str, post_id: i64, status: StatusCode, body: String) -> PublishError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Unauthorized {
            target: target.to_string(),
            status: status.as_u16(),
        },
        StatusCode::NOT_FOUND => PublishError::NotFound {
            target: target.to_string(),
            post_id,
        },
        _ => PublishError::Rejected {
            target: target.to_string(),
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        },
    }
}

#[async_trait]
impl Publisher for WordPressPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishReceipt, PublishError> {
        let target = request.target.as_str();
        let site = self.site(target)?;
        let password = Self::password(target, site)?;
        let url = site.post_url(request.post_id);
        let request_error = |e: reqwest::Error| PublishError::Request {
            target: target.to_string(),
            message: e.to_string(),
        };

        debug!("Loading post {} from {}", request.post_id, url);
        let response = self
            .client
            .get(&url)
            .query(&[("context", "edit")])
            .basic_auth(&site.username, Some(&password))
            .send()
            .await
            .map_err(request_error)?;
        let post = Self::check(response, target, request.post_id).await?;
        let current = post
            .content
            .raw
            .or(post.content.rendered)
            .unwrap_or_default();

        let updated = section::apply(
            &current,
            &SectionUpdate {
                run_date: request.run_date,
                title: &request.section_title,
                items: &request.items,
                button_title: request.button_title.as_deref(),
                days_to_keep: request.days_to_keep,
            },
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&site.username, Some(&password))
            .json(&WpUpdate { content: &updated })
            .send()
            .await
            .map_err(request_error)?;
        let saved = Self::check(response, target, request.post_id).await?;

        info!(
            "Published {} items to {} post {}",
            request.items.len(),
            target,
            request.post_id
        );
        Ok(PublishReceipt {
            target: target.to_string(),
            post_id: request.post_id,
            items_published: request.items.len(),
            link: saved.link.or(post.link),
        })
    }
}
