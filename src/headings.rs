// Heading rewriter: turns a leader's text into the cluster heading.
//
// Deployments can plug in a summariser behind this trait. The shipped
// implementation uses the leader's own words.

use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait HeadingRewriter: Send + Sync {
    /// Produce a heading for a cluster from its leader's text.
    async fn summarize(&self, leader_text: &str) -> Result<String>;
}

/// Uses the leader text as-is, trimmed.
pub struct LeaderTextHeading;

#[async_trait]
impl HeadingRewriter for LeaderTextHeading {
    async fn summarize(&self, leader_text: &str) -> Result<String> {
        Ok(leader_text.trim().to_string())
    }
}
