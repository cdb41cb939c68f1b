//! The HTTP seam for page fetching (to allow mocking).

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Issues one GET for one page URL and returns the parsed JSON body.
///
/// The production implementation is [`crate::client::HttpPageSource`];
/// tests script responses with [`crate::testing::MockSource`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn get_json(&self, url: &str) -> Result<Value>;
}
