//! MediaWiki content client.
//!
//! Uses the `action=parse` endpoint, which returns rendered HTML and the
//! section list in one call.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::{PageId, Section};
use crate::oracle::{ContentApi, ContentPage, OracleError};

/// Default encyclopedia endpoint.
pub const DEFAULT_API_URL: &str = "https://en.wikipedia.org/w/api.php";

/// Error codes meaning "no such page".
const NOT_FOUND_CODES: [&str; 3] = ["nosuchpageid", "missingtitle", "pagecannotexist"];

/// Client for a MediaWiki `api.php` endpoint.
#[derive(Clone)]
pub struct MediaWikiClient {
    client: Client,
    api_url: String,
}

impl MediaWikiClient {
    /// Client for `api_url` with a 30 second request timeout.
    pub fn new(api_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("duel-kiosk/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            api_url: api_url.to_string(),
        }
    }

    async fn parse(&self, target: (&str, String)) -> Result<Option<ContentPage>, OracleError> {
        let response: ParseResponse = self
            .client
            .get(&self.api_url)
            .query(&[
                ("action", "parse"),
                ("format", "json"),
                ("formatversion", "2"),
                ("useskin", "vector-2022"),
                ("redirects", "1"),
                ("mobileformat", "1"),
                ("sections", "1"),
            ])
            .query(&[target])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_page()
    }
}

impl Default for MediaWikiClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

#[async_trait]
impl ContentApi for MediaWikiClient {
    #[instrument(skip(self))]
    async fn page_by_id(&self, id: PageId) -> Result<Option<ContentPage>, OracleError> {
        self.parse(("pageid", id.to_string())).await
    }

    #[instrument(skip(self))]
    async fn page_by_name(&self, name: &str) -> Result<Option<ContentPage>, OracleError> {
        self.parse(("page", name.to_string())).await
    }
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParseResponse {
    Parse { parse: ParsedPage },
    Error { error: ApiError },
}

#[derive(Debug, Deserialize)]
struct ParsedPage {
    title: String,
    pageid: PageId,
    text: String,
    #[serde(default)]
    sections: Vec<Section>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    info: Option<String>,
}

impl ParseResponse {
    fn into_page(self) -> Result<Option<ContentPage>, OracleError> {
        match self {
            ParseResponse::Parse { parse } => Ok(Some(ContentPage {
                id: parse.pageid,
                title: parse.title,
                html: parse.text,
                sections: parse.sections,
            })),
            ParseResponse::Error { error } if NOT_FOUND_CODES.contains(&error.code.as_str()) => {
                debug!(code = %error.code, "page not found");
                Ok(None)
            }
            ParseResponse::Error { error } => Err(OracleError::Api(
                error.info.unwrap_or_else(|| "Wikipedia API error".to_string()),
            )),
        }
    }
}
