//! xe.com currency converter scraper.
//!
//! The converter page renders the conversion as a result row:
//!
//! ```html
//! <tr class="uccRes">
//!   <td class="leftCol">1.00&nbsp;<span>HKD</span></td>
//!   <td class="rightCol">0.128906&nbsp;<span>USD</span></td>
//! </tr>
//! ```
//!
//! Each cell must read `<amount> <unit>` with the expected unit. Amounts
//! are rounded to 2 decimal places and the rate is `right / left`.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::{debug, info};

use fxrate_models::CurrencyPair;

use crate::error::{FetchError, FetchResult};
use crate::RateFetcher;

static LEFT_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.uccRes > td.leftCol").unwrap());

static RIGHT_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr.uccRes > td.rightCol").unwrap());

static AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9][0-9,]*\.[0-9]+)\s+([A-Z]+)").unwrap());

/// Configuration for the xe.com scraper.
#[derive(Debug, Clone)]
pub struct XeScraperConfig {
    /// Site root, without the converter path
    pub base_url: String,
    /// Whole-request timeout
    pub timeout: Duration,
}

impl Default for XeScraperConfig {
    fn default() -> Self {
        Self {
            base_url: "http://www.xe.com".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl XeScraperConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self::from_env_with(Self::default())
    }

    /// Apply environment overrides on top of `defaults`.
    pub fn from_env_with(defaults: Self) -> Self {
        Self {
            base_url: std::env::var("FETCHER_BASE_URL").unwrap_or(defaults.base_url),
            timeout: std::env::var("FETCHER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    fn converter_url(&self) -> String {
        format!("{}/currencyconverter/convert", self.base_url.trim_end_matches('/'))
    }
}

/// Fetches rates by scraping the xe.com converter.
pub struct XeScraper {
    http: Client,
    config: XeScraperConfig,
}

impl XeScraper {
    pub fn new(config: XeScraperConfig) -> FetchResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("fxrate/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> FetchResult<Self> {
        Self::new(XeScraperConfig::from_env())
    }
}

#[async_trait]
impl RateFetcher for XeScraper {
    async fn fetch(&self, pair: &CurrencyPair) -> FetchResult<String> {
        let url = self.config.converter_url();
        debug!("Scraping exchange rate {} from {}", pair, url);

        let response = self
            .http
            .get(&url)
            .query(&[("From", pair.from.as_str()), ("To", pair.to.as_str()), ("Amount", "1")])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::unexpected_response(format!(
                "{} responded unexpected status code: {}",
                url, status
            )));
        }

        let body = response.text().await?;
        let rate = extract_rate(&body, pair)?;

        info!("Exchange rate from \"{}\" to \"{}\": {}", pair.from, pair.to, rate);
        Ok(rate)
    }
}

/// Read the rate out of a converter page.
pub fn extract_rate(html: &str, pair: &CurrencyPair) -> FetchResult<String> {
    let document = Html::parse_document(html);
    let left_text = cell_text(&document, &LEFT_CELL);
    let right_text = cell_text(&document, &RIGHT_CELL);

    let left = parse_amount(&left_text, &pair.from);
    let right = parse_amount(&right_text, &pair.to);

    match (left, right) {
        (Some(left), Some(right)) if left > 0.0 => Ok(format!("{}", right / left)),
        _ => Err(FetchError::format_mismatch(format!(
            "unable to retrieve the {} exchange rate: currency format not match (left: {:?}, right: {:?})",
            pair,
            left_text.trim(),
            right_text.trim()
        ))),
    }
}

/// Concatenated text of every result-row cell matching `selector`.
/// Entities arrive decoded, so `&nbsp;` separators are U+00A0.
fn cell_text(document: &Html, selector: &Selector) -> String {
    document
        .select(selector)
        .flat_map(|cell| cell.text())
        .collect()
}

/// Parse `<amount> <unit>`, requiring `unit` to match, rounded to 2 places.
pub fn parse_amount(text: &str, unit: &str) -> Option<f64> {
    let caps = AMOUNT.captures(text)?;
    if &caps[2] != unit {
        return None;
    }
    let amount: f64 = caps[1].replace(',', "").parse().ok()?;
    Some(round_2dp(amount))
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FetchErrorKind;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PAGE: &str = r#"
        <html><body>
        <table class="ucc-result-table">
          <tr class="uccRes">
            <td width="47%" class="leftCol">1.00&nbsp;<span class="uccResCde">HKD</span></td>
            <td width="6%" class="middleCol">=</td>
            <td width="47%" class="rightCol">0.128906&nbsp;<span class="uccResCde">USD</span></td>
          </tr>
        </table>
        </body></html>"#;

    fn scraper_for(server: &MockServer) -> XeScraper {
        XeScraper::new(XeScraperConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("0.128341 USD", "USD"), Some(0.13));
        assert_eq!(parse_amount("1.00 HKD", "HKD"), Some(1.0));
        assert_eq!(parse_amount("0.135 USD", "USD"), Some(0.14));
        assert_eq!(parse_amount("1,234.5678 JPY", "JPY"), Some(1234.57));
        assert_eq!(parse_amount("0.128341 USD", "EUR"), None);
        assert_eq!(parse_amount("n/a", "USD"), None);
    }

    #[test]
    fn test_extract_rate_from_page() {
        let rate = extract_rate(PAGE, &CurrencyPair::new("HKD", "USD")).unwrap();
        assert_eq!(rate, "0.13");
    }

    #[test]
    fn test_extract_rate_with_single_quoted_classes() {
        let page = r#"
            <table>
              <tr class='uccRes'>
                <td class='leftCol'>1.00&nbsp;<span>HKD</span></td>
                <td class='rightCol'>0.128906&nbsp;<span>USD</span></td>
              </tr>
            </table>"#;
        let rate = extract_rate(page, &CurrencyPair::new("HKD", "USD")).unwrap();
        assert_eq!(rate, "0.13");
    }

    #[test]
    fn test_extract_rate_with_numeric_entities() {
        let page = r#"
            <table>
              <tr class="ucc uccRes">
                <td class="leftCol wide">1.00&#xa0;<b>EUR</b></td>
                <td class="rightCol wide">1,085.4921&#160;<b>JPY</b></td>
              </tr>
            </table>"#;
        let rate = extract_rate(page, &CurrencyPair::new("EUR", "JPY")).unwrap();
        assert_eq!(rate, "1085.49");
    }

    #[test]
    fn test_cells_outside_result_row_are_ignored() {
        let page = r#"
            <table>
              <tr class="header">
                <td class="leftCol">1.00 HKD</td>
                <td class="rightCol">0.128906 USD</td>
              </tr>
            </table>"#;
        let err = extract_rate(page, &CurrencyPair::new("HKD", "USD")).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::FormatMismatch);
    }

    #[test]
    fn test_extract_rate_unit_mismatch() {
        let err = extract_rate(PAGE, &CurrencyPair::new("HKD", "EUR")).unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::FormatMismatch);
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/currencyconverter/convert"))
            .and(query_param("From", "HKD"))
            .and(query_param("To", "USD"))
            .and(query_param("Amount", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
            .expect(1)
            .mount(&server)
            .await;

        let rate = scraper_for(&server)
            .fetch(&CurrencyPair::new("HKD", "USD"))
            .await
            .unwrap();
        assert_eq!(rate, "0.13");
    }

    #[tokio::test]
    async fn test_fetch_unexpected_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = scraper_for(&server)
            .fetch(&CurrencyPair::new("HKD", "USD"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::UnexpectedResponse);
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_fetch_format_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let err = scraper_for(&server)
            .fetch(&CurrencyPair::new("HKD", "USD"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FetchErrorKind::FormatMismatch);
    }
}
