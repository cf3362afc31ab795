use async_trait::async_trait;
use mealhub_core::{DistanceElement, GeolocationError, GeolocationGateway, RouteStatus};
use mealhub_shared::Masked;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::app_config::GeolocationConfig;

/// Distance-matrix HTTP provider: one origin, many destinations per request
pub struct HttpGeolocationGateway {
    client: Client,
    api_url: String,
    api_key: Masked<String>,
}

#[derive(Debug, Deserialize)]
struct MatrixResponse {
    status: String,
    error_message: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Deserialize)]
struct MatrixElement {
    status: String,
    distance: Option<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: u64,
}

impl HttpGeolocationGateway {
    pub fn new(config: &GeolocationConfig) -> Result<Self, GeolocationError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| GeolocationError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

fn element_from(element: MatrixElement) -> DistanceElement {
    match (element.status.as_str(), element.distance) {
        ("OK", Some(distance)) => DistanceElement::routed(distance.value),
        ("NOT_FOUND", _) => DistanceElement::no_route(RouteStatus::NotFound),
        _ => DistanceElement::no_route(RouteStatus::ZeroResults),
    }
}

/// Map a decoded response onto per-destination elements
fn elements_from(
    response: MatrixResponse,
    expected: usize,
) -> Result<Vec<DistanceElement>, GeolocationError> {
    if response.status != "OK" {
        return Err(GeolocationError::Api {
            status: response.status,
            message: response.error_message.unwrap_or_default(),
        });
    }

    let row = response
        .rows
        .into_iter()
        .next()
        .ok_or_else(|| GeolocationError::Malformed("no rows in response".to_string()))?;
    if row.elements.len() != expected {
        return Err(GeolocationError::Malformed(format!(
            "{} elements for {} destinations",
            row.elements.len(),
            expected
        )));
    }

    Ok(row.elements.into_iter().map(element_from).collect())
}

#[async_trait]
impl GeolocationGateway for HttpGeolocationGateway {
    async fn distance(
        &self,
        origin: &str,
        destinations: &[String],
    ) -> Result<Vec<DistanceElement>, GeolocationError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("origins", origin.to_string()),
                ("destinations", destinations.join("|")),
                ("units", "metric".to_string()),
                ("key", self.api_key.expose().clone()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeolocationError::Timeout
                } else {
                    GeolocationError::Transport(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GeolocationError::Api {
                status: response.status().to_string(),
                message: "non-success HTTP status".to_string(),
            });
        }

        let body: MatrixResponse = response
            .json()
            .await
            .map_err(|e| GeolocationError::Malformed(e.to_string()))?;

        elements_from(body, destinations.len())
    }
}
