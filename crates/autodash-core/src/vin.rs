// VIN validation and decoding through the NHTSA vPIC API.

use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::config::NhtsaConfig;

pub const VIN_LENGTH: usize = 17;

/// Fields shown first in a decode summary, in this order, when present.
const HEADLINE_FIELDS: &[&str] = &[
    "Make",
    "Model",
    "ModelYear",
    "Trim",
    "Manufacturer",
    "BodyClass",
    "VehicleType",
    "DriveType",
    "FuelTypePrimary",
    "EngineCylinders",
    "DisplacementL",
    "PlantCity",
    "PlantCountry",
];

/// Values NHTSA uses for "nothing decoded".
const EMPTY_VALUES: &[&str] = &["", "Not Applicable", "null"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VinError {
    #[error("VIN must be a non-empty string")]
    Empty,

    #[error("VIN must be 17 characters long, got {0}")]
    InvalidLength(usize),

    #[error("VIN may only contain letters and digits, found {0:?}")]
    InvalidCharacter(char),

    #[error("model year {year} is outside {min}-{max}")]
    YearOutOfRange { year: u16, min: u16, max: u16 },

    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("error connecting to NHTSA API: {0}")]
    Connection(String),

    #[error("API request failed with status {0}")]
    Status(u16),

    #[error("NHTSA API returned an unreadable body: {0}")]
    Body(String),
}

/// A validated decode request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VinQuery {
    pub vin: String,
    pub model_year: Option<u16>,
}

impl VinQuery {
    /// Trim and uppercase `vin` and check its length and characters. A model
    /// year of 0 means "not given".
    pub fn new(vin: &str, model_year: Option<u16>) -> Result<Self, VinError> {
        let vin = vin.trim();
        if vin.is_empty() {
            return Err(VinError::Empty);
        }
        let len = vin.chars().count();
        if len != VIN_LENGTH {
            warn!("VIN length {} is not equal to {}", len, VIN_LENGTH);
            return Err(VinError::InvalidLength(len));
        }
        if let Some(c) = vin.chars().find(|c| !c.is_ascii_alphanumeric()) {
            warn!("VIN {} contains invalid character {:?}", vin, c);
            return Err(VinError::InvalidCharacter(c));
        }
        Ok(Self {
            vin: vin.to_ascii_uppercase(),
            model_year: model_year.filter(|y| *y != 0),
        })
    }

    /// Like [`VinQuery::new`], additionally requiring the year to fall in
    /// `min..=max`.
    pub fn bounded(
        vin: &str,
        model_year: Option<u16>,
        min: u16,
        max: u16,
    ) -> Result<Self, VinError> {
        let query = Self::new(vin, model_year)?;
        if let Some(year) = query.model_year {
            if !(min..=max).contains(&year) {
                return Err(VinError::YearOutOfRange { year, min, max });
            }
        }
        Ok(query)
    }
}

/// Result of a decode, ready for display.
#[derive(Debug, Clone, PartialEq)]
pub struct VinDecode {
    pub query: VinQuery,
    pub raw: Value,
    pub fields: Vec<(String, String)>,
    /// NHTSA's own warning text when the decode was partial.
    pub warning: Option<String>,
    /// Served from the local cache instead of the API.
    pub cached: bool,
}

impl VinDecode {
    pub fn from_response(query: VinQuery, raw: Value, cached: bool) -> Self {
        let fields = summarize(&raw);
        let warning = decode_warning(&raw);
        Self {
            query,
            raw,
            fields,
            warning,
            cached,
        }
    }
}

/// HTTP client for the `DecodeVinValuesExtended` endpoint.
#[derive(Debug, Clone)]
pub struct VinDecoder {
    http: reqwest::Client,
    decode_url: String,
    format: String,
}

impl VinDecoder {
    pub fn new(config: &NhtsaConfig) -> Result<Self, VinError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VinError::Client(e.to_string()))?;
        Ok(Self {
            http,
            decode_url: config.decode_url.clone(),
            format: config.format.clone(),
        })
    }

    /// `{decode_url}{vin}?format={format}[&modelyear={year}]`
    pub fn url_for(&self, query: &VinQuery) -> String {
        let mut url = format!("{}{}?format={}", self.decode_url, query.vin, self.format);
        if let Some(year) = query.model_year {
            url.push_str(&format!("&modelyear={year}"));
        }
        url
    }

    /// Fetch the raw decode JSON for `query`.
    pub async fn decode(&self, query: &VinQuery) -> Result<Value, VinError> {
        let url = self.url_for(query);
        info!("Decoding VIN {} using URL: {}", query.vin, url);

        let response = self.http.get(&url).send().await.map_err(|e| {
            warn!("Failed to connect to NHTSA API: {}", e);
            VinError::Connection(e.to_string())
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!("NHTSA API returned status code {}", status.as_u16());
            return Err(VinError::Status(status.as_u16()));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| VinError::Body(e.to_string()))?;
        info!("VIN {} decoded successfully", query.vin);
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Flatten an NHTSA response into `(field, value)` pairs, dropping empties.
///
/// Handles both the extended endpoint (one flat object in `Results`) and the
/// classic one (`Results` is a list of `{Variable, Value}` rows). For the flat
/// shape, headline fields come first, the rest follow alphabetically.
pub fn summarize(response: &Value) -> Vec<(String, String)> {
    let Some(results) = response.get("Results").and_then(Value::as_array) else {
        return Vec::new();
    };

    let is_variable_rows = !results.is_empty() && results.iter().all(|r| r.get("Variable").is_some());
    if is_variable_rows {
        return results
            .iter()
            .filter_map(|row| {
                let name = row.get("Variable")?.as_str()?;
                let value = display_value(row.get("Value")?)?;
                Some((name.to_string(), value))
            })
            .collect();
    }

    let Some(Value::Object(map)) = results.first() else {
        return Vec::new();
    };

    let mut fields: Vec<(String, String)> = HEADLINE_FIELDS
        .iter()
        .filter_map(|key| {
            let value = display_value(map.get(*key)?)?;
            Some((key.to_string(), value))
        })
        .collect();

    let mut rest: Vec<(String, String)> = map
        .iter()
        .filter(|(key, _)| !HEADLINE_FIELDS.contains(&key.as_str()))
        .filter_map(|(key, value)| Some((key.clone(), display_value(value)?)))
        .collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));
    fields.extend(rest);
    fields
}

/// NHTSA reports `ErrorCode` "0" for a clean decode; anything else carries
/// a human readable `ErrorText`.
pub fn decode_warning(response: &Value) -> Option<String> {
    let first = response.get("Results")?.as_array()?.first()?;
    let code = first.get("ErrorCode")?.as_str()?;
    if code.trim() == "0" {
        return None;
    }
    first
        .get("ErrorText")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn display_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!EMPTY_VALUES.contains(&text.as_str())).then_some(text)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
