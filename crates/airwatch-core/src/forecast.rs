//! CO2 breach forecasting.
//!
//! The [`ForecastGateway`] validates untyped input, renders a prompt,
//! submits it to a [`ForecastModel`] and validates the model's JSON reply.
//! Nothing is retried, repaired or cached.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, warn};

use airwatch_types::{FieldError, HistoricalPoint};

use crate::error::{Error, Result};

/// Prompt sent to the model. Placeholders are replaced verbatim.
pub const PROMPT_TEMPLATE: &str = r#"You are an expert AI assistant specializing in predicting CO2 concentration breaches in specific zones.

You will receive historical CO2 data, the current time, and an alert threshold.
Your task is to forecast the probability of a CO2 breach occurring in the specified zone within the next hour.

Historical CO2 Data (JSON):
{{historicalCO2Data}}

Current Time: {{currentTime}}
Alert Threshold: {{alertThreshold}} ppm

Zone ID: {{zoneId}}

Consider trends, patterns, and any other relevant factors in the historical data.
Provide a probability (0-1) and a brief explanation of your reasoning.
Ensure the explanation includes the key factors influencing your prediction.

Output in JSON format:
{
  "breachProbability": number,
  "explanation": string
}"#;

/// Validated forecast request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastInput {
    /// Zone the forecast is for.
    pub zone_id: String,
    /// History as a JSON document, embedded in the prompt as-is.
    #[serde(rename = "historicalCO2Data")]
    pub historical_co2_data: String,
    /// RFC 3339 timestamp, embedded in the prompt as-is.
    pub current_time: String,
    /// Threshold in ppm.
    pub alert_threshold: f64,
}

impl ForecastInput {
    /// Build a request from a series of points.
    pub fn from_history(
        zone_id: impl Into<String>,
        history: &[HistoricalPoint],
        current_time: OffsetDateTime,
        alert_threshold: f64,
    ) -> Result<Self> {
        let historical_co2_data =
            serde_json::to_string(history).map_err(|e| Error::Schema(e.to_string()))?;
        let current_time = current_time
            .format(&Rfc3339)
            .map_err(|e| Error::invalid_field("currentTime", e.to_string()))?;

        let input = Self {
            zone_id: zone_id.into(),
            historical_co2_data,
            current_time,
            alert_threshold,
        };
        let errors = input.validate();
        if errors.is_empty() {
            Ok(input)
        } else {
            Err(Error::Validation(errors))
        }
    }

    /// Validate an untyped JSON request, reporting every offending field.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::invalid_field("body", "must be a JSON object"));
        };

        let mut errors = Vec::new();
        let mut string_field = |name: &'static str| match object.get(name) {
            None | Some(Value::Null) => {
                errors.push(FieldError::new(name, "is required"));
                None
            }
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(FieldError::new(name, "must be a string"));
                None
            }
        };

        let zone_id = string_field("zoneId");
        let historical_co2_data = string_field("historicalCO2Data");
        let current_time = string_field("currentTime");

        let alert_threshold = match object.get("alertThreshold") {
            None | Some(Value::Null) => {
                errors.push(FieldError::new("alertThreshold", "is required"));
                None
            }
            Some(Value::Number(n)) => n.as_f64(),
            Some(_) => {
                errors.push(FieldError::new("alertThreshold", "must be a number"));
                None
            }
        };

        match (zone_id, historical_co2_data, current_time, alert_threshold) {
            (Some(zone_id), Some(historical_co2_data), Some(current_time), Some(alert_threshold))
                if errors.is_empty() =>
            {
                let input = Self {
                    zone_id,
                    historical_co2_data,
                    current_time,
                    alert_threshold,
                };
                let errors = input.validate();
                if errors.is_empty() {
                    Ok(input)
                } else {
                    Err(Error::Validation(errors))
                }
            }
            (zone_id, historical_co2_data, current_time, alert_threshold) => {
                // Report value errors for the fields that were present too
                let partial = Self {
                    zone_id: zone_id.unwrap_or_else(|| "-".to_string()),
                    historical_co2_data: historical_co2_data.unwrap_or_else(|| "null".to_string()),
                    current_time: current_time.unwrap_or_else(|| "1970-01-01T00:00:00Z".to_string()),
                    alert_threshold: alert_threshold.unwrap_or(0.0),
                };
                errors.extend(partial.validate());
                Err(Error::Validation(errors))
            }
        }
    }

    /// Value checks on an already typed request.
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.zone_id.trim().is_empty() {
            errors.push(FieldError::new("zoneId", "cannot be empty"));
        }
        if let Err(e) = serde_json::from_str::<Value>(&self.historical_co2_data) {
            errors.push(FieldError::new(
                "historicalCO2Data",
                format!("must contain valid JSON: {}", e),
            ));
        }
        if OffsetDateTime::parse(&self.current_time, &Rfc3339).is_err() {
            errors.push(FieldError::new(
                "currentTime",
                "must be an RFC 3339 timestamp",
            ));
        }
        if !self.alert_threshold.is_finite() || self.alert_threshold < 0.0 {
            errors.push(FieldError::new(
                "alertThreshold",
                "must be a non-negative number",
            ));
        }

        errors
    }

    /// Render [`PROMPT_TEMPLATE`] for this request.
    pub fn render_prompt(&self) -> String {
        PROMPT_TEMPLATE
            .replace("{{historicalCO2Data}}", &self.historical_co2_data)
            .replace("{{currentTime}}", &self.current_time)
            .replace("{{alertThreshold}}", &self.alert_threshold.to_string())
            .replace("{{zoneId}}", &self.zone_id)
    }
}

/// Breach risk bucket for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachRisk {
    /// 40% or lower.
    Low,
    /// Above 40%.
    Elevated,
    /// Above 75%.
    High,
}

/// Validated model reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastOutput {
    /// Probability of a breach within the next hour, in `[0, 1]`.
    pub breach_probability: f64,
    /// Key factors behind the prediction.
    pub explanation: String,
}

impl ForecastOutput {
    /// Parse and validate model reply text.
    pub fn parse(text: &str) -> Result<Self> {
        let output: ForecastOutput = serde_json::from_str(text.trim())
            .map_err(|e| Error::Schema(format!("model reply is not a forecast: {}", e)))?;

        if !(0.0..=1.0).contains(&output.breach_probability) {
            return Err(Error::Schema(format!(
                "breachProbability {} is outside [0, 1]",
                output.breach_probability
            )));
        }
        if output.explanation.trim().is_empty() {
            return Err(Error::Schema("explanation is empty".to_string()));
        }
        Ok(output)
    }

    /// Probability as a percentage.
    pub fn percent(&self) -> f64 {
        self.breach_probability * 100.0
    }

    /// Risk bucket.
    pub fn risk(&self) -> BreachRisk {
        let percent = self.percent();
        if percent > 75.0 {
            BreachRisk::High
        } else if percent > 40.0 {
            BreachRisk::Elevated
        } else {
            BreachRisk::Low
        }
    }
}

/// A generative model that answers a prompt with text.
#[async_trait]
pub trait ForecastModel: Send + Sync {
    /// Model name for logs.
    fn name(&self) -> &str;

    /// Submit a prompt and return the reply text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Validates requests and replies around a [`ForecastModel`].
#[derive(Clone)]
pub struct ForecastGateway {
    model: Option<Arc<dyn ForecastModel>>,
}

impl std::fmt::Debug for ForecastGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastGateway")
            .field("model", &self.model.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

impl ForecastGateway {
    /// Create a gateway backed by `model`.
    pub fn new(model: Arc<dyn ForecastModel>) -> Self {
        Self { model: Some(model) }
    }

    /// Create a gateway with no model. Valid requests fail with
    /// [`Error::NotConfigured`].
    pub fn unconfigured() -> Self {
        Self { model: None }
    }

    /// Whether a model is attached.
    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Validate an untyped request and forecast.
    pub async fn predict_value(&self, value: &Value) -> Result<ForecastOutput> {
        let input = ForecastInput::from_value(value)?;
        self.predict(&input).await
    }

    /// Forecast for a validated request.
    pub async fn predict(&self, input: &ForecastInput) -> Result<ForecastOutput> {
        let errors = input.validate();
        if !errors.is_empty() {
            return Err(Error::Validation(errors));
        }

        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::NotConfigured("forecast model API key is not set".to_string()))?;

        debug!("Requesting forecast for zone {} from {}", input.zone_id, model.name());
        let reply = model.generate(&input.render_prompt()).await?;
        let output = ForecastOutput::parse(&reply).inspect_err(|e| {
            warn!("Rejected forecast reply for zone {}: {}", input.zone_id, e);
        })?;

        debug!(
            "Zone {} breach probability {:.0}%",
            input.zone_id,
            output.percent()
        );
        Ok(output)
    }
}
