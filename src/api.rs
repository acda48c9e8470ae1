use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{error::AnalyzerError, types::PracticeRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking client for the ModiGrip backend.
pub struct ApiClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ThresholdResponse {
    threshold: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordPayload<'a> {
    user_id: i64,
    #[serde(flatten)]
    record: &'a PracticeRecord,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| AnalyzerError::Api(format!("failed to build http client: {err}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// GET the operator-configured classification threshold.
    pub fn fetch_threshold(&self) -> Result<f64, AnalyzerError> {
        let url = format!("{}/api/settings/threshold", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| AnalyzerError::ThresholdFetch(err.to_string()))?
            .error_for_status()
            .map_err(|err| AnalyzerError::ThresholdFetch(err.to_string()))?;

        let body: ThresholdResponse = response
            .json()
            .map_err(|err| AnalyzerError::ThresholdFetch(format!("bad response body: {err}")))?;
        Ok(body.threshold)
    }

    /// PUT a new classification threshold (operator action).
    pub fn update_threshold(&self, value: f64, admin_id: i64) -> Result<f64, AnalyzerError> {
        let url = format!(
            "{}/api/settings/threshold?value={value}&admin_id={admin_id}",
            self.base_url
        );
        let response = self
            .client
            .put(&url)
            .send()
            .map_err(|err| AnalyzerError::Api(err.to_string()))?
            .error_for_status()
            .map_err(|err| AnalyzerError::Api(err.to_string()))?;

        let body: ThresholdResponse = response
            .json()
            .map_err(|err| AnalyzerError::Api(format!("bad response body: {err}")))?;
        Ok(body.threshold)
    }

    /// Persist a finished practice session for the given user.
    pub fn submit_record(
        &self,
        user_id: i64,
        record: &PracticeRecord,
    ) -> Result<(), AnalyzerError> {
        let url = format!("{}/api/records", self.base_url);
        self.client
            .post(&url)
            .json(&RecordPayload { user_id, record })
            .send()
            .map_err(|err| AnalyzerError::Api(err.to_string()))?
            .error_for_status()
            .map_err(|err| AnalyzerError::Api(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_payload_shape() {
        let record = PracticeRecord {
            is_correct: true,
            mse_score: 0.0042,
            confidence: 0.82,
            duration_seconds: 95,
            correct_rate: 62,
        };
        let json = serde_json::to_value(RecordPayload {
            user_id: 7,
            record: &record,
        })
        .unwrap();

        assert_eq!(json["userId"], 7);
        assert_eq!(json["isCorrect"], true);
        assert_eq!(json["mseScore"], 0.0042);
        assert_eq!(json["durationSeconds"], 95);
        assert_eq!(json["correctRate"], 62);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://localhost:8000/").unwrap();
        assert_eq!(client.base_url, "http://localhost:8000");
    }
}
