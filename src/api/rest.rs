use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;
use crate::api::{ClinicalApi, Session};
use crate::clinical::{Alert, AnalyticsSummary, AuthToken, Patient, VitalReading};
use crate::error::ClientError;

pub const API_PREFIX: [&str; 2] = ["api", "v1"];

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct AcknowledgeRequest<'a> {
    clinician_note: &'a str,
}

/// HTTP client for the monitoring back end
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl RestClient {
    pub fn new(base_url: &str, session: Session, timeout: Duration) -> Result<Self, ClientError> {
        let parsed = Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;

        Ok(RestClient { http, base_url: parsed, session })
    }

    // Each segment is percent-encoded, so ids cannot reshape the path
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &[&str],
        query: &[(&str, &str)],
    ) -> Result<T, ClientError> {
        let url = self.endpoint(path);
        debug!(%url, "GET");

        let response = self.authorize(self.http.get(url).query(query))
            .send()
            .await?;
        decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        let url = self.endpoint(path);
        debug!(%url, "POST");

        let response = self.authorize(self.http.post(url).json(body))
            .send()
            .await?;
        decode(response).await
    }
}

// Non-success responses carry their body as the error message
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::status(status.as_u16(), body));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}

#[async_trait]
impl ClinicalApi for RestClient {
    async fn login(&self, username: &str, password: &str) -> Result<AuthToken, ClientError> {
        self.post_json(&["auth", "login"], &LoginRequest { username, password }).await
    }

    async fn get_patients(&self) -> Result<Vec<Patient>, ClientError> {
        self.get_json(&["patients"], &[]).await
    }

    async fn get_patient(&self, patient_id: &str) -> Result<Patient, ClientError> {
        self.get_json(&["patients", patient_id], &[]).await
    }

    async fn get_vitals(
        &self,
        patient_id: &str,
        metric: Option<&str>,
    ) -> Result<Vec<VitalReading>, ClientError> {
        let query: Vec<(&str, &str)> = metric.map(|m| ("metric", m)).into_iter().collect();
        self.get_json(&["vitals", patient_id], &query).await
    }

    async fn get_alerts(&self, patient_id: Option<&str>) -> Result<Vec<Alert>, ClientError> {
        let query: Vec<(&str, &str)> = patient_id.map(|p| ("patient_id", p)).into_iter().collect();
        self.get_json(&["alerts"], &query).await
    }

    async fn acknowledge_alert(&self, alert_id: &str, note: &str) -> Result<Alert, ClientError> {
        self.post_json(
            &["alerts", alert_id, "acknowledge"],
            &AcknowledgeRequest { clinician_note: note },
        )
        .await
    }

    async fn get_analytics_summary(&self, patient_id: &str) -> Result<AnalyticsSummary, ClientError> {
        self.get_json(&["analytics", "summary"], &[("patient_id", patient_id)]).await
    }
}
