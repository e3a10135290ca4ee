//! reqwest implementation of [`MessageApi`]

use crate::config::ApiConfig;
use crate::delivery::api::{CreatedMessageRecord, MessageApi, NewMessage};
use crate::error::ApiError;
use crate::intake::Attachment;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// `{"status": 200, "body": {...}}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    body: T,
}

#[derive(Debug, Deserialize)]
struct CreatedBody {
    email: CreatedMessageRecord,
}

#[derive(Debug, Deserialize)]
struct StoredBody {
    #[serde(rename = "FileId")]
    file_id: u64,
}

/// Client for the MailHub HTTP API
///
/// One client (and connection pool) is shared by all concurrent submissions.
#[derive(Debug, Clone)]
pub struct HttpMessageApi {
    client: reqwest::Client,
    config: ApiConfig,
}

impl HttpMessageApi {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    fn link_url(&self, message_id: u64, file_id: u64) -> String {
        format!(
            "{}/{}/file/{}",
            self.config.link_attachment_url.trim_end_matches('/'),
            message_id,
            file_id
        )
    }

    /// Turn a non-2xx response into [`ApiError::Status`].
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let text = response.text().await?;
        let envelope: Envelope<T> = serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{} in {:?}", e, text)))?;
        Ok(envelope.body)
    }
}

#[async_trait::async_trait]
impl MessageApi for HttpMessageApi {
    async fn create_message(&self, message: &NewMessage) -> Result<CreatedMessageRecord, ApiError> {
        debug!(url = %self.config.create_message_url, "Creating message");

        let response = self
            .client
            .post(&self.config.create_message_url)
            .json(message)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body: CreatedBody = Self::decode(response).await?;
        Ok(body.email)
    }

    async fn store_attachment(&self, attachment: &Attachment) -> Result<u64, ApiError> {
        debug!(
            url = %self.config.store_attachment_url,
            filename = %attachment.filename,
            size = attachment.content.len(),
            "Uploading attachment"
        );

        let part = Part::bytes(attachment.content.clone())
            .file_name(attachment.filename.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.config.store_attachment_url)
            .multipart(form)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body: StoredBody = Self::decode(response).await?;
        Ok(body.file_id)
    }

    async fn link_attachment(&self, message_id: u64, file_id: u64) -> Result<(), ApiError> {
        let url = self.link_url(message_id, file_id);
        debug!(url = %url, "Linking attachment");

        let response = self.client.post(&url).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_link_url() {
        let mut config = ApiConfig::default();
        let api = HttpMessageApi::new(config.clone()).unwrap();
        assert_eq!(
            api.link_url(5, 10),
            "https://mailhub.su/api/v1/auth/addFileToEmailOther/5/file/10"
        );

        config.link_attachment_url = "http://127.0.0.1:9000/link/".to_string();
        let api = HttpMessageApi::new(config).unwrap();
        assert_eq!(api.link_url(1, 2), "http://127.0.0.1:9000/link/1/file/2");
    }

    #[test]
    fn test_envelope_shapes() {
        let created: Envelope<CreatedBody> = serde_json::from_str(
            r#"{"status": 200, "body": {"email": {"id": 5, "topic": "Hello", "text": "Hi"}}}"#,
        )
        .unwrap();
        assert_eq!(created.body.email.id, 5);

        let stored: Envelope<StoredBody> =
            serde_json::from_str(r#"{"status": 200, "body": {"FileId": 10}}"#).unwrap();
        assert_eq!(stored.body.file_id, 10);
    }
}
