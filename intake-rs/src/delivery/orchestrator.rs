use crate::delivery::api::{CreatedMessageRecord, MessageApi, NewMessage};
use crate::error::{AttachmentError, IntakeError, Result};
use crate::intake::{Attachment, ParsedMessage};
use std::sync::Arc;
use tracing::{error, info, warn};

/// An attachment the storage endpoint accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Position of the source attachment in the message
    pub index: usize,
    pub filename: String,
    pub file_id: u64,
}

/// A stored file successfully attached to the created message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub index: usize,
    pub message_id: u64,
    pub file_id: u64,
}

/// Result of a delivery whose mandatory step succeeded.
///
/// `attachments` holds one entry per attachment, in message order.
#[derive(Debug)]
pub struct DeliveryReport {
    pub message: CreatedMessageRecord,
    pub attachments: Vec<std::result::Result<LinkOutcome, AttachmentError>>,
}

impl DeliveryReport {
    pub fn linked(&self) -> impl Iterator<Item = &LinkOutcome> {
        self.attachments.iter().filter_map(|a| a.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &AttachmentError> {
        self.attachments.iter().filter_map(|a| a.as_ref().err())
    }
}

/// Delivery orchestrator
///
/// Creates the message first. Only if that succeeds is each attachment
/// uploaded and linked, one after another. Attachment failures are logged
/// and recorded in the report, they never fail the delivery.
#[derive(Clone)]
pub struct DeliveryOrchestrator {
    api: Arc<dyn MessageApi>,
}

impl DeliveryOrchestrator {
    pub fn new(api: Arc<dyn MessageApi>) -> Self {
        Self { api }
    }

    pub async fn deliver(&self, message: &ParsedMessage) -> Result<DeliveryReport> {
        let created = self
            .api
            .create_message(&NewMessage::from(message))
            .await
            .map_err(|e| {
                error!(error = %e, "Message creation failed");
                IntakeError::UpstreamCreateFailed(e)
            })?;

        info!(message_id = created.id, topic = %created.topic, "Message created");

        let mut attachments = Vec::with_capacity(message.attachments.len());
        for (index, attachment) in message.attachments.iter().enumerate() {
            let outcome = match self.upload(index, attachment).await {
                Ok(file) => self.link(created.id, file).await,
                Err(e) => Err(e),
            };

            if let Err(ref e) = outcome {
                warn!(
                    message_id = created.id,
                    index,
                    filename = %attachment.filename,
                    error = %e,
                    "Attachment dropped"
                );
            }
            attachments.push(outcome);
        }

        Ok(DeliveryReport {
            message: created,
            attachments,
        })
    }

    async fn upload(
        &self,
        index: usize,
        attachment: &Attachment,
    ) -> std::result::Result<UploadedFile, AttachmentError> {
        let file_id = self
            .api
            .store_attachment(attachment)
            .await
            .map_err(|source| AttachmentError::Upload {
                index,
                filename: attachment.filename.clone(),
                source,
            })?;

        Ok(UploadedFile {
            index,
            filename: attachment.filename.clone(),
            file_id,
        })
    }

    async fn link(
        &self,
        message_id: u64,
        file: UploadedFile,
    ) -> std::result::Result<LinkOutcome, AttachmentError> {
        // A failure here leaves the stored file orphaned; nothing reclaims it.
        self.api
            .link_attachment(message_id, file.file_id)
            .await
            .map_err(|source| AttachmentError::Link {
                index: file.index,
                filename: file.filename.clone(),
                message_id,
                file_id: file.file_id,
                source,
            })?;

        info!(message_id, file_id = file.file_id, filename = %file.filename, "Attachment linked");

        Ok(LinkOutcome {
            index: file.index,
            message_id,
            file_id: file.file_id,
        })
    }
}
