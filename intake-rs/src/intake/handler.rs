use crate::config::Config;
use crate::delivery::{DeliveryOrchestrator, DeliveryReport, HttpMessageApi, MessageApi};
use crate::error::{IntakeError, Result};
use crate::intake::decoder::EnvelopeDecoder;
use crate::intake::guard::DomainGuard;
use crate::intake::types::InboundSubmission;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Per-message pipeline invoked by the SMTP session after DATA.
///
/// `Ok` is answered with 250, an error with [`IntakeError::smtp_reply`].
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, submission: InboundSubmission) -> Result<DeliveryReport>;
}

/// Decode, check the recipient domain, then deliver.
pub struct IntakeHandler {
    guard: DomainGuard,
    orchestrator: DeliveryOrchestrator,
}

impl IntakeHandler {
    pub fn new(guard: DomainGuard, orchestrator: DeliveryOrchestrator) -> Self {
        Self {
            guard,
            orchestrator,
        }
    }

    /// Handler delivering over HTTP to the endpoints in `config.api`
    pub fn from_config(config: &Config) -> Result<Self> {
        let api = HttpMessageApi::new(config.api.clone())
            .map_err(|e| IntakeError::Config(format!("Cannot build HTTP client: {}", e)))?;
        let api: Arc<dyn MessageApi> = Arc::new(api);

        Ok(Self::new(
            DomainGuard::new(&config.server.domain)?,
            DeliveryOrchestrator::new(api),
        ))
    }

    async fn process(&self, submission: &InboundSubmission) -> Result<DeliveryReport> {
        let message = EnvelopeDecoder::decode(submission)?;

        // Nothing may reach the backend before this check
        self.guard.validate(&message.recipient_email)?;

        self.orchestrator.deliver(&message).await
    }
}

#[async_trait::async_trait]
impl MessageHandler for IntakeHandler {
    async fn handle(&self, submission: InboundSubmission) -> Result<DeliveryReport> {
        let span = info_span!("submission", id = %Uuid::new_v4());

        async {
            info!(
                origin = ?submission.origin,
                sender = %submission.sender,
                recipients = submission.recipients.len(),
                size = submission.raw_message.len(),
                "Message submitted"
            );

            match self.process(&submission).await {
                Ok(report) => {
                    info!(
                        message_id = report.message.id,
                        linked = report.linked().count(),
                        dropped = report.failed().count(),
                        "Message accepted"
                    );
                    Ok(report)
                }
                Err(e) => {
                    warn!(error = %e, "Message rejected");
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }
}
