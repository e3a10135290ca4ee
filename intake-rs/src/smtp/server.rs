use crate::config::Config;
use crate::error::Result;
use crate::intake::MessageHandler;
use crate::smtp::session::SmtpSession;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// SMTP listener; every accepted connection runs in its own task.
pub struct SmtpServer {
    config: Config,
    hostname: String,
    handler: Arc<dyn MessageHandler>,
}

impl SmtpServer {
    pub fn new(config: Config, handler: Arc<dyn MessageHandler>) -> Self {
        let hostname = config.hostname();
        Self {
            config,
            hostname,
            handler,
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.smtp.listen_addr).await?;
        info!("SMTP server listening on {}", self.config.smtp.listen_addr);

        self.serve(listener).await
    }

    /// Accept connections from an already bound listener. Never returns
    /// unless the task is cancelled.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, addr)) => {
                    info!("New SMTP connection from {}", addr);

                    let session = SmtpSession::new(
                        self.hostname.clone(),
                        &self.config.smtp,
                        self.handler.clone(),
                    );

                    tokio::spawn(async move {
                        if let Err(e) = session.handle(socket, Some(addr)).await {
                            error!("Session error from {}: {}", addr, e);
                        }
                        info!("SMTP connection from {} closed", addr);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
