use crate::config::SmtpConfig;
use crate::error::Result;
use crate::intake::{InboundSubmission, MessageHandler};
use crate::smtp::commands::SmtpCommand;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Maximum line length in SMTP protocol, CRLF included (RFC 5321)
const MAX_LINE_LENGTH: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
enum SmtpState {
    Fresh,
    Greeted,
    MailFrom,
    RcptTo,
    Data,
}

enum LineRead {
    Eof,
    Line,
    /// The line exceeded the limit; the rest of it was read and discarded
    TooLong,
}

/// SMTP session handler with security limits
///
/// # Security features
/// - Command and DATA timeouts to prevent slowloris attacks
/// - Bounded line and message sizes; oversized input is drained, never buffered
/// - Recipient limits
/// - Error counting to drop misbehaving clients
///
/// The session knows nothing about message content: after DATA the whole
/// transaction is handed to the [`MessageHandler`] and its verdict is
/// written back as the reply.
pub struct SmtpSession {
    state: SmtpState,
    from: Option<String>,
    to: Vec<String>,
    data: Vec<u8>,
    hostname: String,
    handler: Arc<dyn MessageHandler>,
    peer: Option<SocketAddr>,
    error_count: usize,
    max_errors: usize,
    max_message_size: usize,
    max_recipients: usize,
    command_timeout: Duration,
    data_timeout: Duration,
}

impl SmtpSession {
    pub fn new(hostname: String, config: &SmtpConfig, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            state: SmtpState::Fresh,
            from: None,
            to: Vec::new(),
            data: Vec::new(),
            hostname,
            handler,
            peer: None,
            error_count: 0,
            max_errors: config.max_errors,
            max_message_size: config.max_message_size,
            max_recipients: config.max_recipients,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
            data_timeout: Duration::from_secs(config.data_timeout_secs),
        }
    }

    /// Run the session until QUIT, disconnect, timeout or too many errors.
    pub async fn handle<S>(mut self, stream: S, peer: Option<SocketAddr>) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.peer = peer;
        let mut buf_reader = BufReader::new(stream);
        let mut line = Vec::new();

        buf_reader
            .write_all(format!("220 {} ESMTP Service Ready\r\n", self.hostname).as_bytes())
            .await?;

        loop {
            // Check error count (security: disconnect abusive clients)
            if self.error_count >= self.max_errors {
                warn!("Too many errors, disconnecting");
                buf_reader
                    .write_all(b"421 4.7.0 Too many errors, closing connection\r\n")
                    .await?;
                break;
            }

            line.clear();

            // Read line with timeout (security: prevent slowloris)
            let read = match timeout(
                self.command_timeout,
                read_line(&mut buf_reader, &mut line, MAX_LINE_LENGTH),
            )
            .await
            {
                Ok(read) => read?,
                Err(_) => {
                    warn!("Command timeout, disconnecting");
                    buf_reader
                        .write_all(b"421 4.4.2 Timeout, closing connection\r\n")
                        .await?;
                    break;
                }
            };

            match read {
                LineRead::Eof => {
                    debug!("Client disconnected");
                    break;
                }
                LineRead::TooLong => {
                    error!("Command line too long");
                    buf_reader.write_all(b"500 5.5.2 Line too long\r\n").await?;
                    self.error_count += 1;
                    continue;
                }
                LineRead::Line => {}
            }

            let command = String::from_utf8_lossy(&line).trim_end().to_string();
            debug!("Received: {}", command);

            let response = match SmtpCommand::parse(&command) {
                Ok(cmd) => self.handle_command(cmd),
                Err(e) => {
                    debug!("Command parse error: {}", e);
                    "501 5.5.4 Syntax error in parameters or arguments\r\n".to_string()
                }
            };

            if response.starts_with('5') {
                self.error_count += 1;
            }

            buf_reader.write_all(response.as_bytes()).await?;

            if response.starts_with("221") {
                break;
            }

            // Handle DATA mode
            if self.state == SmtpState::Data {
                match self.receive_data(&mut buf_reader).await? {
                    Some(reply) => buf_reader.write_all(reply.as_bytes()).await?,
                    None => break,
                }
            }
        }

        buf_reader.flush().await?;
        Ok(())
    }

    fn handle_command(&mut self, cmd: SmtpCommand) -> String {
        match (self.state.clone(), cmd) {
            (_, SmtpCommand::Helo(domain)) => {
                info!("HELO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;
                format!("250 {} Hello {}\r\n", self.hostname, domain)
            }
            (_, SmtpCommand::Ehlo(domain)) => {
                info!("EHLO from {}", domain);
                self.reset_transaction();
                self.state = SmtpState::Greeted;

                format!(
                    "250-{} Hello {}\r\n\
                     250-SIZE {}\r\n\
                     250-8BITMIME\r\n\
                     250-ENHANCEDSTATUSCODES\r\n\
                     250 HELP\r\n",
                    self.hostname, domain, self.max_message_size
                )
            }
            (SmtpState::Greeted, SmtpCommand::MailFrom(mail)) => {
                if let Some(size) = mail.size {
                    if size > self.max_message_size {
                        warn!("Declared size {} exceeds limit {}", size, self.max_message_size);
                        return "552 5.3.4 Message size exceeds fixed maximum message size\r\n"
                            .to_string();
                    }
                }

                info!("MAIL FROM: <{}>", mail.address);
                self.from = Some(mail.address);
                self.to.clear();
                self.state = SmtpState::MailFrom;
                "250 2.1.0 OK\r\n".to_string()
            }
            (SmtpState::MailFrom | SmtpState::RcptTo, SmtpCommand::RcptTo(to)) => {
                // Check recipient limit (security: prevent spam)
                if self.to.len() >= self.max_recipients {
                    warn!("Too many recipients: {}", self.to.len());
                    return "452 4.5.3 Too many recipients\r\n".to_string();
                }

                info!("RCPT TO: <{}>", to);
                self.to.push(to);
                self.state = SmtpState::RcptTo;
                "250 2.1.5 OK\r\n".to_string()
            }
            (SmtpState::RcptTo, SmtpCommand::Data) => {
                debug!("DATA command received");
                self.state = SmtpState::Data;
                "354 Start mail input; end with <CRLF>.<CRLF>\r\n".to_string()
            }
            (state, SmtpCommand::Rset) => {
                debug!("RSET command");
                self.reset_transaction();
                if state != SmtpState::Fresh {
                    self.state = SmtpState::Greeted;
                }
                "250 2.0.0 OK\r\n".to_string()
            }
            (_, SmtpCommand::Noop) => "250 2.0.0 OK\r\n".to_string(),
            (_, SmtpCommand::Help) => {
                "214 2.0.0 Commands: HELO EHLO MAIL RCPT DATA RSET NOOP HELP VRFY QUIT\r\n"
                    .to_string()
            }
            (_, SmtpCommand::Vrfy(_)) => {
                "252 2.5.2 Cannot VRFY user, but will accept message and attempt delivery\r\n"
                    .to_string()
            }
            (_, SmtpCommand::Quit) => {
                debug!("QUIT command");
                format!("221 2.0.0 {} closing connection\r\n", self.hostname)
            }
            (_, SmtpCommand::Unknown(cmd)) => {
                warn!("Unknown command: {}", cmd);
                "502 5.5.2 Command not implemented\r\n".to_string()
            }
            (state, cmd) => {
                warn!("Invalid command sequence: {:?} in state {:?}", cmd, state);
                "503 5.5.1 Bad sequence of commands\r\n".to_string()
            }
        }
    }

    /// Receive the message after DATA and return the final reply.
    ///
    /// `None` means the connection must be closed.
    async fn receive_data<S>(&mut self, buf_reader: &mut BufReader<S>) -> Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        let mut too_large = false;
        let mut too_long = false;

        loop {
            line.clear();

            // Read with timeout (security: prevent slowloris)
            let read = match timeout(
                self.data_timeout,
                read_line(buf_reader, &mut line, MAX_LINE_LENGTH),
            )
            .await
            {
                Ok(read) => read?,
                Err(_) => {
                    warn!("DATA timeout");
                    buf_reader
                        .write_all(b"421 4.4.2 Timeout during DATA, closing connection\r\n")
                        .await?;
                    return Ok(None);
                }
            };

            match read {
                LineRead::Eof => {
                    warn!("Connection closed during DATA");
                    return Ok(None);
                }
                LineRead::TooLong => {
                    too_long = true;
                    continue;
                }
                LineRead::Line => {}
            }

            // Check for end of data (.)
            if line == b".\r\n" || line == b".\n" {
                break;
            }

            // Keep reading to the terminator, but store nothing more
            if too_large || too_long {
                continue;
            }

            // Handle transparency (RFC 5321 4.5.2)
            let content = line.strip_prefix(b".").unwrap_or(&line);

            // Check total size (security: prevent memory exhaustion)
            if self.data.len() + content.len() > self.max_message_size {
                warn!("Message exceeds {} bytes", self.max_message_size);
                too_large = true;
                self.data = Vec::new();
                continue;
            }

            self.data.extend_from_slice(content);
        }

        let reply = if too_large {
            "552 5.3.4 Message size exceeds fixed maximum message size\r\n".to_string()
        } else if too_long {
            error!("DATA line too long");
            "500 5.5.2 Line too long\r\n".to_string()
        } else {
            self.submit().await
        };

        // Reset state for next message
        self.reset_transaction();
        self.state = SmtpState::Greeted;

        Ok(Some(reply))
    }

    async fn submit(&mut self) -> String {
        let submission = InboundSubmission::new(
            self.peer,
            self.from.take().unwrap_or_default(),
            std::mem::take(&mut self.to),
            std::mem::take(&mut self.data),
        );
        info!(
            "End of DATA received, total size: {} bytes",
            submission.raw_message.len()
        );

        match self.handler.handle(submission).await {
            Ok(_) => "250 2.0.0 OK: message accepted\r\n".to_string(),
            Err(e) => e.smtp_reply(),
        }
    }

    fn reset_transaction(&mut self) {
        self.from = None;
        self.to.clear();
        self.data.clear();
    }
}

/// Read one line (terminator included) into `buf`, storing at most `limit`
/// bytes. The remainder of an over-long line is consumed and dropped.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>, limit: usize) -> std::io::Result<LineRead>
where
    R: AsyncBufRead + Unpin,
{
    let mut seen = false;
    let mut overflow = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(match (seen, overflow) {
                (false, _) => LineRead::Eof,
                (true, true) => LineRead::TooLong,
                (true, false) => LineRead::Line,
            });
        }
        seen = true;

        let (used, done) = match available.iter().position(|&b| b == b'\n') {
            Some(i) => (i + 1, true),
            None => (available.len(), false),
        };

        let room = limit.saturating_sub(buf.len());
        if used > room {
            overflow = true;
            buf.extend_from_slice(&available[..room]);
        } else {
            buf.extend_from_slice(&available[..used]);
        }
        reader.consume(used);

        if done {
            return Ok(if overflow {
                LineRead::TooLong
            } else {
                LineRead::Line
            });
        }
    }
}
