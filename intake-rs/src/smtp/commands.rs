use crate::error::{IntakeError, Result};

/// Envelope sender with the ESMTP parameters we honour
#[derive(Debug, Clone, PartialEq)]
pub struct MailFrom {
    /// Reverse path without angle brackets; empty for the null sender `<>`
    pub address: String,
    /// Declared message size (RFC 1870)
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SmtpCommand {
    Helo(String),
    Ehlo(String),
    MailFrom(MailFrom),
    RcptTo(String),
    Data,
    Rset,
    Quit,
    Noop,
    Help,
    Vrfy(String),
    Unknown(String),
}

impl SmtpCommand {
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Err(IntakeError::SmtpProtocol("Empty command".to_string()));
        }

        let (command, args) = match line.split_once(char::is_whitespace) {
            Some((command, args)) => (command.to_ascii_uppercase(), args.trim()),
            None => (line.to_ascii_uppercase(), ""),
        };

        match command.as_str() {
            "HELO" => {
                if args.is_empty() {
                    return Err(IntakeError::SmtpProtocol("HELO requires domain".to_string()));
                }
                Ok(SmtpCommand::Helo(args.to_string()))
            }
            "EHLO" => {
                if args.is_empty() {
                    return Err(IntakeError::SmtpProtocol("EHLO requires domain".to_string()));
                }
                Ok(SmtpCommand::Ehlo(args.to_string()))
            }
            "MAIL" => Ok(SmtpCommand::MailFrom(Self::parse_mail_from(args)?)),
            "RCPT" => Ok(SmtpCommand::RcptTo(Self::parse_rcpt_to(args)?)),
            "DATA" => Ok(SmtpCommand::Data),
            "RSET" => Ok(SmtpCommand::Rset),
            "QUIT" => Ok(SmtpCommand::Quit),
            "NOOP" => Ok(SmtpCommand::Noop),
            "HELP" => Ok(SmtpCommand::Help),
            "VRFY" => Ok(SmtpCommand::Vrfy(args.to_string())),
            _ => Ok(SmtpCommand::Unknown(command)),
        }
    }

    fn parse_mail_from(args: &str) -> Result<MailFrom> {
        // Expected format: FROM:<email@domain.com> [SIZE=n] [BODY=8BITMIME]
        let rest = Self::strip_keyword(args, "FROM:")
            .ok_or_else(|| IntakeError::SmtpProtocol("Invalid MAIL FROM syntax".to_string()))?;
        let (address, params) = Self::split_path(rest)?;

        let mut size = None;
        for param in params.split_whitespace() {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            if key.eq_ignore_ascii_case("SIZE") {
                let declared = value.parse::<usize>().map_err(|_| {
                    IntakeError::SmtpProtocol(format!("Invalid SIZE parameter: {}", value))
                })?;
                size = Some(declared);
            }
        }

        Ok(MailFrom { address, size })
    }

    fn parse_rcpt_to(args: &str) -> Result<String> {
        // Expected format: TO:<email@domain.com>
        let rest = Self::strip_keyword(args, "TO:")
            .ok_or_else(|| IntakeError::SmtpProtocol("Invalid RCPT TO syntax".to_string()))?;
        let (address, _params) = Self::split_path(rest)?;

        if address.is_empty() {
            return Err(IntakeError::SmtpProtocol("Empty forward path".to_string()));
        }

        Ok(address)
    }

    fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
        let head = args.get(..keyword.len())?;
        if head.eq_ignore_ascii_case(keyword) {
            Some(args[keyword.len()..].trim_start())
        } else {
            None
        }
    }

    /// Split `<path> params` (or a bare `path params`) into its two halves.
    fn split_path(rest: &str) -> Result<(String, &str)> {
        if let Some(inner) = rest.strip_prefix('<') {
            let close = inner
                .find('>')
                .ok_or_else(|| IntakeError::SmtpProtocol("Unterminated path".to_string()))?;
            return Ok((inner[..close].trim().to_string(), &inner[close + 1..]));
        }

        match rest.split_once(char::is_whitespace) {
            Some((path, params)) => Ok((path.to_string(), params)),
            None => Ok((rest.to_string(), "")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail_from(address: &str, size: Option<usize>) -> SmtpCommand {
        SmtpCommand::MailFrom(MailFrom {
            address: address.to_string(),
            size,
        })
    }

    #[test]
    fn test_parse_helo() {
        let cmd = SmtpCommand::parse("HELO example.com").unwrap();
        assert_eq!(cmd, SmtpCommand::Helo("example.com".to_string()));
    }

    #[test]
    fn test_parse_ehlo() {
        let cmd = SmtpCommand::parse("ehlo example.com").unwrap();
        assert_eq!(cmd, SmtpCommand::Ehlo("example.com".to_string()));
        assert!(SmtpCommand::parse("EHLO").is_err());
    }

    #[test]
    fn test_parse_mail_from() {
        let cmd = SmtpCommand::parse("MAIL FROM:<sender@example.com>").unwrap();
        assert_eq!(cmd, mail_from("sender@example.com", None));

        let cmd = SmtpCommand::parse("mail from: <sender@example.com>").unwrap();
        assert_eq!(cmd, mail_from("sender@example.com", None));

        let cmd = SmtpCommand::parse("MAIL FROM:sender@example.com").unwrap();
        assert_eq!(cmd, mail_from("sender@example.com", None));
    }

    #[test]
    fn test_parse_mail_from_params() {
        let cmd = SmtpCommand::parse("MAIL FROM:<a@example.com> SIZE=1024 BODY=8BITMIME").unwrap();
        assert_eq!(cmd, mail_from("a@example.com", Some(1024)));

        assert!(SmtpCommand::parse("MAIL FROM:<a@example.com> SIZE=lots").is_err());
    }

    #[test]
    fn test_parse_null_sender() {
        let cmd = SmtpCommand::parse("MAIL FROM:<>").unwrap();
        assert_eq!(cmd, mail_from("", None));
    }

    #[test]
    fn test_parse_mail_from_invalid() {
        assert!(SmtpCommand::parse("MAIL <a@example.com>").is_err());
        assert!(SmtpCommand::parse("MAIL FROM:<a@example.com").is_err());
        assert!(SmtpCommand::parse("MAIL").is_err());
    }

    #[test]
    fn test_parse_rcpt_to() {
        let cmd = SmtpCommand::parse("RCPT TO:<recipient@example.com>").unwrap();
        assert_eq!(cmd, SmtpCommand::RcptTo("recipient@example.com".to_string()));

        let cmd = SmtpCommand::parse("RCPT TO:<\"Bob Smith\"@example.com> NOTIFY=NEVER").unwrap();
        assert_eq!(cmd, SmtpCommand::RcptTo("\"Bob Smith\"@example.com".to_string()));

        assert!(SmtpCommand::parse("RCPT TO:<>").is_err());
        assert!(SmtpCommand::parse("RCPT FROM:<a@example.com>").is_err());
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(SmtpCommand::parse("DATA").unwrap(), SmtpCommand::Data);
        assert_eq!(SmtpCommand::parse("rset").unwrap(), SmtpCommand::Rset);
        assert_eq!(SmtpCommand::parse("NOOP").unwrap(), SmtpCommand::Noop);
        assert_eq!(SmtpCommand::parse("HELP MAIL").unwrap(), SmtpCommand::Help);
        assert_eq!(SmtpCommand::parse("QUIT").unwrap(), SmtpCommand::Quit);
        assert_eq!(
            SmtpCommand::parse("VRFY bob").unwrap(),
            SmtpCommand::Vrfy("bob".to_string())
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert_eq!(
            SmtpCommand::parse("STARTTLS").unwrap(),
            SmtpCommand::Unknown("STARTTLS".to_string())
        );
        assert_eq!(
            SmtpCommand::parse("auth plain AGZvbwBiYXI=").unwrap(),
            SmtpCommand::Unknown("AUTH".to_string())
        );
        assert!(SmtpCommand::parse("   ").is_err());
    }
}
