//! SMTP commands: builders for the client and verb splitting for the server.

use std::fmt;

use crate::types::AuthMechanism;

/// SMTP command sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address, sent verbatim between angle brackets
        from: String,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: String,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Describes the command for error reports, without credentials.
    #[must_use]
    pub fn step(&self) -> String {
        match self {
            Self::Auth { mechanism, .. } => format!("AUTH {}", mechanism.as_str()),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Command {
    /// Writes the wire form of the command, without the line terminator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Helo { hostname } => write!(f, "HELO {hostname}"),
            Self::Ehlo { hostname } => write!(f, "EHLO {hostname}"),
            Self::StartTls => f.write_str("STARTTLS"),
            Self::Auth {
                mechanism,
                initial_response,
            } => {
                write!(f, "AUTH {}", mechanism.as_str())?;
                if let Some(resp) = initial_response {
                    write!(f, " {resp}")?;
                }
                Ok(())
            }
            Self::MailFrom { from } => write!(f, "MAIL FROM:<{from}>"),
            Self::RcptTo { to } => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
        }
    }
}

/// Command verb received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    /// HELO
    Helo,
    /// EHLO
    Ehlo,
    /// STARTTLS
    StartTls,
    /// AUTH
    Auth,
    /// MAIL
    Mail,
    /// RCPT
    Rcpt,
    /// DATA
    Data,
    /// RSET
    Rset,
    /// NOOP
    Noop,
    /// QUIT
    Quit,
    /// Any other verb, uppercased
    Unknown(String),
}

impl Verb {
    /// Recognizes an uppercased verb.
    fn from_upper(verb: String) -> Self {
        match verb.as_str() {
            "HELO" => Self::Helo,
            "EHLO" => Self::Ehlo,
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth,
            "MAIL" => Self::Mail,
            "RCPT" => Self::Rcpt,
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => Self::Unknown(verb),
        }
    }
}

/// Splits a command line into its verb and the verbatim argument string.
///
/// The verb is matched case-insensitively; the argument string is
/// everything after the first space.
#[must_use]
pub fn split_command(line: &str) -> (Verb, &str) {
    let (verb, args) = line.split_once(' ').unwrap_or((line, ""));
    (Verb::from_upper(verb.to_ascii_uppercase()), args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helo_command() {
        let cmd = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(cmd.to_string(), "HELO client.example.com");
    }

    #[test]
    fn test_ehlo_command() {
        let cmd = Command::Ehlo {
            hostname: "localhost".to_string(),
        };
        assert_eq!(cmd.to_string(), "EHLO localhost");
    }

    #[test]
    fn test_auth_plain() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.to_string(), "AUTH PLAIN AHVzZXIAcGFzcw==");
        assert_eq!(cmd.step(), "AUTH PLAIN");
    }

    #[test]
    fn test_auth_login_without_initial_response() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(cmd.to_string(), "AUTH LOGIN");
    }

    #[test]
    fn test_envelope_commands() {
        let from = Command::MailFrom {
            from: "a@localhost".to_string(),
        };
        let to = Command::RcptTo {
            to: "b@localhost".to_string(),
        };
        assert_eq!(from.to_string(), "MAIL FROM:<a@localhost>");
        assert_eq!(to.to_string(), "RCPT TO:<b@localhost>");
        assert_eq!(to.step(), "RCPT TO:<b@localhost>");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::StartTls.to_string(), "STARTTLS");
        assert_eq!(Command::Data.to_string(), "DATA");
        assert_eq!(Command::Rset.to_string(), "RSET");
        assert_eq!(Command::Noop.to_string(), "NOOP");
        assert_eq!(Command::Quit.to_string(), "QUIT");
    }

    #[test]
    fn test_split_command_case_insensitive() {
        assert_eq!(split_command("ehlo localhost"), (Verb::Ehlo, "localhost"));
        assert_eq!(split_command("Mail FROM:<a@b>"), (Verb::Mail, "FROM:<a@b>"));
        assert_eq!(split_command("QUIT"), (Verb::Quit, ""));
        assert_eq!(split_command("StartTLS"), (Verb::StartTls, ""));
    }

    #[test]
    fn test_split_command_keeps_arguments_verbatim() {
        assert_eq!(
            split_command("RCPT  TO:<B@Example.com>"),
            (Verb::Rcpt, " TO:<B@Example.com>")
        );
    }

    #[test]
    fn test_split_command_unknown() {
        assert_eq!(
            split_command("vrfy postmaster"),
            (Verb::Unknown("VRFY".to_string()), "postmaster")
        );
        assert_eq!(split_command(""), (Verb::Unknown(String::new()), ""));
    }
}
