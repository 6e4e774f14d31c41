//! Minimal blocking IMAP4rev1 client over rustls.
//!
//! Only what reply correlation needs: LOGIN, SELECT, SEARCH, FETCH and LOGOUT.
//! Responses are read line by line; `{N}` literals are read as exact byte
//! counts so message bodies survive intact.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::error::MailboxError;
use crate::mail::mailbox::{Mailbox, MailboxAccount, MailboxConnector};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Tagged response: untagged lines, any literals, and the final status line.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

/// Connects to mailboxes over implicit TLS (port 993).
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

impl MailboxConnector for ImapConnector {
    fn connect(&self, account: &MailboxAccount) -> Result<Box<dyn Mailbox>, MailboxError> {
        Ok(Box::new(ImapSession::connect(account)?))
    }
}

/// One authenticated IMAP session.
pub struct ImapSession {
    tls: TlsStream,
    tag: u32,
    address: String,
}

impl ImapSession {
    /// Open TCP + TLS, read the greeting and log in.
    pub fn connect(account: &MailboxAccount) -> Result<Self, MailboxError> {
        let connect_err = |reason: String| MailboxError::Connect {
            host: account.host.clone(),
            port: account.port,
            reason,
        };

        let tcp = TcpStream::connect((account.host.as_str(), account.port))
            .map_err(|e| connect_err(e.to_string()))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let tls_config = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| MailboxError::Tls(e.to_string()))?
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let server_name = ServerName::try_from(account.host.clone())
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let conn = rustls::ClientConnection::new(Arc::new(tls_config), server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;

        let mut session = Self {
            tls: rustls::StreamOwned::new(conn, tcp),
            tag: 0,
            address: account.address.clone(),
        };

        let greeting = line_text(&session.read_line()?);
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Protocol(format!("unexpected greeting: {greeting}")));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&account.address),
            quote(account.password.expose_secret())
        );
        match session.command(&login) {
            Ok(_) => {}
            Err(MailboxError::Command { .. }) => {
                return Err(MailboxError::AuthFailed(account.address.clone()));
            }
            Err(e) => return Err(e),
        }

        debug!(mailbox = %session.address, host = %account.host, "IMAP session opened");
        Ok(session)
    }

    fn next_tag(&mut self) -> String {
        self.tag += 1;
        format!("A{}", self.tag)
    }

    fn read_line(&mut self) -> Result<Vec<u8>, MailboxError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.tls.read(&mut byte) {
                Ok(0) => return Err(MailboxError::Closed),
                Ok(_) => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(buf);
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send_raw(&mut self, bytes: &[u8]) -> Result<(), MailboxError> {
        self.tls.write_all(bytes)?;
        self.tls.flush()?;
        Ok(())
    }

    /// Read until the tagged completion line, collecting literals.
    fn read_response(&mut self, tag: &str, command: &str) -> Result<Response, MailboxError> {
        let prefix = format!("{tag} ");
        let mut response = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(size) = literal_size(&line) {
                let mut literal = vec![0u8; size];
                self.tls.read_exact(&mut literal)?;
                response.literals.push(literal);
                response.lines.push(line_text(&line));
                continue;
            }

            let text = line_text(&line);
            if let Some(status) = text.strip_prefix(&prefix) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                return Err(MailboxError::Command {
                    command: command.to_string(),
                    response: status.to_string(),
                });
            }
            response.lines.push(text);
        }
    }

    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = self.next_tag();
        self.send_raw(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.read_response(&tag, command_verb(cmd))
    }

    /// Send a command whose last argument is a synchronizing literal.
    fn command_with_literal(&mut self, prefix: &str, literal: &[u8]) -> Result<Response, MailboxError> {
        let tag = self.next_tag();
        let verb = command_verb(prefix);
        self.send_raw(format!("{tag} {prefix} {{{}}}\r\n", literal.len()).as_bytes())?;

        let cont = line_text(&self.read_line()?);
        if !cont.starts_with('+') {
            return Err(MailboxError::Command {
                command: verb.to_string(),
                response: cont,
            });
        }

        let mut payload = literal.to_vec();
        payload.extend_from_slice(b"\r\n");
        self.send_raw(&payload)?;
        self.read_response(&tag, verb)
    }
}

impl Mailbox for ImapSession {
    fn select_inbox(&mut self) -> Result<(), MailboxError> {
        self.command("SELECT \"INBOX\"").map(|_| ())
    }

    fn search_subject(&mut self, subject: &str) -> Result<Vec<u32>, MailboxError> {
        let response = if subject.is_ascii() {
            self.command(&format!("SEARCH SUBJECT {}", quote(subject)))?
        } else {
            self.command_with_literal("SEARCH CHARSET UTF-8 SUBJECT", subject.as_bytes())?
        };
        Ok(parse_search(&response.lines))
    }

    fn search_thread(&mut self, thread_id: &str) -> Result<Vec<u32>, MailboxError> {
        let id = quote(thread_id);
        let response = self.command(&format!(
            "SEARCH OR OR HEADER Message-ID {id} HEADER References {id} HEADER In-Reply-To {id}"
        ))?;
        Ok(parse_search(&response.lines))
    }

    fn fetch(&mut self, seq: u32) -> Result<Vec<u8>, MailboxError> {
        let mut response = self.command(&format!("FETCH {seq} BODY.PEEK[]"))?;
        if response.literals.is_empty() {
            return Err(MailboxError::Protocol(format!("FETCH {seq} returned no body")));
        }
        Ok(response.literals.swap_remove(0))
    }

    fn logout(&mut self) -> Result<(), MailboxError> {
        self.command("LOGOUT")?;
        self.tls.conn.send_close_notify();
        let _ = self.tls.flush();
        debug!(mailbox = %self.address, "IMAP session closed");
        Ok(())
    }
}

fn line_text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim_end().to_string()
}

fn command_verb(cmd: &str) -> &str {
    cmd.split_whitespace().next().unwrap_or(cmd)
}

/// Byte count of a `{N}` literal announced at the end of a line.
fn literal_size(line: &[u8]) -> Option<usize> {
    let line = line.strip_suffix(b"\r\n").unwrap_or(line);
    let line = line.strip_suffix(b"}")?;
    let open = line.iter().rposition(|&b| b == b'{')?;
    std::str::from_utf8(&line[open + 1..]).ok()?.parse().ok()
}

/// IMAP quoted string.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            out.push('\\');
        }
        if ch != '\r' && ch != '\n' {
            out.push(ch);
        }
    }
    out.push('"');
    out
}

fn parse_search(lines: &[String]) -> Vec<u32> {
    lines
        .iter()
        .filter_map(|line| line.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace().filter_map(|n| n.parse().ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_size_detection() {
        assert_eq!(literal_size(b"* 1 FETCH (BODY[] {342}\r\n"), Some(342));
        assert_eq!(literal_size(b"* 1 FETCH (FLAGS (\\Seen))\r\n"), None);
        assert_eq!(literal_size(b"A1 OK done\r\n"), None);
        assert_eq!(literal_size(b"{abc}\r\n"), None);
    }

    #[test]
    fn quote_escapes_specials() {
        assert_eq!(quote("Quick question, X Corp"), "\"Quick question, X Corp\"");
        assert_eq!(quote(r#"say "hi" \o/"#), r#""say \"hi\" \\o/""#);
        assert_eq!(quote("a\r\nb"), "\"ab\"");
    }

    #[test]
    fn search_results_are_parsed() {
        let lines = vec![
            "* SEARCH 2 5 9".to_string(),
            "* OK something".to_string(),
        ];
        assert_eq!(parse_search(&lines), vec![2, 5, 9]);
        assert!(parse_search(&["* SEARCH".to_string()]).is_empty());
    }

    #[test]
    fn command_verb_hides_arguments() {
        assert_eq!(command_verb("LOGIN \"a@x.com\" \"secret\""), "LOGIN");
        assert_eq!(command_verb("SEARCH CHARSET UTF-8 SUBJECT"), "SEARCH");
    }
}
