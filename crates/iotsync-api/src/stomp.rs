// STOMP 1.2 frame codec.
//
// Just enough of the protocol for a client that connects, subscribes,
// and receives broker messages over a WebSocket: text frames, escaped
// header values, NUL terminators, and bare-newline heartbeats.

use std::fmt::Write as _;
use std::str::FromStr;

use strum::{Display, EnumString};

use crate::error::Error;

/// Client and server frame commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Receipt,
    Error,
    Disconnect,
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First value of a header. Repeated headers keep the first occurrence,
    /// as STOMP 1.2 requires.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire text, including the trailing NUL.
    pub fn encode(&self) -> String {
        // CONNECT/CONNECTED headers are never escaped (STOMP 1.2 §Value Encoding).
        let escape = !matches!(self.command, Command::Connect | Command::Connected);

        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(&self.command.to_string());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                let _ = writeln!(out, "{}:{}", escape_value(name), escape_value(value));
            } else {
                let _ = writeln!(out, "{name}:{value}");
            }
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            let _ = writeln!(out, "content-length:{}", self.body.len());
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for a heartbeat (only EOLs, optionally NUL).
    pub fn decode(text: &str) -> Result<Option<Self>, Error> {
        let text = text.trim_start_matches(['\r', '\n']);
        if text.is_empty() || text == "\0" {
            return Ok(None);
        }

        let (head, body) = split_head(text)
            .ok_or_else(|| Error::Protocol("frame has no header terminator".into()))?;

        let mut lines = head.split('\n').map(|l| l.trim_end_matches('\r'));
        let command_line = lines.next().unwrap_or_default();
        let command = Command::from_str(command_line)
            .map_err(|_| Error::Protocol(format!("unknown command {command_line:?}")))?;
        let unescape = !matches!(command, Command::Connect | Command::Connected);

        let mut headers = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| Error::Protocol(format!("malformed header {line:?}")))?;
            if unescape {
                headers.push((unescape_value(name)?, unescape_value(value)?));
            } else {
                headers.push((name.to_owned(), value.to_owned()));
            }
        }

        let body = body.split('\0').next().unwrap_or_default().to_owned();
        Ok(Some(Self {
            command,
            headers,
            body,
        }))
    }
}

/// Negotiated heartbeat intervals in milliseconds (`0` = disabled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// How often we must send something.
    pub outgoing_ms: u64,
    /// How often we expect something from the server.
    pub incoming_ms: u64,
}

impl HeartBeat {
    /// Combine our `heart-beat:cx,cy` offer with the server's `sx,sy` reply.
    pub fn negotiate(client: (u64, u64), server_header: Option<&str>) -> Self {
        let (sx, sy) = server_header
            .and_then(|h| h.split_once(','))
            .and_then(|(a, b)| Some((a.trim().parse().ok()?, b.trim().parse().ok()?)))
            .unwrap_or((0, 0));
        let (cx, cy) = client;

        let outgoing_ms = if cx == 0 || sy == 0 { 0 } else { cx.max(sy) };
        let incoming_ms = if cy == 0 || sx == 0 { 0 } else { cy.max(sx) };
        Self {
            outgoing_ms,
            incoming_ms,
        }
    }
}

fn split_head(text: &str) -> Option<(&str, &str)> {
    if let Some(idx) = text.find("\n\n") {
        return Some((&text[..idx], &text[idx + 2..]));
    }
    text.find("\r\n\r\n")
        .map(|idx| (&text[..idx], &text[idx + 4..]))
}

fn escape_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_value(raw: &str) -> Result<String, Error> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodes_subscribe_frame() {
        let frame = Frame::new(Command::Subscribe)
            .header("id", "sub-0")
            .header("destination", "/topic/organization/org-1/devices/status");
        assert_eq!(
            frame.encode(),
            "SUBSCRIBE\nid:sub-0\ndestination\
             :/topic/organization/org-1/devices/status\n\n\0"
        );
    }

    #[test]
    fn decodes_message_frame() {
        let wire = "MESSAGE\nsubscription:sub-0\nmessage-id:7\n\
                    destination:/topic/organization/o/devices/status\n\
                    content-length:9\n\n{\"a\":\"b\"}\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.get("subscription"), Some("sub-0"));
        assert_eq!(frame.body, "{\"a\":\"b\"}");
    }

    #[test]
    fn heartbeat_decodes_to_none() {
        assert!(Frame::decode("\n").unwrap().is_none());
        assert!(Frame::decode("\r\n").unwrap().is_none());
    }

    #[test]
    fn header_values_are_escaped_outside_connect() {
        let frame = Frame::new(Command::Send)
            .header("destination", "/app/x")
            .header("note", "a:b\nc");
        let decoded = Frame::decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(decoded.get("note"), Some("a:b\nc"));
        assert!(frame.encode().contains("note:a\\cb\\nc"));
    }

    #[test]
    fn connected_headers_are_not_unescaped() {
        let wire = "CONNECTED\nversion:1.2\nheart-beat:0,0\nserver:weird\\x\n\n\0";
        let frame = Frame::decode(wire).unwrap().unwrap();
        assert_eq!(frame.get("server"), Some("weird\\x"));
    }

    #[test]
    fn unknown_command_is_protocol_error() {
        let err = Frame::decode("BOGUS\n\n\0").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn negotiates_heartbeats() {
        let hb = HeartBeat::negotiate((4000, 4000), Some("10000,10000"));
        assert_eq!(hb.outgoing_ms, 10000);
        assert_eq!(hb.incoming_ms, 10000);

        let off = HeartBeat::negotiate((4000, 4000), Some("0,0"));
        assert_eq!(off, HeartBeat::default());

        let missing = HeartBeat::negotiate((4000, 4000), None);
        assert_eq!(missing, HeartBeat::default());
    }
}
