//! Line protocol definitions

/// Commands sent to the microcontroller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the drowsiness alarm
    Drowsy,
}

impl Command {
    /// Wire form, newline terminated
    pub fn as_line(&self) -> &'static [u8] {
        match self {
            Command::Drowsy => b"DROWSY\n",
        }
    }
}

/// Lines received from the microcontroller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkMessage {
    /// Driver acknowledged the alarm
    Ack,
    /// Anything else (debug output, partial lines)
    Other(String),
}

impl LinkMessage {
    /// Parse one raw line. Blank lines yield `None`.
    pub fn parse(raw: &[u8]) -> Option<Self> {
        let line = decode_line(raw);
        if line.is_empty() {
            return None;
        }
        if line == "ACK" {
            Some(LinkMessage::Ack)
        } else {
            Some(LinkMessage::Other(line))
        }
    }
}

/// Decode a raw line, dropping invalid UTF-8 and surrounding whitespace
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_command_wire_form() {
        assert_eq!(Command::Drowsy.as_line(), b"DROWSY\n");
    }

    #[test]
    fn test_parse_ack_variants() {
        assert_eq!(LinkMessage::parse(b"ACK\n"), Some(LinkMessage::Ack));
        assert_eq!(LinkMessage::parse(b"  ACK\r\n"), Some(LinkMessage::Ack));
        assert_eq!(LinkMessage::parse(b"A\xffCK\n"), Some(LinkMessage::Ack));
        assert_eq!(
            LinkMessage::parse(b"ack\n"),
            Some(LinkMessage::Other("ack".to_string()))
        );
        assert_eq!(
            LinkMessage::parse(b"ACKNOWLEDGED\n"),
            Some(LinkMessage::Other("ACKNOWLEDGED".to_string()))
        );
    }

    #[test]
    fn test_blank_lines_ignored() {
        assert_eq!(LinkMessage::parse(b"\r\n"), None);
        assert_eq!(LinkMessage::parse(b"\xfe\xff\n"), None);
    }

    proptest! {
        #[test]
        fn prop_decode_never_panics(raw in proptest::collection::vec(any::<u8>(), 0..64)) {
            let line = decode_line(&raw);
            prop_assert!(!line.contains(char::REPLACEMENT_CHARACTER));
            prop_assert_eq!(line.trim(), line.as_str());
        }
    }
}
