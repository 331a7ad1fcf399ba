//! The UDP discovery announcement.
//!
//! Wire format (ASCII, no length prefix, no terminator):
//! ```text
//! SERVER_IP_DISCOVERY:<tcp_port>
//! ```
//! `<tcp_port>` is the decimal TCP port the server accepts clients on, for
//! example `SERVER_IP_DISCOVERY:50001`.
//!
//! # How discovery works (for beginners)
//!
//! A Pico that has just joined the Wi-Fi network does not know the server's
//! IP address.  Instead of configuring it by hand, the device listens on the
//! discovery UDP port.  The server periodically sends this datagram to the
//! subnet broadcast address, so every host on the LAN receives it.  The
//! datagram's *source address* tells the device where the server lives, and
//! the payload tells it which TCP port to connect to.

use std::fmt;

use thiserror::Error;

/// Fixed marker that prefixes every discovery payload.
pub const DISCOVERY_MARKER: &str = "SERVER_IP_DISCOVERY";

/// Errors returned when a datagram is not a valid discovery announcement.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnouncementError {
    /// The datagram is not valid UTF-8 text.
    #[error("announcement is not valid UTF-8")]
    NotText,

    /// The datagram does not start with `SERVER_IP_DISCOVERY:`.
    #[error("announcement does not start with SERVER_IP_DISCOVERY:")]
    WrongMarker,

    /// The port field is missing, non-numeric, zero, or out of range.
    #[error("invalid port in announcement: {0:?}")]
    InvalidPort(String),
}

/// A decoded discovery announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Announcement {
    /// TCP port the announcing server accepts connections on.
    pub tcp_port: u16,
}

impl Announcement {
    /// Creates an announcement advertising `tcp_port`.
    pub fn new(tcp_port: u16) -> Self {
        Self { tcp_port }
    }

    /// Serialises the announcement to its exact wire bytes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use swarm_core::Announcement;
    ///
    /// assert_eq!(Announcement::new(50001).to_bytes(), b"SERVER_IP_DISCOVERY:50001");
    /// ```
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses a received datagram.
    ///
    /// Strict: surrounding whitespace, a sign, or trailing characters after
    /// the port are rejected, because the server never emits them.
    ///
    /// # Errors
    ///
    /// Returns an [`AnnouncementError`] describing the first problem found.
    pub fn parse(datagram: &[u8]) -> Result<Self, AnnouncementError> {
        let text = std::str::from_utf8(datagram).map_err(|_| AnnouncementError::NotText)?;

        let port_field = text
            .strip_prefix(DISCOVERY_MARKER)
            .and_then(|rest| rest.strip_prefix(':'))
            .ok_or(AnnouncementError::WrongMarker)?;

        if port_field.is_empty() || !port_field.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AnnouncementError::InvalidPort(port_field.to_string()));
        }

        match port_field.parse::<u16>() {
            Ok(0) | Err(_) => Err(AnnouncementError::InvalidPort(port_field.to_string())),
            Ok(tcp_port) => Ok(Self { tcp_port }),
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{DISCOVERY_MARKER}:{}", self.tcp_port)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_encodes_to_exact_wire_bytes() {
        // Arrange
        let announcement = Announcement::new(50001);

        // Act
        let bytes = announcement.to_bytes();

        // Assert
        assert_eq!(bytes, b"SERVER_IP_DISCOVERY:50001".to_vec());
    }

    #[test]
    fn test_encoded_payload_has_no_terminator() {
        let bytes = Announcement::new(1).to_bytes();
        assert_eq!(bytes.last(), Some(&b'1'));
        assert!(!bytes.contains(&b'\n'));
        assert!(!bytes.contains(&0));
    }

    #[test]
    fn test_parse_accepts_server_payload() {
        // Arrange
        let datagram = b"SERVER_IP_DISCOVERY:50001";

        // Act
        let parsed = Announcement::parse(datagram);

        // Assert
        assert_eq!(parsed, Ok(Announcement::new(50001)));
    }

    #[test]
    fn test_parse_accepts_max_port() {
        assert_eq!(
            Announcement::parse(b"SERVER_IP_DISCOVERY:65535"),
            Ok(Announcement::new(65535))
        );
    }

    #[test]
    fn test_parse_rejects_wrong_marker() {
        assert_eq!(
            Announcement::parse(b"CLIENT_HELLO:50001"),
            Err(AnnouncementError::WrongMarker)
        );
    }

    #[test]
    fn test_parse_rejects_marker_without_separator() {
        assert_eq!(
            Announcement::parse(b"SERVER_IP_DISCOVERY50001"),
            Err(AnnouncementError::WrongMarker)
        );
    }

    #[test]
    fn test_parse_rejects_missing_port() {
        assert_eq!(
            Announcement::parse(b"SERVER_IP_DISCOVERY:"),
            Err(AnnouncementError::InvalidPort(String::new()))
        );
    }

    #[test]
    fn test_parse_rejects_port_zero() {
        assert!(matches!(
            Announcement::parse(b"SERVER_IP_DISCOVERY:0"),
            Err(AnnouncementError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_parse_rejects_out_of_range_port() {
        assert!(matches!(
            Announcement::parse(b"SERVER_IP_DISCOVERY:65536"),
            Err(AnnouncementError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_parse_rejects_signed_and_padded_ports() {
        for datagram in [
            &b"SERVER_IP_DISCOVERY:+50001"[..],
            &b"SERVER_IP_DISCOVERY: 50001"[..],
            &b"SERVER_IP_DISCOVERY:50001\n"[..],
        ] {
            assert!(
                matches!(
                    Announcement::parse(datagram),
                    Err(AnnouncementError::InvalidPort(_))
                ),
                "must reject {datagram:?}"
            );
        }
    }

    #[test]
    fn test_parse_rejects_non_utf8() {
        assert_eq!(
            Announcement::parse(&[0xFF, 0xFE, 0x00]),
            Err(AnnouncementError::NotText)
        );
    }

    #[test]
    fn test_display_matches_wire_format() {
        assert_eq!(
            Announcement::new(4242).to_string(),
            "SERVER_IP_DISCOVERY:4242"
        );
    }
}
