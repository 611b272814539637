//! Flight-controller link: the fixed binary telemetry format and the
//! serial port it travels over.
//!
//! ```
//! use landing_vision_link::{decode_packet, encode_no_detection, TelemetryPacket};
//!
//! let bytes = encode_no_detection(1_000);
//! assert_eq!(bytes.len(), 10);
//! assert_eq!(
//!     decode_packet(&bytes).unwrap(),
//!     TelemetryPacket::NoDetection { timestamp_ms: 1_000 }
//! );
//! ```

mod protocol;
mod transport;

pub use protocol::{
    decode_packet, encode_detection, encode_no_detection, now_millis, split_packets, DecodeError,
    EncodingError, TelemetryPacket, DETECTION_LEN, HEADER, MSG_DETECTION, MSG_NO_DETECTION,
    NO_DETECTION_LEN,
};
pub use transport::{SerialTransport, TransportError, UartConfig};
