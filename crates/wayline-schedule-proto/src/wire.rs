// SPDX-License-Identifier: Apache-2.0
// © Wayline Works <https://github.com/wayline-works/wayline>

//! CBOR codec for schedule messages.
//!
//! Messages cross the broker as self-contained CBOR values; topic names
//! carry the type information, so the codec itself is schema-free.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Errors from message encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The value could not be encoded as CBOR.
    #[error("cbor encode failed: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// The payload was not valid CBOR for the expected type.
    #[error("cbor decode failed: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
    /// The stream does not yet hold a whole frame; read more bytes and
    /// retry.
    #[error("incomplete frame")]
    IncompleteFrame,
}

/// Encodes a message to CBOR bytes.
///
/// # Errors
/// Returns [`WireError::Encode`] when serialization fails.
pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>, WireError> {
    let mut out = Vec::new();
    ciborium::into_writer(message, &mut out)?;
    Ok(out)
}

/// Decodes a message from CBOR bytes.
///
/// # Errors
/// Returns [`WireError::Decode`] when the payload does not parse as `M`.
pub fn decode<M: DeserializeOwned>(bytes: &[u8]) -> Result<M, WireError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Length-prefixed framing for stream transports: a u32 big-endian
/// payload length followed by the CBOR payload.
///
/// Brokers that deliver discrete messages never need this; bridges that
/// carry schedule traffic over a byte stream frame each message with
/// [`Packet::encode`] and peel frames off the receive buffer with
/// [`Packet::decode`].
#[derive(Debug, Clone, Copy)]
pub struct Packet;

impl Packet {
    /// Encodes a message into a length-prefixed CBOR frame.
    ///
    /// # Errors
    /// Returns [`WireError::Encode`] when serialization fails.
    pub fn encode<M: Serialize>(message: &M) -> Result<Vec<u8>, WireError> {
        let body = encode(message)?;
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes one frame from the front of `stream`, returning the
    /// message and the number of bytes consumed.
    ///
    /// # Errors
    /// Returns [`WireError::IncompleteFrame`] while the buffer holds less
    /// than a whole frame, and [`WireError::Decode`] when the framed
    /// payload does not parse as `M`.
    pub fn decode<M: DeserializeOwned>(stream: &[u8]) -> Result<(M, usize), WireError> {
        if stream.len() < 4 {
            return Err(WireError::IncompleteFrame);
        }
        let len = u32::from_be_bytes([stream[0], stream[1], stream[2], stream[3]]) as usize;
        if stream.len() < 4 + len {
            return Err(WireError::IncompleteFrame);
        }
        let message = decode(&stream[4..4 + len])?;
        Ok((message, 4 + len))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{ConflictNotice, InconsistencyMsg, MirrorUpdateMsg};
    use wayline_schedule::{
        Database, ItineraryVersion, NegotiationVersion, ParticipantDescription, ParticipantId,
        Query, QueryId, Responsiveness, VersionRange,
    };
    use wayline_traffic::{Profile, Route, Time, Trajectory, Waypoint};

    #[test]
    fn mirror_update_round_trips_with_a_real_patch() {
        let mut db = Database::new();
        let reg = db.register(ParticipantDescription::new(
            "codec-robot",
            "codec_fleet",
            Responsiveness::Responsive,
            Profile::circle_mm(300),
        ));
        db.set(
            reg.id,
            vec![Route::new(
                "L1",
                Trajectory::from_waypoints(vec![
                    Waypoint::new(Time::from_secs(0), [0.0, 0.0]),
                    Waypoint::new(Time::from_secs(7), [3.0, 4.0]),
                ])
                .expect("valid trajectory"),
            )],
            ItineraryVersion(1),
        )
        .expect("registered");

        let msg = MirrorUpdateMsg {
            database_version: db.latest_version(),
            query_id: QueryId(4),
            query: Query::all(),
            patch: db.changes(&Query::all(), None),
        };
        let bytes = encode(&msg).expect("encode");
        let decoded: MirrorUpdateMsg = decode(&bytes).expect("decode");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn packets_frame_and_deframe_across_a_stream() {
        let first = ConflictNotice {
            conflict_version: NegotiationVersion(1),
            participants: vec![ParticipantId(1), ParticipantId(2)],
        };
        let second = ConflictNotice {
            conflict_version: NegotiationVersion(2),
            participants: vec![ParticipantId(3), ParticipantId(4)],
        };

        // Two frames concatenated on one stream peel off in order.
        let mut stream = Packet::encode(&first).expect("encode");
        stream.extend_from_slice(&Packet::encode(&second).expect("encode"));

        let (decoded, consumed) = Packet::decode::<ConflictNotice>(&stream).expect("first frame");
        assert_eq!(decoded, first);
        let (decoded, rest) =
            Packet::decode::<ConflictNotice>(&stream[consumed..]).expect("second frame");
        assert_eq!(decoded, second);
        assert_eq!(consumed + rest, stream.len());

        // A truncated prefix or body is reported as incomplete, not an
        // error, so stream readers know to keep buffering.
        assert!(matches!(
            Packet::decode::<ConflictNotice>(&stream[..2]),
            Err(WireError::IncompleteFrame)
        ));
        assert!(matches!(
            Packet::decode::<ConflictNotice>(&stream[..consumed - 1]),
            Err(WireError::IncompleteFrame)
        ));
    }

    #[test]
    fn negotiation_and_inconsistency_messages_round_trip() {
        let notice = ConflictNotice {
            conflict_version: NegotiationVersion(9),
            participants: vec![ParticipantId(1), ParticipantId(2)],
        };
        let decoded: ConflictNotice = decode(&encode(&notice).expect("encode")).expect("decode");
        assert_eq!(decoded, notice);

        let report = InconsistencyMsg {
            participant: ParticipantId(1),
            ranges: vec![VersionRange {
                lower: ItineraryVersion(2),
                upper: ItineraryVersion(4),
            }],
            last_known_version: ItineraryVersion(1),
        };
        let decoded: InconsistencyMsg = decode(&encode(&report).expect("encode")).expect("decode");
        assert_eq!(decoded, report);
    }
}
