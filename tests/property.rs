//! Property-based tests for the frame codec and the connection engine.

use std::io;

use proptest::prelude::*;

use wscore::protocol::apply_mask;
use wscore::{Config, Connection, Frame, OpCode, ReadEvent, Role, Transport, Update};

#[derive(Default)]
struct MockTransport {
    written: Vec<u8>,
    closed: bool,
}

impl Transport for MockTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn is_open(&self) -> bool {
        !self.closed
    }
}

fn server() -> Connection<MockTransport> {
    Connection::new(MockTransport::default(), Role::Server, Config::default())
}

fn drain(conn: &mut Connection<MockTransport>) {
    for _ in 0..100_000 {
        if conn.is_write_buffer_empty() || conn.is_terminated() {
            return;
        }
        conn.flush();
    }
    panic!("write buffer failed to drain");
}

fn written_frames(conn: &Connection<MockTransport>) -> Vec<Frame> {
    let mut buf = conn.transport().written.as_slice();
    let mut frames = Vec::new();
    while !buf.is_empty() {
        let (frame, consumed) = Frame::parse(buf).expect("invalid frame on the wire");
        frames.push(frame);
        buf = &buf[consumed..];
    }
    frames
}

/// Split `data` into fragments at the given cut points and encode them
/// as a fragmented message.
fn fragment_wire(data: &[u8], cuts: &[usize], opcode: OpCode) -> Vec<u8> {
    let mut bounds: Vec<usize> = cuts.iter().map(|&c| c % (data.len() + 1)).collect();
    bounds.push(0);
    bounds.push(data.len());
    bounds.sort_unstable();
    bounds.dedup();

    let mut wire = Vec::new();
    for (i, pair) in bounds.windows(2).enumerate() {
        let chunk = data[pair[0]..pair[1]].to_vec();
        let fin = pair[1] == data.len();
        let code = if i == 0 { opcode } else { OpCode::Continuation };
        wire.extend(Frame::new(fin, code, chunk).encode(None));
    }
    if bounds.len() < 2 {
        // Empty message: single empty FIN frame
        wire.extend(Frame::new(true, opcode, Vec::new()).encode(None));
    }
    wire
}

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Text), Just(OpCode::Binary)]
}

proptest! {
    // =========================================================================
    // Property: masking is an involution
    // =========================================================================
    #[test]
    fn test_mask_involution(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    // =========================================================================
    // Property: encode/parse round-trip
    // =========================================================================
    #[test]
    fn test_frame_roundtrip(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..1000),
        mask in prop::option::of(any::<[u8; 4]>())
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let encoded = frame.encode(mask);
        let (parsed, consumed) = Frame::parse(&encoded).unwrap();

        prop_assert_eq!(consumed, encoded.len());
        prop_assert_eq!(parsed, frame);
    }

    // =========================================================================
    // Property: fragmentation round-trip through the engine
    // =========================================================================
    #[test]
    fn test_fragmentation_roundtrip(
        payload in prop::collection::vec(any::<u8>(), 0..500),
        cuts in prop::collection::vec(any::<usize>(), 0..8)
    ) {
        let mut conn = server();
        conn.ingest(&fragment_wire(&payload, &cuts, OpCode::Binary));

        match conn.poll() {
            Some(Update::Read(ReadEvent::Message { opcode, payload: received })) => {
                prop_assert_eq!(opcode, OpCode::Binary);
                prop_assert_eq!(received.as_slice(), Some(payload.as_slice()));
            }
            other => prop_assert!(false, "expected message, got {:?}", other),
        }
        prop_assert!(conn.poll().is_none());
    }

    // =========================================================================
    // Property: a text message is delivered iff it is valid UTF-8,
    // regardless of how it is fragmented
    // =========================================================================
    #[test]
    fn test_text_validity_matches_std(
        payload in prop::collection::vec(any::<u8>(), 0..200),
        cuts in prop::collection::vec(any::<usize>(), 0..4)
    ) {
        let mut conn = server();
        conn.ingest(&fragment_wire(&payload, &cuts, OpCode::Text));

        let expected_valid = std::str::from_utf8(&payload).is_ok();
        match conn.poll() {
            Some(Update::Read(ReadEvent::Message { payload: received, .. })) => {
                prop_assert!(expected_valid, "invalid UTF-8 was accepted");
                prop_assert_eq!(received.as_slice(), Some(payload.as_slice()));
            }
            Some(Update::Error(_)) => prop_assert!(!expected_valid, "valid UTF-8 was rejected"),
            other => prop_assert!(false, "unexpected update {:?}", other),
        }
    }

    // =========================================================================
    // Property: utf-8 text round-trips whole when built from chars
    // =========================================================================
    #[test]
    fn test_valid_text_roundtrip(
        text in "\\PC{0,80}",
        cuts in prop::collection::vec(any::<usize>(), 0..4)
    ) {
        let mut conn = server();
        conn.ingest(&fragment_wire(text.as_bytes(), &cuts, OpCode::Text));

        match conn.poll() {
            Some(Update::Read(ReadEvent::Message { opcode, payload })) => {
                prop_assert_eq!(opcode, OpCode::Text);
                prop_assert_eq!(payload.as_slice(), Some(text.as_bytes()));
            }
            other => prop_assert!(false, "expected message, got {:?}", other),
        }
    }

    // =========================================================================
    // Property: close echo carries the received code, or 1002 when the
    // received code was invalid; exactly one close frame is sent
    // =========================================================================
    #[test]
    fn test_close_echo(code in any::<u16>()) {
        let mut conn = server();
        let mut payload = vec![0x88, 0x02];
        payload.extend(code.to_be_bytes());
        conn.ingest(&payload);
        drain(&mut conn);

        let frames = written_frames(&conn);
        let close_frames: Vec<&Frame> =
            frames.iter().filter(|f| f.opcode == OpCode::Close).collect();
        prop_assert_eq!(close_frames.len(), 1);

        let echoed = u16::from_be_bytes([
            close_frames[0].payload()[0],
            close_frames[0].payload()[1],
        ]);
        let expected = if wscore::protocol::is_valid_close_code(code) {
            code
        } else {
            1002
        };
        prop_assert_eq!(echoed, expected);
    }

    // =========================================================================
    // Property: every queued ping is transmitted before any data frame
    // enqueued after it
    // =========================================================================
    #[test]
    fn test_priority_ordering(
        ops in prop::collection::vec(any::<bool>(), 1..20)
    ) {
        let mut conn = server();
        let mut pings = 0u32;
        let mut datas = 0u32;
        for &is_ping in &ops {
            if is_ping {
                conn.write(&pings.to_be_bytes(), OpCode::Ping, true).unwrap();
                pings += 1;
            } else {
                conn.write(&datas.to_be_bytes(), OpCode::Binary, true).unwrap();
                datas += 1;
            }
        }
        drain(&mut conn);

        let frames = written_frames(&conn);
        prop_assert_eq!(frames.len(), ops.len());

        // With all writes queued before the first flush, the priority
        // queue drains first: pings in order, then data in order.
        let mut expected_ping = 0u32;
        let mut expected_data = 0u32;
        let mut seen_data = false;
        for frame in &frames {
            match frame.opcode {
                OpCode::Ping => {
                    prop_assert!(!seen_data, "ping transmitted after a data frame");
                    prop_assert_eq!(frame.payload(), &expected_ping.to_be_bytes()[..]);
                    expected_ping += 1;
                }
                OpCode::Binary => {
                    seen_data = true;
                    prop_assert_eq!(frame.payload(), &expected_data.to_be_bytes()[..]);
                    expected_data += 1;
                }
                other => prop_assert!(false, "unexpected opcode {}", other),
            }
        }
        prop_assert_eq!(expected_ping, pings);
        prop_assert_eq!(expected_data, datas);
    }

    // =========================================================================
    // Property: close-after-write closes the transport exactly when the
    // write buffer drains
    // =========================================================================
    #[test]
    fn test_close_after_write_drain(
        frames in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
        write_rate in 1usize..64
    ) {
        let mut conn = server();
        conn.set_write_rate(write_rate);
        for payload in &frames {
            conn.write(payload, OpCode::Binary, true).unwrap();
        }
        conn.set_close_after_write();

        while !conn.is_terminated() {
            conn.flush();
            if conn.is_terminated() {
                // The transport closes only once everything drained
                prop_assert!(conn.is_write_buffer_empty());
            } else {
                prop_assert!(conn.transport().is_open());
            }
        }
        prop_assert!(!conn.transport().is_open());
        prop_assert_eq!(written_frames(&conn).len(), frames.len());
    }

    // =========================================================================
    // Property: write_multi_framed reassembles to the original message
    // when looped back into a peer engine
    // =========================================================================
    #[test]
    fn test_multi_framed_loopback(
        payload in prop::collection::vec(any::<u8>(), 0..300),
        frame_size in 1usize..64
    ) {
        let mut sender = server();
        sender.write_multi_framed(&payload, OpCode::Binary, frame_size).unwrap();
        drain(&mut sender);

        let mut receiver = server();
        receiver.ingest(&sender.transport().written);

        match receiver.poll() {
            Some(Update::Read(ReadEvent::Message { opcode, payload: received })) => {
                prop_assert_eq!(opcode, OpCode::Binary);
                prop_assert_eq!(received.as_slice(), Some(payload.as_slice()));
            }
            other => prop_assert!(false, "expected message, got {:?}", other),
        }
    }
}
