//! Fuzz target for datagram decoding.
//!
//! Arbitrary bytes must decode to an error or to a packet that encodes
//! again, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use year_duel::network::codec;
use year_duel::network::messages::Packet;
use year_duel::Message;

fuzz_target!(|data: &[u8]| {
    if let Ok(packet) = codec::decode_value::<Packet>(data) {
        let _ = codec::encode(&packet);
    }
    if let Ok(message) = codec::decode_value::<Message>(data) {
        let _ = codec::encode(&message);
        let _ = message.kind();
    }
});
