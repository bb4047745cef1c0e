//! Fuzz target: `codec::decode`
//!
//! Feeds arbitrary bytes as both binary and (lossy) text frames. Decoding
//! must never panic, and anything that decodes must survive a re-encode.
//!
//! cargo fuzz run fuzz_envelope_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use testbridge::connection::Payload;
use testbridge::protocol::codec;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data).into_owned();
    for payload in [Payload::Binary(data.to_vec()), Payload::Text(text)] {
        if let Ok(envelope) = codec::decode(&payload) {
            let encoded = codec::encode(&envelope).expect("decoded envelope re-encodes");
            assert!(encoded.as_text().is_some(), "encode always yields text");
            let again = codec::decode(&encoded).expect("re-encoded envelope decodes");
            assert_eq!(again.kind(), envelope.kind());
        }
    }
});
