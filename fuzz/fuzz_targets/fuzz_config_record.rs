//! Fuzz target: FRAM config record decoding
//!
//! Treats the input as raw FRAM contents at the record offset.  A record
//! that decodes must also pass validation and survive a re-encode.
//!
//! cargo fuzz run fuzz_config_record

#![no_main]

use libfuzzer_sys::fuzz_target;
use lidguard::adapters::fram_store::{CHECKSUM_LEN, HEADER_LEN, decode_body, encode_record, payload_len};

fuzz_target!(|data: &[u8]| {
    let Some((head, rest)) = data.split_first_chunk::<HEADER_LEN>() else {
        return;
    };
    let Ok(Some(len)) = payload_len(head) else {
        return;
    };
    let Some(body) = rest.get(..len + CHECKSUM_LEN) else {
        return;
    };
    if let Ok(config) = decode_body(body) {
        assert!(config.validate().is_ok());
        let record = encode_record(&config).expect("valid config must encode");
        assert_eq!(decode_body(&record[HEADER_LEN..]), Ok(config));
    }
});
