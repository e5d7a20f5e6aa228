#![no_main]

use libfuzzer_sys::fuzz_target;
use mp4_avc::{BoxDecoder, Encode};

fuzz_target!(|data: &[u8]| {
    if let Ok(boxes) = BoxDecoder::new().decode_boxes(data) {
        for b in boxes {
            let _ = b.encode_to_vec();
        }
    }
});
