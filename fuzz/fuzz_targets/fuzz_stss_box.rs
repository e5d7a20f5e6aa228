#![no_main]

use libfuzzer_sys::fuzz_target;
use mp4_avc::{BaseBox, Decode, Encode, boxes::StssBox};

fuzz_target!(|data: &[u8]| {
    if let Ok((stss, _)) = StssBox::decode(data) {
        let encoded = stss.encode_to_vec().expect("decoded stss box must be encodable");
        assert_eq!(encoded.len() as u64, stss.box_size());
        if let Some(&n) = stss.sample_numbers.first() {
            let _ = stss.is_sync_sample(n);
        }
    }
});
