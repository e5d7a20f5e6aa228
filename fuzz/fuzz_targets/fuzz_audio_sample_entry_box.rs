#![no_main]

use libfuzzer_sys::fuzz_target;
use mp4_avc::{BaseBox, Decode, Encode, boxes::AudioSampleEntryBox};

fuzz_target!(|data: &[u8]| {
    if let Ok((mut entry, _)) = AudioSampleEntryBox::decode(data) {
        let encoded = entry.encode_to_vec().expect("decoded sample entry must be encodable");
        assert_eq!(encoded.len() as u64, entry.box_size());

        if entry.remove_encryption().is_ok() {
            assert!(entry.sinf_box().is_none());
            let _ = entry.encode_to_vec();
        }
    }
});
