#![no_main]

use libfuzzer_sys::fuzz_target;
use mp4_avc::avc;

fuzz_target!(|data: &[u8]| {
    let sample = avc::convert_byte_stream_to_nalu_sample(data);
    let stream = avc::convert_sample_to_byte_stream(&sample).expect("generated sample must be valid");
    assert_eq!(avc::convert_byte_stream_to_nalu_sample(&stream), sample);
    let _ = avc::get_parameter_sets_from_byte_stream(data);

    let _ = avc::convert_sample_to_byte_stream(data);
    let _ = avc::find_nalu_types(data);
    let mut buf = data.to_vec();
    let _ = avc::convert_sample_to_byte_stream_in_place(&mut buf);
});
