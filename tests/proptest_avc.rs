//! NAL ユニット列の形式変換の Property-Based Testing

use proptest::prelude::*;
use mp4_avc::{
    ErrorKind,
    avc::{
        LengthPrefixedNalus, NaluType, START_CODE, convert_byte_stream_to_nalu_sample,
        convert_sample_to_byte_stream, convert_sample_to_byte_stream_in_place,
        extract_nalus_from_byte_stream, get_parameter_sets_from_byte_stream,
        get_parameter_sets_from_sample,
    },
};

/// スタートコードの誤検出が起きない NAL ユニットを生成する Strategy
///
/// 先頭はヘッダーバイト、末尾は 0 以外で、途中に `00 00` が現れないようにしている
fn arb_nalu() -> impl Strategy<Value = Vec<u8>> {
    (
        1u8..=0x1f,
        0u8..=3,
        prop::collection::vec(1u8..=0xff, 0..32),
    )
        .prop_map(|(nal_type, nal_ref_idc, body)| {
            let mut nalu = vec![(nal_ref_idc << 5) | nal_type];
            nalu.extend(body);
            nalu
        })
}

/// NAL ユニット列と、それぞれに使うスタートコードの長さを生成する Strategy
fn arb_byte_stream() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<u8>)> {
    prop::collection::vec((arb_nalu(), any::<bool>()), 0..10).prop_map(|units| {
        let mut stream = Vec::new();
        let mut nalus = Vec::new();
        for (nalu, long_start_code) in units {
            if long_start_code {
                stream.extend_from_slice(&START_CODE);
            } else {
                stream.extend_from_slice(&START_CODE[1..]);
            }
            stream.extend_from_slice(&nalu);
            nalus.push(nalu);
        }
        (nalus, stream)
    })
}

fn to_sample(nalus: &[Vec<u8>]) -> Vec<u8> {
    let mut sample = Vec::new();
    for nalu in nalus {
        sample.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
        sample.extend_from_slice(nalu);
    }
    sample
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Annex B 形式から取り出した NAL ユニットは元の NAL ユニットと一致する
    #[test]
    fn extract_nalus_recovers_units((nalus, stream) in arb_byte_stream()) {
        let extracted = extract_nalus_from_byte_stream(&stream);
        prop_assert_eq!(extracted, nalus.iter().map(|n| n.as_slice()).collect::<Vec<_>>());
    }

    /// Annex B 形式 -> サンプル形式 -> Annex B 形式 で、スタートコードは 4 バイトに正規化される
    #[test]
    fn byte_stream_sample_roundtrip((nalus, stream) in arb_byte_stream()) {
        let sample = convert_byte_stream_to_nalu_sample(&stream);
        prop_assert_eq!(&sample, &to_sample(&nalus));

        let restored = convert_sample_to_byte_stream(&sample).unwrap();
        let normalized: Vec<u8> = nalus
            .iter()
            .flat_map(|n| START_CODE.iter().chain(n.iter()).copied())
            .collect();
        prop_assert_eq!(&restored, &normalized);

        // 正規化後のバイト列は変換を繰り返しても変わらない
        let sample2 = convert_byte_stream_to_nalu_sample(&restored);
        prop_assert_eq!(convert_sample_to_byte_stream(&sample2).unwrap(), normalized);
    }

    /// その場での変換は、新しいバッファを作る変換と同じ結果になる
    #[test]
    fn in_place_conversion_matches((nalus, _) in arb_byte_stream()) {
        let mut sample = to_sample(&nalus);
        let expected = convert_sample_to_byte_stream(&sample).unwrap();
        convert_sample_to_byte_stream_in_place(&mut sample).unwrap();
        prop_assert_eq!(sample, expected);
    }

    /// 不正なサンプル形式のバイト列を渡してもパニックせず、エラーは必ず InsufficientBuffer になる
    #[test]
    fn arbitrary_sample_never_panics(data in prop::collection::vec(any::<u8>(), 0..128)) {
        match convert_sample_to_byte_stream(&data) {
            Ok(stream) => prop_assert_eq!(stream.len(), data.len()),
            Err(e) => prop_assert_eq!(e.kind, ErrorKind::InsufficientBuffer),
        }
        let nalus: Vec<_> = LengthPrefixedNalus::new(&data).collect();
        prop_assert!(nalus.iter().filter(|r| r.is_err()).count() <= 1);
    }

    /// 任意のバイト列から取り出した NAL ユニットは空にならず、最後のもの以外は末尾が 0 にならない
    #[test]
    fn arbitrary_byte_stream_units_are_trimmed(data in prop::collection::vec(0u8..=2, 0..128)) {
        let nalus = extract_nalus_from_byte_stream(&data);
        for nalu in &nalus {
            prop_assert!(!nalu.is_empty());
        }
        if let Some((last, rest)) = nalus.split_last() {
            for nalu in rest {
                prop_assert_ne!(nalu.last().copied(), Some(0));
            }
            // 最後の NAL ユニットは入力の末尾までそのまま含む
            prop_assert!(data.ends_with(last));
        }
    }

    /// SPS と PPS だけが出現順に取り出され、存在しない場合は None になる
    #[test]
    fn parameter_sets_are_collected_in_order((nalus, stream) in arb_byte_stream()) {
        let of_type = |ty: NaluType| {
            let units: Vec<Vec<u8>> = nalus
                .iter()
                .filter(|n| NaluType::of_nalu(n) == Some(ty))
                .cloned()
                .collect();
            (!units.is_empty()).then_some(units)
        };
        let expected = (of_type(NaluType::Sps), of_type(NaluType::Pps));

        prop_assert_eq!(&get_parameter_sets_from_byte_stream(&stream), &expected);
        prop_assert_eq!(&get_parameter_sets_from_sample(&to_sample(&nalus)).unwrap(), &expected);
    }
}
