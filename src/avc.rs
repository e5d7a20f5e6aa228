//! AVC (H.264) の NAL ユニット列を扱うためのモジュール
//!
//! NAL ユニット列の表現形式としては、以下の二つをサポートしている:
//! - Annex B 形式: 各 NAL ユニットの前に `00 00 01` または `00 00 00 01` のスタートコードが置かれる
//! - サンプル形式: 各 NAL ユニットの前に 4 バイト（ビッグエンディアン）の長さが置かれる（MP4 のサンプルで使われる形式）
//!
//! このモジュールの関数は全て呼び出し元のバッファに対する純粋な処理で、ボックス関連の型には依存しない
use crate::{Decode, Error, ErrorKind, Result};

/// Annex B 形式の 4 バイトのスタートコード
pub const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// サンプル形式での長さフィールドのバイト数
pub const NALU_LENGTH_SIZE: usize = 4;

/// SPS のリストと PPS のリストの組
///
/// 該当する NAL ユニットが一つも存在しない場合には、空のリストではなく `None` となる
pub type ParameterSets = (Option<Vec<Vec<u8>>>, Option<Vec<Vec<u8>>>);

/// NAL ユニットの種別（ヘッダーバイトの下位 5 ビット）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NaluType {
    /// 1: 非 IDR ピクチャのスライス
    NonIdrSlice,

    /// 2: スライスデータパーティション A
    SliceDataA,

    /// 3: スライスデータパーティション B
    SliceDataB,

    /// 4: スライスデータパーティション C
    SliceDataC,

    /// 5: IDR ピクチャのスライス
    IdrSlice,

    /// 6: SEI
    Sei,

    /// 7: シーケンスパラメーターセット
    Sps,

    /// 8: ピクチャパラメーターセット
    Pps,

    /// 9: アクセスユニットデリミター
    Aud,

    /// 10: シーケンス終端
    EndOfSequence,

    /// 11: ストリーム終端
    EndOfStream,

    /// 12: フィラーデータ
    FillerData,

    /// 13: SPS 拡張
    SpsExtension,

    /// 14: プレフィックス NAL ユニット
    PrefixNalu,

    /// 15: サブセット SPS
    SubsetSps,

    /// 16: デプスパラメーターセット
    DepthParameterSet,

    /// 19: 補助ピクチャのスライス
    AuxiliarySlice,

    /// 20: スライス拡張
    SliceExtension,

    /// 21: デプスビュー用のスライス拡張
    SliceExtensionForDepthView,

    /// 17, 18, 22, 23: 予約済み
    Reserved(u8),

    /// 0, 24..=31: 未規定
    Unspecified(u8),
}

impl NaluType {
    /// NAL ユニットのヘッダーバイトから種別を取得する
    ///
    /// 上位 3 ビット（forbidden_zero_bit と nal_ref_idc）は無視される
    pub const fn from_header_byte(header: u8) -> Self {
        match header & 0x1f {
            1 => Self::NonIdrSlice,
            2 => Self::SliceDataA,
            3 => Self::SliceDataB,
            4 => Self::SliceDataC,
            5 => Self::IdrSlice,
            6 => Self::Sei,
            7 => Self::Sps,
            8 => Self::Pps,
            9 => Self::Aud,
            10 => Self::EndOfSequence,
            11 => Self::EndOfStream,
            12 => Self::FillerData,
            13 => Self::SpsExtension,
            14 => Self::PrefixNalu,
            15 => Self::SubsetSps,
            16 => Self::DepthParameterSet,
            19 => Self::AuxiliarySlice,
            20 => Self::SliceExtension,
            21 => Self::SliceExtensionForDepthView,
            v @ (17 | 18 | 22 | 23) => Self::Reserved(v),
            v => Self::Unspecified(v),
        }
    }

    /// 種別を表す 5 ビットの値を返す
    pub const fn get(self) -> u8 {
        match self {
            Self::NonIdrSlice => 1,
            Self::SliceDataA => 2,
            Self::SliceDataB => 3,
            Self::SliceDataC => 4,
            Self::IdrSlice => 5,
            Self::Sei => 6,
            Self::Sps => 7,
            Self::Pps => 8,
            Self::Aud => 9,
            Self::EndOfSequence => 10,
            Self::EndOfStream => 11,
            Self::FillerData => 12,
            Self::SpsExtension => 13,
            Self::PrefixNalu => 14,
            Self::SubsetSps => 15,
            Self::DepthParameterSet => 16,
            Self::AuxiliarySlice => 19,
            Self::SliceExtension => 20,
            Self::SliceExtensionForDepthView => 21,
            Self::Reserved(v) | Self::Unspecified(v) => v,
        }
    }

    /// NAL ユニットの先頭バイトから種別を取得する
    ///
    /// 空の NAL ユニットの場合は `None` が返される
    pub fn of_nalu(nalu: &[u8]) -> Option<Self> {
        nalu.first().copied().map(Self::from_header_byte)
    }
}

impl core::fmt::Display for NaluType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}({})", self, self.get())
    }
}

/// Annex B 形式のバイト列から NAL ユニット群を取り出す
///
/// 返される各スライスにはスタートコードは含まれない。
/// 3 バイトと 4 バイトのスタートコードは混在していても構わない。
///
/// 最初のスタートコードより前のバイト列は無視される。
/// また、次のスタートコードの直前にある 0 のバイト（trailing_zero_8bits や 4 バイトのスタートコードの先頭バイト）は
/// 直前の NAL ユニットには含めない。
/// 最後の NAL ユニットは後ろにスタートコードが無いので、末尾の 0 のバイトも含めてそのまま返される。
///
/// スタートコードが見つからない場合や、中身が空の NAL ユニットしかない場合には空の [`Vec`] が返される
pub fn extract_nalus_from_byte_stream(data: &[u8]) -> Vec<&[u8]> {
    let mut nalus = Vec::new();
    let mut current_start = None;
    let mut i = 0;
    while i + 3 <= data.len() {
        if data[i..i + 3] == [0, 0, 1] {
            if let Some(start) = current_start {
                push_nalu(&mut nalus, &data[start..i], start, true);
            }
            i += 3;
            current_start = Some(i);
        } else {
            i += 1;
        }
    }
    if let Some(start) = current_start {
        push_nalu(&mut nalus, &data[start..], start, false);
    }

    tracing::trace!(
        input_size = data.len(),
        nalu_count = nalus.len(),
        "extracted NAL units from byte stream"
    );
    nalus
}

fn push_nalu<'a>(
    nalus: &mut Vec<&'a [u8]>,
    nalu: &'a [u8],
    position: usize,
    followed_by_start_code: bool,
) {
    let len = if followed_by_start_code {
        nalu.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1)
    } else {
        nalu.len()
    };
    if len == 0 {
        tracing::trace!(position, "skipped empty NAL unit");
        return;
    }
    nalus.push(&nalu[..len]);
}

/// サンプル形式のバイト列に含まれる NAL ユニットを順番に走査するイテレーター
///
/// 長さフィールドがバッファの末尾を越える場合には [`ErrorKind::InsufficientBuffer`] エラーを一度だけ返し、
/// その後は `None` を返し続ける
#[derive(Debug, Clone)]
pub struct LengthPrefixedNalus<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> LengthPrefixedNalus<'a> {
    /// サンプル形式のバイト列を受け取ってイテレーターを作成する
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// 次の NAL ユニットの開始位置（長さフィールドの位置）を返す
    pub fn position(&self) -> usize {
        self.offset
    }

    fn next_nalu(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.offset..];
        let (len, _) = u32::decode(rest).map_err(|_| {
            Error::with_reason(
                ErrorKind::InsufficientBuffer,
                format!(
                    "Truncated NAL unit length at position {}: {} bytes remain",
                    self.offset,
                    rest.len()
                ),
            )
        })?;
        let end = NALU_LENGTH_SIZE
            .checked_add(len as usize)
            .filter(|&end| end <= rest.len())
            .ok_or_else(|| {
                Error::with_reason(
                    ErrorKind::InsufficientBuffer,
                    format!(
                        "NAL unit at position {} has length {len}, but only {} bytes remain",
                        self.offset,
                        rest.len() - NALU_LENGTH_SIZE
                    ),
                )
            })?;
        self.offset += end;
        Ok(&rest[NALU_LENGTH_SIZE..end])
    }
}

impl<'a> Iterator for LengthPrefixedNalus<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.data.len() {
            return None;
        }
        let result = self.next_nalu();
        if result.is_err() {
            self.offset = self.data.len();
        }
        Some(result)
    }
}

impl core::iter::FusedIterator for LengthPrefixedNalus<'_> {}

/// Annex B 形式のバイト列をサンプル形式に変換する
///
/// NAL ユニットの分割規則は [`extract_nalus_from_byte_stream()`] と同じ
pub fn convert_byte_stream_to_nalu_sample(data: &[u8]) -> Vec<u8> {
    let nalus = extract_nalus_from_byte_stream(data);
    let size = nalus.iter().map(|n| NALU_LENGTH_SIZE + n.len()).sum();
    let mut sample = Vec::with_capacity(size);
    for nalu in nalus {
        sample.extend_from_slice(&(nalu.len() as u32).to_be_bytes());
        sample.extend_from_slice(nalu);
    }
    sample
}

/// サンプル形式のバイト列を Annex B 形式に変換する
///
/// スタートコードは常に 4 バイトのものが使われる。
/// そのため 3 バイトのスタートコードを含む Annex B 形式のバイト列をサンプル形式を経由して戻した場合には、
/// 元とは異なるバイト列になる。
pub fn convert_sample_to_byte_stream(data: &[u8]) -> Result<Vec<u8>> {
    let mut stream = Vec::with_capacity(data.len());
    for nalu in LengthPrefixedNalus::new(data) {
        stream.extend_from_slice(&START_CODE);
        stream.extend_from_slice(nalu?);
    }
    Ok(stream)
}

/// サンプル形式のバイト列を、メモリ確保を行わずにその場で Annex B 形式に書き換える
///
/// 長さフィールドとスタートコードはどちらも 4 バイトなので、バッファのサイズは変わらない。
/// 途中に不正な長さフィールドがある場合には、バッファを一切変更せずにエラーを返す。
pub fn convert_sample_to_byte_stream_in_place(data: &mut [u8]) -> Result<()> {
    let mut positions = Vec::new();
    let mut nalus = LengthPrefixedNalus::new(data);
    loop {
        let position = nalus.position();
        match nalus.next() {
            Some(nalu) => {
                nalu?;
                positions.push(position);
            }
            None => break,
        }
    }
    for position in positions {
        data[position..position + NALU_LENGTH_SIZE].copy_from_slice(&START_CODE);
    }
    Ok(())
}

/// サンプル形式のバイト列に含まれる NAL ユニットの種別を、出現順に返す
///
/// 長さ 0 の NAL ユニットは無視される
pub fn find_nalu_types(sample: &[u8]) -> Result<Vec<NaluType>> {
    let mut types = Vec::new();
    for nalu in LengthPrefixedNalus::new(sample) {
        if let Some(ty) = NaluType::of_nalu(nalu?) {
            types.push(ty);
        }
    }
    Ok(types)
}

/// サンプル形式のバイト列に、指定の種別の NAL ユニットが含まれているかどうかを判定する
pub fn contains_nalu_type(sample: &[u8], ty: NaluType) -> Result<bool> {
    for nalu in LengthPrefixedNalus::new(sample) {
        if NaluType::of_nalu(nalu?) == Some(ty) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// サンプル形式のバイト列が IDR ピクチャのスライスを含むかどうかを判定する
pub fn is_idr_sample(sample: &[u8]) -> Result<bool> {
    contains_nalu_type(sample, NaluType::IdrSlice)
}

/// Annex B 形式のバイト列から SPS と PPS を取り出す
///
/// 各要素はヘッダーバイトを含む NAL ユニット全体で、出現順に（重複も含めて）格納される。
/// それ以外の種別の NAL ユニットは無視される。
pub fn get_parameter_sets_from_byte_stream(data: &[u8]) -> ParameterSets {
    collect_parameter_sets(extract_nalus_from_byte_stream(data))
}

/// サンプル形式のバイト列から SPS と PPS を取り出す
///
/// 結果の形式は [`get_parameter_sets_from_byte_stream()`] と同じ
pub fn get_parameter_sets_from_sample(sample: &[u8]) -> Result<ParameterSets> {
    let nalus = LengthPrefixedNalus::new(sample).collect::<Result<Vec<_>>>()?;
    Ok(collect_parameter_sets(nalus))
}

fn collect_parameter_sets<'a, I>(nalus: I) -> ParameterSets
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut sps = Vec::new();
    let mut pps = Vec::new();
    for nalu in nalus {
        match NaluType::of_nalu(nalu) {
            Some(NaluType::Sps) => sps.push(nalu.to_vec()),
            Some(NaluType::Pps) => pps.push(nalu.to_vec()),
            _ => {}
        }
    }
    (
        (!sps.is_empty()).then_some(sps),
        (!pps.is_empty()).then_some(pps),
    )
}
