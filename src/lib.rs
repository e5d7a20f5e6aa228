//! MP4 のボックスのエンコードおよびデコードと、AVC (H.264) の NAL ユニット列の形式変換を行うためのライブラリ
//!
//! ボックスのデコードは [`BoxDecoder`] を起点に行う。
//! ボックス種別ごとのデコード関数は [`BoxRegistry`] に登録されており、登録されていない種別のボックスは
//! [`boxes::UnknownBox`] としてペイロードごと保持されるので、デコードしたボックスを再エンコードすると元のバイト列に戻る。
//!
//! NAL ユニット列の扱いについては [`avc`] モジュールを参照のこと。
#![warn(missing_docs)]

mod basic_types;
mod boxes_moov_tree;
mod boxes_sample_entry;
mod codec;
mod registry;

pub mod avc;
pub mod boxes;

pub use basic_types::{
    BaseBox, BoxHeader, BoxSize, BoxType, FixedPointNumber, FullBox, FullBoxFlags, FullBoxHeader,
};
pub use codec::{Decode, Encode, Error, ErrorKind, Result};
pub use registry::{
    BoxDecoder, BoxDecoderOptions, BoxRegistry, DecodeBox, DecodeBoxFn, DecodeContext,
};
