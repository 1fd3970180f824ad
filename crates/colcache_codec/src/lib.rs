// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Optional compression of cached values.
//!
//! [`Codec`] turns a JSON value into a [`CompressedEnvelope`] before it is stored in
//! any tier and restores it on read. `decompress(compress(v)) == v` for every value,
//! and any value that is not an envelope passes through `decompress` unchanged.

mod codec;
mod error;

#[doc(inline)]
pub use codec::{Codec, CompressedEnvelope, DEFAULT_LEVEL, DEFAULT_MIN_SIZE, ENCODING_BASE64, FORMAT_ZSTD};
#[doc(inline)]
pub use error::{Error, Result};
