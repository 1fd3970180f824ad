// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// An error from compressing or decompressing a value.
///
/// The codec's infallible entry points never surface this type; they log it and
/// return the input unchanged.
#[ohno::error]
#[display("codec failed to {operation}")]
pub struct Error {
    operation: &'static str,
}

impl Error {
    /// The step that failed, such as `"decode base64"`.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

/// A specialized [`Result`] type for codec operations.
pub type Result<T> = std::result::Result<T, Error>;
