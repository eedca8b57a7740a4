//! Conversion trait shared by every format converter

use crate::error::{ConvertError, Result};

/// A stateless conversion from `Input` to [`Self::Output`].
///
/// A converter implements this once per input it understands. The provided
/// `apply` rejects the input, so an impl that only names the signature
/// reports [`ConvertError::Unsupported`] instead of producing garbage.
pub trait Conversion<Input> {
    type Output;

    fn name(&self) -> &'static str;

    fn apply(&self, _input: Input) -> Result<Self::Output> {
        Err(ConvertError::Unsupported(<Self as Conversion<Input>>::name(self)))
    }
}
