//! Zero-copy typed views over caller-owned byte buffers.
//!
//! A view is validated once at the boundary and then passed down as a plain
//! borrowed slice. Nothing below this module re-derives pointers.

use std::mem::{align_of, size_of};
use std::ops::Deref;

use crate::error::IndexError;

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for i32 {}
}

/// Scalar types a [`BufferView`] can expose.
///
/// Sealed: every bit pattern of an implementor must be a valid value.
pub trait Element: Copy + sealed::Sealed {
    /// Host-facing name of the typed array holding this element.
    const ARRAY_NAME: &'static str;
}

impl Element for f32 {
    const ARRAY_NAME: &'static str = "Float32Array";
}

impl Element for i32 {
    const ARRAY_NAME: &'static str = "Int32Array";
}

/// Caller-owned bytes with an optional `(byte_offset, byte_length)` window.
#[derive(Debug, Clone, Copy)]
pub struct RawBuffer<'a> {
    bytes: &'a [u8],
    byte_offset: Option<usize>,
    byte_length: Option<usize>,
}

impl<'a> RawBuffer<'a> {
    /// Window covering the whole buffer.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            byte_offset: None,
            byte_length: None,
        }
    }

    pub fn with_byte_offset(mut self, byte_offset: usize) -> Self {
        self.byte_offset = Some(byte_offset);
        self
    }

    pub fn with_byte_length(mut self, byte_length: usize) -> Self {
        self.byte_length = Some(byte_length);
        self
    }
}

/// Read-only typed view over a [`RawBuffer`], without copying.
#[derive(Debug, Clone, Copy)]
pub struct BufferView<'a, T: Element> {
    elements: &'a [T],
}

impl<'a, T: Element> BufferView<'a, T> {
    /// Validate `raw` and expose it as `&[T]`.
    ///
    /// Checks, in order: non-empty buffer, window within bounds, window
    /// length a positive multiple of `size_of::<T>()`, window start aligned
    /// to `align_of::<T>()`. No view is produced unless all checks pass.
    pub fn new(raw: RawBuffer<'a>) -> Result<Self, IndexError> {
        let name = T::ARRAY_NAME;
        let total = raw.bytes.len();
        if total == 0 {
            return Err(IndexError::InvalidArgument(format!("{} is empty", name)));
        }

        let byte_offset = raw.byte_offset.unwrap_or(0);
        if byte_offset > total {
            return Err(IndexError::InvalidArgument(format!(
                "{} byteOffset {} exceeds buffer size {}",
                name, byte_offset, total
            )));
        }
        let byte_length = raw.byte_length.unwrap_or(total - byte_offset);
        let end = byte_offset
            .checked_add(byte_length)
            .filter(|end| *end <= total)
            .ok_or_else(|| {
                IndexError::InvalidArgument(format!(
                    "{} window [{}, +{}) exceeds buffer size {}",
                    name, byte_offset, byte_length, total
                ))
            })?;

        let element_size = size_of::<T>();
        if byte_length == 0 || byte_length % element_size != 0 {
            return Err(IndexError::InvalidArgument(format!(
                "{} byteLength {} is not a positive multiple of {}",
                name, byte_length, element_size
            )));
        }

        let window = &raw.bytes[byte_offset..end];
        let align = align_of::<T>();
        if (window.as_ptr() as usize) % align != 0 {
            return Err(IndexError::Alignment {
                element: name,
                byte_offset,
                align,
            });
        }

        // SAFETY: `window` is in bounds, aligned for `T`, spans exactly
        // `byte_length / size_of::<T>()` elements, and every bit pattern is a
        // valid `T` (sealed to f32/i32). The slice borrows `raw.bytes` for 'a.
        let elements = unsafe {
            std::slice::from_raw_parts(window.as_ptr().cast::<T>(), byte_length / element_size)
        };
        Ok(Self { elements })
    }

    pub fn as_slice(&self) -> &'a [T] {
        self.elements
    }

    /// Copy into owned storage (for work that outlives the borrow).
    pub fn to_vec(&self) -> Vec<T> {
        self.elements.to_vec()
    }
}

impl<T: Element> Deref for BufferView<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.elements
    }
}
