//! Host typed arrays: a byte buffer plus an optional `(byteOffset, byteLength)`
//! window, interpreted as 4-byte floats or integers.
//!
//! Windows are stored as given and only validated when a view is taken, the
//! same way a host runtime hands them across the boundary.

use std::marker::PhantomData;
use std::mem::{size_of, size_of_val};

use vecdex_index::{BufferView, Element, IndexError, RawBuffer};

/// Owned byte storage, always 8-byte aligned at its start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayBuffer {
    words: Vec<u64>,
    len: usize,
}

impl ArrayBuffer {
    /// Zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(size_of::<u64>())],
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut buffer = Self::new(bytes.len());
        buffer.as_bytes_mut().copy_from_slice(bytes);
        buffer
    }

    /// Native-endian copy of `values`.
    pub fn from_elements<T: Element>(values: &[T]) -> Self {
        // SAFETY: `Element` is sealed to plain 4-byte scalars with no padding,
        // so their storage is fully initialized bytes of the stated length.
        let bytes = unsafe {
            std::slice::from_raw_parts(values.as_ptr().cast::<u8>(), size_of_val(values))
        };
        Self::from_bytes(bytes)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: `words` holds at least `len` initialized bytes and u8 has no
        // alignment requirement.
        unsafe { std::slice::from_raw_parts(self.words.as_ptr().cast::<u8>(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_bytes`, with exclusive access through `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.words.as_mut_ptr().cast::<u8>(), self.len) }
    }
}

/// Typed window over an [`ArrayBuffer`].
#[derive(Debug, Clone)]
pub struct TypedArray<T: Element> {
    buffer: ArrayBuffer,
    byte_offset: Option<usize>,
    byte_length: Option<usize>,
    _element: PhantomData<T>,
}

pub type Float32Array = TypedArray<f32>;
pub type Int32Array = TypedArray<i32>;

impl<T: Element> TypedArray<T> {
    /// Array covering a fresh buffer holding `values`.
    pub fn from_slice(values: &[T]) -> Self {
        Self::from_buffer(ArrayBuffer::from_elements(values))
    }

    /// Array covering all of `buffer`.
    pub fn from_buffer(buffer: ArrayBuffer) -> Self {
        Self {
            buffer,
            byte_offset: None,
            byte_length: None,
            _element: PhantomData,
        }
    }

    /// Array over `byte_length` bytes of `buffer` starting at `byte_offset`.
    /// Not validated until [`view`](Self::view).
    pub fn with_window(buffer: ArrayBuffer, byte_offset: usize, byte_length: usize) -> Self {
        Self {
            buffer,
            byte_offset: Some(byte_offset),
            byte_length: Some(byte_length),
            _element: PhantomData,
        }
    }

    pub fn buffer(&self) -> &ArrayBuffer {
        &self.buffer
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset.unwrap_or(0)
    }

    pub fn raw(&self) -> RawBuffer<'_> {
        let mut raw = RawBuffer::new(self.buffer.as_bytes());
        if let Some(offset) = self.byte_offset {
            raw = raw.with_byte_offset(offset);
        }
        if let Some(length) = self.byte_length {
            raw = raw.with_byte_length(length);
        }
        raw
    }

    /// Validated zero-copy view of the window.
    pub fn view(&self) -> Result<BufferView<'_, T>, IndexError> {
        BufferView::new(self.raw())
    }

    pub fn to_vec(&self) -> Result<Vec<T>, IndexError> {
        self.view().map(|view| view.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_is_word_aligned() {
        let buffer = ArrayBuffer::new(13);
        assert_eq!(buffer.len(), 13);
        assert_eq!(buffer.as_bytes().as_ptr() as usize % 8, 0);
        assert!(buffer.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_float32_from_slice() {
        let array = Float32Array::from_slice(&[1.5, -2.0]);
        assert_eq!(array.buffer().len(), 8);
        assert_eq!(array.to_vec().unwrap(), vec![1.5, -2.0]);
    }

    #[test]
    fn test_window_over_shared_buffer() {
        let buffer = ArrayBuffer::from_elements(&[1.0f32, 2.0, 3.0, 4.0]);
        let array = Float32Array::with_window(buffer, 8, 8);
        assert_eq!(array.byte_offset(), 8);
        assert_eq!(array.to_vec().unwrap(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_misaligned_window_fails_on_view() {
        let buffer = ArrayBuffer::new(16);
        let array = Float32Array::with_window(buffer, 1, 12);
        assert!(matches!(array.view(), Err(IndexError::Alignment { .. })));
    }

    #[test]
    fn test_int32_roundtrip() {
        let array = Int32Array::from_slice(&[3, -4, 5]);
        assert_eq!(array.to_vec().unwrap(), vec![3, -4, 5]);
    }
}
