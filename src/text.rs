//! Source-text access interface.
//!
//! The parser never sees the caller's text representation directly. It pulls
//! bytes on demand through [`Text::read`], which lets editors expose ropes,
//! gap buffers or memory-mapped files without copying the whole document.

/// Granularity of byte offsets handed to the native engine.
///
/// Determines how the engine interprets byte offsets and edit boundaries:
/// single bytes for UTF-8 text, 16-bit code units for UTF-16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf16,
}

/// A source of bytes for parsing.
pub trait Text {
    /// Fill `output` with bytes starting at `byte_offset`, returning how many
    /// bytes were written. May supply fewer bytes than the buffer holds;
    /// returning `0` signals end of text.
    fn read(&self, byte_offset: u32, output: &mut [u8]) -> usize;

    /// The encoding byte offsets are expressed in.
    fn encoding(&self) -> Encoding;
}

impl Text for str {
    fn read(&self, byte_offset: u32, output: &mut [u8]) -> usize {
        let bytes = self.as_bytes();
        let start = (byte_offset as usize).min(bytes.len());
        let n = output.len().min(bytes.len() - start);
        output[..n].copy_from_slice(&bytes[start..start + n]);
        n
    }

    fn encoding(&self) -> Encoding {
        Encoding::Utf8
    }
}

impl Text for String {
    fn read(&self, byte_offset: u32, output: &mut [u8]) -> usize {
        self.as_str().read(byte_offset, output)
    }

    fn encoding(&self) -> Encoding {
        Encoding::Utf8
    }
}
