//! Owned resource buffers.

use crate::error::{FileError, Result};

/// One resource's bytes, either read from a fork or handed over by the caller.
///
/// The buffer is freed on [`unload`](Self::unload) or drop; [`detach`](Self::detach)
/// is the only way to keep the bytes past this object's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadedResource {
    data: Option<Vec<u8>>,
}

impl LoadedResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    pub fn len(&self) -> Result<usize> {
        self.data.as_ref().map(Vec::len).ok_or(FileError::InvalidState("resource is not loaded"))
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|l| l == 0)
    }

    /// The loaded bytes. A zero-length resource still yields a valid (empty) slice.
    pub fn as_slice(&self) -> Result<&[u8]> {
        self.data.as_deref().ok_or(FileError::InvalidState("resource is not loaded"))
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        self.data.as_deref_mut().ok_or(FileError::InvalidState("resource is not loaded"))
    }

    /// Takes ownership of synthesized data, releasing whatever was held before.
    pub fn set_data(&mut self, data: Vec<u8>) {
        self.data = Some(data);
    }

    pub fn unload(&mut self) {
        self.data = None;
    }

    /// Hands the buffer to the caller and leaves this object unloaded.
    pub fn detach(&mut self) -> Result<Vec<u8>> {
        self.data.take().ok_or(FileError::InvalidState("resource is not loaded"))
    }
}

impl From<Vec<u8>> for LoadedResource {
    fn from(data: Vec<u8>) -> Self {
        Self { data: Some(data) }
    }
}
