use std::sync::Arc;

use ash::vk;
use vantage_rhi::{
    buffer::{Buffer, BufferError},
    command::{CommandError, CommandPool},
    device::Device,
};
use vantage_scene::document::Document;

/// Owns the device buffers backing a loaded document.
///
/// One buffer per source byte buffer, addressed by the same index the
/// document's accessors use. Primitives reference regions of these buffers
/// by index and byte offset; they never own them.
#[derive(Default)]
pub struct ResourceManager {
    buffers: Vec<Buffer>,
}

impl ResourceManager {
    /// Uploads every byte buffer of a document.
    ///
    /// Upload failure is recoverable: buffers created so far drop with the
    /// returned error and the device context is left untouched, so the
    /// caller can abandon the load and keep running.
    pub fn upload(device: &Arc<Device>, document: &Document) -> Result<Self, BufferError> {
        let buffers = document
            .buffers
            .iter()
            .map(|bytes| Buffer::upload(device.clone(), bytes))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Uploaded {} buffers ({} bytes)",
            buffers.len(),
            document.buffers.iter().map(Vec::len).sum::<usize>()
        );

        Ok(Self { buffers })
    }

    /// The device buffer at `index`, or a null handle for an out-of-range
    /// index.
    #[inline]
    pub fn buffer(&self, index: usize) -> vk::Buffer {
        self.buffers
            .get(index)
            .map(Buffer::handle)
            .unwrap_or(vk::Buffer::null())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Drops every tracked buffer. Safe to call with none; the caller must
    /// have idled the device first.
    pub fn destroy_all(&mut self) {
        self.buffers.clear();
    }

    /// Copies a byte region between two tracked buffers through a one-time
    /// command submission, waiting for the copy to finish.
    pub fn copy_buffer(
        &self,
        pool: &CommandPool,
        src: usize,
        dst: usize,
        region: vk::BufferCopy,
    ) -> Result<(), CommandError> {
        let src = self.buffer(src);
        let dst = self.buffer(dst);

        pool.one_time(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
        })
    }
}
