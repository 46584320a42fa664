//! Registered decoders and request dispatch.
//!
//! Decoders are consulted newest first. `info` falls through every decoder
//! that reports [`Invalid`]; `open` commits to the first decoder whose
//! `info` accepts the source, and a failure there is final for the request.

use std::sync::Arc;

use rastercache_core::{DecoderPlugin, ImageHeader, ImageSource, Invalid, RasterView};

/// Identifies one registration. Handles are never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecoderHandle(u64);

/// An open image together with the decoder that must close it.
pub struct OpenedImage {
    handle: DecoderHandle,
    decoder: Arc<dyn DecoderPlugin>,
    header: ImageHeader,
    view: RasterView,
}

impl OpenedImage {
    pub fn decoder(&self) -> DecoderHandle {
        self.handle
    }

    pub fn header(&self) -> ImageHeader {
        self.header
    }

    pub fn view(&self) -> &RasterView {
        &self.view
    }

    pub fn pixels(&self) -> &[u8] {
        self.view.pixels()
    }
}

impl std::fmt::Debug for OpenedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedImage")
            .field("decoder", &self.decoder.name())
            .field("handle", &self.handle)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct DecoderRegistry {
    decoders: Vec<(DecoderHandle, Arc<dyn DecoderPlugin>)>,
    next_handle: u64,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, decoder: Arc<dyn DecoderPlugin>) -> DecoderHandle {
        let handle = DecoderHandle(self.next_handle);
        self.next_handle += 1;
        tracing::debug!(decoder = decoder.name(), handle = handle.0, "decoder registered");
        self.decoders.push((handle, decoder));
        handle
    }

    /// Remove a registration. Images it opened can still be closed.
    pub fn unregister(&mut self, handle: DecoderHandle) -> bool {
        let Some(idx) = self.decoders.iter().position(|(h, _)| *h == handle) else {
            return false;
        };
        let (_, decoder) = self.decoders.remove(idx);
        tracing::debug!(decoder = decoder.name(), handle = handle.0, "decoder unregistered");
        true
    }

    /// The most recently registered decoder called `name`.
    pub fn find_by_name(&self, name: &str) -> Option<DecoderHandle> {
        self.iter()
            .find(|(_, d)| d.name() == name)
            .map(|(h, _)| *h)
    }

    pub fn get(&self, handle: DecoderHandle) -> Option<&Arc<dyn DecoderPlugin>> {
        self.decoders
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, d)| d)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Probe `src` with each decoder until one accepts it.
    pub fn info(&self, src: &ImageSource) -> Result<ImageHeader, Invalid> {
        self.probe(src).map(|(_, _, header)| header)
    }

    /// Open `src` with the first decoder that accepts it.
    pub fn open(&self, src: &ImageSource) -> Result<OpenedImage, Invalid> {
        let (handle, decoder, header) = self.probe(src)?;
        let view = decoder.open(src).inspect_err(|_| {
            tracing::warn!(decoder = decoder.name(), source = ?src, "image failed to load");
        })?;
        Ok(OpenedImage {
            handle,
            decoder: Arc::clone(decoder),
            header,
            view,
        })
    }

    /// Hand an image back to the decoder that opened it.
    pub fn close(&self, image: OpenedImage) {
        let OpenedImage { decoder, view, .. } = image;
        decoder.close(view);
    }

    fn iter(&self) -> impl Iterator<Item = &(DecoderHandle, Arc<dyn DecoderPlugin>)> {
        self.decoders.iter().rev()
    }

    fn probe(
        &self,
        src: &ImageSource,
    ) -> Result<(DecoderHandle, &Arc<dyn DecoderPlugin>, ImageHeader), Invalid> {
        self.iter()
            .find_map(|(handle, decoder)| {
                decoder
                    .info(src)
                    .ok()
                    .map(|header| (*handle, decoder, header))
            })
            .ok_or_else(|| {
                tracing::debug!(source = ?src, "no decoder accepts source");
                Invalid
            })
    }
}
