//! Off-screen render targets with multiple attachments.

use log::{debug, warn};

use crate::device::{AttachmentDef, AttachmentKind, AttachmentSlot, RenderDevice, TargetStatus};
use crate::error::FrameBufferError;

/// A set of device images of one fixed size that draw output can be
/// redirected to. The target owns its images; dropping it releases them.
pub struct RenderTarget<D: RenderDevice> {
    width: u32,
    height: u32,
    defs: Vec<AttachmentDef>,
    draw_buffers: Vec<u32>,
    // Declared before `images` so the target is released before its attachments
    target: D::Target,
    images: Vec<D::Image>,
}

impl<D: RenderDevice> RenderTarget<D> {
    /// Allocate and attach every image in `attachments` order, then check
    /// completeness. Color attachments take consecutive color slots; depth
    /// attachments all share the depth slot.
    pub fn new(
        device: &mut D,
        width: u32,
        height: u32,
        attachments: &[AttachmentDef],
    ) -> Result<Self, FrameBufferError> {
        validate_layout(width, height, device.max_image_size(), attachments)?;

        let mut target = device.create_target();
        let mut images = Vec::with_capacity(attachments.len());
        let mut draw_buffers = Vec::new();
        let mut has_depth = false;

        for def in attachments {
            let image = device.create_image(width, height, def.format);
            let slot = match def.kind {
                AttachmentKind::Color => {
                    let slot = draw_buffers.len() as u32;
                    draw_buffers.push(slot);
                    AttachmentSlot::Color(slot)
                }
                AttachmentKind::Depth => {
                    if has_depth {
                        warn!("render target has more than one depth attachment, the last one wins");
                    }
                    has_depth = true;
                    AttachmentSlot::Depth
                }
            };
            device.attach_image(&mut target, slot, &image);
            images.push(image);
        }

        if let TargetStatus::Incomplete(reason) = device.target_status(&target) {
            return Err(FrameBufferError::new(reason));
        }

        debug!(
            "created {}x{} render target with {} color and {} depth attachments",
            width,
            height,
            draw_buffers.len(),
            attachments.len() - draw_buffers.len()
        );

        Ok(Self {
            width,
            height,
            defs: attachments.to_vec(),
            draw_buffers,
            target,
            images,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Redirect subsequent draws into this target's attachments
    pub fn bind(&self, device: &mut D) {
        device.bind_target(Some(&self.target), &self.draw_buffers);
    }

    /// Restore output to the visible surface
    pub fn unbind(&self, device: &mut D) {
        device.bind_target(None, &[]);
    }

    /// The image created for the `index`-th attachment definition
    pub fn attachment(&self, index: usize) -> Option<&D::Image> {
        self.images.get(index)
    }

    pub fn attachment_def(&self, index: usize) -> Option<&AttachmentDef> {
        self.defs.get(index)
    }

    pub fn attachment_count(&self) -> usize {
        self.images.len()
    }

    /// Color slots receiving fragment output while bound
    pub fn draw_buffers(&self) -> &[u32] {
        &self.draw_buffers
    }
}

fn validate_layout(
    width: u32,
    height: u32,
    max_size: u32,
    attachments: &[AttachmentDef],
) -> Result<(), FrameBufferError> {
    if width == 0 || height == 0 {
        return Err(FrameBufferError::new(format!(
            "attachment size {}x{} is empty",
            width, height
        )));
    }
    if width > max_size || height > max_size {
        return Err(FrameBufferError::new(format!(
            "attachment size {}x{} exceeds device limit {}",
            width, height, max_size
        )));
    }
    if attachments.is_empty() {
        return Err(FrameBufferError::new("no attachments"));
    }
    for (index, def) in attachments.iter().enumerate() {
        let depth_format = def.format.is_depth();
        match def.kind {
            AttachmentKind::Color if depth_format => {
                return Err(FrameBufferError::new(format!(
                    "attachment {} uses depth format {:?} on a color slot",
                    index, def.format
                )));
            }
            AttachmentKind::Depth if !depth_format => {
                return Err(FrameBufferError::new(format!(
                    "attachment {} uses color format {:?} on the depth slot",
                    index, def.format
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::testing::{Call, RecordingDevice};
    use crate::device::TextureFormat;

    fn gbuffer() -> Vec<AttachmentDef> {
        vec![
            AttachmentDef::color(TextureFormat::Rgb8),
            AttachmentDef::color(TextureFormat::Rgb8),
            AttachmentDef::depth(TextureFormat::Depth24),
        ]
    }

    #[test]
    fn test_attachments_created_in_order() {
        let mut device = RecordingDevice::new();
        let target = RenderTarget::new(&mut device, 640, 360, &gbuffer()).unwrap();

        assert_eq!(target.width(), 640);
        assert_eq!(target.height(), 360);
        assert_eq!(target.attachment_count(), 3);
        assert_eq!(target.draw_buffers(), &[0, 1]);
        assert_eq!(target.attachment(2).unwrap().format, TextureFormat::Depth24);
        assert!(target.attachment(3).is_none());

        let slots: Vec<AttachmentSlot> = device
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Attach { slot, .. } => Some(slot),
                _ => None,
            })
            .collect();
        assert_eq!(
            slots,
            vec![AttachmentSlot::Color(0), AttachmentSlot::Color(1), AttachmentSlot::Depth]
        );
    }

    #[test]
    fn test_color_slots_skip_depth() {
        let mut device = RecordingDevice::new();
        let defs = [
            AttachmentDef::depth(TextureFormat::Depth24Stencil8),
            AttachmentDef::color(TextureFormat::Rgba8),
        ];
        let target = RenderTarget::new(&mut device, 8, 8, &defs).unwrap();
        assert_eq!(target.draw_buffers(), &[0]);
        assert_eq!(target.attachment_def(1), Some(&defs[1]));
    }

    #[test]
    fn test_zero_size_fails_before_any_draw() {
        let mut device = RecordingDevice::new();
        let defs = [
            AttachmentDef::color(TextureFormat::Rgba8),
            AttachmentDef::depth(TextureFormat::Depth24),
        ];
        let result = RenderTarget::new(&mut device, 0, 720, &defs);
        assert!(result.is_err());
        assert!(result.err().unwrap().reason.contains("0x720"));
        assert_eq!(device.count(|c| matches!(c, Call::DrawIndexed(_) | Call::DrawStrip(_))), 0);
        assert_eq!(*device.live_images.borrow(), 0);
    }

    #[test]
    fn test_oversized_target_fails() {
        let mut device = RecordingDevice::new();
        device.max_size = 1024;
        assert!(RenderTarget::new(&mut device, 2048, 16, &gbuffer()).is_err());
    }

    #[test]
    fn test_format_kind_mismatch_fails() {
        let mut device = RecordingDevice::new();
        assert!(RenderTarget::new(&mut device, 8, 8, &[AttachmentDef::color(TextureFormat::Depth24)]).is_err());
        assert!(RenderTarget::new(&mut device, 8, 8, &[AttachmentDef::depth(TextureFormat::Rgb8)]).is_err());
        assert!(RenderTarget::new(&mut device, 8, 8, &[]).is_err());
    }

    #[test]
    fn test_device_incompleteness_releases_images() {
        let mut device = RecordingDevice::new();
        device.force_incomplete = Some("unsupported format combination".into());
        let result = RenderTarget::new(&mut device, 64, 64, &gbuffer());
        assert_eq!(
            result.err(),
            Some(FrameBufferError::new("unsupported format combination"))
        );
        assert_eq!(*device.live_images.borrow(), 0);
    }

    #[test]
    fn test_bind_is_idempotent() {
        let mut device = RecordingDevice::new();
        let target = RenderTarget::new(&mut device, 32, 32, &gbuffer()).unwrap();

        target.bind(&mut device);
        let once = (device.bound_target, device.draw_buffers.clone());
        target.bind(&mut device);
        assert_eq!((device.bound_target, device.draw_buffers.clone()), once);
        assert_eq!(device.draw_buffers, vec![0, 1]);

        target.unbind(&mut device);
        assert_eq!(device.bound_target, None);
        assert!(device.draw_buffers.is_empty());
    }

    #[test]
    fn test_drop_releases_attachments() {
        let mut device = RecordingDevice::new();
        let target = RenderTarget::new(&mut device, 32, 32, &gbuffer()).unwrap();
        assert_eq!(*device.live_images.borrow(), 3);
        drop(target);
        assert_eq!(*device.live_images.borrow(), 0);
    }
}
