// cglx/src/visual.rs
//
//! Translation of GLX visuals and framebuffer configurations into CGL pixel format attributes.

use bitflags::bitflags;

bitflags! {
    /// Boolean properties of a GLX visual.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct ModeFlags: u8 {
        const DOUBLE_BUFFER = 0x01;
        const STEREO        = 0x02;
        /// The context renders into client memory rather than a window server surface.
        const OFFSCREEN     = 0x04;
    }
}

/// The subset of a GLX framebuffer configuration that CGL cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PixelFormatDescriptor {
    pub flags: ModeFlags,
    pub red_bits: i32,
    pub green_bits: i32,
    pub blue_bits: i32,
    pub alpha_bits: i32,
    pub accum_red_bits: i32,
    pub accum_green_bits: i32,
    pub accum_blue_bits: i32,
    pub accum_alpha_bits: i32,
    pub depth_bits: i32,
    pub stencil_bits: i32,
    pub sample_buffers: i32,
    pub samples: i32,
    /// The `GLX_FBCONFIG_ID` of the configuration this descriptor came from.
    pub fbconfig_id: u32,
}

/// A single CGL pixel format attribute, independent of the CGL headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormatAttribute {
    Stereo,
    DoubleBuffer,
    OffScreen,
    ColorSize(i32),
    AlphaSize(i32),
    AccumSize(i32),
    DepthSize(i32),
    StencilSize(i32),
    SampleBuffers(i32),
    Samples(i32),
}

impl PixelFormatDescriptor {
    /// An RGBA8 double-buffered descriptor with a 24-bit depth buffer.
    pub fn rgba8_depth24() -> PixelFormatDescriptor {
        PixelFormatDescriptor {
            flags: ModeFlags::DOUBLE_BUFFER,
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 24,
            ..PixelFormatDescriptor::default()
        }
    }

    #[inline]
    pub fn is_double_buffered(&self) -> bool {
        self.flags.contains(ModeFlags::DOUBLE_BUFFER)
    }

    /// Builds the attribute list handed to `CGLChoosePixelFormat`.
    ///
    /// The accumulation, depth, stencil and multisample attributes are only emitted when the
    /// visual asks for them, since CGL treats a zero size as a hard requirement.
    pub fn to_attributes(&self) -> Vec<PixelFormatAttribute> {
        let mut attributes = vec![];

        if self.flags.contains(ModeFlags::OFFSCREEN) {
            attributes.push(PixelFormatAttribute::OffScreen);
        }
        if self.flags.contains(ModeFlags::STEREO) {
            attributes.push(PixelFormatAttribute::Stereo);
        }
        if self.flags.contains(ModeFlags::DOUBLE_BUFFER) {
            attributes.push(PixelFormatAttribute::DoubleBuffer);
        }

        attributes.push(PixelFormatAttribute::ColorSize(
            self.red_bits + self.green_bits + self.blue_bits,
        ));
        attributes.push(PixelFormatAttribute::AlphaSize(self.alpha_bits));

        if self.accum_red_bits + self.accum_green_bits + self.accum_blue_bits > 0 {
            attributes.push(PixelFormatAttribute::AccumSize(
                self.accum_red_bits
                    + self.accum_green_bits
                    + self.accum_blue_bits
                    + self.accum_alpha_bits,
            ));
        }
        if self.depth_bits > 0 {
            attributes.push(PixelFormatAttribute::DepthSize(self.depth_bits));
        }
        if self.stencil_bits > 0 {
            attributes.push(PixelFormatAttribute::StencilSize(self.stencil_bits));
        }
        if self.sample_buffers > 0 {
            attributes.push(PixelFormatAttribute::SampleBuffers(self.sample_buffers));
            attributes.push(PixelFormatAttribute::Samples(self.samples));
        }

        attributes
    }
}
