use derivative::Derivative;

/// Texel formats understood by the RHI.
#[derive(Clone, Copy, Debug, Derivative, Eq, Hash, PartialEq)]
#[derivative(Default)]
pub enum PixelFormat {
    #[derivative(Default)]
    Unknown,
    R8Unorm,
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    R32Float,
    Rgba32Float,
    Depth32Float,
    Depth24UnormStencil8,
}

impl PixelFormat {
    /// Size of one texel in bytes.
    pub fn size(self) -> u32 {
        use PixelFormat::*;
        match self {
            Unknown => 0,
            R8Unorm => 1,
            Rgba8Unorm | Bgra8Unorm | R32Float | Depth32Float
                | Depth24UnormStencil8 => 4,
            Rgba16Float => 8,
            Rgba32Float => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, PixelFormat::Depth32Float
            | PixelFormat::Depth24UnormStencil8)
    }

    pub fn has_stencil(self) -> bool {
        self == PixelFormat::Depth24UnormStencil8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texel_sizes() {
        assert_eq!(PixelFormat::Rgba8Unorm.size(), 4);
        assert_eq!(PixelFormat::Rgba16Float.size(), 8);
        assert!(PixelFormat::Depth32Float.is_depth());
        assert!(!PixelFormat::Depth32Float.has_stencil());
        assert!(PixelFormat::Depth24UnormStencil8.has_stencil());
        assert!(!PixelFormat::Bgra8Unorm.is_depth());
    }
}
