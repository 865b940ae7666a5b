use glam::{Vec2, Vec3};

/// Affine map from image-plane flow to a consumer's model coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowTransform {
    /// Model-space vector per pixel of horizontal flow.
    pub basis_x: Vec3,
    /// Model-space vector per pixel of vertical flow.
    pub basis_y: Vec3,
    /// Model-space offset added to every result.
    pub origin: Vec3,
}

impl Default for FlowTransform {
    /// Horizontal flow maps to +X and downward flow to -Z, so image motion
    /// lands on the X/Z plane of a front-facing installation.
    fn default() -> Self {
        Self {
            basis_x: Vec3::X,
            basis_y: Vec3::NEG_Z,
            origin: Vec3::ZERO,
        }
    }
}

impl FlowTransform {
    /// Create a transform from its bases and origin.
    pub fn new(basis_x: Vec3, basis_y: Vec3, origin: Vec3) -> Self {
        Self {
            basis_x,
            basis_y,
            origin,
        }
    }

    /// Map a pixel-space flow vector into model space.
    #[inline]
    pub fn apply(&self, pixels: Vec2) -> Vec3 {
        self.origin + self.basis_x * pixels.x + self.basis_y * pixels.y
    }

    pub(crate) fn to_words(self) -> [u32; 9] {
        let mut words = [0u32; 9];
        let values = [self.basis_x, self.basis_y, self.origin];
        for (chunk, v) in words.chunks_exact_mut(3).zip(values) {
            chunk[0] = v.x.to_bits();
            chunk[1] = v.y.to_bits();
            chunk[2] = v.z.to_bits();
        }
        words
    }

    pub(crate) fn from_words(words: [u32; 9]) -> Self {
        let v = |i: usize| {
            Vec3::new(
                f32::from_bits(words[i]),
                f32::from_bits(words[i + 1]),
                f32::from_bits(words[i + 2]),
            )
        };
        Self {
            basis_x: v(0),
            basis_y: v(3),
            origin: v(6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_transform() {
        let model = FlowTransform::default().apply(Vec2::new(2.5, -4.0));
        assert_eq!(model, Vec3::new(2.5, 0.0, 4.0));

        assert_eq!(FlowTransform::default().apply(Vec2::ZERO), Vec3::ZERO);
    }

    #[test]
    fn test_custom_transform() {
        let transform = FlowTransform::new(
            Vec3::new(0.5, 0.0, 0.0),
            Vec3::new(0.0, 0.25, 0.0),
            Vec3::new(1.0, 2.0, 3.0),
        );
        let model = transform.apply(Vec2::new(4.0, 8.0));

        assert_relative_eq!(model.x, 3.0);
        assert_relative_eq!(model.y, 4.0);
        assert_relative_eq!(model.z, 3.0);
    }

    #[test]
    fn test_words() {
        let transform = FlowTransform::new(Vec3::new(1.0, -2.0, 3.5), Vec3::Y, Vec3::splat(-0.125));
        assert_eq!(FlowTransform::from_words(transform.to_words()), transform);
    }
}
