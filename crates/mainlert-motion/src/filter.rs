use glam::Vec3;

/// Smoothing factor for the gravity low-pass. Favors slow-changing gravity
/// over fast linear motion.
pub const GRAVITY_ALPHA: f32 = 0.8;

/// Complementary gravity filter.
///
/// Tracks gravity with an exponential low-pass and returns what is left
/// over as linear acceleration: `g' = a·g + (1 - a)·raw`, `linear = raw - g'`.
#[derive(Debug, Clone)]
pub struct GravityFilter {
    alpha: f32,
    gravity: Vec3,
}

impl GravityFilter {
    pub fn new() -> Self {
        Self::with_alpha(GRAVITY_ALPHA)
    }

    pub fn with_alpha(alpha: f32) -> Self {
        Self {
            alpha,
            gravity: Vec3::ZERO,
        }
    }

    /// Fold one raw reading into the gravity estimate and return the linear component.
    pub fn update(&mut self, raw: Vec3) -> Vec3 {
        self.gravity = self.gravity * self.alpha + raw * (1.0 - self.alpha);
        raw - self.gravity
    }

    /// Current gravity estimate.
    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    /// Drop the estimate back to zero.
    pub fn reset(&mut self) {
        self.gravity = Vec3::ZERO;
    }
}

impl Default for GravityFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_update_from_zero() {
        let mut filter = GravityFilter::new();
        let linear = filter.update(Vec3::new(10.0, 0.0, -5.0));

        assert!((filter.gravity().x - 2.0).abs() < 1e-6);
        assert!((filter.gravity().z + 1.0).abs() < 1e-6);
        assert!((linear.x - 8.0).abs() < 1e-6);
        assert!((linear.z + 4.0).abs() < 1e-6);
    }

    #[test]
    fn converges_on_constant_input() {
        let mut filter = GravityFilter::new();
        let g = Vec3::new(0.0, 0.0, 9.81);
        let mut linear = Vec3::ZERO;
        for _ in 0..200 {
            linear = filter.update(g);
        }

        assert!((filter.gravity() - g).length() < 1e-3);
        assert!(linear.length() < 1e-3);
    }

    #[test]
    fn reset_zeroes_estimate() {
        let mut filter = GravityFilter::new();
        filter.update(Vec3::splat(3.0));
        filter.reset();
        assert_eq!(filter.gravity(), Vec3::ZERO);
    }
}
