use serde::Serialize;

/// `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AffineTransform {
    pub slope: f64,
    pub intercept: f64,
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        slope: 1.0,
        intercept: 0.0,
    };

    pub const fn new(slope: f64, intercept: f64) -> Self {
        Self { slope, intercept }
    }

    pub fn apply(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }

    /// Apply `self` first, then `next`.
    pub fn then(&self, next: &AffineTransform) -> AffineTransform {
        AffineTransform {
            slope: next.slope * self.slope,
            intercept: next.slope * self.intercept + next.intercept,
        }
    }

    pub fn inverse(&self) -> Option<AffineTransform> {
        if self.slope == 0.0 || !self.slope.is_finite() {
            return None;
        }
        Some(AffineTransform {
            slope: 1.0 / self.slope,
            intercept: -self.intercept / self.slope,
        })
    }

    /// Component-wise comparison with a relative tolerance (absolute near zero).
    /// Slopes are compared relative to their magnitude. Intercepts are
    /// additionally allowed an absolute `tolerance` so values near zero match.
    pub fn approx_eq(&self, other: &AffineTransform, tolerance: f64) -> bool {
        let slope_scale = self.slope.abs().max(other.slope.abs());
        let intercept_scale = self.intercept.abs().max(other.intercept.abs()).max(1.0);
        (self.slope - other.slope).abs() <= tolerance * slope_scale
            && (self.intercept - other.intercept).abs() <= tolerance * intercept_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_applies_left_to_right() {
        let celsius_to_kelvin = AffineTransform::new(1.0, 273.15);
        let double = AffineTransform::new(2.0, 0.0);

        assert!((celsius_to_kelvin.then(&double).apply(10.0) - 566.3).abs() < 1e-9);
        assert!((double.then(&celsius_to_kelvin).apply(10.0) - 293.15).abs() < 1e-9);
    }

    #[test]
    fn inverse_undoes_transform() {
        let f_to_c = AffineTransform::new(5.0 / 9.0, -160.0 / 9.0);
        let c_to_f = f_to_c.inverse().unwrap();
        assert!(f_to_c.then(&c_to_f).approx_eq(&AffineTransform::IDENTITY, 1e-12));
        assert!((c_to_f.apply(100.0) - 212.0).abs() < 1e-9);
        assert!(AffineTransform::new(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn tolerance_is_relative_for_large_values() {
        let a = AffineTransform::new(1.0e6, 0.0);
        let b = AffineTransform::new(1.0e6 + 1.0e-4, 0.0);
        assert!(a.approx_eq(&b, 1e-9));
        assert!(!a.approx_eq(&AffineTransform::new(1.0e6 + 1.0, 0.0), 1e-9));
    }

    #[test]
    fn tolerance_is_relative_for_tiny_slopes() {
        let wh_to_twh = AffineTransform::new(1e-12, 0.0);
        assert!(!wh_to_twh.approx_eq(&AffineTransform::new(1.5e-12, 0.0), 1e-9));
        assert!(wh_to_twh.approx_eq(&AffineTransform::new(1e-12 * (1.0 + 1e-12), 0.0), 1e-9));
        assert!(AffineTransform::new(0.0, 0.0).approx_eq(&AffineTransform::new(0.0, 1e-12), 1e-9));
    }
}
