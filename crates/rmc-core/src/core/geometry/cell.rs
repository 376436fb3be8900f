use super::GeometryError;
use nalgebra::{Matrix3, Point3, Vector3};

/// The enclosing box of a simulated system.
///
/// Positions are always stored in Cartesian coordinates. When the box is periodic, every
/// displacement between two atoms is folded into the minimum image before it is used by a
/// geometry kernel.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SimulationBox {
    /// No boundaries, displacements are used as-is.
    #[default]
    Open,
    /// Periodic box spanned by three basis vectors.
    Periodic {
        /// Box matrix whose columns are the three box vectors.
        basis: Matrix3<f64>,
        /// Cached inverse of `basis`, mapping Cartesian to fractional coordinates.
        inverse: Matrix3<f64>,
    },
}

impl SimulationBox {
    /// Creates a box without periodic boundaries.
    pub fn open() -> Self {
        SimulationBox::Open
    }

    /// Creates a periodic box from a matrix whose columns are the box vectors.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::NonFiniteBasis`] if any component is not finite,
    /// [`GeometryError::ZeroLengthVector`] if a box vector has zero length and
    /// [`GeometryError::SingularBasis`] if the matrix cannot be inverted.
    pub fn periodic(basis: Matrix3<f64>) -> Result<Self, GeometryError> {
        if basis.iter().any(|v| !v.is_finite()) {
            return Err(GeometryError::NonFiniteBasis);
        }
        for (i, column) in basis.column_iter().enumerate() {
            if column.norm() == 0.0 {
                return Err(GeometryError::ZeroLengthVector(i));
            }
        }
        let inverse = basis.try_inverse().ok_or(GeometryError::SingularBasis)?;
        Ok(SimulationBox::Periodic { basis, inverse })
    }

    /// Creates a periodic box from three box vectors.
    pub fn from_vectors(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> Result<Self, GeometryError> {
        Self::periodic(Matrix3::from_columns(&[
            Vector3::from(a),
            Vector3::from(b),
            Vector3::from(c),
        ]))
    }

    /// Creates an orthorhombic periodic box with side lengths `a, b, c`.
    pub fn orthorhombic(a: f64, b: f64, c: f64) -> Result<Self, GeometryError> {
        Self::periodic(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    pub fn is_periodic(&self) -> bool {
        matches!(self, SimulationBox::Periodic { .. })
    }

    /// Folds a displacement into the minimum-image convention.
    #[inline]
    pub fn minimum_image(&self, delta: Vector3<f64>) -> Vector3<f64> {
        match self {
            SimulationBox::Open => delta,
            SimulationBox::Periodic { basis, inverse } => {
                let mut fractional = inverse * delta;
                fractional.apply(|v| *v -= v.round());
                basis * fractional
            }
        }
    }

    /// Returns the (minimum-image) displacement vector pointing from `from` to `to`.
    #[inline]
    pub fn displacement(&self, from: &Point3<f64>, to: &Point3<f64>) -> Vector3<f64> {
        self.minimum_image(to - from)
    }

    /// Returns the (minimum-image) distance between two positions.
    #[inline]
    pub fn distance(&self, a: &Point3<f64>, b: &Point3<f64>) -> f64 {
        self.displacement(a, b).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-12, "{a} != {b}");
    }

    #[test]
    fn open_box_keeps_displacement_unchanged() {
        let cell = SimulationBox::open();
        let d = cell.displacement(&Point3::new(0.0, 0.0, 0.0), &Point3::new(9.0, -7.0, 3.0));
        assert_eq!(d, Vector3::new(9.0, -7.0, 3.0));
        assert!(!cell.is_periodic());
    }

    #[test]
    fn orthorhombic_box_wraps_to_nearest_image() {
        let cell = SimulationBox::orthorhombic(10.0, 10.0, 10.0).unwrap();
        let d = cell.displacement(&Point3::new(0.5, 0.0, 0.0), &Point3::new(9.5, 0.0, 0.0));
        assert_close(d.x, -1.0);
        assert_close(cell.distance(&Point3::new(0.0, 0.2, 0.0), &Point3::new(0.0, 9.8, 0.0)), 0.4);
    }

    #[test]
    fn triclinic_box_wraps_along_box_vectors() {
        let cell = SimulationBox::from_vectors([10.0, 0.0, 0.0], [5.0, 10.0, 0.0], [0.0, 0.0, 10.0])
            .unwrap();
        let shifted = Point3::new(1.0, 1.0, 1.0) + Vector3::new(5.0, 10.0, 0.0);
        assert_close(cell.distance(&Point3::new(1.0, 1.0, 1.0), &shifted), 0.0);
    }

    #[test]
    fn periodic_rejects_invalid_basis() {
        assert_eq!(
            SimulationBox::orthorhombic(10.0, 0.0, 10.0),
            Err(GeometryError::ZeroLengthVector(1))
        );
        assert_eq!(
            SimulationBox::from_vectors([1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            Err(GeometryError::SingularBasis)
        );
        assert_eq!(
            SimulationBox::orthorhombic(f64::NAN, 1.0, 1.0),
            Err(GeometryError::NonFiniteBasis)
        );
    }
}
