use nalgebra::Point3;
use ndarray::Array2;

/// An ordered set of fitted atoms: positions, channel indices, and a symmetric
/// 0/1 bond adjacency matrix.
///
/// The placement loop grows the set by append; the local optimizers mutate
/// positions in place through [`Self::positions_mut`]. The adjacency matrix is
/// kept square and symmetric with size equal to the atom count.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomSet {
    positions: Vec<Point3<f64>>,
    channels: Vec<usize>,
    bonds: Array2<u8>,
}

impl AtomSet {
    /// An empty set with capacity reserved for `capacity` atoms, so repeated
    /// appends during placement do not reallocate.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            channels: Vec::with_capacity(capacity),
            bonds: Array2::zeros((0, 0)),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.positions
    }

    #[inline]
    pub fn channels(&self) -> &[usize] {
        &self.channels
    }

    #[inline]
    pub fn bonds(&self) -> &Array2<u8> {
        &self.bonds
    }

    /// Disjoint views for in-place position optimization: mutable positions
    /// alongside shared channel labels and bond adjacency.
    pub fn split_mut(&mut self) -> (&mut [Point3<f64>], &[usize], &Array2<u8>) {
        (&mut self.positions, &self.channels, &self.bonds)
    }

    /// Appends an unbonded atom.
    pub fn push(&mut self, position: Point3<f64>, channel: usize) {
        let n = self.len();
        self.positions.push(position);
        self.channels.push(channel);
        let mut bonds = Array2::zeros((n + 1, n + 1));
        bonds
            .slice_mut(ndarray::s![..n, ..n])
            .assign(&self.bonds);
        self.bonds = bonds;
    }

    /// Appends an atom bonded to a subset of the existing atoms.
    ///
    /// `bond_row[i]` is nonzero when the new atom bonds to atom `i`; the row
    /// and its transpose are written so the adjacency stays symmetric.
    pub fn push_bonded(&mut self, position: Point3<f64>, channel: usize, bond_row: &[u8]) {
        let n = self.len();
        assert_eq!(bond_row.len(), n, "bond row must cover every existing atom");
        self.push(position, channel);
        for (i, &b) in bond_row.iter().enumerate() {
            let b = u8::from(b != 0);
            self.bonds[[n, i]] = b;
            self.bonds[[i, n]] = b;
        }
    }

    /// Number of bonds currently recorded for atom `index`.
    pub fn bond_count(&self, index: usize) -> usize {
        self.bonds
            .row(index)
            .iter()
            .filter(|&&b| b != 0)
            .count()
    }
}
