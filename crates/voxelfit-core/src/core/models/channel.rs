use serde::{Deserialize, Serialize};

/// An atom-type bucket with the parameters of its density kernel.
///
/// Channels are sourced from an external atom-type catalog; the fitting engine
/// only relies on the kernel radius and, in bonded placement mode, the valence
/// limit derived from the atomic number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Catalog name of the channel (e.g., "AliphaticCarbonXSHydrophobe").
    pub name: String,
    /// Atomic number of the underlying element.
    pub atomic_num: u32,
    /// Element symbol (e.g., "C", "N").
    pub symbol: String,
    /// Kernel radius in Angstroms.
    pub atomic_radius: f64,
}

impl Channel {
    pub fn new(name: &str, atomic_num: u32, symbol: &str, atomic_radius: f64) -> Self {
        Self {
            name: name.to_string(),
            atomic_num,
            symbol: symbol.to_string(),
            atomic_radius,
        }
    }

    /// Maximum number of bonds an atom of this channel may form.
    ///
    /// Conservative main-group valences; the external catalog may override this
    /// by substituting its own channel definitions.
    pub fn max_bonds(&self) -> usize {
        match self.atomic_num {
            1 | 9 | 17 | 35 | 53 => 1,
            8 => 2,
            5 | 7 => 3,
            15 => 5,
            16 => 6,
            _ => 4,
        }
    }
}
