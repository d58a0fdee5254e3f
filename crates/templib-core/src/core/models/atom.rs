use crate::core::elements;
use nalgebra::{Point3, Vector3};

/// Represents a single atom record of a residue template.
///
/// An atom starts out free-standing. Once it is inserted into a
/// [`ResidueTemplate`](super::template::ResidueTemplate) it carries the dense
/// index it was assigned, which doubles as the ownership marker that prevents
/// the same record from being inserted a second time.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "CA", "HH31"), unique within its template.
    pub name: String,
    /// The force field atom type (e.g., "CT", "HC").
    pub atom_type: String,
    /// The atomic number, `0` when unknown.
    pub atomic_number: u8,
    /// The partial atomic charge in elementary charge units.
    pub charge: f64,
    /// The 3D coordinates of the atom in Angstroms.
    pub position: Point3<f64>,
    /// The velocity of the atom, zero unless a file provided one.
    pub velocity: Vector3<f64>,
    index: Option<usize>,
}

impl Atom {
    /// Creates a free-standing atom with zero charge, origin position and zero velocity.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `atom_type` - The force field type label.
    pub fn new(name: &str, atom_type: &str) -> Self {
        Self {
            name: name.to_string(),
            atom_type: atom_type.to_string(),
            atomic_number: 0,
            charge: 0.0,
            position: Point3::origin(),
            velocity: Vector3::zeros(),
            index: None,
        }
    }

    /// Creates an atom and guesses its atomic number from the type and name.
    pub fn with_guessed_element(name: &str, atom_type: &str) -> Self {
        let mut atom = Self::new(name, atom_type);
        atom.atomic_number = elements::guess_atomic_number(name, atom_type);
        atom
    }

    pub fn with_position(mut self, position: Point3<f64>) -> Self {
        self.position = position;
        self
    }

    pub fn with_charge(mut self, charge: f64) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_atomic_number(mut self, atomic_number: u8) -> Self {
        self.atomic_number = atomic_number;
        self
    }

    /// The position of this atom inside its owning template, `None` if free-standing.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Returns `true` once the atom has been inserted into a template.
    pub fn is_owned(&self) -> bool {
        self.index.is_some()
    }

    /// Returns a free-standing copy of this atom that may be inserted elsewhere.
    pub fn detached(&self) -> Self {
        Self {
            index: None,
            ..self.clone()
        }
    }

    pub(crate) fn set_index(&mut self, index: usize) {
        self.index = Some(index);
    }
}
