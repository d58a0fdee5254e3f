use super::atom::Atom;
use super::residue::ResidueKind;
use super::template::PeriodicBox;
use super::topology::BondOrder;
use std::ops::Range;

/// A contiguous run of atoms forming one residue of a [`Structure`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueSpan {
    pub name: String,
    pub kind: ResidueKind,
    pub atoms: Range<usize>,
}

/// A bond between two atoms of a [`Structure`], addressed by global atom index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureBond {
    pub atom1: usize,
    pub atom2: usize,
    pub order: BondOrder,
}

/// Flat view of a multi-residue structure.
///
/// This is the only shape in which templates consume full structures: a
/// global atom list, residue spans over that list and a global bond list.
/// Atoms outside every span are allowed and model atoms the producer could not
/// assign to a residue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Structure {
    atoms: Vec<Atom>,
    residues: Vec<ResidueSpan>,
    bonds: Vec<StructureBond>,
    pub periodic_box: Option<PeriodicBox>,
}

impl Structure {
    /// All atoms in global order.
    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    /// Residue spans in the order they were started.
    pub fn residues(&self) -> &[ResidueSpan] {
        &self.residues
    }

    pub fn bonds(&self) -> &[StructureBond] {
        &self.bonds
    }

    /// Returns the index of the first residue whose span contains `atom_index`.
    pub fn residue_of(&self, atom_index: usize) -> Option<usize> {
        self.residues
            .iter()
            .position(|span| span.atoms.contains(&atom_index))
    }
}

#[derive(Debug, Default)]
pub struct StructureBuilder {
    structure: Structure,
    current_residue: Option<usize>,
}

impl StructureBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new residue; subsequent atoms are appended to it.
    pub fn start_residue(&mut self, name: &str, kind: ResidueKind) -> &mut Self {
        let start = self.structure.atoms.len();
        self.structure.residues.push(ResidueSpan {
            name: name.to_string(),
            kind,
            atoms: start..start,
        });
        self.current_residue = Some(self.structure.residues.len() - 1);
        self
    }

    /// Closes the current residue; subsequent atoms belong to no residue.
    pub fn end_residue(&mut self) -> &mut Self {
        self.current_residue = None;
        self
    }

    /// Appends an atom to the open residue, or to no residue after
    /// [`end_residue`](Self::end_residue).
    pub fn add_atom(&mut self, atom: Atom) -> &mut Self {
        self.structure.atoms.push(atom.detached());
        if let Some(span) = self
            .current_residue
            .and_then(|idx| self.structure.residues.get_mut(idx))
        {
            span.atoms.end = self.structure.atoms.len();
        }
        self
    }

    /// Adds a bond between two global atom indices.
    pub fn add_bond(&mut self, atom1: usize, atom2: usize, order: BondOrder) -> &mut Self {
        self.structure.bonds.push(StructureBond {
            atom1,
            atom2,
            order,
        });
        self
    }

    pub fn periodic_box(&mut self, periodic_box: PeriodicBox) -> &mut Self {
        self.structure.periodic_box = Some(periodic_box);
        self
    }

    /// Number of atoms added so far.
    pub fn atom_count(&self) -> usize {
        self.structure.atoms.len()
    }

    pub fn build(self) -> Structure {
        self.structure
    }
}
