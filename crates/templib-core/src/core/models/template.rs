use super::atom::Atom;
use super::error::TemplateError;
use super::ids::AtomId;
use super::residue::ResidueKind;
use super::structure::Structure;
use super::topology::{Bond, BondOrder};
use nalgebra::{MatrixXx3, Point3, Vector3};
use serde::Serialize;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::ops::Index;
use std::sync::Arc;

/// Periodic simulation cell: three edge lengths (Å) and three angles (degrees).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodicBox {
    pub lengths: Vector3<f64>,
    pub angles: Vector3<f64>,
}

impl PeriodicBox {
    /// Creates a box from its edge lengths (Å) and angles (degrees).
    pub fn new(lengths: [f64; 3], angles: [f64; 3]) -> Self {
        Self {
            lengths: Vector3::from(lengths),
            angles: Vector3::from(angles),
        }
    }

    /// A rectangular box with right angles.
    pub fn rectangular(a: f64, b: f64, c: f64) -> Self {
        Self::new([a, b, c], [90.0; 3])
    }
}

/// Refers to an atom of a template either by arena handle or by dense index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomRef {
    Id(AtomId),
    Index(usize),
}

impl From<AtomId> for AtomRef {
    fn from(id: AtomId) -> Self {
        Self::Id(id)
    }
}

impl From<usize> for AtomRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for AtomRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{:?}", id),
            Self::Index(index) => write!(f, "at index {}", index),
        }
    }
}

/// A residue template: a named, ordered set of atoms with a bond graph and
/// attachment points used when chaining templates into larger structures.
///
/// Cloning deep-copies atoms and bonds. Patch templates are held behind
/// [`Arc`] and are shared by clones.
#[derive(Debug, Clone, Default)]
pub struct ResidueTemplate {
    pub name: String,
    pub kind: ResidueKind,
    pub first_patch: Option<Arc<ResidueTemplate>>,
    pub last_patch: Option<Arc<ResidueTemplate>>,
    pub periodic_box: Option<PeriodicBox>,
    atoms: SlotMap<AtomId, Atom>,
    order: Vec<AtomId>,
    name_map: HashMap<String, AtomId>,
    bonds: Vec<Bond>,
    adjacency: SecondaryMap<AtomId, Vec<AtomId>>,
    head: Option<AtomId>,
    tail: Option<AtomId>,
    connections: Vec<AtomId>,
}

#[derive(Serialize)]
struct AtomRow<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    atom_type: &'a str,
    atomic_number: u8,
    charge: f64,
    x: f64,
    y: f64,
    z: f64,
    vx: f64,
    vy: f64,
    vz: f64,
}

impl ResidueTemplate {
    /// Creates an empty template of unknown kind.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Sets the residue kind, builder style.
    pub fn with_kind(mut self, kind: ResidueKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of atoms in the template.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appends an atom and returns its handle.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::DuplicatePosition`] if the atom already belongs to a
    /// template or if another atom of this template carries the same name.
    pub fn add_atom(&mut self, mut atom: Atom) -> Result<AtomId, TemplateError> {
        let reason = if atom.is_owned() {
            Some("atom already belongs to a template")
        } else if self.name_map.contains_key(&atom.name) {
            Some("atom name is already taken")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(TemplateError::DuplicatePosition {
                template: self.name.clone(),
                atom: atom.name,
                reason,
            });
        }

        atom.set_index(self.order.len());
        let name = atom.name.clone();
        let id = self.atoms.insert(atom);
        self.order.push(id);
        self.name_map.insert(name, id);
        self.adjacency.insert(id, Vec::new());
        Ok(id)
    }

    /// Resolves an atom reference to a handle of this template.
    pub fn resolve(&self, atom: impl Into<AtomRef>) -> Result<AtomId, TemplateError> {
        let reference = atom.into();
        let resolved = match reference {
            AtomRef::Id(id) => self.atoms.contains_key(id).then_some(id),
            AtomRef::Index(index) => self.order.get(index).copied(),
        };
        resolved.ok_or_else(|| TemplateError::UnknownAtom {
            template: self.name.clone(),
            reference: reference.to_string(),
        })
    }

    /// Looks up an atom by handle or by position in storage order.
    pub fn atom(&self, atom: impl Into<AtomRef>) -> Option<&Atom> {
        let id = self.resolve(atom).ok()?;
        self.atoms.get(id)
    }

    /// Mutable counterpart of [`atom`](Self::atom).
    pub fn atom_mut(&mut self, atom: impl Into<AtomRef>) -> Option<&mut Atom> {
        let id = self.resolve(atom).ok()?;
        self.atoms.get_mut(id)
    }

    /// Returns the first atom called `name`.
    pub fn atom_by_name(&self, name: &str) -> Option<&Atom> {
        self.name_map.get(name).and_then(|&id| self.atoms.get(id))
    }

    /// Handle of the first atom called `name`.
    pub fn id_by_name(&self, name: &str) -> Option<AtomId> {
        self.name_map.get(name).copied()
    }

    /// Dense index of the atom behind `id`.
    pub fn index_of(&self, id: AtomId) -> Option<usize> {
        self.atoms.get(id).and_then(Atom::index)
    }

    /// Atom handles in storage order.
    pub fn atom_ids(&self) -> &[AtomId] {
        &self.order
    }

    /// Iterates over the atoms in storage order.
    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.order.iter().filter_map(|&id| self.atoms.get(id))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Atom> {
        let mut by_index: Vec<&mut Atom> = self.atoms.values_mut().collect();
        by_index.sort_by_key(|atom| atom.index());
        by_index.into_iter()
    }

    pub fn add_bond(
        &mut self,
        atom1: impl Into<AtomRef>,
        atom2: impl Into<AtomRef>,
    ) -> Result<(), TemplateError> {
        self.add_bond_with_order(atom1, atom2, BondOrder::Single)
    }

    /// Bonds two distinct atoms. Both become each other's partners; repeated
    /// pairs are stored as separate bonds.
    pub fn add_bond_with_order(
        &mut self,
        atom1: impl Into<AtomRef>,
        atom2: impl Into<AtomRef>,
        order: BondOrder,
    ) -> Result<(), TemplateError> {
        let id1 = self.resolve(atom1)?;
        let id2 = self.resolve(atom2)?;
        if id1 == id2 {
            return Err(TemplateError::SelfBond {
                atom: self.atoms[id1].name.clone(),
            });
        }

        self.bonds.push(Bond::new(id1, id2, order));
        if let Some(partners) = self.adjacency.get_mut(id1) {
            partners.push(id2);
        }
        if let Some(partners) = self.adjacency.get_mut(id2) {
            partners.push(id1);
        }
        Ok(())
    }

    /// All bonds in insertion order, duplicates included.
    pub fn bonds(&self) -> &[Bond] {
        &self.bonds
    }

    /// Handles of the atoms bonded to `atom`; empty for unknown references.
    pub fn bond_partners(&self, atom: impl Into<AtomRef>) -> &[AtomId] {
        self.resolve(atom)
            .ok()
            .and_then(|id| self.adjacency.get(id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the two atoms are bonded; `false` if either is unknown.
    pub fn has_bond(&self, atom1: impl Into<AtomRef>, atom2: impl Into<AtomRef>) -> bool {
        match (self.resolve(atom1), self.resolve(atom2)) {
            (Ok(id1), Ok(id2)) => self.bond_partners(id1).contains(&id2),
            _ => false,
        }
    }

    /// The atom that bonds to the previous residue of a chain, if any.
    pub fn head(&self) -> Option<&Atom> {
        self.head.and_then(|id| self.atoms.get(id))
    }

    /// Handle of the head atom.
    pub fn head_id(&self) -> Option<AtomId> {
        self.head
    }

    /// Position of the head atom in storage order.
    pub fn head_index(&self) -> Option<usize> {
        self.head.and_then(|id| self.index_of(id))
    }

    /// Marks `atom` as the head.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::UnknownAtom`] if `atom` is not part of the template.
    pub fn set_head(&mut self, atom: impl Into<AtomRef>) -> Result<(), TemplateError> {
        self.head = Some(self.resolve(atom)?);
        Ok(())
    }

    pub fn clear_head(&mut self) {
        self.head = None;
    }

    /// The atom that bonds to the next residue of a chain, if any.
    pub fn tail(&self) -> Option<&Atom> {
        self.tail.and_then(|id| self.atoms.get(id))
    }

    pub fn tail_id(&self) -> Option<AtomId> {
        self.tail
    }

    /// Position of the tail atom in storage order.
    pub fn tail_index(&self) -> Option<usize> {
        self.tail.and_then(|id| self.index_of(id))
    }

    /// Marks `atom` as the tail. Fails like [`set_head`](Self::set_head).
    pub fn set_tail(&mut self, atom: impl Into<AtomRef>) -> Result<(), TemplateError> {
        self.tail = Some(self.resolve(atom)?);
        Ok(())
    }

    pub fn clear_tail(&mut self) {
        self.tail = None;
    }

    /// Extra attachment atoms beyond head and tail, e.g. a disulfide sulfur.
    pub fn connections(&self) -> &[AtomId] {
        &self.connections
    }

    /// Appends an attachment atom. The same atom may be listed more than once.
    pub fn add_connection(&mut self, atom: impl Into<AtomRef>) -> Result<(), TemplateError> {
        let id = self.resolve(atom)?;
        self.connections.push(id);
        Ok(())
    }

    pub fn clear_connections(&mut self) {
        self.connections.clear();
    }

    /// Sum of all partial charges.
    pub fn net_charge(&self) -> f64 {
        self.iter().map(|atom| atom.charge).sum()
    }

    /// Atom positions as an N×3 matrix, one row per atom in storage order.
    pub fn coordinates(&self) -> MatrixXx3<f64> {
        let atoms: Vec<&Atom> = self.iter().collect();
        MatrixXx3::from_fn(atoms.len(), |row, col| atoms[row].position[col])
    }

    /// Overwrites atom positions from an N×3 matrix in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::CoordinateShape`] if the row count differs from
    /// the number of atoms; positions are left unchanged.
    pub fn set_coordinates(&mut self, coordinates: &MatrixXx3<f64>) -> Result<(), TemplateError> {
        if coordinates.nrows() != self.len() {
            return Err(TemplateError::CoordinateShape {
                expected: self.len(),
                found: coordinates.nrows(),
            });
        }
        for (row, atom) in self.iter_mut().enumerate() {
            atom.position = Point3::new(
                coordinates[(row, 0)],
                coordinates[(row, 1)],
                coordinates[(row, 2)],
            );
        }
        Ok(())
    }

    /// Projects residue `residue_index` of `structure` into a standalone template.
    ///
    /// Bonds leaving the residue become attachment points: a partner in the
    /// previous residue marks the head, one in the next residue marks the tail
    /// and anything else is recorded as a connection.
    pub fn from_residue(structure: &Structure, residue_index: usize) -> Result<Self, TemplateError> {
        let span = structure.residues().get(residue_index).ok_or_else(|| {
            TemplateError::InconsistentResidue {
                residue: residue_index,
                details: format!("structure has {} residues", structure.residues().len()),
            }
        })?;

        let mut template = Self::new(&span.name).with_kind(span.kind);
        let mut local: HashMap<usize, AtomId> = HashMap::with_capacity(span.atoms.len());
        for global in span.atoms.clone() {
            let source = structure.atoms().get(global).ok_or_else(|| {
                TemplateError::InconsistentResidue {
                    residue: residue_index,
                    details: format!("atom index {} is out of range", global),
                }
            })?;
            local.insert(global, template.add_atom(source.detached())?);
        }

        for bond in structure.bonds() {
            match (local.get(&bond.atom1), local.get(&bond.atom2)) {
                (Some(&a), Some(&b)) => template.add_bond_with_order(a, b, bond.order)?,
                (Some(&inside), None) => {
                    template.attach_external(structure, residue_index, inside, bond.atom2)?
                }
                (None, Some(&inside)) => {
                    template.attach_external(structure, residue_index, inside, bond.atom1)?
                }
                (None, None) => {}
            }
        }
        Ok(template)
    }

    fn attach_external(
        &mut self,
        structure: &Structure,
        residue_index: usize,
        inside: AtomId,
        external: usize,
    ) -> Result<(), TemplateError> {
        match structure.residue_of(external) {
            Some(other) if other + 1 == residue_index => self.head = Some(inside),
            Some(other) if other == residue_index + 1 => self.tail = Some(inside),
            Some(other) if other != residue_index => self.connections.push(inside),
            _ => {
                return Err(TemplateError::InconsistentResidue {
                    residue: residue_index,
                    details: format!(
                        "bond partner {} of atom '{}' cannot be assigned to another residue",
                        external, self.atoms[inside].name
                    ),
                });
            }
        }
        Ok(())
    }

    /// Writes one CSV row per atom: name, type, atomic number, charge, position
    /// and velocity.
    pub fn write_atom_table<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for atom in self.iter() {
            csv_writer.serialize(AtomRow {
                name: &atom.name,
                atom_type: &atom.atom_type,
                atomic_number: atom.atomic_number,
                charge: atom.charge,
                x: atom.position.x,
                y: atom.position.y,
                z: atom.position.z,
                vx: atom.velocity.x,
                vy: atom.velocity.y,
                vz: atom.velocity.z,
            })?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl Index<usize> for ResidueTemplate {
    type Output = Atom;

    fn index(&self, index: usize) -> &Self::Output {
        &self.atoms[self.order[index]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::StructureBuilder;
    use std::collections::HashSet;

    fn ace() -> ResidueTemplate {
        let mut ace = ResidueTemplate::new("ACE").with_kind(ResidueKind::Protein);
        let specs = [
            ("HH31", "HC", 1, 0.1123, [2.0, 1.0, 0.0]),
            ("CH3", "CT", 6, -0.3662, [2.0, 2.09, 0.0]),
            ("HH32", "HC", 1, 0.1123, [1.486, 2.454, 0.890]),
            ("HH33", "HC", 1, 0.1123, [1.486, 2.454, -0.890]),
            ("C", "C", 6, 0.5972, [3.427, 2.641, 0.0]),
            ("O", "O", 8, -0.5679, [4.391, 1.877, 0.0]),
        ];
        for (name, ty, z, q, p) in specs {
            ace.add_atom(
                Atom::new(name, ty)
                    .with_atomic_number(z)
                    .with_charge(q)
                    .with_position(Point3::from(p)),
            )
            .unwrap();
        }
        for (a, b) in [(0, 1), (1, 2), (1, 3), (1, 4)] {
            ace.add_bond(a, b).unwrap();
        }
        ace.add_bond_with_order(4, 5, BondOrder::Double).unwrap();
        ace.set_tail(4).unwrap();
        ace
    }

    fn partner_names<'a>(template: &'a ResidueTemplate, name: &str) -> HashSet<&'a str> {
        let id = template.id_by_name(name).unwrap();
        template
            .bond_partners(id)
            .iter()
            .map(|&p| template.atom(p).unwrap().name.as_str())
            .collect()
    }

    #[test]
    fn add_atom_assigns_dense_indices() {
        let ace = ace();
        assert_eq!(ace.len(), 6);
        for (i, atom) in ace.iter().enumerate() {
            assert_eq!(atom.index(), Some(i));
            assert_eq!(ace[i].name, atom.name);
        }
        assert_eq!(ace.atom_by_name("C").unwrap().index(), Some(4));
    }

    #[test]
    fn add_atom_rejects_owned_atoms_and_duplicate_names() {
        let mut ace = ace();
        let owned = ace[0].clone();
        let err = ace.add_atom(owned).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicatePosition { .. }));

        let err = ace.add_atom(Atom::new("C", "C")).unwrap_err();
        assert!(matches!(err, TemplateError::DuplicatePosition { .. }));
        assert_eq!(ace.len(), 6);

        ace.add_atom(ace[0].detached()).unwrap_err();
        let mut renamed = ace[0].detached();
        renamed.name = "HH34".to_string();
        ace.add_atom(renamed).unwrap();
        assert_eq!(ace.len(), 7);
    }

    #[test]
    fn bonds_are_symmetric() {
        let ace = ace();
        assert_eq!(ace.bonds().len(), 5);
        for bond in ace.bonds() {
            assert!(ace.bond_partners(bond.atom1).contains(&bond.atom2));
            assert!(ace.bond_partners(bond.atom2).contains(&bond.atom1));
        }
        assert_eq!(
            partner_names(&ace, "CH3"),
            HashSet::from(["HH31", "HH32", "HH33", "C"])
        );
        assert!(ace.has_bond(4, 5));
        assert!(!ace.has_bond(0, 5));
    }

    #[test]
    fn add_bond_does_not_deduplicate() {
        let mut ace = ace();
        ace.add_bond(0, 1).unwrap();
        assert_eq!(ace.bonds().len(), 6);
        assert_eq!(ace.bond_partners(0usize).len(), 2);
    }

    #[test]
    fn add_bond_rejects_self_bonds_for_handles_and_indices() {
        let mut ace = ace();
        let id = ace.atom_ids()[1];
        assert!(matches!(ace.add_bond(id, id), Err(TemplateError::SelfBond { .. })));
        assert!(matches!(ace.add_bond(1, 1), Err(TemplateError::SelfBond { .. })));
        assert_eq!(ace.bonds().len(), 5);
    }

    #[test]
    fn add_bond_rejects_unknown_atoms_as_reference_errors() {
        let mut ace = ace();
        let by_index = ace.add_bond(0, 42).unwrap_err();
        assert!(by_index.is_reference_error());

        let mut larger = ResidueTemplate::new("BIG");
        for i in 0..10 {
            larger.add_atom(Atom::new(&format!("X{i}"), "DU")).unwrap();
        }
        let stranger = larger.atom_ids()[9];
        let by_id = ace.add_bond(stranger, 0).unwrap_err();
        assert!(by_id.is_reference_error());
        assert!(!matches!(by_id, TemplateError::SelfBond { .. }));
        assert_eq!(ace.bonds().len(), 5);
    }

    #[test]
    fn attachment_setters_validate_references() {
        let mut ace = ace();
        assert_eq!(ace.tail().unwrap().name, "C");
        assert_eq!(ace.tail_index(), Some(4));
        assert!(ace.head().is_none());

        assert!(ace.set_head(17).unwrap_err().is_reference_error());
        ace.set_head(1).unwrap();
        assert_eq!(ace.head().unwrap().name, "CH3");
        ace.clear_head();
        ace.clear_tail();
        assert!(ace.head_id().is_none() && ace.tail_id().is_none());

        ace.add_connection(5).unwrap();
        assert_eq!(ace.connections(), &[ace.atom_ids()[5]]);
        assert!(ace.add_connection(6).is_err());
    }

    #[test]
    fn clone_deep_copies_atoms_and_shares_patches() {
        let mut ace = ace();
        let patch = Arc::new(ResidueTemplate::new("PATCH"));
        ace.first_patch = Some(Arc::clone(&patch));

        let mut copy = ace.clone();
        copy.atom_mut(0).unwrap().charge = 1.0;
        copy.add_bond(0, 5).unwrap();

        assert_eq!(ace[0].charge, 0.1123);
        assert_eq!(ace.bonds().len(), 5);
        assert_eq!(copy.bonds().len(), 6);
        assert_eq!(copy.tail().unwrap().name, "C");
        assert!(Arc::ptr_eq(copy.first_patch.as_ref().unwrap(), &patch));
        assert!(copy.last_patch.is_none());
    }

    #[test]
    fn coordinates_round_trip_through_matrix() {
        let mut ace = ace();
        let coords = ace.coordinates();
        assert_eq!(coords.nrows(), 6);
        assert_eq!(coords[(4, 0)], 3.427);

        let shifted = coords.add_scalar(1.0);
        ace.set_coordinates(&shifted).unwrap();
        assert_eq!(ace[5].position.x, coords[(5, 0)] + 1.0);
        assert_eq!(ace[5].position.z, 1.0);

        let wrong = MatrixXx3::<f64>::zeros(2);
        assert_eq!(
            ace.set_coordinates(&wrong).unwrap_err(),
            TemplateError::CoordinateShape {
                expected: 6,
                found: 2
            }
        );
    }

    #[test]
    fn net_charge_sums_atom_charges() {
        let ace = ace();
        assert!((ace.net_charge() - 0.0).abs() < 1e-10);
    }

    fn ace_ala_nme() -> Structure {
        let ace = ace();
        let mut builder = StructureBuilder::new();
        builder.start_residue("ACE", ResidueKind::Protein);
        for atom in ace.iter() {
            builder.add_atom(atom.detached());
        }
        for bond in ace.bonds() {
            let a = ace.index_of(bond.atom1).unwrap();
            let b = ace.index_of(bond.atom2).unwrap();
            builder.add_bond(a, b, bond.order);
        }
        builder
            .start_residue("ALA", ResidueKind::Protein)
            .add_atom(Atom::new("N", "N").with_atomic_number(7))
            .add_atom(Atom::new("CA", "CT").with_atomic_number(6))
            .add_atom(Atom::new("C", "C").with_atomic_number(6))
            .add_atom(Atom::new("SG", "SH").with_atomic_number(16))
            .add_bond(6, 7, BondOrder::Single)
            .add_bond(7, 8, BondOrder::Single)
            .add_bond(7, 9, BondOrder::Single)
            .add_bond(4, 6, BondOrder::Single)
            .start_residue("NME", ResidueKind::Protein)
            .add_atom(Atom::new("N", "N").with_atomic_number(7))
            .add_atom(Atom::new("CH3", "CT").with_atomic_number(6))
            .add_bond(10, 11, BondOrder::Single)
            .add_bond(8, 10, BondOrder::Single)
            .start_residue("CYX", ResidueKind::Protein)
            .add_atom(Atom::new("SG", "S").with_atomic_number(16))
            .add_bond(9, 12, BondOrder::Single);
        builder.build()
    }

    #[test]
    fn from_residue_classifies_crossing_bonds() {
        let structure = ace_ala_nme();

        let ace = ResidueTemplate::from_residue(&structure, 0).unwrap();
        assert_eq!(ace.len(), 6);
        assert_eq!(ace.bonds().len(), 5);
        assert!(ace.head().is_none());
        assert_eq!(ace.tail().unwrap().name, "C");
        assert_eq!(ace.kind, ResidueKind::Protein);
        assert_eq!(ace.coordinates(), self::ace().coordinates());

        let ala = ResidueTemplate::from_residue(&structure, 1).unwrap();
        assert_eq!(ala.head().unwrap().name, "N");
        assert_eq!(ala.tail().unwrap().name, "C");
        assert_eq!(ala.connections().len(), 1);
        assert_eq!(ala.atom(ala.connections()[0]).unwrap().name, "SG");
        assert_eq!(ala.bonds().len(), 3);

        let nme = ResidueTemplate::from_residue(&structure, 2).unwrap();
        assert_eq!(nme.head().unwrap().name, "N");
        assert!(nme.tail().is_none());

        let cyx = ResidueTemplate::from_residue(&structure, 3).unwrap();
        assert!(cyx.head().is_none());
        assert_eq!(cyx.connections().len(), 1);
    }

    #[test]
    fn from_residue_copies_atom_fields() {
        let structure = ace_ala_nme();
        let ace = ResidueTemplate::from_residue(&structure, 0).unwrap();
        for (copied, source) in ace.iter().zip(structure.atoms()) {
            assert_eq!(copied.name, source.name);
            assert_eq!(copied.atom_type, source.atom_type);
            assert_eq!(copied.atomic_number, source.atomic_number);
            assert_eq!(copied.charge, source.charge);
            assert_eq!(copied.position, source.position);
            assert_eq!(copied.velocity, source.velocity);
        }
    }

    #[test]
    fn from_residue_rejects_partners_outside_every_residue() {
        let mut builder = StructureBuilder::new();
        builder
            .start_residue("WAT", ResidueKind::Solvent)
            .add_atom(Atom::new("O", "OW"))
            .end_residue()
            .add_atom(Atom::new("EP", "EP"))
            .add_bond(0, 1, BondOrder::Single);
        let structure = builder.build();

        let err = ResidueTemplate::from_residue(&structure, 0).unwrap_err();
        assert!(matches!(err, TemplateError::InconsistentResidue { residue: 0, .. }));
        assert!(ResidueTemplate::from_residue(&structure, 3).is_err());
    }

    #[test]
    fn write_atom_table_emits_header_and_rows() {
        let ace = ace();
        let mut buffer = Vec::new();
        ace.write_atom_table(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 7);
        assert_eq!(lines[0], "name,type,atomic_number,charge,x,y,z,vx,vy,vz");
        assert!(lines[5].starts_with("C,C,6,0.5972,3.427,2.641,0.0,"));
    }
}
