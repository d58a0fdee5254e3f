use phf::{Map, phf_map};

#[rustfmt::skip]
static ATOMIC_NUMBERS: Map<&'static str, u8> = phf_map! {
    "H" => 1, "He" => 2,
    "Li" => 3, "Be" => 4, "B" => 5, "C" => 6, "N" => 7, "O" => 8, "F" => 9, "Ne" => 10,
    "Na" => 11, "Mg" => 12, "Al" => 13, "Si" => 14, "P" => 15, "S" => 16, "Cl" => 17, "Ar" => 18,
    "K" => 19, "Ca" => 20,
    // --- First-row transition metals ---
    "Sc" => 21, "Ti" => 22, "V" => 23, "Cr" => 24, "Mn" => 25,
    "Fe" => 26, "Co" => 27, "Ni" => 28, "Cu" => 29, "Zn" => 30,
    "Ga" => 31, "Ge" => 32, "As" => 33, "Se" => 34, "Br" => 35, "Kr" => 36,
    "Rb" => 37, "Sr" => 38,
    "Ag" => 47, "Cd" => 48, "Sn" => 50, "I" => 53, "Xe" => 54,
    "Cs" => 55, "Ba" => 56, "Pt" => 78, "Au" => 79, "Hg" => 80, "Pb" => 82,
};

/// Looks up the atomic number of a case-sensitive element symbol.
pub fn atomic_number(symbol: &str) -> Option<u8> {
    ATOMIC_NUMBERS.get(symbol).copied()
}

/// Guesses the atomic number of an atom from its type and name.
///
/// SYBYL types (`C.3`, `N.am`) and bare element types (`Cl`, `Na`) decide
/// directly; otherwise the element is taken from the leading letters of the
/// atom name, where a second letter only counts when it is lowercase. Returns
/// `0` when nothing matches.
pub fn guess_atomic_number(name: &str, atom_type: &str) -> u8 {
    if let Some((prefix, _)) = atom_type.split_once('.') {
        if let Some(z) = atomic_number(&normalize_symbol(prefix)) {
            return z;
        }
    }
    if let Some(z) = atomic_number(atom_type) {
        return z;
    }

    let letters: Vec<char> = name
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .chars()
        .take(2)
        .collect();
    match letters.as_slice() {
        [first, second, ..] if second.is_ascii_lowercase() => {
            let two: String = [first.to_ascii_uppercase(), *second].iter().collect();
            atomic_number(&two)
                .or_else(|| atomic_number(&first.to_ascii_uppercase().to_string()))
                .unwrap_or(0)
        }
        [first, ..] => atomic_number(&first.to_ascii_uppercase().to_string()).unwrap_or(0),
        [] => 0,
    }
}

fn normalize_symbol(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
        None => String::new(),
    }
}
