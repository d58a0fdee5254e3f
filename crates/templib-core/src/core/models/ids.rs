use slotmap::new_key_type;

new_key_type! {
    /// Stable handle to an atom inside the arena of the [`ResidueTemplate`] that issued it.
    ///
    /// Handles are only meaningful for their issuing template (and for clones of it, which
    /// keep the same handles for their own copies of the atoms).
    ///
    /// [`ResidueTemplate`]: super::template::ResidueTemplate
    pub struct AtomId;
}
