/// Reports whether an access constructed the value or found it already in place.
///
/// This is a diagnostic signal. Correctness never depends on it: both outcomes hand out a
/// reference to the same value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Outcome {
    /// This access ran the initializer and published the value.
    Constructed,

    /// The value had already been published by an earlier (or racing) access.
    AlreadyExisted,
}

impl Outcome {
    /// Whether this access is the one that ran the initializer.
    #[must_use]
    pub const fn is_constructed(self) -> bool {
        matches!(self, Self::Constructed)
    }
}
