//! Typed append-only time-series storage.

/// Append-only history of one record type per simulated entity.
///
/// Every call to [`Recorder::record`] appends exactly one row, so index `i`
/// of every recorder that is fed once per timestep refers to the same
/// timestep.
///
/// # Examples
///
/// ```
/// use prosumer_sim::recorder::Recorder;
///
/// let mut rec = Recorder::new();
/// rec.record(1.5_f64);
/// rec.record(2.0_f64);
/// assert_eq!(rec.len(), 2);
/// assert_eq!(rec.last(), Some(&2.0));
/// ```
#[derive(Debug, Clone)]
pub struct Recorder<T> {
    rows: Vec<T>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T> Recorder<T> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty recorder with room for `steps` rows.
    pub fn with_capacity(steps: usize) -> Self {
        Self {
            rows: Vec::with_capacity(steps),
        }
    }

    /// Appends one row.
    pub fn record(&mut self, row: T) {
        self.rows.push(row);
    }

    /// Returns the most recent row, if any.
    pub fn last(&self) -> Option<&T> {
        self.rows.last()
    }

    /// Mutable access to the most recent row.
    ///
    /// Only used to settle values that are decided later in the same
    /// timestep (PV curtailment).
    pub(crate) fn last_mut(&mut self) -> Option<&mut T> {
        self.rows.last_mut()
    }

    pub fn rows(&self) -> &[T] {
        &self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Projects one field of every row into a column vector.
    pub fn column<U>(&self, f: impl Fn(&T) -> U) -> Vec<U> {
        self.rows.iter().map(f).collect()
    }
}

impl<'a, T> IntoIterator for &'a Recorder<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
