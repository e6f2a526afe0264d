//! Vectorisation strategies.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use strata_common::types::{
    ColumnElement, DenseTensor, IndexList, NumericElement, WeightedIndexList,
};
use strata_common::utils::error::{CapacityError, Error, Result};
use strata_common::utils::hash::FxHashMap;

use super::metadata::MetadataStore;

/// Metadata key holding the vectoriser kind.
pub const TYPE_KEY: &str = "vectoriser.type";
/// Metadata key holding the output width.
pub const WIDTH_KEY: &str = "vectoriser.width";
/// Metadata key holding the label table, in slot order.
pub const LABELS_KEY: &str = "vectoriser.labels";

/// Identifies a vectoriser implementation in persisted metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectoriserKind {
    /// Single numeric slot.
    Numeric,
    /// Single 0/1 slot.
    Boolean,
    /// One slot per label.
    OneHot,
    /// Single slot holding the label ordinal.
    Categorical,
    /// 1.0 at every listed slot.
    IndexList,
    /// Weight at every listed slot.
    WeightedIndexList,
    /// Dense copy.
    Tensor,
}

impl VectoriserKind {
    /// Returns the persisted name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::OneHot => "one_hot",
            Self::Categorical => "categorical",
            Self::IndexList => "index_list",
            Self::WeightedIndexList => "weighted_index_list",
            Self::Tensor => "tensor",
        }
    }
}

impl fmt::Display for VectoriserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps one value to a fixed-width `f32` row.
///
/// The width is fixed at construction. `out` is always exactly
/// [`output_width`](Self::output_width) long and zeroed.
pub trait Vectoriser<T>: Send {
    /// Returns the implementation kind.
    fn kind(&self) -> VectoriserKind;

    /// Returns the row width.
    fn output_width(&self) -> usize;

    /// Writes the row for `value` into `out`.
    fn vectorise(&mut self, value: &T, out: &mut [f32]) -> Result<()>;

    /// Persists kind and width for `column`.
    fn save(&self, store: &dyn MetadataStore, column: &str) -> Result<()> {
        save_header(store, column, self.kind(), self.output_width())
    }
}

/// Writes kind and width for `column`.
pub fn save_header(
    store: &dyn MetadataStore,
    column: &str,
    kind: VectoriserKind,
    width: usize,
) -> Result<()> {
    store.set(column, TYPE_KEY, json!(kind.name()))?;
    store.set(column, WIDTH_KEY, json!(width))
}

/// Checks that `column` has a vectoriser of `kind` and `width` on record.
pub fn check_header(
    store: &dyn MetadataStore,
    column: &str,
    kind: VectoriserKind,
    width: usize,
) -> Result<()> {
    let stored_kind = store.get(column, TYPE_KEY)?;
    match stored_kind.as_ref().and_then(|v| v.as_str()) {
        Some(name) if name == kind.name() => {}
        Some(name) => {
            return Err(Error::Metadata(format!(
                "column {column} has a {name} vectoriser on record, not {kind}"
            )));
        }
        None => {
            return Err(Error::Metadata(format!(
                "column {column} has no vectoriser on record"
            )));
        }
    }

    let stored_width = store.get(column, WIDTH_KEY)?.and_then(|v| v.as_u64());
    if stored_width != Some(width as u64) {
        return Err(Error::Metadata(format!(
            "column {column} has width {stored_width:?} on record, expected {width}"
        )));
    }
    Ok(())
}

fn check_out(out: &[f32], width: usize) -> Result<()> {
    if out.len() != width {
        return Err(CapacityError::WidthMismatch {
            expected: width,
            found: out.len(),
        }
        .into());
    }
    Ok(())
}

/// Passes a numeric value through as one slot.
pub struct NumericVectoriser<T> {
    _marker: PhantomData<fn(&T)>,
}

impl<T: NumericElement> NumericVectoriser<T> {
    /// Creates a numeric vectoriser.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// Reloads a numeric vectoriser, checking the record for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str) -> Result<Self> {
        check_header(store, column, VectoriserKind::Numeric, 1)?;
        Ok(Self::new())
    }
}

impl<T: NumericElement> Default for NumericVectoriser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: NumericElement> Vectoriser<T> for NumericVectoriser<T> {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::Numeric
    }

    fn output_width(&self) -> usize {
        1
    }

    fn vectorise(&mut self, value: &T, out: &mut [f32]) -> Result<()> {
        check_out(out, 1)?;
        out[0] = value.to_f64() as f32;
        Ok(())
    }
}

/// Maps `true` to 1.0 and `false` to 0.0.
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanVectoriser;

impl BooleanVectoriser {
    /// Reloads a boolean vectoriser, checking the record for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str) -> Result<Self> {
        check_header(store, column, VectoriserKind::Boolean, 1)?;
        Ok(Self)
    }
}

impl Vectoriser<bool> for BooleanVectoriser {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::Boolean
    }

    fn output_width(&self) -> usize {
        1
    }

    fn vectorise(&mut self, value: &bool, out: &mut [f32]) -> Result<()> {
        check_out(out, 1)?;
        out[0] = if *value { 1.0 } else { 0.0 };
        Ok(())
    }
}

/// Label to slot assignments in first-seen order.
#[derive(Clone)]
pub struct LabelDictionary<T: ColumnElement> {
    slots: FxHashMap<T::Key, usize>,
    labels: Vec<T>,
}

impl<T: ColumnElement> Default for LabelDictionary<T> {
    fn default() -> Self {
        Self {
            slots: FxHashMap::default(),
            labels: Vec::new(),
        }
    }
}

impl<T: ColumnElement> fmt::Debug for LabelDictionary<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LabelDictionary")
            .field("labels", &self.labels)
            .finish()
    }
}

impl<T: ColumnElement> LabelDictionary<T> {
    /// Builds a dictionary from labels in slot order.
    pub fn from_labels(labels: Vec<T>) -> Self {
        let slots = labels
            .iter()
            .enumerate()
            .map(|(slot, label)| (label.distinct_key(), slot))
            .collect();
        Self { slots, labels }
    }

    /// Returns the slot of `label`, assigning the next one if it is new.
    ///
    /// Fails with [`CapacityError::LabelOverflow`] if a new label would
    /// need slot `limit` or beyond. The dictionary is unchanged on failure.
    pub fn slot_of(&mut self, label: &T, limit: usize) -> Result<usize> {
        let key = label.distinct_key();
        if let Some(&slot) = self.slots.get(&key) {
            return Ok(slot);
        }
        if self.labels.len() >= limit {
            return Err(CapacityError::LabelOverflow {
                label: format!("{label:?}"),
                width: limit,
            }
            .into());
        }
        let slot = self.labels.len();
        self.slots.insert(key, slot);
        self.labels.push(label.clone());
        Ok(slot)
    }

    /// Returns labels in slot order.
    #[must_use]
    pub fn labels(&self) -> &[T] {
        &self.labels
    }

    /// Returns the number of assigned slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if no label was seen yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<T: ColumnElement + Serialize + DeserializeOwned> LabelDictionary<T> {
    fn save(&self, store: &dyn MetadataStore, column: &str) -> Result<()> {
        let labels =
            serde_json::to_value(&self.labels).map_err(|e| Error::Serialization(e.to_string()))?;
        store.set(column, LABELS_KEY, labels)
    }

    fn load(store: &dyn MetadataStore, column: &str, limit: usize) -> Result<Self> {
        let Some(stored) = store.get(column, LABELS_KEY)? else {
            return Ok(Self::default());
        };
        let labels: Vec<T> = serde_json::from_value(stored)
            .map_err(|e| Error::Metadata(format!("column {column} labels: {e}")))?;
        if labels.len() > limit {
            return Err(Error::Metadata(format!(
                "column {column} has {} labels on record, limit is {limit}",
                labels.len()
            )));
        }
        Ok(Self::from_labels(labels))
    }
}

/// One slot per label, 1.0 at the label's slot.
///
/// Labels get slots in first-seen order. A label that would need a slot
/// beyond the declared width fails; earlier labels are unaffected.
#[derive(Debug, Clone)]
pub struct OneHotVectoriser<T: ColumnElement> {
    width: usize,
    dictionary: LabelDictionary<T>,
}

impl<T: ColumnElement + Serialize + DeserializeOwned> OneHotVectoriser<T> {
    /// Creates a one-hot vectoriser for at most `width` labels.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self {
            width,
            dictionary: LabelDictionary::default(),
        }
    }

    /// Reloads the label table for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str, width: usize) -> Result<Self> {
        check_header(store, column, VectoriserKind::OneHot, width)?;
        Ok(Self {
            width,
            dictionary: LabelDictionary::load(store, column, width)?,
        })
    }

    /// Returns labels in slot order.
    #[must_use]
    pub fn labels(&self) -> &[T] {
        self.dictionary.labels()
    }
}

impl<T: ColumnElement + Serialize + DeserializeOwned> Vectoriser<T> for OneHotVectoriser<T> {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::OneHot
    }

    fn output_width(&self) -> usize {
        self.width
    }

    fn vectorise(&mut self, value: &T, out: &mut [f32]) -> Result<()> {
        check_out(out, self.width)?;
        let slot = self.dictionary.slot_of(value, self.width)?;
        out.fill(0.0);
        out[slot] = 1.0;
        Ok(())
    }

    fn save(&self, store: &dyn MetadataStore, column: &str) -> Result<()> {
        save_header(store, column, self.kind(), self.width)?;
        self.dictionary.save(store, column)
    }
}

/// One slot holding the label's first-seen ordinal.
#[derive(Debug, Clone)]
pub struct CategoricalVectoriser<T: ColumnElement> {
    max_categories: Option<usize>,
    dictionary: LabelDictionary<T>,
}

impl<T: ColumnElement + Serialize + DeserializeOwned> CategoricalVectoriser<T> {
    /// Creates a vectoriser with an unbounded category count.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_categories: None,
            dictionary: LabelDictionary::default(),
        }
    }

    /// Creates a vectoriser that fails past `max` categories.
    #[must_use]
    pub fn with_max_categories(max: usize) -> Self {
        Self {
            max_categories: Some(max),
            dictionary: LabelDictionary::default(),
        }
    }

    /// Reloads the category table for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str, max: Option<usize>) -> Result<Self> {
        check_header(store, column, VectoriserKind::Categorical, 1)?;
        Ok(Self {
            max_categories: max,
            dictionary: LabelDictionary::load(store, column, max.unwrap_or(usize::MAX))?,
        })
    }

    /// Returns categories in ordinal order.
    #[must_use]
    pub fn categories(&self) -> &[T] {
        self.dictionary.labels()
    }
}

impl<T: ColumnElement + Serialize + DeserializeOwned> Default for CategoricalVectoriser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ColumnElement + Serialize + DeserializeOwned> Vectoriser<T> for CategoricalVectoriser<T> {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::Categorical
    }

    fn output_width(&self) -> usize {
        1
    }

    fn vectorise(&mut self, value: &T, out: &mut [f32]) -> Result<()> {
        check_out(out, 1)?;
        let limit = self.max_categories.unwrap_or(usize::MAX);
        out[0] = self.dictionary.slot_of(value, limit)? as f32;
        Ok(())
    }

    fn save(&self, store: &dyn MetadataStore, column: &str) -> Result<()> {
        save_header(store, column, self.kind(), 1)?;
        self.dictionary.save(store, column)
    }
}

fn slot(index: u32, width: usize) -> Result<usize> {
    let slot = index as usize;
    if slot >= width {
        return Err(CapacityError::SlotOutOfRange { slot, width }.into());
    }
    Ok(slot)
}

/// 1.0 at every listed slot.
#[derive(Debug, Clone, Copy)]
pub struct IndexListVectoriser {
    width: usize,
}

impl IndexListVectoriser {
    /// Creates a vectoriser with `width` slots.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Reloads a vectoriser, checking the record for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str, width: usize) -> Result<Self> {
        check_header(store, column, VectoriserKind::IndexList, width)?;
        Ok(Self::new(width))
    }
}

impl Vectoriser<IndexList> for IndexListVectoriser {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::IndexList
    }

    fn output_width(&self) -> usize {
        self.width
    }

    fn vectorise(&mut self, value: &IndexList, out: &mut [f32]) -> Result<()> {
        check_out(out, self.width)?;
        for &index in &value.indices {
            out[slot(index, self.width)?] = 1.0;
        }
        Ok(())
    }
}

/// Weight at every listed slot.
#[derive(Debug, Clone, Copy)]
pub struct WeightedIndexListVectoriser {
    width: usize,
}

impl WeightedIndexListVectoriser {
    /// Creates a vectoriser with `width` slots.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Reloads a vectoriser, checking the record for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str, width: usize) -> Result<Self> {
        check_header(store, column, VectoriserKind::WeightedIndexList, width)?;
        Ok(Self::new(width))
    }
}

impl Vectoriser<WeightedIndexList> for WeightedIndexListVectoriser {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::WeightedIndexList
    }

    fn output_width(&self) -> usize {
        self.width
    }

    fn vectorise(&mut self, value: &WeightedIndexList, out: &mut [f32]) -> Result<()> {
        check_out(out, self.width)?;
        for &(index, weight) in &value.entries {
            out[slot(index, self.width)?] = weight;
        }
        Ok(())
    }
}

/// Copies an already-dense row.
#[derive(Debug, Clone, Copy)]
pub struct TensorVectoriser {
    width: usize,
}

impl TensorVectoriser {
    /// Creates a vectoriser for rows of exactly `width` values.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Reloads a vectoriser, checking the record for `column`.
    pub fn load(store: &dyn MetadataStore, column: &str, width: usize) -> Result<Self> {
        check_header(store, column, VectoriserKind::Tensor, width)?;
        Ok(Self::new(width))
    }
}

impl Vectoriser<DenseTensor> for TensorVectoriser {
    fn kind(&self) -> VectoriserKind {
        VectoriserKind::Tensor
    }

    fn output_width(&self) -> usize {
        self.width
    }

    fn vectorise(&mut self, value: &DenseTensor, out: &mut [f32]) -> Result<()> {
        check_out(out, self.width)?;
        if value.values.len() != self.width {
            return Err(CapacityError::WidthMismatch {
                expected: self.width,
                found: value.values.len(),
            }
            .into());
        }
        out.copy_from_slice(&value.values);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vectorise::metadata::MemoryMetadataStore;

    fn row<T, V: Vectoriser<T>>(v: &mut V, value: &T) -> Result<Vec<f32>> {
        let mut out = vec![0.0; v.output_width()];
        v.vectorise(value, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_one_hot_width_two_overflows_on_third_label() {
        let mut v = OneHotVectoriser::<String>::new(2);
        assert_eq!(row(&mut v, &"x".to_string()).unwrap(), vec![1.0, 0.0]);
        assert_eq!(row(&mut v, &"y".to_string()).unwrap(), vec![0.0, 1.0]);
        assert_eq!(row(&mut v, &"x".to_string()).unwrap(), vec![1.0, 0.0]);

        let err = row(&mut v, &"z".to_string()).unwrap_err();
        assert!(matches!(
            err,
            Error::Capacity(CapacityError::LabelOverflow { width: 2, .. })
        ));
        // Known labels still work after the failure.
        assert_eq!(row(&mut v, &"y".to_string()).unwrap(), vec![0.0, 1.0]);
        assert_eq!(v.labels(), ["x", "y"]);
    }

    #[test]
    fn test_numeric_and_boolean() {
        let mut numeric = NumericVectoriser::<i64>::new();
        assert_eq!(row(&mut numeric, &-3).unwrap(), vec![-3.0]);
        let mut boolean = BooleanVectoriser;
        assert_eq!(row(&mut boolean, &true).unwrap(), vec![1.0]);
        assert_eq!(row(&mut boolean, &false).unwrap(), vec![0.0]);
    }

    #[test]
    fn test_categorical_ordinals() {
        let mut v = CategoricalVectoriser::<String>::with_max_categories(2);
        assert_eq!(row(&mut v, &"b".to_string()).unwrap(), vec![0.0]);
        assert_eq!(row(&mut v, &"a".to_string()).unwrap(), vec![1.0]);
        assert_eq!(row(&mut v, &"b".to_string()).unwrap(), vec![0.0]);
        assert!(row(&mut v, &"c".to_string()).is_err());
    }

    #[test]
    fn test_index_lists() {
        let mut v = IndexListVectoriser::new(4);
        assert_eq!(
            row(&mut v, &IndexList::new(vec![0, 3])).unwrap(),
            vec![1.0, 0.0, 0.0, 1.0]
        );
        assert!(matches!(
            row(&mut v, &IndexList::new(vec![4])).unwrap_err(),
            Error::Capacity(CapacityError::SlotOutOfRange { slot: 4, width: 4 })
        ));

        let mut w = WeightedIndexListVectoriser::new(3);
        assert_eq!(
            row(&mut w, &WeightedIndexList::new(vec![(1, 0.5), (2, 2.0)])).unwrap(),
            vec![0.0, 0.5, 2.0]
        );
    }

    #[test]
    fn test_tensor_width_checked() {
        let mut v = TensorVectoriser::new(2);
        assert_eq!(row(&mut v, &DenseTensor::new(vec![1.5, 2.5])).unwrap(), vec![1.5, 2.5]);
        assert!(row(&mut v, &DenseTensor::new(vec![1.0])).is_err());
    }

    #[test]
    fn test_wrong_output_slice_rejected() {
        let mut v = NumericVectoriser::<f64>::new();
        let mut out = [0.0; 2];
        assert!(v.vectorise(&1.0, &mut out).is_err());
    }

    #[test]
    fn test_one_hot_save_and_load() {
        let store = MemoryMetadataStore::new();
        let mut v = OneHotVectoriser::<String>::new(3);
        row(&mut v, &"red".to_string()).unwrap();
        row(&mut v, &"green".to_string()).unwrap();
        v.save(&store, "colour").unwrap();

        let mut reloaded = OneHotVectoriser::<String>::load(&store, "colour", 3).unwrap();
        assert_eq!(reloaded.labels(), ["red", "green"]);
        assert_eq!(
            row(&mut reloaded, &"green".to_string()).unwrap(),
            vec![0.0, 1.0, 0.0]
        );
    }

    #[test]
    fn test_load_mismatch_fails_fast() {
        let store = MemoryMetadataStore::new();
        OneHotVectoriser::<String>::new(3).save(&store, "colour").unwrap();

        assert!(matches!(
            OneHotVectoriser::<String>::load(&store, "colour", 4),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            CategoricalVectoriser::<String>::load(&store, "colour", None),
            Err(Error::Metadata(_))
        ));
        assert!(matches!(
            NumericVectoriser::<f32>::load(&store, "missing"),
            Err(Error::Metadata(_))
        ));
    }
}
