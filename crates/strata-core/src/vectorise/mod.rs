//! Mapping column values to fixed-width numeric rows.
//!
//! | Strategy              | Input               | Width     |
//! |-----------------------|---------------------|-----------|
//! | `NumericVectoriser`   | any numeric element | 1         |
//! | `BooleanVectoriser`   | `bool`              | 1         |
//! | `OneHotVectoriser`    | any label           | declared  |
//! | `CategoricalVectoriser` | any label         | 1         |
//! | `IndexListVectoriser` | `IndexList`         | declared  |
//! | `WeightedIndexListVectoriser` | `WeightedIndexList` | declared |
//! | `TensorVectoriser`    | `DenseTensor`       | declared  |
//!
//! Label-based strategies persist their label table through a
//! [`MetadataStore`] so slot assignments survive restarts.

pub mod metadata;
pub mod strategies;

pub use metadata::{JsonMetadataStore, MemoryMetadataStore, MetadataStore};
pub use strategies::{
    BooleanVectoriser, CategoricalVectoriser, IndexListVectoriser, LABELS_KEY, LabelDictionary,
    NumericVectoriser, OneHotVectoriser, TYPE_KEY, TensorVectoriser, Vectoriser, VectoriserKind,
    WIDTH_KEY, WeightedIndexListVectoriser, check_header, save_header,
};
