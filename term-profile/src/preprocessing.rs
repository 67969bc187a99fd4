//! Classification of raw input batches into typed lanes.
//!
//! A batch is either a slice of [`Value`]s or an arrow array. Classification partitions it
//! into disjoint lanes (null, boolean, integral, fractional, string, tensor, object) that
//! metrics consume in bulk. The order of checks is fixed:
//!
//! 1. null markers and `NaN` are null
//! 2. booleans are boolean, never integral
//! 3. integers are integral, other finite or infinite floats fractional
//! 4. strings are strings
//! 5. rectangular numeric arrays are tensors (objects when tensor tracking is off)
//! 6. everything else is an object
//!
//! Classification is a pure function of the batch and the [`MetricConfig`]; there is no
//! state carried between calls.

use std::fmt;

use arrow::array::{
    Array, ArrayRef, ArrowPrimitiveType, BooleanArray, FixedSizeListArray, Float64Array,
    LargeListArray, LargeStringArray, ListArray, PrimitiveArray, StringArray, StringViewArray,
};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};

use crate::config::MetricConfig;

/// A single input cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing value marker.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// An array-like value. Becomes a tensor when it is a rectangular numeric array.
    List(Vec<Value>),
    /// Any other value, identified by a type label.
    Object(String),
}

impl Value {
    fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                // u64 beyond i64::MAX and all non-integers
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(_) => Value::Object("json_object".to_string()),
        }
    }
}

/// A dense numeric array with its shape, flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    values: Vec<f64>,
}

impl Tensor {
    /// Builds a tensor from a nested list, or `None` when the list is empty,
    /// ragged, or contains anything other than numbers.
    pub fn from_values(items: &[Value]) -> Option<Self> {
        if items.is_empty() {
            return None;
        }

        if items.iter().all(|v| v.as_number().is_some()) {
            return Some(Tensor {
                shape: vec![items.len()],
                values: items.iter().filter_map(Value::as_number).collect(),
            });
        }

        let mut inner_shape: Option<Vec<usize>> = None;
        let mut values = Vec::new();
        for item in items {
            let Value::List(children) = item else {
                return None;
            };
            let child = Tensor::from_values(children)?;
            match &inner_shape {
                Some(shape) if *shape != child.shape => return None,
                Some(_) => {}
                None => inner_shape = Some(child.shape.clone()),
            }
            values.extend(child.values);
        }

        let mut shape = vec![items.len()];
        shape.extend(inner_shape.unwrap_or_default());
        Some(Tensor { shape, values })
    }

    /// Builds a one-dimensional tensor from a numeric arrow array.
    fn from_arrow(values: &ArrayRef) -> Option<Self> {
        if values.is_empty() || values.null_count() > 0 || !values.data_type().is_numeric() {
            return None;
        }
        let cast = arrow::compute::cast(values, &DataType::Float64).ok()?;
        let floats = cast.as_any().downcast_ref::<Float64Array>()?;
        Some(Tensor {
            shape: vec![floats.len()],
            values: floats.values().to_vec(),
        })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Lane a single value was assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Null,
    Boolean,
    Integral,
    Fractional,
    String,
    Tensor,
    Object,
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lane::Null => "null",
            Lane::Boolean => "boolean",
            Lane::Integral => "integral",
            Lane::Fractional => "fractional",
            Lane::String => "string",
            Lane::Tensor => "tensor",
            Lane::Object => "object",
        };
        f.write_str(name)
    }
}

/// A value after classification, carrying what its lane stores.
enum Classified<'v> {
    Null,
    Boolean(bool),
    Integral(i64),
    Fractional(f64),
    String(&'v str),
    Tensor(Tensor),
    Object,
}

impl Classified<'_> {
    fn lane(&self) -> Lane {
        match self {
            Classified::Null => Lane::Null,
            Classified::Boolean(_) => Lane::Boolean,
            Classified::Integral(_) => Lane::Integral,
            Classified::Fractional(_) => Lane::Fractional,
            Classified::String(_) => Lane::String,
            Classified::Tensor(_) => Lane::Tensor,
            Classified::Object => Lane::Object,
        }
    }
}

/// Lane rules shared by [`classify`] and the batch path.
fn classify_value<'v>(value: &'v Value, config: &MetricConfig) -> Classified<'v> {
    match value {
        Value::Null => Classified::Null,
        Value::Float(v) if v.is_nan() => Classified::Null,
        Value::Bool(b) => Classified::Boolean(*b),
        Value::Int(i) => Classified::Integral(*i),
        Value::Float(f) => Classified::Fractional(*f),
        Value::Str(s) => Classified::String(s.as_str()),
        Value::List(items) if config.track_tensors => match Tensor::from_values(items) {
            Some(tensor) => Classified::Tensor(tensor),
            None => Classified::Object,
        },
        Value::List(_) | Value::Object(_) => Classified::Object,
    }
}

/// Returns the lane a value belongs to.
pub fn classify(value: &Value, config: &MetricConfig) -> Lane {
    classify_value(value, config).lane()
}

/// One batch partitioned into typed lanes.
///
/// Borrowed string lanes tie the column to the batch it was built from; it only lives for
/// the duration of the update calls that consume it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreprocessedColumn<'a> {
    len: usize,
    null_positions: Vec<usize>,
    bools: Vec<bool>,
    ints: Vec<i64>,
    floats: Vec<f64>,
    strings: Vec<&'a str>,
    tensors: Vec<Tensor>,
    objects: usize,
    failures: usize,
}

impl<'a> PreprocessedColumn<'a> {
    /// Classifies a batch of values with the default configuration.
    pub fn apply(values: &'a [Value]) -> Self {
        Self::apply_with(values, &MetricConfig::default())
    }

    /// Classifies a batch of values.
    pub fn apply_with(values: &'a [Value], config: &MetricConfig) -> Self {
        let mut column = PreprocessedColumn {
            len: values.len(),
            ..Default::default()
        };

        for (position, value) in values.iter().enumerate() {
            match classify_value(value, config) {
                Classified::Null => column.null_positions.push(position),
                Classified::Boolean(b) => column.bools.push(b),
                Classified::Integral(i) => column.ints.push(i),
                Classified::Fractional(f) => column.floats.push(f),
                Classified::String(s) => column.strings.push(s),
                Classified::Tensor(tensor) => column.tensors.push(tensor),
                Classified::Object => column.objects += 1,
            }
        }

        column
    }

    /// Classifies a single value as a batch of one.
    pub fn process_scalar_value(value: &'a Value) -> Self {
        Self::apply(std::slice::from_ref(value))
    }

    /// Classifies an arrow array with the default configuration.
    pub fn from_arrow(array: &'a dyn Array) -> Self {
        Self::from_arrow_with(array, &MetricConfig::default())
    }

    /// Classifies an arrow array.
    ///
    /// Unsigned 64-bit values above `i64::MAX` cannot be represented in the integral lane and
    /// are counted as failures. Types without a scalar lane (dates, structs, binary, ...) are
    /// objects.
    pub fn from_arrow_with(array: &'a dyn Array, config: &MetricConfig) -> Self {
        let mut column = PreprocessedColumn {
            len: array.len(),
            ..Default::default()
        };

        match array.data_type() {
            DataType::Null => column.null_positions.extend(0..array.len()),
            DataType::Boolean => {
                if let Some(a) = array.as_any().downcast_ref::<BooleanArray>() {
                    for (position, v) in a.iter().enumerate() {
                        match v {
                            Some(b) => column.bools.push(b),
                            None => column.null_positions.push(position),
                        }
                    }
                }
            }
            DataType::Int8 => column.push_integers::<Int8Type>(array),
            DataType::Int16 => column.push_integers::<Int16Type>(array),
            DataType::Int32 => column.push_integers::<Int32Type>(array),
            DataType::Int64 => column.push_integers::<Int64Type>(array),
            DataType::UInt8 => column.push_integers::<UInt8Type>(array),
            DataType::UInt16 => column.push_integers::<UInt16Type>(array),
            DataType::UInt32 => column.push_integers::<UInt32Type>(array),
            DataType::UInt64 => column.push_integers::<UInt64Type>(array),
            DataType::Float32 => column.push_floats::<Float32Type>(array),
            DataType::Float64 => column.push_floats::<Float64Type>(array),
            DataType::Utf8 => {
                if let Some(a) = array.as_any().downcast_ref::<StringArray>() {
                    column.push_strings(a.iter());
                }
            }
            DataType::LargeUtf8 => {
                if let Some(a) = array.as_any().downcast_ref::<LargeStringArray>() {
                    column.push_strings(a.iter());
                }
            }
            DataType::Utf8View => {
                if let Some(a) = array.as_any().downcast_ref::<StringViewArray>() {
                    column.push_strings(a.iter());
                }
            }
            DataType::List(_) => {
                if let Some(a) = array.as_any().downcast_ref::<ListArray>() {
                    column.push_lists(a.iter(), config);
                }
            }
            DataType::LargeList(_) => {
                if let Some(a) = array.as_any().downcast_ref::<LargeListArray>() {
                    column.push_lists(a.iter(), config);
                }
            }
            DataType::FixedSizeList(_, _) => {
                if let Some(a) = array.as_any().downcast_ref::<FixedSizeListArray>() {
                    column.push_lists(a.iter(), config);
                }
            }
            _ => {
                for position in 0..array.len() {
                    if array.is_null(position) {
                        column.null_positions.push(position);
                    } else {
                        column.objects += 1;
                    }
                }
            }
        }

        column
    }

    fn push_integers<T>(&mut self, array: &dyn Array)
    where
        T: ArrowPrimitiveType,
        T::Native: TryInto<i64>,
    {
        let Some(a) = array.as_any().downcast_ref::<PrimitiveArray<T>>() else {
            return;
        };
        for (position, v) in a.iter().enumerate() {
            match v {
                None => self.null_positions.push(position),
                Some(v) => match v.try_into() {
                    Ok(i) => self.ints.push(i),
                    Err(_) => self.failures += 1,
                },
            }
        }
    }

    fn push_floats<T>(&mut self, array: &dyn Array)
    where
        T: ArrowPrimitiveType,
        T::Native: Into<f64>,
    {
        let Some(a) = array.as_any().downcast_ref::<PrimitiveArray<T>>() else {
            return;
        };
        for (position, v) in a.iter().enumerate() {
            match v.map(Into::into) {
                Some(f) if !f.is_nan() => self.floats.push(f),
                _ => self.null_positions.push(position),
            }
        }
    }

    fn push_strings(&mut self, values: impl Iterator<Item = Option<&'a str>>) {
        for (position, v) in values.enumerate() {
            match v {
                Some(s) => self.strings.push(s),
                None => self.null_positions.push(position),
            }
        }
    }

    fn push_lists(&mut self, rows: impl Iterator<Item = Option<ArrayRef>>, config: &MetricConfig) {
        for (position, row) in rows.enumerate() {
            match row {
                None => self.null_positions.push(position),
                Some(values) => match Tensor::from_arrow(&values).filter(|_| config.track_tensors) {
                    Some(tensor) => self.tensors.push(tensor),
                    None => self.objects += 1,
                },
            }
        }
    }

    /// Number of values in the batch, nulls and failures included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Batch positions that were classified as null.
    pub fn null_positions(&self) -> &[usize] {
        &self.null_positions
    }

    pub fn null_count(&self) -> usize {
        self.null_positions.len()
    }

    pub fn bools(&self) -> &[bool] {
        &self.bools
    }

    pub fn ints(&self) -> &[i64] {
        &self.ints
    }

    pub fn floats(&self) -> &[f64] {
        &self.floats
    }

    pub fn strings(&self) -> &[&'a str] {
        &self.strings
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    pub fn object_count(&self) -> usize {
        self.objects
    }

    /// Values that could not be placed in any lane.
    pub fn failures(&self) -> usize {
        self.failures
    }

    /// Integral and fractional values as one numeric stream, integers first.
    pub fn numbers(&self) -> impl Iterator<Item = f64> + '_ {
        self.ints
            .iter()
            .map(|v| *v as f64)
            .chain(self.floats.iter().copied())
    }

    /// Number of values that landed in a non-null lane.
    pub fn classified_count(&self) -> usize {
        self.bools.len()
            + self.ints.len()
            + self.floats.len()
            + self.strings.len()
            + self.tensors.len()
            + self.objects
    }
}
