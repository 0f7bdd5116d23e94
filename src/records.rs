//! Unbinned record datasets
//!
//! A [`RecordSet`] is what the observation readers produce and what the
//! filters transform: named arrays that share a leading record axis, with an
//! optional trailing channel axis described by the reserved
//! [`CHANNEL_COORDINATE`].

use crate::errors::{ObsBinError, Result};
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayD, ArrayView1, Axis};
use std::collections::BTreeMap;

/// Name of the coordinate describing the channel axis of 2-D fields
pub const CHANNEL_COORDINATE: &str = "sensor_channel";

/// Named 1-D or 2-D arrays sharing a leading record axis
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    fields: BTreeMap<String, ArrayD<f64>>,
    channels: Option<Array1<f64>>,
    /// Per-channel values such as `VarMetaData/frequency`
    channel_metadata: BTreeMap<String, Array1<f64>>,
    window_start: Option<DateTime<Utc>>,
    window_end: Option<DateTime<Utc>>,
}

impl RecordSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field.
    ///
    /// # Errors
    ///
    /// Fails for 0-d arrays, or when the record axis length differs from the
    /// fields already present.
    pub fn insert(&mut self, name: impl Into<String>, values: ArrayD<f64>) -> Result<()> {
        let name = name.into();
        if values.ndim() == 0 {
            return Err(ObsBinError::UnsupportedRank {
                field: name,
                ndim: 0,
            });
        }
        let others = self.fields.iter().find(|(k, _)| **k != name);
        if let Some((_, existing)) = others {
            if existing.shape()[0] != values.shape()[0] {
                return Err(ObsBinError::ShapeMismatch {
                    field: name,
                    expected: vec![existing.shape()[0]],
                    found: vec![values.shape()[0]],
                });
            }
        }
        self.fields.insert(name, values);
        Ok(())
    }

    /// Builder form of [`RecordSet::insert`]
    ///
    /// # Errors
    ///
    /// See [`RecordSet::insert`].
    pub fn with_field(mut self, name: impl Into<String>, values: ArrayD<f64>) -> Result<Self> {
        self.insert(name, values)?;
        Ok(self)
    }

    /// Builder form of [`RecordSet::set_channels`]
    #[must_use]
    pub fn with_channels(mut self, channels: Array1<f64>) -> Self {
        self.channels = Some(channels);
        self
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&ArrayD<f64>> {
        self.fields.get(name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut ArrayD<f64>> {
        self.fields.get_mut(name)
    }

    /// Look up a field that must exist
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::MissingField`] when absent.
    pub fn require(&self, name: &str) -> Result<&ArrayD<f64>> {
        self.fields.get(name).ok_or_else(|| ObsBinError::MissingField {
            field: name.to_string(),
        })
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<ArrayD<f64>> {
        self.fields.remove(name)
    }

    /// Move a field to a new name, replacing anything already there
    ///
    /// # Errors
    ///
    /// Returns [`ObsBinError::MissingField`] when `from` is absent.
    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let values = self.fields.remove(from).ok_or_else(|| ObsBinError::MissingField {
            field: from.to_string(),
        })?;
        self.fields.insert(to.to_string(), values);
        Ok(())
    }

    /// Keep only the fields for which `keep` returns true
    pub fn retain_fields(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|name, _| keep(name));
    }

    /// Field names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields in name order
    pub fn fields(&self) -> impl Iterator<Item = (&str, &ArrayD<f64>)> {
        self.fields.iter().map(|(name, values)| (name.as_str(), values))
    }

    /// Number of fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Length of the shared record axis, `None` without fields
    #[must_use]
    pub fn n_records(&self) -> Option<usize> {
        self.fields.values().next().map(|f| f.shape()[0])
    }

    /// Values of the channel coordinate, if any
    #[must_use]
    pub fn channels(&self) -> Option<ArrayView1<'_, f64>> {
        self.channels.as_ref().map(Array1::view)
    }

    pub fn set_channels(&mut self, channels: Array1<f64>) {
        self.channels = Some(channels);
    }

    /// Store values indexed by channel rather than by record
    pub fn insert_channel_metadata(&mut self, name: impl Into<String>, values: Array1<f64>) {
        self.channel_metadata.insert(name.into(), values);
    }

    #[must_use]
    pub fn channel_metadata(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.channel_metadata.get(name).map(Array1::view)
    }

    pub fn channel_metadata_names(&self) -> impl Iterator<Item = &str> {
        self.channel_metadata.keys().map(String::as_str)
    }

    #[must_use]
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_start
    }

    #[must_use]
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        self.window_end
    }

    pub fn set_window(&mut self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) {
        self.window_start = start;
        self.window_end = end;
    }

    /// New record set holding only the records where `keep` is true
    ///
    /// # Errors
    ///
    /// Fails when `keep` does not have one entry per record.
    pub fn select_records(&self, keep: &[bool]) -> Result<Self> {
        if let Some(n) = self.n_records() {
            if n != keep.len() {
                return Err(ObsBinError::ShapeMismatch {
                    field: "record mask".to_string(),
                    expected: vec![n],
                    found: vec![keep.len()],
                });
            }
        }
        let indices: Vec<usize> = keep
            .iter()
            .enumerate()
            .filter_map(|(i, &k)| k.then_some(i))
            .collect();

        let fields = self
            .fields
            .iter()
            .map(|(name, values)| (name.clone(), values.select(Axis(0), &indices)))
            .collect();

        Ok(Self {
            fields,
            channels: self.channels.clone(),
            channel_metadata: self.channel_metadata.clone(),
            window_start: self.window_start,
            window_end: self.window_end,
        })
    }
}
