//! Protobuf messages of the profile file format.
//!
//! Maps are ordered (`btree_map`) so that encoding a message is deterministic: writing the
//! same view twice yields identical bytes.

use std::collections::BTreeMap;

/// A single serialized metric component.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MetricComponentMessage {
    #[prost(uint32, tag = "1")]
    pub type_id: u32,
    #[prost(oneof = "metric_component_message::Value", tags = "2, 3, 6")]
    pub value: ::core::option::Option<metric_component_message::Value>,
}

pub mod metric_component_message {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Value {
        #[prost(int64, tag = "2")]
        N(i64),
        #[prost(double, tag = "3")]
        D(f64),
        #[prost(message, tag = "6")]
        Kll(super::KllSketchMessage),
    }
}

/// Serialized KLL sketch.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KllSketchMessage {
    #[prost(uint32, tag = "1")]
    pub k: u32,
    #[prost(uint64, tag = "2")]
    pub n: u64,
    #[prost(double, tag = "3")]
    pub min: f64,
    #[prost(double, tag = "4")]
    pub max: f64,
    #[prost(message, repeated, tag = "5")]
    pub levels: ::prost::alloc::vec::Vec<KllLevelMessage>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KllLevelMessage {
    #[prost(double, repeated, tag = "1")]
    pub items: ::prost::alloc::vec::Vec<f64>,
}

/// All components of one column keyed by their full `<kind>/<component>` name.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ColumnMessage {
    #[prost(btree_map = "string, message", tag = "1")]
    pub metric_components: BTreeMap<::prost::alloc::string::String, MetricComponentMessage>,
}

/// All components of one column keyed by their index in the header name table.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkMessage {
    #[prost(btree_map = "int32, message", tag = "1")]
    pub metric_components: BTreeMap<i32, MetricComponentMessage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ChunkType {
    Dataset = 0,
    Column = 1,
    Segment = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkHeader {
    #[prost(enumeration = "ChunkType", tag = "1")]
    pub r#type: i32,
    #[prost(uint32, tag = "2")]
    pub length: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ChunkOffsets {
    #[prost(uint64, repeated, tag = "1")]
    pub offsets: ::prost::alloc::vec::Vec<u64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DatasetProperties {
    /// Milliseconds since the Unix epoch, UTC.
    #[prost(uint64, tag = "1")]
    pub dataset_timestamp: u64,
    /// Milliseconds since the Unix epoch, UTC.
    #[prost(uint64, tag = "2")]
    pub creation_timestamp: u64,
    #[prost(btree_map = "string, string", tag = "4")]
    pub metadata: BTreeMap<::prost::alloc::string::String, ::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DatasetProfileHeader {
    #[prost(btree_map = "string, message", tag = "1")]
    pub column_offsets: BTreeMap<::prost::alloc::string::String, ChunkOffsets>,
    #[prost(message, optional, tag = "2")]
    pub properties: ::core::option::Option<DatasetProperties>,
    /// Total byte length of the chunk region that follows the header.
    #[prost(uint64, tag = "3")]
    pub length: u64,
    #[prost(btree_map = "int32, string", tag = "4")]
    pub indexed_names: BTreeMap<i32, ::prost::alloc::string::String>,
}
