//! Table descriptors, record metadata and DML generation.

pub mod dates;
mod descriptor;
mod dml;
mod record;
mod registry;
mod value_map;

pub use descriptor::TableDescriptor;
pub use dml::{DmlProvider, MetadataDmlProvider, ParametrizedSql};
pub use record::{FieldMeta, Record};
pub use registry::DescriptorRegistry;
pub use value_map::ValueMap;
