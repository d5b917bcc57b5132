pub mod config;
pub mod error;
pub mod field;
pub mod node;
pub mod quam;
pub mod reference;
pub mod resolve;
pub mod schema;
pub mod serialise;
pub mod storage;

pub use error::QuamError;
pub use field::Field;
pub use node::{Key, NodeId, Value};
pub use quam::Quam;
pub use schema::{ClassRegistry, ClassSpec, FieldSpec, FieldType};
pub use storage::JsonSerialiser;
