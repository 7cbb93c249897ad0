pub mod codec;
pub mod schema;
pub mod value;

pub use codec::Tuple;
pub use schema::{Column, Schema};
pub use value::{TypeId, Value};
