//! Typed views over reflection records
//!
//! Views are `(schema, address)` pairs. They hold no data of their own:
//! every accessor reads target memory at the discovered offset, so an
//! offset that was never discovered simply yields `None`.

mod ffield;
mod lookup;
mod object;
mod property;
mod structs;

pub use ffield::{FFieldClassView, FFieldView, FieldOwner};
pub use lookup::ObjectLookup;
pub use object::{EntityKind, ObjectView};
pub use property::{BoolInfo, PropertyKind, PropertyView};
pub use structs::{ClassView, EnumView, FunctionView, StructView};

/// Upper bound on any linked-list or outer-chain walk
pub(crate) const MAX_CHAIN: usize = 0x4000;

/// Anything that lives at an address in the target
pub trait Address {
    fn address(&self) -> usize;
}
