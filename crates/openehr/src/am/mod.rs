//! Archetype constraint model.
//!
//! An [`Archetype`] owns a tree of constraint objects ([`CObject`]) and attribute constraints
//! ([`CAttribute`]) mirroring the shape of the instances it governs. Validation walks an
//! instance and the definition side by side, collecting every violation in a
//! [`ValidationReport`]; default-value synthesis walks the definition alone and builds a
//! minimal conforming instance.

mod archetype;
mod c_object;
mod default_value;
mod domain;
mod primitive;
mod validate;

pub use archetype::{Archetype, ArchetypeTerm};
pub use c_object::{
    ArchetypeInternalRef, ArchetypeSlot, CAttribute, CAttributeKind, CComplexObject, CObject,
    Cardinality, ConstraintRef,
};
pub use domain::{CCodePhrase, CDomainObject, CDvOrdinal, CDvQuantity, CDvState, CQuantityItem, CState};
pub use primitive::{
    CBoolean, CDate, CDateTime, CDuration, CInteger, CPrimitive, CPrimitiveObject, CReal,
    CString, CTemporal, CTime, PrimitiveFailure,
};
pub use validate::{ValidationContext, ValidationError, ValidationErrorKind, ValidationReport};
