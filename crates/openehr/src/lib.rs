//! openEHR reference model, path, constraint and assertion core.
//!
//! The crate holds instance trees of locatables in an arena ([`rm::RmTree`]), addresses their
//! nodes with openEHR paths ([`path`]), validates them against archetype constraints ([`am`])
//! and evaluates assertions over them ([`assertion`]). The [`rm_1_1_0`] module reads and
//! writes both instance trees and archetypes as YAML.
//!
//! ```
//! use openehr::rm::{Locatable, RmAttribute, RmTree, RmType};
//!
//! let mut tree = RmTree::new();
//! let composition = tree.insert(Locatable::new(
//!     RmType::Composition,
//!     "openEHR-EHR-COMPOSITION.encounter.v1",
//!     "Encounter",
//! )?);
//! let section = tree.insert(Locatable::new(RmType::Section, "at0001", "Vitals")?);
//! tree.attach(composition, RmAttribute::Content, section)?;
//!
//! let path = tree.path_of(composition, section)?;
//! assert_eq!(path, "/content[at0001 and name/value='Vitals']");
//! assert_eq!(tree.item_at_path(composition, &path)?.as_node(), Some(section));
//! # Ok::<(), openehr::OpenEhrError>(())
//! ```

pub mod am;
pub mod assertion;
pub mod config;
pub mod data_types;
pub mod error;
pub mod factory;
pub mod path;
pub mod rm;
pub mod rm_1_1_0;

pub use config::{CoreConfig, RmVersion};
pub use error::{OpenEhrError, OpenEhrResult};

use am::Archetype;
use rm::{NodeHandle, RmTree};

/// Read an RM 1.1.0 instance tree from YAML.
pub fn read_instance_yaml(yaml: &str) -> OpenEhrResult<(RmTree, NodeHandle)> {
    rm_1_1_0::instance::read_yaml(yaml)
}

/// Write the subtree rooted at `node` as RM 1.1.0 YAML.
pub fn write_instance_yaml(tree: &RmTree, node: NodeHandle) -> OpenEhrResult<String> {
    rm_1_1_0::instance::write_yaml(tree, node)
}

/// Read an archetype from YAML.
pub fn read_archetype_yaml(yaml: &str) -> OpenEhrResult<Archetype> {
    rm_1_1_0::archetype::read_yaml(yaml)
}

/// Write an archetype to YAML.
pub fn write_archetype_yaml(archetype: &Archetype) -> OpenEhrResult<String> {
    rm_1_1_0::archetype::write_yaml(archetype)
}
