//! openEHR Reference Model (RM) 1.1.0 wire support.
//!
//! YAML forms of instance trees and archetypes. Reading is strict: a field that does not match
//! its wire form is reported with the path of the field.

pub mod archetype;
pub mod instance;
