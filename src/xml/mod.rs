//! XML toolkit (C2): a streaming builder for composing EBICS/ISO 20022
//! documents, a fail-closed destructuring walker for reading them back, and
//! the EBICS authentication-signature canonicalization subset.

pub mod builder;
pub mod canonical;
pub mod shape;

pub use builder::{el, to_xml_string, ElementBuilder};
pub use canonical::{blank_auth_signature_value, extract_auth_signature_value};
pub use shape::{Element, XmlError};
