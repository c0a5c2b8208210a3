//! geoquery-geo - Geometry parsing, CRS handling and validation
//!
//! Reads GML 3.2/2.x, GeoJSON, Esri JSON and WKT into the canonical
//! [`Geometry`](geoquery_core::models::Geometry), checks it against the
//! request's vertex budget and topology rules, and repairs what lenient mode
//! allows.

pub mod crs;
pub mod esri;
pub mod gml;
pub mod json;
pub mod models;
pub mod parser;
pub mod text;
pub mod validation;
pub mod xml;

pub use models::GeometryExt;
pub use parser::{GeometryParser, ParsedGeometry, MAX_XML_DEPTH};
pub use validation::{ValidationResult, ViolationKind};
pub use xml::XmlElement;
