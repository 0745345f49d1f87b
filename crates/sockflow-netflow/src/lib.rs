//! # sockflow-netflow
//!
//! NetFlow v9 (RFC 3954) export of tracked connection relationships.
//!
//! - **Template**: the field-type table and the fixed flow template.
//! - **Report**: header, flow records, `meta` sidecars, and statistics.
//! - **Encoder**: turns cache records into a [`report::FlowExportReport`].
//! - **Document**: the YAML shape persisted for downstream consumers.
//! - **Decoder**: rebuilds connection records from a document.
//! - **Wire**: binary RFC 3954 packets.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod decoder;
pub mod document;
pub mod encoder;
pub mod report;
pub mod template;
pub mod timestamp;
pub mod wire;
