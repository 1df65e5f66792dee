//! Reconciliation of raw XML or JSON documents.
//!
//! A document may hold any number of top-level elements (a get-config
//! `data` section usually does). An empty or whitespace-only document is
//! the empty configuration.

use log::{Level, debug, log_enabled};

use super::{Mode, diff_paths, satisfied_by};
use crate::error::ParseError;
use crate::tree::{ConfigTree, DecodeOptions, forest, from_json, from_xml_fragment};

/// Decode an XML document into its root trees.
pub fn parse_xml(xml: &str, options: &DecodeOptions) -> Result<Vec<ConfigTree>, ParseError> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    from_xml_fragment(xml, options)
}

/// Decode a JSON document into its root trees.
pub fn parse_json(json: &str, options: &DecodeOptions) -> Result<Vec<ConfigTree>, ParseError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    from_json(json, options)
}

fn in_sync(mode: Mode, target: &[ConfigTree], current: &[ConfigTree]) -> bool {
    let (target, current) = (forest(target), forest(current));
    let in_sync = satisfied_by(mode, &target, &current);
    if !in_sync && log_enabled!(Level::Debug) {
        debug!(
            "{} not in sync at {:?}",
            mode,
            diff_paths(mode, &target, &current)
        );
    }
    in_sync
}

pub fn in_sync_for_merge(target: &str, current: &str) -> Result<bool, ParseError> {
    in_sync_xml(Mode::Merge, target, current, &DecodeOptions::default())
}

pub fn in_sync_for_replace(target: &str, current: &str) -> Result<bool, ParseError> {
    in_sync_xml(Mode::Replace, target, current, &DecodeOptions::default())
}

/// Compare two XML documents with explicit decode options.
pub fn in_sync_xml(
    mode: Mode,
    target: &str,
    current: &str,
    options: &DecodeOptions,
) -> Result<bool, ParseError> {
    let target = parse_xml(target, options)?;
    let current = parse_xml(current, options)?;
    Ok(in_sync(mode, &target, &current))
}

pub fn json_in_sync_for_merge(target: &str, current: &str) -> Result<bool, ParseError> {
    in_sync_json(Mode::Merge, target, current, &DecodeOptions::default())
}

pub fn json_in_sync_for_replace(target: &str, current: &str) -> Result<bool, ParseError> {
    in_sync_json(Mode::Replace, target, current, &DecodeOptions::default())
}

/// Compare two JSON documents with explicit decode options.
pub fn in_sync_json(
    mode: Mode,
    target: &str,
    current: &str,
    options: &DecodeOptions,
) -> Result<bool, ParseError> {
    let target = parse_json(target, options)?;
    let current = parse_json(current, options)?;
    Ok(in_sync(mode, &target, &current))
}
