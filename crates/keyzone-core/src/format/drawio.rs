//! Keyboard layout loader for draw.io (mxGraph XML) diagrams.
//!
//! A layout diagram is a set of rectangles drawn in draw.io:
//!
//! ```xml
//! <mxfile>
//!   <diagram>
//!     <mxGraphModel>
//!       <root>
//!         <mxCell id="2" value="FRAME" vertex="1" parent="1">
//!           <mxGeometry x="0" y="0" width="1000" height="300" as="geometry"/>
//!         </mxCell>
//!         <mxCell id="3" value="Q" vertex="1" parent="1">
//!           <mxGeometry x="100" y="15" width="50" height="30" as="geometry"/>
//!         </mxCell>
//!       </root>
//!     </mxGraphModel>
//!   </diagram>
//! </mxfile>
//! ```
//!
//! Every `mxCell` with `vertex="1"` and an `mxGeometry` child is a record. The
//! record labelled `FRAME` is the keyboard outline and only contributes the layout
//! size; every other record with a non-empty label becomes a key, in document order.
//! Cells wrapped in `<object label="...">` (draw.io's form for cells with custom
//! properties) take their label from the wrapper.
//!
//! Compressed diagram payloads (base64 + deflate) are not supported; save the
//! diagram uncompressed.

use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::layout::{Key, KeyboardLayout, LayoutError};

/// Label of the record that describes the keyboard outline.
pub const FRAME_LABEL: &str = "FRAME";

/// Errors produced while reading the diagram XML.
#[derive(Debug, Error)]
pub enum DrawioError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(#[from] quick_xml::Error),

    /// A geometry attribute could not be parsed as a number.
    #[error("cell `{label}`: attribute `{attribute}` is not a number: `{value}`")]
    InvalidNumber {
        label: String,
        attribute: &'static str,
        value: String,
    },
}

impl From<quick_xml::events::attributes::AttrError> for DrawioError {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        DrawioError::Xml(e.into())
    }
}

/// A labelled rectangle read from the diagram, in diagram pixel units.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagramCell {
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Cell being assembled while the reader is inside an `mxCell` element.
#[derive(Default)]
struct PendingCell {
    label: String,
    geometry: Option<[f64; 4]>,
}

/// Reads every vertex cell that has a geometry, in document order.
///
/// # Errors
///
/// Returns [`DrawioError`] for malformed XML or non-numeric geometry.
pub fn parse_cells(xml: &str) -> Result<Vec<DiagramCell>, DrawioError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut cells = Vec::new();
    let mut wrapper_label: Option<String> = None;
    let mut pending: Option<PendingCell> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.name().as_ref() {
                b"object" | b"UserObject" => wrapper_label = attribute(&e, b"label")?,
                b"mxCell" => pending = start_cell(&e, wrapper_label.as_deref())?,
                b"mxGeometry" => read_geometry(&e, pending.as_mut())?,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                // A self-closing cell has no geometry and can never become a record.
                b"mxCell" => {}
                b"mxGeometry" => read_geometry(&e, pending.as_mut())?,
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"mxCell" => {
                    if let Some(PendingCell {
                        label,
                        geometry: Some([x, y, width, height]),
                    }) = pending.take()
                    {
                        cells.push(DiagramCell {
                            label,
                            x,
                            y,
                            width,
                            height,
                        });
                    }
                }
                b"object" | b"UserObject" => wrapper_label = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    debug!(cells = cells.len(), "read diagram cells");
    Ok(cells)
}

/// Builds a [`KeyboardLayout`] from diagram XML.
///
/// Key rectangles are taken relative to the frame's top-left corner and
/// normalized by the frame width.
///
/// # Errors
///
/// Returns [`LayoutError::FrameNotFound`] if there is no `FRAME` record,
/// [`LayoutError::Parse`] for unreadable XML, and the validation errors of
/// [`KeyboardLayout::from_pixel_keys`].
pub fn parse_layout(xml: &str) -> Result<KeyboardLayout, LayoutError> {
    let cells = parse_cells(xml)?;

    let frame = cells
        .iter()
        .find(|c| c.label == FRAME_LABEL)
        .ok_or_else(|| LayoutError::FrameNotFound {
            label: FRAME_LABEL.to_string(),
        })?;

    let keys: Vec<Key> = cells
        .iter()
        .filter(|c| c.label != FRAME_LABEL && !c.label.is_empty())
        .map(|c| Key::new(c.label.clone(), c.x - frame.x, c.y - frame.y, c.width, c.height))
        .collect();

    let layout = KeyboardLayout::from_pixel_keys(frame.width, frame.height, keys)?;

    let overlaps = layout.overlapping_pairs();
    if !overlaps.is_empty() {
        warn!(
            count = overlaps.len(),
            "layout contains overlapping keys; the earlier key wins on lookup"
        );
    }
    info!(
        width = layout.width(),
        height = layout.height(),
        keys = layout.keys().len(),
        "keyboard layout loaded"
    );
    Ok(layout)
}

/// Reads and parses a layout diagram file.
///
/// # Errors
///
/// Returns [`LayoutError::Io`] if the file cannot be read, otherwise the errors of
/// [`parse_layout`].
pub fn load_layout(path: impl AsRef<Path>) -> Result<KeyboardLayout, LayoutError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_layout(&xml)
}

fn start_cell(e: &BytesStart<'_>, wrapper_label: Option<&str>) -> Result<Option<PendingCell>, DrawioError> {
    if attribute(e, b"vertex")?.as_deref() != Some("1") {
        return Ok(None);
    }
    let label = match wrapper_label {
        Some(label) => label.to_string(),
        None => attribute(e, b"value")?.unwrap_or_default(),
    };
    Ok(Some(PendingCell {
        label: label.trim().to_string(),
        geometry: None,
    }))
}

fn read_geometry(e: &BytesStart<'_>, pending: Option<&mut PendingCell>) -> Result<(), DrawioError> {
    let Some(cell) = pending else {
        return Ok(());
    };
    if cell.geometry.is_some() {
        return Ok(());
    }
    let mut geometry = [0.0; 4];
    for (slot, name) in geometry.iter_mut().zip(["x", "y", "width", "height"]) {
        if let Some(raw) = attribute(e, name.as_bytes())? {
            *slot = raw.trim().parse().map_err(|_| DrawioError::InvalidNumber {
                label: cell.label.clone(),
                attribute: name,
                value: raw.clone(),
            })?;
        }
    }
    cell.geometry = Some(geometry);
    Ok(())
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, DrawioError> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == name {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diagram(cells: &str) -> String {
        format!(
            r#"<mxfile host="app.diagrams.net"><diagram name="Page-1"><mxGraphModel><root>
<mxCell id="0"/><mxCell id="1" parent="0"/>
{cells}
</root></mxGraphModel></diagram></mxfile>"#
        )
    }

    fn cell(id: u32, value: &str, x: f64, y: f64, w: f64, h: f64) -> String {
        format!(
            r#"<mxCell id="{id}" value="{value}" style="rounded=0;" vertex="1" parent="1"><mxGeometry x="{x}" y="{y}" width="{w}" height="{h}" as="geometry"/></mxCell>"#
        )
    }

    #[test]
    fn test_parse_layout_excludes_frame_and_keeps_document_order() {
        // Arrange
        let xml = diagram(&[
            cell(2, "W", 150.0, 15.0, 50.0, 30.0),
            cell(3, "FRAME", 0.0, 0.0, 1000.0, 300.0),
            cell(4, "Q", 100.0, 15.0, 50.0, 30.0),
        ]
        .concat());

        // Act
        let layout = parse_layout(&xml).expect("layout must parse");

        // Assert
        assert_eq!(layout.width(), 1000.0);
        assert_eq!(layout.height(), 300.0);
        let labels: Vec<&str> = layout.keys().iter().map(|k| k.keycode.as_str()).collect();
        assert_eq!(labels, ["W", "Q"]);
        let q = layout.key("Q").unwrap();
        assert_relative_eq!(q.x, 0.1);
        assert_relative_eq!(q.y, 0.015);
        assert_relative_eq!(q.width, 0.05);
        assert_relative_eq!(q.height, 0.03);
    }

    #[test]
    fn test_parse_layout_keys_are_relative_to_frame_origin() {
        let xml = diagram(&[
            cell(2, "FRAME", 40.0, 60.0, 500.0, 200.0),
            cell(3, "Esc", 40.0, 60.0, 25.0, 25.0),
        ]
        .concat());

        let layout = parse_layout(&xml).unwrap();

        let esc = layout.key("Esc").unwrap();
        assert_eq!(esc.x, 0.0);
        assert_eq!(esc.y, 0.0);
        assert_relative_eq!(esc.width, 0.05);
    }

    #[test]
    fn test_parse_layout_without_frame_fails() {
        let xml = diagram(&cell(2, "Q", 0.0, 0.0, 10.0, 10.0));
        let result = parse_layout(&xml);
        assert!(matches!(result, Err(LayoutError::FrameNotFound { .. })));
    }

    #[test]
    fn test_parse_layout_skips_empty_and_whitespace_labels() {
        let xml = diagram(&[
            cell(2, "FRAME", 0.0, 0.0, 100.0, 50.0),
            cell(3, "", 0.0, 0.0, 10.0, 10.0),
            cell(4, "   ", 10.0, 0.0, 10.0, 10.0),
            cell(5, " A ", 20.0, 0.0, 10.0, 10.0),
        ]
        .concat());

        let layout = parse_layout(&xml).unwrap();

        let labels: Vec<&str> = layout.keys().iter().map(|k| k.keycode.as_str()).collect();
        assert_eq!(labels, ["A"]);
    }

    #[test]
    fn test_parse_cells_ignores_edges_and_cells_without_geometry() {
        let xml = diagram(
            r#"<mxCell id="7" value="arrow" edge="1" parent="1"><mxGeometry relative="1" as="geometry"/></mxCell>
<mxCell id="8" value="Floating" vertex="1" parent="1"/>
<mxCell id="9" value="Real" vertex="1" parent="1"><mxGeometry width="10" height="10" as="geometry"/></mxCell>"#,
        );

        let cells = parse_cells(&xml).unwrap();

        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].label, "Real");
        assert_eq!((cells[0].x, cells[0].y), (0.0, 0.0), "missing x/y default to zero");
    }

    #[test]
    fn test_parse_cells_reads_label_from_object_wrapper() {
        let xml = diagram(
            r#"<object label="Shift" id="10" finger="pinky"><mxCell style="" vertex="1" parent="1"><mxGeometry x="5" y="6" width="70" height="30" as="geometry"/></mxCell></object>"#,
        );

        let cells = parse_cells(&xml).unwrap();

        assert_eq!(cells[0].label, "Shift");
        assert_eq!(cells[0].width, 70.0);
    }

    #[test]
    fn test_parse_cells_unescapes_entities_in_labels() {
        let xml = diagram(&cell(2, "&amp;", 0.0, 0.0, 10.0, 10.0));
        let cells = parse_cells(&xml).unwrap();
        assert_eq!(cells[0].label, "&");
    }

    #[test]
    fn test_parse_layout_rejects_non_numeric_geometry() {
        let xml = diagram(
            r#"<mxCell id="2" value="FRAME" vertex="1" parent="1"><mxGeometry x="0" y="0" width="wide" height="300" as="geometry"/></mxCell>"#,
        );

        let result = parse_layout(&xml);

        match result {
            Err(LayoutError::Parse(DrawioError::InvalidNumber { attribute, value, .. })) => {
                assert_eq!(attribute, "width");
                assert_eq!(value, "wide");
            }
            other => panic!("expected InvalidNumber, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_layout_rejects_malformed_xml() {
        let result = parse_layout("<mxfile><diagram></mxfile>");
        assert!(matches!(result, Err(LayoutError::Parse(DrawioError::Xml(_)))));
    }

    #[test]
    fn test_load_layout_reports_missing_file() {
        let result = load_layout("/nonexistent/keymap.drawio");
        assert!(matches!(result, Err(LayoutError::Io { .. })));
    }
}
