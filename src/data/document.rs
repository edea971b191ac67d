//! Reading and writing ENTSO-E market documents.
//!
//! Day-ahead price queries answer with a `Publication_MarketDocument` holding
//! `TimeSeries` blocks, or with an `Acknowledgement_MarketDocument` when there
//! is nothing to return. Each `TimeSeries` keeps its verbatim bytes so a
//! merged document carries the same per-record markup upstream produced.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use crate::data::types::{PricePoint, SeriesPeriod, TimeSeriesRecord};

pub const PUBLICATION_NAMESPACE: &str =
    "urn:iec62325.351:tc57wg16:451-3:publicationdocument:7:3";
pub const PUBLICATION_ROOT: &str = "Publication_MarketDocument";
pub const ACKNOWLEDGEMENT_ROOT: &str = "Acknowledgement_MarketDocument";

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: usize, message: String },

    #[error("Missing <{element}> in {context}")]
    MissingElement { element: &'static str, context: String },

    #[error("Invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    #[error("Unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("Document has no root element")]
    Empty,

    #[error("Failed to write XML: {0}")]
    Write(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarketDocument {
    Publication {
        namespace: Option<String>,
        series: Vec<TimeSeriesRecord>,
    },
    /// Upstream's "no data" answer, e.g. reason 999.
    Acknowledgement {
        reason_code: Option<String>,
        reason_text: Option<String>,
    },
}

#[derive(Default)]
struct PointBuilder {
    position: Option<String>,
    price: Option<String>,
}

#[derive(Default)]
struct PeriodBuilder {
    start: Option<String>,
    end: Option<String>,
    resolution: Option<String>,
    points: Vec<PricePoint>,
    point: Option<PointBuilder>,
}

struct SeriesBuilder {
    offset: usize,
    mrid: Option<String>,
    classification: Option<String>,
    periods: Vec<SeriesPeriod>,
    period: Option<PeriodBuilder>,
}

/// Parse a market document, either a publication or an acknowledgement.
pub fn parse_document(bytes: &[u8]) -> Result<MarketDocument, DocumentError> {
    let mut reader = Reader::from_reader(bytes);
    let mut path: Vec<String> = Vec::new();
    let mut root: Option<String> = None;
    let mut namespace = None;
    let mut series = Vec::new();
    let mut current: Option<SeriesBuilder> = None;
    let mut reason_code = None;
    let mut reason_text = None;

    loop {
        let offset = reader.buffer_position();
        let event = reader.read_event().map_err(|e| DocumentError::Xml {
            position: reader.buffer_position(),
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                if root.is_none() {
                    namespace = default_namespace(&e);
                    check_root(&name)?;
                    root = Some(name.clone());
                } else if name == "TimeSeries" && path.len() == 1 {
                    current = Some(SeriesBuilder {
                        offset,
                        mrid: None,
                        classification: None,
                        periods: Vec::new(),
                        period: None,
                    });
                } else if let Some(builder) = current.as_mut() {
                    if name == "Period" {
                        builder.period = Some(PeriodBuilder::default());
                    } else if name == "Point" {
                        if let Some(period) = builder.period.as_mut() {
                            period.point = Some(PointBuilder::default());
                        }
                    }
                }
                path.push(name);
            }
            Event::Empty(e) => {
                if root.is_none() {
                    let name = local_name(&e);
                    namespace = default_namespace(&e);
                    check_root(&name)?;
                    root = Some(name);
                }
            }
            Event::End(_) => {
                let name = path.pop().unwrap_or_default();
                if let Some(mut builder) = current.take() {
                    match name.as_str() {
                        "TimeSeries" => {
                            let (start, end) = (builder.offset, reader.buffer_position());
                            series.push(finish_series(builder, &bytes[start..end])?);
                            continue;
                        }
                        "Period" => {
                            if let Some(period) = builder.period.take() {
                                builder.periods.push(finish_period(period)?);
                            }
                        }
                        "Point" => {
                            if let Some(period) = builder.period.as_mut() {
                                if let Some(point) = period.point.take().and_then(finish_point).transpose()? {
                                    period.points.push(point);
                                }
                            }
                        }
                        _ => {}
                    }
                    current = Some(builder);
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| DocumentError::Xml {
                    position: reader.buffer_position(),
                    message: err.to_string(),
                })?;
                let text = text.trim();
                if !text.is_empty() {
                    assign_text(&path, text, current.as_mut(), &mut reason_code, &mut reason_text);
                }
            }
            Event::CData(e) => {
                let raw = e.into_inner();
                let text = String::from_utf8_lossy(&raw);
                let text = text.trim();
                if !text.is_empty() {
                    assign_text(&path, text, current.as_mut(), &mut reason_code, &mut reason_text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match root.as_deref() {
        None => Err(DocumentError::Empty),
        Some(ACKNOWLEDGEMENT_ROOT) => Ok(MarketDocument::Acknowledgement {
            reason_code,
            reason_text,
        }),
        Some(_) => Ok(MarketDocument::Publication { namespace, series }),
    }
}

/// Parse a publication document; an acknowledgement yields no series.
pub fn parse_series(bytes: &[u8]) -> Result<Vec<TimeSeriesRecord>, DocumentError> {
    match parse_document(bytes)? {
        MarketDocument::Publication { series, .. } => Ok(series),
        MarketDocument::Acknowledgement { .. } => Ok(Vec::new()),
    }
}

/// Serialise records under a single publication root, replaying each
/// record's upstream markup.
pub fn write_publication(namespace: &str, series: &[TimeSeriesRecord]) -> Result<Vec<u8>, DocumentError> {
    let mut writer = Writer::new(Vec::new());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| DocumentError::Write(e.to_string()))?;
    writer.get_mut().push(b'\n');

    let root = BytesStart::new(PUBLICATION_ROOT).with_attributes([("xmlns", namespace)]);
    writer
        .write_event(Event::Start(root))
        .map_err(|e| DocumentError::Write(e.to_string()))?;

    for record in series {
        writer.get_mut().extend_from_slice(b"\n  ");
        writer.get_mut().extend_from_slice(&record.raw);
    }

    writer.get_mut().push(b'\n');
    writer
        .write_event(Event::End(BytesEnd::new(PUBLICATION_ROOT)))
        .map_err(|e| DocumentError::Write(e.to_string()))?;
    writer.get_mut().push(b'\n');

    Ok(writer.into_inner())
}

/// Upstream instants come as `2024-01-14T23:00Z`, seconds optional.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, DocumentError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%MZ")
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| DocumentError::InvalidValue {
            field: "timestamp",
            value: value.to_string(),
        })
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn default_namespace(e: &BytesStart) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == b"xmlns")
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn check_root(name: &str) -> Result<(), DocumentError> {
    match name {
        PUBLICATION_ROOT | ACKNOWLEDGEMENT_ROOT => Ok(()),
        other => Err(DocumentError::UnexpectedRoot(other.to_string())),
    }
}

fn assign_text(
    path: &[String],
    text: &str,
    series: Option<&mut SeriesBuilder>,
    reason_code: &mut Option<String>,
    reason_text: &mut Option<String>,
) {
    let n = path.len();
    let name = path.last().map(String::as_str).unwrap_or("");
    let parent = if n >= 2 { path[n - 2].as_str() } else { "" };

    let Some(builder) = series else {
        if parent == "Reason" {
            match name {
                "code" => *reason_code = Some(text.to_string()),
                "text" => *reason_text = Some(text.to_string()),
                _ => {}
            }
        }
        return;
    };

    match (parent, name) {
        ("TimeSeries", "mRID") => builder.mrid = Some(text.to_string()),
        ("TimeSeries", "classificationSequence_AttributeInstanceComponent.position") => {
            builder.classification = Some(text.to_string())
        }
        ("timeInterval", "start") => {
            if let Some(period) = builder.period.as_mut() {
                period.start = Some(text.to_string());
            }
        }
        ("timeInterval", "end") => {
            if let Some(period) = builder.period.as_mut() {
                period.end = Some(text.to_string());
            }
        }
        ("Period", "resolution") => {
            if let Some(period) = builder.period.as_mut() {
                period.resolution = Some(text.to_string());
            }
        }
        ("Point", "position") => {
            if let Some(point) = builder.period.as_mut().and_then(|p| p.point.as_mut()) {
                point.position = Some(text.to_string());
            }
        }
        ("Point", "price.amount") => {
            if let Some(point) = builder.period.as_mut().and_then(|p| p.point.as_mut()) {
                point.price = Some(text.to_string());
            }
        }
        _ => {}
    }
}

/// Points lacking a position or price are skipped, as upstream never omits
/// one without the other on a valid point.
fn finish_point(point: PointBuilder) -> Option<Result<PricePoint, DocumentError>> {
    let (position, price) = (point.position?, point.price?);
    Some(parse_point(&position, &price))
}

fn parse_point(position: &str, price: &str) -> Result<PricePoint, DocumentError> {
    let position = position.parse::<u32>().map_err(|_| DocumentError::InvalidValue {
        field: "position",
        value: position.to_string(),
    })?;
    let price = price.parse::<f64>().map_err(|_| DocumentError::InvalidValue {
        field: "price.amount",
        value: price.to_string(),
    })?;
    Ok(PricePoint { position, price })
}

fn finish_period(period: PeriodBuilder) -> Result<SeriesPeriod, DocumentError> {
    let start = period.start.ok_or_else(|| DocumentError::MissingElement {
        element: "timeInterval/start",
        context: "Period".to_string(),
    })?;
    let resolution = period.resolution.ok_or_else(|| DocumentError::MissingElement {
        element: "resolution",
        context: format!("Period starting {}", start),
    })?;

    Ok(SeriesPeriod {
        start: parse_instant(&start)?,
        end: period.end.as_deref().map(parse_instant).transpose()?,
        resolution,
        points: period.points,
    })
}

fn finish_series(builder: SeriesBuilder, raw: &[u8]) -> Result<TimeSeriesRecord, DocumentError> {
    let classification_sequence = builder
        .classification
        .map(|value| {
            value.parse::<u32>().map_err(|_| DocumentError::InvalidValue {
                field: "classificationSequence",
                value,
            })
        })
        .transpose()?;

    Ok(TimeSeriesRecord {
        mrid: builder.mrid,
        classification_sequence,
        periods: builder.periods,
        raw: raw.to_vec(),
    })
}
