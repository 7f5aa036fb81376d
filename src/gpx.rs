//! GPX track and waypoint reader
//!
//! Provides an iterator that reads the recorded trackpoints and the named
//! waypoints from a GPX track file, plus [`parse_track_file`] implementing
//! the ingest contract of the [`World`](crate::World): one call, both
//! corpora, no partial results on failure.
//!
//! Trackpoints come from `trk/trkseg/trkpt` elements and carry the fix
//! time (`time` child, required) and horizontal dilution of precision
//! (`hdop` child, 0.0 when absent — the accuracy filter belongs to the
//! preparer, not the parser). Waypoints come from `wpt` elements; a
//! waypoint without a `name` child is assigned its 1-based ordinal within
//! the file as a decimal string, which by the digits rule marks it as an
//! intersection.

use std::io::BufRead;
use std::num::ParseFloatError;
use std::{mem, str};

use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::events::attributes::AttrError;
use quick_xml::name::QName;
use quick_xml::reader::Reader;
use thiserror::Error;
use tracing::debug;

use crate::types::{GeoPoint, RawTrackpoint, RawWaypoint, TypeError};

/// An error processing a GPX track file.
#[derive(Error, Debug)]
pub enum GpxError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    #[error("XML processing error")]
    Xml(#[from] quick_xml::Error),
    #[error("XML attribute processing error")]
    XmlAttr(#[from] AttrError),
    #[error("UTF-8 decoding error")]
    Utf8(#[from] str::Utf8Error),
    #[error("parsing floating-point number")]
    ParseFloat(#[from] ParseFloatError),
    #[error("parsing timestamp")]
    ParseTime(#[from] chrono::ParseError),
    #[error("GPX schema error: {0}")]
    GpxSchema(String),
    #[error("type invariant error")]
    Type(#[from] TypeError),
}

type Result<T> = std::result::Result<T, GpxError>;

/// An item parsed from a GPX document.
#[derive(Clone, PartialEq, Debug)]
pub enum GpxItem {
    /// A recorded GPS fix, in document order.
    Trackpoint(RawTrackpoint),
    /// A waypoint, possibly unnamed. Global to the GPX document.
    Waypoint(GpxWaypoint),
}

/// A GPX waypoint as it appears in the file, before name fallback.
#[derive(Clone, PartialEq, Debug)]
pub struct GpxWaypoint {
    /// Waypoint name, if the file provides one.
    pub name: Option<String>,

    /// Position of the waypoint.
    pub point: GeoPoint,
}

#[derive(Default)]
struct NextPtFields {
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
    time: Option<DateTime<Utc>>,
    hdop: Option<f64>,
}

impl TryFrom<NextPtFields> for RawTrackpoint {
    type Error = GpxError;

    fn try_from(value: NextPtFields) -> Result<Self> {
        let lat = value.lat.ok_or(GpxError::GpxSchema(
            "trackpoint missing lat attribute".to_owned(),
        ))?;
        let lon = value.lon.ok_or(GpxError::GpxSchema(
            "trackpoint missing lon attribute".to_owned(),
        ))?;
        let time = value
            .time
            .ok_or(GpxError::GpxSchema("trackpoint missing time".to_owned()))?;
        Ok(RawTrackpoint::new(
            time,
            GeoPoint::new(lat, lon)?,
            value.hdop.unwrap_or(0.0),
        ))
    }
}

impl TryFrom<NextPtFields> for GpxWaypoint {
    type Error = GpxError;

    fn try_from(value: NextPtFields) -> Result<Self> {
        let lat = value.lat.ok_or(GpxError::GpxSchema(
            "waypoint missing lat attribute".to_owned(),
        ))?;
        let lon = value.lon.ok_or(GpxError::GpxSchema(
            "waypoint missing lon attribute".to_owned(),
        ))?;
        Ok(Self {
            name: value.name,
            point: GeoPoint::new(lat, lon)?,
        })
    }
}

#[derive(Copy, Clone, PartialEq, Debug)]
enum Tag {
    Gpx,
    Trk,
    Trkseg,
    Trkpt,
    Time,
    Hdop,
    Wpt,
    Name,
    Unknown,
}

fn get_tag(name: &[u8]) -> Tag {
    match name {
        b"gpx" => Tag::Gpx,
        b"trk" => Tag::Trk,
        b"trkseg" => Tag::Trkseg,
        b"trkpt" => Tag::Trkpt,
        b"time" => Tag::Time,
        b"hdop" => Tag::Hdop,
        b"wpt" => Tag::Wpt,
        b"name" => Tag::Name,
        _ => Tag::Unknown,
    }
}

type TagPath = Vec<Tag>;

/// A reader for GPX track files.
///
/// Implements an Iterator that emits the track's trackpoints and waypoints.
/// A document that never opens a `gpx` root element produces a schema error
/// at end of input.
pub struct GpxReader<R>
where
    R: BufRead,
{
    reader: Reader<R>,
    tag_path: TagPath,
    next_pt_fields: NextPtFields,
    saw_root: bool,
}

impl<R> GpxReader<R>
where
    R: BufRead,
{
    fn new(mut reader: Reader<R>) -> GpxReader<R> {
        // Needed because our parsing logic relies on maintaining a stack of
        // tag names, which would otherwise be broken by empty trkpt tags
        // not generating an "End" event.
        reader.config_mut().expand_empty_elements = true;

        Self {
            reader,
            tag_path: vec![],
            next_pt_fields: NextPtFields::default(),
            saw_root: false,
        }
    }

    pub fn from_reader(reader: R) -> GpxReader<R> {
        GpxReader::new(Reader::from_reader(reader))
    }
}

impl<R> Iterator for GpxReader<R>
where
    R: BufRead,
{
    type Item = Result<GpxItem>;

    fn next(&mut self) -> Option<Result<GpxItem>> {
        let mut buf = Vec::new();

        // Keep iterating through quick_xml events until a new GpxItem can be
        // successfully emitted, any error occurs, or EOF is reached.
        loop {
            match self.reader.read_event_into(&mut buf) {
                Err(err) => return Some(Err(GpxError::Xml(err))),

                Ok(Event::Eof) => {
                    if !self.saw_root {
                        self.saw_root = true;
                        return Some(Err(GpxError::GpxSchema(
                            "input is not a GPX document".to_owned(),
                        )));
                    }
                    return None;
                }

                Ok(Event::Start(elt)) => {
                    let tag = get_tag(elt.name().as_ref());
                    self.tag_path.push(tag);
                    if self.tag_path.as_slice() == [Tag::Gpx] {
                        self.saw_root = true;
                    }

                    match self.tag_path.as_slice() {
                        [Tag::Gpx, Tag::Trk, Tag::Trkseg, Tag::Trkpt] | [Tag::Gpx, Tag::Wpt] => {
                            if let Err(e) = (|| -> Result<()> {
                                for attr in elt.attributes() {
                                    let a = attr?;
                                    if a.key == QName(b"lat") {
                                        self.next_pt_fields.lat =
                                            Some(str::from_utf8(&a.value)?.parse::<f64>()?);
                                    } else if a.key == QName(b"lon") {
                                        self.next_pt_fields.lon =
                                            Some(str::from_utf8(&a.value)?.parse::<f64>()?);
                                    }
                                }
                                Ok(())
                            })() {
                                return Some(Err(e));
                            }
                        }

                        _ => (),
                    }
                }

                Ok(Event::Text(text)) => match self.tag_path.as_slice() {
                    [Tag::Gpx, Tag::Trk, Tag::Trkseg, Tag::Trkpt, Tag::Time] => {
                        if let Err(e) = (|| -> Result<()> {
                            let s = str::from_utf8(text.as_ref())?;
                            self.next_pt_fields.time = Some(
                                DateTime::parse_from_rfc3339(s.trim())?.with_timezone(&Utc),
                            );
                            Ok(())
                        })() {
                            return Some(Err(e));
                        }
                    }

                    [Tag::Gpx, Tag::Trk, Tag::Trkseg, Tag::Trkpt, Tag::Hdop] => {
                        if let Err(e) = (|| -> Result<()> {
                            self.next_pt_fields.hdop =
                                Some(str::from_utf8(text.as_ref())?.trim().parse::<f64>()?);
                            Ok(())
                        })() {
                            return Some(Err(e));
                        }
                    }

                    [Tag::Gpx, Tag::Wpt, Tag::Name] => match str::from_utf8(text.as_ref()) {
                        Ok(name) => self.next_pt_fields.name = Some(name.to_owned()),
                        Err(err) => return Some(Err(err.into())),
                    },

                    _ => (),
                },

                Ok(Event::End(_elt)) => {
                    let tag_path = self.tag_path.clone();
                    self.tag_path.pop();

                    match tag_path.as_slice() {
                        [Tag::Gpx, Tag::Trk, Tag::Trkseg, Tag::Trkpt] => {
                            return Some(
                                RawTrackpoint::try_from(mem::take(&mut self.next_pt_fields))
                                    .map(GpxItem::Trackpoint),
                            );
                        }

                        [Tag::Gpx, Tag::Wpt] => {
                            debug!("Found waypoint with name: {:?}", self.next_pt_fields.name);
                            return Some(
                                GpxWaypoint::try_from(mem::take(&mut self.next_pt_fields))
                                    .map(GpxItem::Waypoint),
                            );
                        }

                        _ => (),
                    }
                }

                _ => (),
            }
        }
    }
}

/// Parse a GPX document into the two raw corpora.
///
/// Returns the trackpoints and waypoints in document order. Unnamed
/// waypoints receive their 1-based ordinal within the file as a name. On
/// any error nothing is returned; partial results are never emitted.
pub fn parse_track_file(bytes: &[u8]) -> Result<(Vec<RawTrackpoint>, Vec<RawWaypoint>)> {
    let mut trackpoints = Vec::new();
    let mut waypoints = Vec::new();
    for item in GpxReader::from_reader(bytes) {
        match item? {
            GpxItem::Trackpoint(trackpoint) => trackpoints.push(trackpoint),
            GpxItem::Waypoint(waypoint) => {
                let ordinal = waypoints.len() + 1;
                let name = waypoint.name.unwrap_or_else(|| ordinal.to_string());
                waypoints.push(RawWaypoint::new(name, waypoint.point));
            }
        }
    }
    debug!(
        trackpoints = trackpoints.len(),
        waypoints = waypoints.len(),
        "parsed GPX document"
    );
    Ok((trackpoints, waypoints))
}
