use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str;

use log::warn;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use xz::bufread::XzDecoder;

use crate::data::osm::{ElementKind, Member, RawElement, Tag};
use crate::errors::{Error, Result};

/// Lazy, forward-only reader over the top-level elements of an .osm file.
/// One element is materialized at a time; the event buffer is reused between
/// reads, so memory stays bounded by the largest single element no matter
/// how big the input is. Not restartable: reopen the source to walk again.
pub struct ElementReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    skipped: u64,
    finished: bool,
}

impl ElementReader<Box<dyn BufRead>> {
    /// Open a plain or xz-compressed .osm file.
    pub fn open(path: &Path) -> Result<ElementReader<Box<dyn BufRead>>> {
        let file = fs::File::open(path)?;
        let file_reader = BufReader::new(file);
        let buf_read: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "xz") {
            Box::new(BufReader::new(XzDecoder::new(file_reader)))
        } else {
            Box::new(file_reader)
        };
        Ok(ElementReader::from_buf_read(buf_read))
    }
}

impl<R: BufRead> ElementReader<R> {
    pub fn from_buf_read(buf_read: R) -> ElementReader<R> {
        let mut reader = Reader::from_reader(buf_read);
        reader.trim_text(true);

        ElementReader {
            reader,
            buf: Vec::new(),
            skipped: 0,
            finished: false,
        }
    }

    /// Elements dropped so far because a required attribute was missing.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn read_next(&mut self) -> Result<Option<RawElement>> {
        let mut current: Option<RawElement> = None;
        // Set while discarding the subtree of an element that failed to open.
        let mut discarding = false;

        loop {
            // Nothing borrows the buffer across iterations, so it can be
            // cleared before every read to keep memory usage low.
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf) {
                Err(e) => return Err(e.into()),
                Ok(Event::Eof) => {
                    if current.is_some() || discarding {
                        return Err("input ended inside an element".into());
                    }
                    return Ok(None);
                },
                Ok(Event::Decl(_)) | Ok(Event::Comment(_)) => (),
                Ok(Event::Text(_)) => return Err("didn't expect text content in an OSM file".into()),
                Ok(Event::Start(e)) => {
                    match e.name().as_ref() {
                        b"node" | b"way" | b"relation" => {
                            if current.is_some() || discarding {
                                return Err("top-level elements must not nest".into());
                            }
                            match Self::begin_element(&e) {
                                Ok(element) => current = Some(element),
                                Err(err) => {
                                    warn!(err = err.to_string(); "Skipping element");
                                    self.skipped += 1;
                                    discarding = true;
                                },
                            }
                        },
                        b"tag" => Self::attach_tag(&e, &mut current)?,
                        b"nd" => Self::attach_node_ref(&e, &mut current)?,
                        b"member" => Self::attach_member(&e, &mut current)?,
                        b"osm" | b"bounds" | b"bound" => (),
                        _ => (),
                    }
                },
                Ok(Event::Empty(e)) => {
                    match e.name().as_ref() {
                        b"node" | b"way" | b"relation" => {
                            if current.is_some() || discarding {
                                return Err("top-level elements must not nest".into());
                            }
                            match Self::begin_element(&e) {
                                Ok(element) => return Ok(Some(element)),
                                Err(err) => {
                                    warn!(err = err.to_string(); "Skipping element");
                                    self.skipped += 1;
                                },
                            }
                        },
                        b"tag" => Self::attach_tag(&e, &mut current)?,
                        b"nd" => Self::attach_node_ref(&e, &mut current)?,
                        b"member" => Self::attach_member(&e, &mut current)?,
                        _ => (),
                    }
                },
                Ok(Event::End(e)) => {
                    match e.name().as_ref() {
                        b"node" | b"way" | b"relation" => {
                            if discarding {
                                discarding = false;
                            } else if let Some(element) = current.take() {
                                return Ok(Some(element));
                            }
                        },
                        _ => (),
                    }
                },
                Ok(event) => {
                    return Err(format!("unexpected event {:?}", event).into());
                },
            }
        }
    }

    fn begin_element(e: &BytesStart) -> Result<RawElement> {
        let kind = ElementKind::from_tag_name(e.name().as_ref())
            .ok_or("not a top-level element")?;
        let mut element = RawElement::new(kind);
        element.attrs = Self::parse_attrs(e)?;
        if element.id().is_none() {
            return Err(Error::MissingAttribute { element: kind.as_str(), attribute: "id" });
        }
        Ok(element)
    }

    fn parse_attrs(e: &BytesStart) -> Result<Vec<(String, String)>> {
        let mut attrs = Vec::new();
        for attribute_res in e.attributes() {
            let attribute = attribute_res?;
            let key = str::from_utf8(attribute.key.as_ref())?.to_string();
            let value = unescape(str::from_utf8(&attribute.value)?)?.into_owned();
            attrs.push((key, value));
        }
        Ok(attrs)
    }

    fn attach_tag(e: &BytesStart, current: &mut Option<RawElement>) -> Result<()> {
        let Some(element) = current.as_mut() else {
            return Ok(());
        };
        let attrs = Self::parse_attrs(e)?;
        let key = attrs.iter().find(|(name, _)| name == "k");
        let value = attrs.iter().find(|(name, _)| name == "v");
        match (key, value) {
            (Some((_, key)), Some((_, value))) => {
                element.tags.push(Tag { key: key.clone(), value: value.clone() });
            },
            _ => {
                warn!(parent = element.id().unwrap_or(""); "Dropping <tag> without k/v");
            },
        }
        Ok(())
    }

    fn attach_node_ref(e: &BytesStart, current: &mut Option<RawElement>) -> Result<()> {
        let Some(element) = current.as_mut() else {
            return Ok(());
        };
        let attrs = Self::parse_attrs(e)?;
        match attrs.into_iter().find(|(name, _)| name == "ref") {
            Some((_, node_ref)) => element.node_refs.push(node_ref),
            None => {
                warn!(parent = element.id().unwrap_or(""); "Dropping <nd> without ref");
            },
        }
        Ok(())
    }

    fn attach_member(e: &BytesStart, current: &mut Option<RawElement>) -> Result<()> {
        let Some(element) = current.as_mut() else {
            return Ok(());
        };
        let attrs = Self::parse_attrs(e)?;
        let mut member = Member {
            member_type: String::new(),
            member_ref: String::new(),
            role: String::new(),
        };
        for (name, value) in attrs {
            match name.as_str() {
                "type" => member.member_type = value,
                "ref" => member.member_ref = value,
                "role" => member.role = value,
                _ => (),
            }
        }
        element.members.push(member);
        Ok(())
    }
}

impl<R: BufRead> Iterator for ElementReader<R> {
    type Item = Result<RawElement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_next() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.finished = true;
                None
            },
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            },
        }
    }
}
