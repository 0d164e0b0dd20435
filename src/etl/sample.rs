use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tqdm::tqdm;

use crate::data::osm::RawElement;
use crate::errors::Result;
use crate::etl::parse_osm::ElementReader;
use crate::etl::Etl;

pub const ETL_NAME: &str = "sample";
pub const OUTPUT_FILE_NAME: &str = "sample.osm";

/// Writes every k-th top-level element back out as a smaller .osm file, for
/// working on a manageable subset before running a full pass.
pub struct SampleEtl {
    input_path: PathBuf,
    k: usize,
}

impl SampleEtl {
    pub fn new(input_path: PathBuf, k: usize) -> SampleEtl {
        SampleEtl {
            input_path,
            k: k.max(1),
        }
    }
}

pub fn write_element<W: io::Write>(writer: &mut Writer<W>, element: &RawElement) -> Result<()> {
    let name = element.kind.as_str();
    let mut start = BytesStart::new(name);
    for (key, value) in &element.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.tags.is_empty() && element.node_refs.is_empty() && element.members.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    writer.write_event(Event::Start(start))?;
    for node_ref in &element.node_refs {
        let mut nd = BytesStart::new("nd");
        nd.push_attribute(("ref", node_ref.as_str()));
        writer.write_event(Event::Empty(nd))?;
    }
    for member in &element.members {
        let mut m = BytesStart::new("member");
        m.push_attribute(("type", member.member_type.as_str()));
        m.push_attribute(("ref", member.member_ref.as_str()));
        m.push_attribute(("role", member.role.as_str()));
        writer.write_event(Event::Empty(m))?;
    }
    for tag in &element.tags {
        let mut t = BytesStart::new("tag");
        t.push_attribute(("k", tag.key.as_str()));
        t.push_attribute(("v", tag.value.as_str()));
        writer.write_event(Event::Empty(t))?;
    }
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

impl Etl for SampleEtl {
    type Input = ElementReader<Box<dyn BufRead>>;
    type Output = ElementReader<Box<dyn BufRead>>;

    fn etl_name(&self) -> &str {
        ETL_NAME
    }

    fn output_file_name(&self) -> &str {
        OUTPUT_FILE_NAME
    }

    fn extract(&mut self, _dir: &Path) -> Result<Self::Input> {
        ElementReader::open(&self.input_path)
    }

    fn transform(&mut self, input: Self::Input) -> Result<Self::Output> {
        Ok(input)
    }

    fn load(&mut self, dir: &Path, output: Self::Output) -> Result<()> {
        let file = File::create(self.output_path(dir))?;
        let mut writer = Writer::new_with_indent(BufWriter::new(file), b' ', 2);

        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        writer.write_event(Event::Start(BytesStart::new("osm")))?;
        for element_res in tqdm(output.step_by(self.k)) {
            write_element(&mut writer, &element_res?)?;
        }
        writer.write_event(Event::End(BytesEnd::new("osm")))?;

        writer.into_inner().flush()?;
        Ok(())
    }
}
