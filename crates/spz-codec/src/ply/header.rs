use crate::error::{Result, SpzError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

/// The parts of a PLY header the importer cares about.
#[derive(Clone, Debug)]
pub(crate) struct PlyHeader {
    pub(crate) format: PlyFormat,
    pub(crate) comments: Vec<String>,
    pub(crate) vertex_count: usize,
    pub(crate) vertex_properties: Vec<String>,
}

impl PlyHeader {
    pub(crate) fn has_property(&self, name: &str) -> bool {
        self.vertex_properties.iter().any(|p| p == name)
    }

    pub(crate) fn has_any(&self, names: &[&str]) -> bool {
        names.iter().any(|name| self.has_property(name))
    }

    pub(crate) fn rest_count(&self) -> usize {
        self.vertex_properties
            .iter()
            .filter(|p| p.starts_with("f_rest_"))
            .count()
    }
}

/// Reads the header lines up to `end_header`. Only the `vertex` element is
/// kept, other elements are skipped over.
pub(crate) fn scan_header(bytes: &[u8]) -> Result<PlyHeader> {
    let mut lines = bytes
        .split(|&b| b == b'\n')
        .map(|line| std::str::from_utf8(line).map(str::trim));

    match lines.next() {
        Some(Ok("ply")) => {}
        _ => return Err(SpzError::corrupt("not a ply file, missing `ply` magic line")),
    }

    let mut format = None;
    let mut comments = Vec::new();
    let mut vertex_count = None;
    let mut vertex_properties = Vec::new();
    let mut in_vertex = false;

    for line in lines {
        let line = line.map_err(|_err| SpzError::corrupt("ply header is not valid text"))?;
        let mut words = line.split_whitespace();

        match words.next() {
            Some("end_header") => {
                let format = format.ok_or_else(|| SpzError::corrupt("ply header has no format"))?;
                let vertex_count = vertex_count
                    .ok_or_else(|| SpzError::corrupt("ply file has no vertex element"))?;
                return Ok(PlyHeader {
                    format,
                    comments,
                    vertex_count,
                    vertex_properties,
                });
            }
            Some("format") => {
                format = Some(match words.next() {
                    Some("ascii") => PlyFormat::Ascii,
                    Some("binary_little_endian") => PlyFormat::BinaryLittleEndian,
                    Some("binary_big_endian") => PlyFormat::BinaryBigEndian,
                    other => {
                        return Err(SpzError::corrupt(format!(
                            "unknown ply format {}",
                            other.unwrap_or("<none>")
                        )));
                    }
                });
            }
            Some("comment") | Some("obj_info") => {
                let text = line.split_once(char::is_whitespace).map_or("", |(_, t)| t);
                comments.push(text.trim().to_owned());
            }
            Some("element") => {
                let name = words.next();
                in_vertex = name == Some("vertex");
                if in_vertex {
                    let count = words
                        .next()
                        .and_then(|c| c.parse().ok())
                        .ok_or_else(|| SpzError::corrupt("bad vertex count in ply header"))?;
                    vertex_count = Some(count);
                }
            }
            Some("property") => {
                if in_vertex && let Some(name) = words.next_back() {
                    vertex_properties.push(name.to_owned());
                }
            }
            _ => {}
        }
    }

    Err(SpzError::corrupt("ply header is missing `end_header`"))
}
